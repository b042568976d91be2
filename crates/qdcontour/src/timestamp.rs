//! Output file names and the time stamp drawn into frames.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use qd_common::time::{format_clock_date, format_date_clock, format_ddhhmm, format_yyyymmddhhmm, minutes_between};
use qd_common::{BlendRule, Color, QdResult, TimeZoneSpec};
use querydata::GridSource;
use renderer::text::{draw_text, measure};
use renderer::{Alignment, Canvas, FontLibrary, TextStyle};

use crate::context::{Settings, TimestampMode};

const STAMP_FONT: &str = "DejaVuSans-Bold";
const STAMP_SIZE: f32 = 14.0;
const STAMP_MARGIN: f32 = 4.0;
/// Light grey at transparency 32 of 127.
const STAMP_BACKGROUND: Color = Color::rgba(180, 180, 180, 191);

/// `<savepath>/<prefix><YYYYMMDDHHMM>[_<DDHHMM>...]<suffix>.<ext>`, with one
/// modification stamp per source when file stamping is on.
pub fn output_path(settings: &Settings, time: &NaiveDateTime, sources: &[Box<dyn GridSource>]) -> PathBuf {
    let mut name = format!("{}{}", settings.prefix, format_yyyymmddhhmm(time));
    if settings.timestamp_files {
        for source in sources {
            if let Some(modified) = source.modified() {
                let local = TimeZoneSpec::Local.from_system(modified);
                name.push('_');
                name.push_str(&format_ddhhmm(&local));
            }
        }
    }
    name.push_str(&settings.suffix);
    name.push('.');
    name.push_str(settings.image.format.extension());
    settings.savepath.join(name)
}

/// Earliest forecast origin time of the sources, in `zone`.
pub fn origin_time(sources: &[Box<dyn GridSource>], zone: TimeZoneSpec) -> Option<NaiveDateTime> {
    sources.iter().map(|s| s.origin_time()).min().map(|t| zone.from_utc(t))
}

/// Text of the frame stamp, `None` when stamping is off.
pub fn stamp_text(mode: TimestampMode, time: &NaiveDateTime, origin: &NaiveDateTime, step: i64) -> Option<String> {
    match mode {
        TimestampMode::None => None,
        TimestampMode::Obs => Some(format_clock_date(time)),
        TimestampMode::For => Some(format_clock_date(origin)),
        TimestampMode::ForObs => {
            let diff = minutes_between(origin, time);
            let sign = if diff < 0 { "" } else { "+" };
            let elapsed = if diff % 60 == 0 && step % 60 == 0 {
                format!("{}{}h", sign, diff / 60)
            } else {
                format!("{}{}m", sign, diff)
            };
            Some(format!("{} {}", format_date_clock(origin), elapsed))
        }
    }
}

/// Draw the stamp on a light backing box. Negative positions count from
/// the right and bottom edges.
pub fn draw_stamp(canvas: &mut Canvas, fonts: &mut FontLibrary, text: &str, position: (i32, i32)) -> QdResult<()> {
    let font = fonts.font(STAMP_FONT)?;
    let (width, height) = measure(&font, STAMP_SIZE, text);

    let mut x = position.0 as f32;
    let mut y = position.1 as f32;
    if x < 0.0 {
        x += canvas.width() as f32;
    }
    if y < 0.0 {
        y += canvas.height() as f32;
    }

    canvas.fill_rect(
        x - STAMP_MARGIN,
        y - STAMP_MARGIN,
        width + 2.0 * STAMP_MARGIN,
        height + 2.0 * STAMP_MARGIN,
        STAMP_BACKGROUND,
        BlendRule::Over,
    );
    let style = TextStyle {
        font,
        size: STAMP_SIZE,
        color: Color::BLACK,
        rule: BlendRule::Over,
        align: Alignment::NorthWest,
        angle: 0.0,
    };
    draw_text(canvas, &style, text, x, y);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SearchPaths;
    use renderer::ImageFormat;
    use test_utils::at;

    #[test]
    fn test_output_path() {
        let mut settings = Settings::new(SearchPaths::default());
        settings.savepath = PathBuf::from("/tmp/out");
        settings.prefix = "t2m_".to_string();
        settings.suffix = "_fi".to_string();
        settings.image.format = ImageFormat::Jpeg;
        let path = output_path(&settings, &at(12, 0), &[]);
        assert_eq!(path, PathBuf::from("/tmp/out/t2m_202401151200_fi.jpg"));
    }

    #[test]
    fn test_stamp_texts() {
        let origin = at(6, 0);
        assert_eq!(stamp_text(TimestampMode::None, &at(12, 0), &origin, 60), None);
        let obs = stamp_text(TimestampMode::Obs, &at(12, 0), &origin, 60).unwrap();
        assert_eq!(obs, format_clock_date(&at(12, 0)));

        let hours = stamp_text(TimestampMode::ForObs, &at(12, 0), &origin, 60).unwrap();
        assert!(hours.ends_with(" +6h"), "{}", hours);
        let minutes = stamp_text(TimestampMode::ForObs, &at(12, 0), &origin, 30).unwrap();
        assert!(minutes.ends_with(" +360m"), "{}", minutes);
        let before = stamp_text(TimestampMode::ForObs, &at(5, 0), &origin, 60).unwrap();
        assert!(before.ends_with(" -1h"), "{}", before);
    }
}
