//! Selection of output frame times over one or more sources.
//!
//! Frames are produced inside the interval where every source has data: from
//! the latest first time to the earliest last time. Each candidate time is
//! checked against every source in turn and accepted only if all of them can
//! supply data for it under the active [`FilterPolicy`].

use chrono::NaiveDateTime;
use qd_common::time::{add_minutes, minutes_between, round_to_step};
use qd_common::{QdError, QdResult, TimeZoneSpec};
use querydata::GridSource;

/// Maximum accepted value of the time step commands, 30 days in minutes.
pub const MAX_TIME_MINUTES: i64 = 30 * 24 * 60;

/// How a frame is built from the raw times of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPolicy {
    /// Only exact data times.
    #[default]
    None,
    /// Interpolate between the bracketing data times.
    Linear,
    Min,
    Max,
    Mean,
    Sum,
}

impl FilterPolicy {
    pub fn parse(s: &str) -> QdResult<Self> {
        match s {
            "none" => Ok(FilterPolicy::None),
            "linear" => Ok(FilterPolicy::Linear),
            "min" => Ok(FilterPolicy::Min),
            "max" => Ok(FilterPolicy::Max),
            "mean" => Ok(FilterPolicy::Mean),
            "sum" | "msum" => Ok(FilterPolicy::Sum),
            other => Err(QdError::UnknownFilter(other.to_string())),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FilterPolicy::Min | FilterPolicy::Max | FilterPolicy::Mean | FilterPolicy::Sum
        )
    }
}

/// Time stepping set with the `timestep*` commands, all in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSettings {
    /// Distance between frames, 0 follows the data times.
    pub step: i64,
    /// Length of the aggregation window.
    pub interval: i64,
    /// Maximum number of frames.
    pub steps: i64,
    /// Offset of the first frame from the data start.
    pub skip: i64,
    /// Round the first frame to a multiple of the step.
    pub rounding: bool,
    pub filter: FilterPolicy,
}

impl Default for TimeSettings {
    fn default() -> Self {
        Self {
            step: 0,
            interval: 0,
            steps: MAX_TIME_MINUTES,
            skip: 0,
            rounding: true,
            filter: FilterPolicy::None,
        }
    }
}

/// Raw data used for one source in one frame. Indices refer to the
/// source's time axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Window {
    /// A data time equal to the frame time.
    Exact(usize),
    /// `next * weight + previous * (1 - weight)`.
    Blend { previous: usize, next: usize, weight: f32 },
    /// Every data time in `[t - interval, t]`, latest first.
    Aggregate(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    /// First data time at or after the frame time.
    pub found: usize,
    pub window: Window,
}

/// One accepted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRequest {
    /// Frame time in the presentation time zone.
    pub time: NaiveDateTime,
    /// Per source, in source order.
    pub sources: Vec<SourceFrame>,
}

/// Plans frame times for a set of time axes.
#[derive(Debug, Clone)]
pub struct TemporalAligner {
    times: Vec<Vec<NaiveDateTime>>,
    settings: TimeSettings,
}

impl TemporalAligner {
    /// Time axes must be ascending and already in the presentation zone.
    pub fn new(times: Vec<Vec<NaiveDateTime>>, settings: TimeSettings) -> Self {
        Self { times, settings }
    }

    pub fn from_sources(sources: &[Box<dyn GridSource>], zone: TimeZoneSpec, settings: TimeSettings) -> Self {
        let times = sources
            .iter()
            .map(|s| s.times().iter().map(|t| zone.from_utc(*t)).collect())
            .collect();
        Self::new(times, settings)
    }

    /// Common data interval of all sources, `None` if any source is empty.
    pub fn interval(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut first: Option<NaiveDateTime> = None;
        let mut last: Option<NaiveDateTime> = None;
        for axis in &self.times {
            let (a, b) = (*axis.first()?, *axis.last()?);
            first = Some(first.map_or(a, |f| f.max(a)));
            last = Some(last.map_or(b, |l| l.min(b)));
        }
        Some((first?, last?))
    }

    pub fn frames(&self) -> Frames<'_> {
        let step = self.step();
        let state = self.interval().map(|(time1, time2)| {
            let start = if self.settings.rounding {
                let rounded = round_to_step(&time1, step);
                add_minutes(&add_minutes(&rounded, self.settings.skip), -step)
            } else {
                add_minutes(&time1, self.settings.skip)
            };
            (start, time1, time2)
        });
        Frames {
            aligner: self,
            state,
            accepted: 0,
        }
    }

    fn step(&self) -> i64 {
        if self.settings.step > 0 {
            self.settings.step
        } else {
            1
        }
    }

    /// Check one candidate against every source. The candidate moves to the
    /// found data time when the step is 0.
    fn accept(&self, t: &mut NaiveDateTime, time1: NaiveDateTime) -> Option<Vec<SourceFrame>> {
        let interval = self.settings.interval;
        let mut frames = Vec::with_capacity(self.times.len());

        for axis in &self.times {
            let found = axis.iter().position(|x| x >= t)?;
            if self.settings.step == 0 {
                *t = axis[found];
            }
            if *t < time1 {
                return None;
            }

            let exact = axis[found] == *t;
            let has_previous = add_minutes(t, -interval) >= time1;
            let window = match self.settings.filter {
                FilterPolicy::None if exact => Window::Exact(found),
                FilterPolicy::None => return None,
                FilterPolicy::Linear if exact => Window::Exact(found),
                FilterPolicy::Linear if has_previous && found > 0 => {
                    let (previous, next) = (found - 1, found);
                    let range = minutes_between(&axis[previous], &axis[next]);
                    let offset = minutes_between(&axis[previous], t);
                    Window::Blend {
                        previous,
                        next,
                        weight: offset as f32 / range as f32,
                    }
                }
                FilterPolicy::Linear => return None,
                _ if exact && has_previous => {
                    let start = add_minutes(t, -interval);
                    let indices = (0..=found).rev().take_while(|&i| axis[i] >= start).collect();
                    Window::Aggregate(indices)
                }
                _ => return None,
            };
            frames.push(SourceFrame { found, window });
        }
        Some(frames)
    }
}

/// Lazily stepped frame sequence.
pub struct Frames<'a> {
    aligner: &'a TemporalAligner,
    /// Current candidate and the data interval.
    state: Option<(NaiveDateTime, NaiveDateTime, NaiveDateTime)>,
    accepted: i64,
}

impl Iterator for Frames<'_> {
    type Item = FrameRequest;

    fn next(&mut self) -> Option<FrameRequest> {
        let (mut t, time1, time2) = self.state?;
        let step = self.aligner.step();
        loop {
            if self.accepted >= self.aligner.settings.steps {
                self.state = None;
                return None;
            }
            t = add_minutes(&t, step);
            if t > time2 {
                self.state = None;
                return None;
            }

            let mut candidate = t;
            let accepted = self.aligner.accept(&mut candidate, time1);
            t = candidate;
            self.state = Some((t, time1, time2));

            if let Some(sources) = accepted {
                self.accepted += 1;
                return Some(FrameRequest { time: t, sources });
            }
            tracing::trace!(time = %t, "No acceptable data for candidate time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{at, time_series};

    fn settings(step: i64, filter: FilterPolicy) -> TimeSettings {
        TimeSettings {
            step,
            interval: step,
            filter,
            ..TimeSettings::default()
        }
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(FilterPolicy::parse("msum").unwrap(), FilterPolicy::Sum);
        assert!(FilterPolicy::parse("mean").unwrap().is_aggregate());
        assert!(matches!(FilterPolicy::parse("median"), Err(QdError::UnknownFilter(_))));
    }

    #[test]
    fn test_step_zero_follows_data_times() {
        let times = vec![at(0, 0), at(1, 0), at(3, 0)];
        let aligner = TemporalAligner::new(vec![times.clone()], settings(0, FilterPolicy::None));
        let frames: Vec<_> = aligner.frames().map(|f| f.time).collect();
        assert_eq!(frames, times);
    }

    #[test]
    fn test_none_filter_skips_missing_times() {
        let times = vec![at(0, 0), at(1, 0), at(3, 0)];
        let aligner = TemporalAligner::new(vec![times], settings(60, FilterPolicy::None));
        let frames: Vec<_> = aligner.frames().map(|f| f.time).collect();
        assert_eq!(frames, vec![at(0, 0), at(1, 0), at(3, 0)]);
    }

    #[test]
    fn test_linear_blends_between_times() {
        let times = vec![at(0, 0), at(1, 0)];
        let aligner = TemporalAligner::new(vec![times], settings(30, FilterPolicy::Linear));
        let frames: Vec<_> = aligner.frames().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].sources[0].window, Window::Exact(0));
        assert_eq!(
            frames[1].sources[0].window,
            Window::Blend {
                previous: 0,
                next: 1,
                weight: 0.5
            }
        );
        assert_eq!(frames[2].sources[0].window, Window::Exact(1));
    }

    #[test]
    fn test_aggregate_needs_closed_window() {
        let times = time_series(at(0, 0), 4, 60);
        let aligner = TemporalAligner::new(vec![times], settings(60, FilterPolicy::Mean));
        let frames: Vec<_> = aligner.frames().collect();
        // The first data time has no previous window
        assert_eq!(frames[0].time, at(1, 0));
        assert_eq!(frames[0].sources[0].window, Window::Aggregate(vec![1, 0]));
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_timesteps_and_skip() {
        let times = time_series(at(0, 0), 10, 60);
        let aligner = TemporalAligner::new(
            vec![times],
            TimeSettings {
                step: 60,
                steps: 2,
                skip: 120,
                ..TimeSettings::default()
            },
        );
        let frames: Vec<_> = aligner.frames().map(|f| f.time).collect();
        assert_eq!(frames, vec![at(2, 0), at(3, 0)]);
    }

    #[test]
    fn test_rounding_snaps_to_step() {
        let times = time_series(at(0, 10), 6, 60);
        let rounded = TemporalAligner::new(vec![times.clone()], settings(60, FilterPolicy::None));
        assert_eq!(rounded.frames().count(), 0);

        let unrounded = TemporalAligner::new(
            vec![times],
            TimeSettings {
                rounding: false,
                ..settings(60, FilterPolicy::None)
            },
        );
        // Without rounding the first candidate is one step past the data start
        let frames: Vec<_> = unrounded.frames().map(|f| f.time).collect();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], at(1, 10));
    }

    #[test]
    fn test_empty_source_produces_nothing() {
        let aligner = TemporalAligner::new(vec![vec![at(0, 0)], Vec::new()], TimeSettings::default());
        assert!(aligner.interval().is_none());
        assert_eq!(aligner.frames().count(), 0);
    }
}
