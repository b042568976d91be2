//! End-to-end tests running scripts through the interpreter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use qd_common::{Field, GridSpec, QdError};
use qdcontour::{RenderContext, ScriptInterpreter, SearchPaths};
use renderer::{ContourEngine, ContourRequest, DefaultContourEngine, RecordingWriter};
use test_utils::{
    areas, at, create_constant_field, create_ramp_field, create_series_source, small_grid, time_series,
    temp_test_dir, write_querydata, write_script,
};

/// Counts calls reaching the contour engine.
#[derive(Debug, Default)]
struct CountingEngine {
    calls: AtomicUsize,
}

impl CountingEngine {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContourEngine for CountingEngine {
    fn contour(&self, field: &Field, grid: &GridSpec, request: &ContourRequest) -> renderer::Path {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DefaultContourEngine.contour(field, grid, request)
    }
}

type TestInterpreter = ScriptInterpreter<CountingEngine, RecordingWriter>;

fn interpreter() -> TestInterpreter {
    ScriptInterpreter::with_parts(
        RenderContext::new(SearchPaths::default()),
        CountingEngine::default(),
        RecordingWriter::default(),
    )
}

/// Temperature on the small grid at 00, 01, 02 and 03 UTC.
fn write_temperature(dir: &Path, name: &str, field_at: impl Fn(usize) -> Field) -> PathBuf {
    let qd = create_series_source(name, &small_grid(), "Temperature", time_series(at(0, 0), 4, 60), field_at);
    write_querydata(dir, name, &qd)
}

fn preamble(dir: &Path, data: &Path) -> String {
    format!(
        "timestampzone utc\nprojection {}\nsavepath {}\nquerydata {}\n",
        areas::SMALL_LATLON,
        dir.display(),
        data.display()
    )
}

// ============================================================================
// Frame selection and output names
// ============================================================================

#[test]
fn test_one_frame_per_data_time() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    let mut interp = interpreter();
    interp
        .run(&format!("{}prefix t_\nparam Temperature\ndraw contours\n", preamble(dir.path(), &data)))
        .unwrap();

    let expected: Vec<PathBuf> = ["0000", "0100", "0200", "0300"]
        .iter()
        .map(|hm| dir.path().join(format!("t_20240115{}.png", hm)))
        .collect();
    assert_eq!(interp.writer().written, expected);
    assert_eq!(interp.drawn().written, expected);
}

#[test]
fn test_frames_limited_to_common_interval() {
    let dir = temp_test_dir();
    let grid = small_grid();
    let a = create_series_source("a.json", &grid, "Temperature", time_series(at(0, 0), 7, 60), |_| {
        create_constant_field(5, 5, 1.0)
    });
    let b = create_series_source("b.json", &grid, "Precipitation1h", time_series(at(2, 0), 7, 60), |_| {
        create_constant_field(5, 5, 0.5)
    });
    let a = write_querydata(dir.path(), "a.json", &a);
    let b = write_querydata(dir.path(), "b.json", &b);

    let mut interp = interpreter();
    interp
        .run(&format!(
            "timestampzone utc\nprojection {}\nsavepath {}\nquerydata {},{}\ntimestep 60\n\
             param Temperature\nparam Precipitation1h\ndraw contours\n",
            areas::SMALL_LATLON,
            dir.path().display(),
            a.display(),
            b.display()
        ))
        .unwrap();

    let names: Vec<String> = interp
        .writer()
        .written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "202401150200.png",
            "202401150300.png",
            "202401150400.png",
            "202401150500.png",
            "202401150600.png"
        ]
    );
}

#[test]
fn test_existing_frames_are_skipped_unless_forced() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    let existing = dir.path().join("202401150100.png");
    std::fs::write(&existing, b"old").unwrap();

    let mut interp = interpreter();
    interp.run(&format!("{}draw contours\n", preamble(dir.path(), &data))).unwrap();
    assert_eq!(interp.drawn().skipped, vec![existing.clone()]);
    assert_eq!(interp.writer().written.len(), 3);
    assert!(!interp.writer().written.contains(&existing));

    interp.context_mut().settings.force = true;
    interp.run("draw contours\n").unwrap();
    assert_eq!(interp.writer().written.len(), 7);
    assert_eq!(interp.drawn().skipped.len(), 1);
}

#[test]
fn test_empty_existing_file_is_overwritten() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    std::fs::write(dir.path().join("202401150000.png"), b"").unwrap();

    let mut interp = interpreter();
    interp.run(&format!("{}draw contours\n", preamble(dir.path(), &data))).unwrap();
    assert_eq!(interp.writer().written.len(), 4);
    assert!(interp.drawn().skipped.is_empty());
}

// ============================================================================
// Contour cache
// ============================================================================

#[test]
fn test_identical_fields_are_traced_once() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    let mut interp = interpreter();
    interp
        .run(&format!(
            "{}param Temperature\ncontourfills 0 10 2 blue red\ndraw contours\n",
            preamble(dir.path(), &data)
        ))
        .unwrap();

    assert_eq!(interp.writer().written.len(), 4);
    // Five bands, each traced for the first frame only
    assert_eq!(interp.engine().calls(), 5);
}

#[test]
fn test_disabled_cache_traces_every_frame() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    let mut interp = interpreter();
    interp
        .run(&format!(
            "{}cache 0\nparam Temperature\ncontourfills 0 10 2 blue red\ndraw contours\n",
            preamble(dir.path(), &data)
        ))
        .unwrap();
    assert_eq!(interp.engine().calls(), 20);
}

#[test]
fn test_new_querydata_clears_cache() {
    let dir = temp_test_dir();
    let first = write_temperature(dir.path(), "a.json", |_| create_ramp_field(5, 5));
    let second = write_temperature(dir.path(), "b.json", |_| create_ramp_field(5, 5));
    let mut interp = interpreter();
    interp
        .run(&format!(
            "{}param Temperature\ncontourfill 0 10 red\ndraw contours\n",
            preamble(dir.path(), &first)
        ))
        .unwrap();
    assert_eq!(interp.engine().calls(), 1);

    interp.run("draw contours\n").unwrap();
    assert_eq!(interp.engine().calls(), 1);

    interp
        .run(&format!("querydata {}\ndraw contours\n", second.display()))
        .unwrap();
    assert_eq!(interp.engine().calls(), 2);
}

// ============================================================================
// Range rejection
// ============================================================================

#[test]
fn test_ranges_outside_data_are_not_traced() {
    let dir = temp_test_dir();
    let qd = create_series_source("c.json", &small_grid(), "Temperature", vec![at(12, 0)], |_| {
        create_constant_field(5, 5, 5.0)
    });
    let data = write_querydata(dir.path(), "c.json", &qd);

    let mut interp = interpreter();
    interp
        .run(&format!(
            "{}param Temperature\ncontourfill 10 20 red\ncontourfill 0 10 blue\n\
             contourline 7 black\ncontourline 5 black\ndraw contours\n",
            preamble(dir.path(), &data)
        ))
        .unwrap();
    assert_eq!(interp.writer().written.len(), 1);
    assert_eq!(interp.engine().calls(), 2);
}

#[test]
fn test_all_missing_field_only_traces_missing_ranges() {
    let dir = temp_test_dir();
    let qd = create_series_source("m.json", &small_grid(), "Temperature", vec![at(12, 0)], |_| {
        Field::filled(5, 5, None)
    });
    let data = write_querydata(dir.path(), "m.json", &qd);

    let mut interp = interpreter();
    interp
        .run(&format!(
            "{}cache 0\nparam Temperature\ncontourfill - - grey\ncontourfill 0 1 red\n\
             contourline - black\ncontourline 0 black\ndraw contours\n",
            preamble(dir.path(), &data)
        ))
        .unwrap();
    // The missing band and the missing line share a cache key, so trace
    // without the cache to count both
    assert_eq!(interp.engine().calls(), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unknown_parameter_fails_the_run() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_ramp_field(5, 5));
    let mut interp = interpreter();
    let err = interp
        .run(&format!("{}param Humidity\ncontourfill 0 10 red\ndraw contours\n", preamble(dir.path(), &data)))
        .unwrap_err();
    assert!(matches!(err, QdError::UnknownParameter(_)), "{:?}", err);
    assert!(interp.writer().written.is_empty());
}

#[test]
fn test_commands_after_a_failure_are_not_run() {
    let mut interp = interpreter();
    assert!(interp.run("prefix a_\nnosuchcommand\nprefix b_\n").is_err());
    assert_eq!(interp.context().settings.prefix, "a_");
}

// ============================================================================
// Script files and real output
// ============================================================================

#[test]
fn test_script_file_with_include_writes_png() {
    let dir = temp_test_dir();
    let data = write_temperature(dir.path(), "t.json", |_| create_constant_field(5, 5, 5.0));
    write_script(
        dir.path(),
        "setup.inc",
        &format!("{}#define WARM #FF0000\ntimesteps 1\n", preamble(dir.path(), &data)),
    );
    let script = write_script(
        dir.path(),
        "main.conf",
        "#include setup.inc\n\
         // red wherever the data is\n\
         fillrule Over\n\
         param Temperature\n\
         contourfill 0 10 WARM\n\
         draw contours\n",
    );

    let mut interp = ScriptInterpreter::new(SearchPaths::default());
    interp.run_file(&script).unwrap();

    let output = dir.path().join("202401150000.png");
    assert_eq!(interp.drawn().written, vec![output.clone()]);
    let image = image::open(&output).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (100, 100));
    assert_eq!(image.get_pixel(50, 50).0, [255, 0, 0, 255]);
}
