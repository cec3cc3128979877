use desk_config::{RunMode, load_file, load_toml};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

const FULL: &str = r#"
[predictor]
max_speed = 6000
max_speed_to_stop = 20
fudge_factor = 1.5
max_height = 12700

[stall]
window = 6
zero_speed_limit = 3

[mover]
tick_ms = 50
acquire_timeout_ms = 2000

[engine]
command_interval_ms = 150

[runner]
mode = "guarded"
cycle_timeout_ms = 30000
"#;

#[test]
fn parses_every_section() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.predictor.max_speed, 6000);
    assert_eq!(cfg.predictor.max_speed_to_stop, 20);
    assert_eq!(cfg.predictor.max_height, 12700);
    assert_eq!(cfg.stall.window, 6);
    assert_eq!(cfg.mover.tick_ms, 50);
    assert_eq!(cfg.engine.command_interval_ms, 150);
    assert_eq!(cfg.runner.mode, RunMode::Guarded);
}

#[test]
fn partial_sections_keep_defaults() {
    let cfg = load_toml("[mover]\ntick_ms = 20\n").expect("parse TOML");
    assert_eq!(cfg.mover.tick_ms, 20);
    assert_eq!(cfg.mover.acquire_timeout_ms, 3000);
    assert_eq!(cfg.stall.window, 5);
    cfg.validate().expect("valid");
}

#[rstest]
#[case("[predictor]\nmax_speed = 0\n", "predictor.max_speed must be > 0")]
#[case("[predictor]\nfudge_factor = 0.0\n", "predictor.fudge_factor")]
#[case("[predictor]\nmax_height = 100\n", "predictor.max_height")]
#[case("[stall]\nwindow = 1\n", "stall.window must be >= 2")]
#[case("[stall]\nzero_speed_limit = 9\n", "stall.zero_speed_limit")]
#[case("[mover]\ntick_ms = 0\n", "mover.tick_ms must be >= 1")]
#[case("[mover]\ntick_ms = 60000\n", "unreasonably large")]
#[case("[mover]\nacquire_timeout_ms = 0\n", "mover.acquire_timeout_ms")]
#[case("[engine]\ncommand_interval_ms = 0\n", "engine.command_interval_ms")]
#[case("[runner]\ncycle_timeout_ms = 100\n", "runner.cycle_timeout_ms must be >=")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "unexpected error message: {err}"
    );
}

#[test]
fn unknown_run_mode_is_a_parse_error() {
    assert!(load_toml("[runner]\nmode = \"sideways\"\n").is_err());
}

#[test]
fn load_file_parses_and_validates() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("desk.toml");
    fs::write(&good, FULL).unwrap();
    let cfg = load_file(&good).expect("load");
    assert_eq!(cfg.runner.cycle_timeout_ms, 30_000);

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[mover]\ntick_ms = 0\n").unwrap();
    let err = load_file(&bad).expect_err("invalid file");
    assert!(format!("{err}").contains("mover.tick_ms"));

    let missing = dir.path().join("nope.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("reading config"));
}
