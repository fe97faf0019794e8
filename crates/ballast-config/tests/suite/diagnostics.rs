use std::io::Write;

use ballast_config::{
    BallastConfig, ConfigError, ConfigValidationError, ConfigWarning, CONFIG_FILE_NAME,
};
use ballast_memory::QualityLevel;
use tempfile::tempdir;

#[test]
fn reports_unknown_keys_with_full_paths() {
    let text = r#"
typo = 1

[cleanup]
agressive_passes = 3

[disk_cache]
enabeld = true
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.unknown_keys,
        vec!["cleanup.agressive_passes", "disk_cache.enabeld", "typo"]
    );
    assert!(diagnostics.is_ok());
}

#[test]
fn default_config_has_no_diagnostics() {
    let (config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics("").expect("config should parse");
    assert_eq!(config, BallastConfig::default());
    assert!(diagnostics.is_empty());
}

#[test]
fn thresholds_must_be_increasing() {
    let text = r#"
[pressure]
warning = 0.8
critical = 0.7
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert_eq!(
        diagnostics.errors,
        vec![ConfigValidationError::ThresholdsOutOfOrder {
            warning: "0.8".to_string(),
            critical: "0.7".to_string(),
            extreme: "0.9".to_string(),
        }]
    );
}

#[test]
fn zero_intervals_and_pass_counts_are_errors() {
    let text = r#"
[cleanup]
aggressive_interval_secs = 0
emergency_passes = 9

[diagnostics]
cooldown_secs = 0
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(diagnostics
        .errors
        .contains(&ConfigValidationError::IntervalZero {
            toml_path: "cleanup.aggressive_interval_secs".to_string(),
        }));
    assert!(diagnostics
        .errors
        .contains(&ConfigValidationError::IntervalZero {
            toml_path: "diagnostics.cooldown_secs".to_string(),
        }));
    assert!(diagnostics
        .errors
        .contains(&ConfigValidationError::PassesOutOfRange {
            toml_path: "cleanup.emergency_passes".to_string(),
            passes: 9,
        }));
    assert!(!diagnostics.is_ok());
}

#[test]
fn fewer_emergency_than_aggressive_passes_is_a_warning() {
    let text = r#"
[cleanup]
aggressive_passes = 4
emergency_passes = 2
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(diagnostics.is_ok());
    assert_eq!(
        diagnostics.warnings,
        vec![ConfigWarning::InvalidValue {
            toml_path: "cleanup.emergency_passes".to_string(),
            message: "is lower than cleanup.aggressive_passes".to_string(),
        }]
    );
}

#[test]
fn invalid_logging_level_is_a_warning() {
    let text = r#"
[logging]
level = "info,ballast.cache=verbose"
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(diagnostics.is_ok());
    assert!(matches!(
        diagnostics.warnings.as_slice(),
        [ConfigWarning::LoggingLevelInvalid { .. }]
    ));
}

#[test]
fn toml_errors_do_not_echo_the_input() {
    let err = BallastConfig::load_from_str_with_diagnostics("[leak]\nenabled = \"sometimes\"\n")
        .expect_err("type mismatch");
    match err {
        ConfigError::Toml(message) => assert!(!message.contains("[leak]"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn loads_sections_from_a_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
[quality]
override_level = "ultra"
reevaluate_interval_ms = 250

[leak]
enabled = false
window_secs = 120

[frame_rate]
target_fps = 90
"#
    )
    .unwrap();

    let config = BallastConfig::load_from_path(&path).expect("load");
    assert_eq!(config.quality.override_level, Some(QualityLevel::Ultra));
    assert_eq!(config.quality.reevaluate_interval().as_millis(), 250);
    assert!(!config.leak.enabled);
    assert_eq!(config.leak.detector_config().window.as_secs(), 120);
    assert_eq!(config.frame_rate.target_fps, 90);
}

#[test]
fn missing_file_reports_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    let err = BallastConfig::load_from_path(&path).expect_err("missing file");
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn leak_window_shorter_than_two_intervals_is_a_warning() {
    let text = r#"
[leak]
interval_secs = 60
window_secs = 60
"#;

    let (_config, diagnostics) =
        BallastConfig::load_from_str_with_diagnostics(text).expect("config should parse");

    assert!(diagnostics.errors.is_empty());
    assert!(matches!(
        diagnostics.warnings.as_slice(),
        [ConfigWarning::InvalidValue { toml_path, .. }] if toml_path == "leak.window_secs"
    ));
}

#[test]
fn default_leak_cadence_fits_the_window() {
    let config = BallastConfig::default();
    assert!(config.leak.detector_config().window >= config.leak.interval() * 2);
}
