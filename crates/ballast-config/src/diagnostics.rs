use std::collections::BTreeSet;
use std::fmt;

use serde::de::DeserializeOwned;

/// Findings from [`crate::BallastConfig::load_from_str_with_diagnostics`].
///
/// Anything that deserializes is returned to the caller; problems are reported here instead of
/// failing the load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiagnostics {
    /// Unrecognized keys as dotted paths, e.g. `cleanup.agressive_passes`. Sorted.
    pub unknown_keys: Vec<String>,
    pub warnings: Vec<ConfigWarning>,
    /// Inconsistencies the engine cannot run sensibly with.
    pub errors: Vec<ConfigValidationError>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty() && self.errors.is_empty()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn absorb(&mut self, ValidationDiagnostics { warnings, errors }: ValidationDiagnostics) {
        self.warnings.extend(warnings);
        self.errors.extend(errors);
    }
}

/// Output of [`crate::BallastConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDiagnostics {
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<ConfigValidationError>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Accepted but probably not what was meant.
    InvalidValue { toml_path: String, message: String },
    /// `logging.level` is not a valid filter; `info` is used instead.
    LoggingLevelInvalid { value: String, normalized: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { toml_path, message } => write!(f, "{toml_path}: {message}"),
            Self::LoggingLevelInvalid { value, normalized } => {
                write!(f, "logging.level: `{value}` (read as `{normalized}`) is not a valid filter")
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    InvalidValue { toml_path: String, message: String },
    /// Pressure thresholds must satisfy `warning < critical < extreme`.
    ThresholdsOutOfOrder {
        warning: String,
        critical: String,
        extreme: String,
    },
    IntervalZero { toml_path: String },
    PassesOutOfRange { toml_path: String, passes: u32 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { toml_path, message } => write!(f, "{toml_path}: {message}"),
            Self::ThresholdsOutOfOrder {
                warning,
                critical,
                extreme,
            } => write!(
                f,
                "pressure thresholds out of order: warning={warning} critical={critical} extreme={extreme}"
            ),
            Self::IntervalZero { toml_path } => write!(f, "{toml_path}: interval must be non-zero"),
            Self::PassesOutOfRange { toml_path, passes } => {
                write!(f, "{toml_path}: {passes} passes is out of range")
            }
        }
    }
}

/// Parses `text` as `T`, collecting every key `T` ignored.
pub(crate) fn parse_tracking_unknown<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut ignored = BTreeSet::new();
    let parsed = serde_ignored::deserialize(toml::de::Deserializer::new(text), |path| {
        let rendered = path.to_string();
        // Root-level paths come out as `.key`.
        ignored.insert(rendered.strip_prefix('.').unwrap_or(&rendered).to_owned());
    })?;
    Ok((parsed, ignored.into_iter().collect()))
}
