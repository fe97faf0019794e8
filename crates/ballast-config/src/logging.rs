use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Level names accepted case-insensitively, mapped to their filter spelling.
const LEVEL_ALIASES: &[(&str, &str)] = &[
    ("trace", "trace"),
    ("debug", "debug"),
    ("info", "info"),
    ("warn", "warn"),
    ("warning", "warn"),
    ("error", "error"),
    ("off", "off"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string such as
    /// `info,ballast.cache=debug`. `RUST_LOG` directives are layered on top.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Also append to this file. Logging continues on the other sinks if it cannot be opened.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// Canonicalizes a bare level name; anything else is passed through as directives.
    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }
        LEVEL_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
            .map_or_else(|| trimmed.to_owned(), |(_, level)| (*level).to_owned())
    }

    /// The filter `init_tracing` installs.
    ///
    /// Tries the configured directives merged with `RUST_LOG`, then `RUST_LOG` alone, then the
    /// configured directives alone, and settles on `info` if none parse.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = Self::normalize_level_directives(&self.level);
        let from_env = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let mut candidates = Vec::with_capacity(3);
        if let Some(env) = from_env {
            candidates.push(format!("{configured},{env}"));
            candidates.push(env);
        }
        candidates.push(configured);

        candidates
            .into_iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

fn open_log_file(path: &Path) -> io::Result<Arc<std::fs::File>> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
}

/// Combines the configured sinks into one writer. A file that fails to open is returned as the
/// error half so it can be logged once the subscriber is live.
fn make_writer(config: &LoggingConfig) -> (BoxMakeWriter, Option<(PathBuf, io::Error)>) {
    let stderr = config.stderr.then(|| {
        // Debug builds go through `TestWriter` so libtest can capture the output.
        if cfg!(debug_assertions) {
            BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
        } else {
            BoxMakeWriter::new(io::stderr)
        }
    });

    let (file, failure) = match config.file.as_deref().map(|path| (path, open_log_file(path))) {
        Some((_, Ok(file))) => (Some(file), None),
        Some((path, Err(err))) => (None, Some((path.to_path_buf(), err))),
        None => (None, None),
    };

    let writer = match (stderr, file) {
        (Some(stderr), Some(file)) => BoxMakeWriter::new(stderr.and(file)),
        (Some(stderr), None) => stderr,
        (None, Some(file)) => BoxMakeWriter::new(file),
        (None, None) => BoxMakeWriter::new(io::sink),
    };
    (writer, failure)
}

static ATTEMPTED: AtomicBool = AtomicBool::new(false);

/// Installs the process-wide `tracing` subscriber described by `config`.
///
/// Only the first call does anything. Returns `true` if that call installed the subscriber.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    if ATTEMPTED.swap(true, Ordering::AcqRel) {
        return false;
    }

    let (writer, file_failure) = make_writer(config);
    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);
    let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
        fmt.json().boxed()
    } else {
        fmt.boxed()
    };

    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    if let Some((path, err)) = file_failure {
        tracing::warn!(
            target = "ballast.config",
            path = %path.display(),
            error = %err,
            "log file unavailable; continuing without it"
        );
    }
    true
}
