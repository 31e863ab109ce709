use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the harness outside the metrics subsystem.
///
/// Only `Config*` and `UnknownBehavior` are fatal; they are raised before
/// any virtual user starts. The rest are handled per request or per user.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("no behavior registered under `{0}`")]
    UnknownBehavior(String),

    #[error("behavior `{behavior}` has no task named `{task}`")]
    UnknownTask { behavior: String, task: String },

    #[error("no authentication token available")]
    MissingToken,

    #[error("authentication failed after {attempts} attempts: {reason}")]
    AuthFailed { attempts: u32, reason: String },

    #[error("request `{endpoint}` failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures of the resource sampler. Always non-fatal: logged and skipped.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("resource probe failed: {0}")]
    Probe(String),

    #[error("sampling task failed: {0}")]
    Task(String),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
