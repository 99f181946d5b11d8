use std::path::PathBuf;
use thiserror::Error;

/// Structural problems with a problem directory.
///
/// Every variant is fatal: grading aborts before any test case runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown problem type '{kind}' in {path}")]
    UnknownProblemType { path: PathBuf, kind: String },

    #[error("invalid time limit in {path}: {reason}")]
    TimeLimit { path: PathBuf, reason: String },

    #[error("{field} must be a finite number in {path}, got {value}")]
    NonFiniteScore {
        path: PathBuf,
        field: &'static str,
        value: f64,
    },

    #[error("{field} must be an integer for pass-fail problems in {path}, got {value}")]
    NonIntegralScore {
        path: PathBuf,
        field: &'static str,
        value: f64,
    },

    #[error("invalid range '{range}' in {path}: {reason}")]
    Range {
        path: PathBuf,
        range: String,
        reason: String,
    },

    #[error("test case {input} has no matching answer file")]
    MissingAnswer { input: PathBuf },

    #[error("no problem directory with a problem.yaml under {root}")]
    NoProblem { root: PathBuf },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}
