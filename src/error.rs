//! Error types for the grading core
//!
//! Only failures a caller has to act on live here. A checker timing out, a
//! checker producing unreadable bytes or output that matches no rule are all
//! ordinary results and never show up as a `GradeError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradeError {
    /// The checker executable could not be started
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The checker started but waiting on it failed
    #[error("failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read checker configuration {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse checker configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid checker configuration: {0}")]
    InvalidConfig(String),

    #[error("the {target} validator does not support `{format}` output")]
    UnsupportedFormat { target: String, format: String },

    #[error("failed to read submission {}: {source}", path.display())]
    ReadSubmission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed validator response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GradeError>;
