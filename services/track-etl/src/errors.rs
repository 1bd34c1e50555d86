//!
//! src/errors.rs
//!
//! Defines the error enum shared by every stage of the etl pipeline
//! and the conversions from the libraries each stage calls into
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("retrieval error: {0}")]
    Retrieval(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("run exceeded deadline of {0:?}")]
    Timeout(std::time::Duration),
    #[error("run cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl From<reqwest::Error> for EtlError {
    fn from(e: reqwest::Error) -> Self { EtlError::Retrieval(e.to_string()) }
}

impl From<serde_json::Error> for EtlError {
    fn from(e: serde_json::Error) -> Self { EtlError::Transform(e.to_string()) }
}

impl From<sqlx::Error> for EtlError {
    fn from(e: sqlx::Error) -> Self { EtlError::Persistence(e.to_string()) }
}

impl EtlError {
    /// Short stage label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Config(_)      => "config",
            EtlError::Invalid(_)     => "invalid",
            EtlError::Retrieval(_)   => "retrieval",
            EtlError::Transform(_)   => "transform",
            EtlError::Persistence(_) => "persistence",
            EtlError::Timeout(_)     => "timeout",
            EtlError::Cancelled      => "cancelled",
            EtlError::Io(_)          => "io"
        }
    }
}
