//! Error types for the verification harness

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Malformed fixture {path}: {reason}")]
    MalformedFixture { path: PathBuf, reason: String },

    #[error("Fixture not found: {0}")]
    FixtureNotFound(String),

    #[error("Build command `{command}` failed with {status}")]
    BuildFailed { command: String, status: ExitStatus },

    #[error("Server never printed a line starting with {prefix:?} after {attempts} attempts")]
    StartupTimeout { attempts: usize, prefix: String },

    #[error("Server exited with {status} before printing a line starting with {prefix:?}")]
    ProcessExited { status: ExitStatus, prefix: String },

    #[error("Command for {fixture} exited with {status}: {stderr}")]
    CommandExecution {
        fixture: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Response for {fixture} is not valid JSON: {source}")]
    InvalidResponseJson {
        fixture: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Interrupted, server stopped")]
    Interrupted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
