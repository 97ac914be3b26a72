use std::time::Duration;

use thiserror::Error;

use crate::fixture::FixtureError;

/// Failure of a verification run, carrying the process exit code
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Fixture could not be built or written (exit code 2)
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// Static file server did not come up (exit code 3)
    #[error("Static server failed to start: {0}")]
    ServerStart(String),

    /// WebDriver connection or browser session failed (exit code 4)
    #[error("WebDriver connection failed: {0}")]
    WebDriver(String),

    /// An expectation was not met within its timeout (exit code 5)
    #[error("Timed out after {}ms waiting for {expectation} (last observed: {observed})", .timeout.as_millis())]
    Timeout {
        expectation: String,
        timeout: Duration,
        observed: String,
    },

    /// A check failed outright (exit code 6)
    #[error("Assertion failed: expected {expected}, found {actual}")]
    Assertion { expected: String, actual: String },

    /// The run was stopped by SIGINT or SIGTERM (exit code 130)
    #[error("Interrupted by {0}, resources released")]
    Interrupted(String),

    /// Anything else (exit code 1)
    #[error(transparent)]
    Other(anyhow::Error),
}

impl VerifyError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            VerifyError::Fixture(_) => 2,
            VerifyError::ServerStart(_) => 3,
            VerifyError::WebDriver(_) => 4,
            VerifyError::Timeout { .. } => 5,
            VerifyError::Assertion { .. } => 6,
            VerifyError::Interrupted(_) => 130,
            VerifyError::Other(_) => 1,
        }
    }
}

impl From<anyhow::Error> for VerifyError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<VerifyError>() {
            Ok(verify) => return verify,
            Err(err) => err,
        };
        let err = match err.downcast::<FixtureError>() {
            Ok(fixture) => return VerifyError::Fixture(fixture),
            Err(err) => err,
        };

        let msg = format!("{err:#}");
        if msg.contains("WebDriver")
            || msg.contains("geckodriver")
            || msg.contains("chromedriver")
        {
            VerifyError::WebDriver(msg)
        } else {
            VerifyError::Other(err)
        }
    }
}

pub type VerifyResult<T> = Result<T, VerifyError>;

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
