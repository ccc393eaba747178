use coderun_common::UnsupportedLanguage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong inside the execution core.
///
/// Failures of the guest program are not errors: they come back as ordinary
/// stdout/stderr/exit code. Only validation failures are returned to the
/// caller as `Err`; everything else ends up in `ExecutionResult::system_error`.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("workspace error at {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build image {tag}: {reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("failed to launch sandbox: {0}")]
    Launch(String),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

impl ExecError {
    pub fn workspace(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExecError::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Rejected before any resource was allocated (4xx-equivalent)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExecError::UnsupportedLanguage(_) | ExecError::InvalidRequest(_)
        )
    }
}

impl From<UnsupportedLanguage> for ExecError {
    fn from(err: UnsupportedLanguage) -> Self {
        ExecError::UnsupportedLanguage(err.0)
    }
}

pub type Result<T, E = ExecError> = std::result::Result<T, E>;
