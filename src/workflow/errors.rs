use std::path::PathBuf;
use thiserror::Error;

use super::types::LifecyclePhase;

/// Failures reported by the capture engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user cancelled the session; treated as a benign restart.
    #[error("capture session was cancelled")]
    Cancelled,
    #[error("capture engine could not start: {0}")]
    StartFailed(String),
    #[error("capture session failed: {0}")]
    Session(String),
}

impl CaptureError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CaptureError::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructionError {
    #[error("reconstruction engine could not be created: {0}")]
    Setup(String),
    #[error("reconstruction failed: {0}")]
    Processing(String),
}

/// Error carried by the `Failed` phase and shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),
}

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("no scans root directory is available")]
    NoScansRoot,
    #[error("failed to create capture directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("capture directory {path} was not created as a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejections of presentation-layer commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot {command} while {phase}")]
    InvalidPhase {
        command: &'static str,
        phase: LifecyclePhase,
    },
    #[error("capture setup failed: {0}")]
    Setup(#[from] FolderError),
}
