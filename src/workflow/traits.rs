// Collaborator interfaces - injected into the workflow so engines and storage
// can be swapped for simulations in tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::errors::{CaptureError, FolderError, ReconstructionError};
use super::types::{CaptureConfig, CaptureState, FeedbackSet, ScanFolder};

/// Live capture session: tracks the camera and reports state and feedback.
pub trait CaptureEngine: Send + Sync {
    /// Starts writing images into `images_directory`. Errors are immediate
    /// start failures; later failures arrive on the state stream.
    fn start(&self, images_directory: &Path, config: &CaptureConfig) -> Result<(), CaptureError>;

    fn pause(&self);

    fn resume(&self);

    /// Ends capturing; the engine reports `Completed` when done.
    fn finish(&self);

    /// Aborts the session; the engine reports `Failed(Cancelled)`.
    fn cancel(&self);

    fn begin_new_scan_pass(&self);

    fn begin_new_scan_pass_after_flip(&self);

    fn state_updates(&self) -> broadcast::Receiver<CaptureState>;

    fn feedback_updates(&self) -> broadcast::Receiver<FeedbackSet>;

    fn images_taken(&self) -> usize;

    /// Whether the current scan pass was marked complete.
    fn user_completed_scan_pass(&self) -> bool;

    fn state(&self) -> CaptureState;
}

pub trait CaptureEngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn CaptureEngine>;
}

/// Handle on the photogrammetry job for one capture.
pub trait ReconstructionEngine: Send + Sync {
    fn images_directory(&self) -> &Path;

    fn checkpoint_directory(&self) -> &Path;

    fn cancel(&self);
}

#[cfg_attr(test, mockall::automock)]
pub trait ReconstructionEngineFactory: Send + Sync {
    fn create(
        &self,
        images_directory: &Path,
        checkpoint_directory: &Path,
    ) -> Result<Arc<dyn ReconstructionEngine>, ReconstructionError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FolderManager: Send + Sync {
    /// Creates a fresh scan directory with its subfolders. Blocking.
    fn create_new_scan_directory(&self) -> Result<ScanFolder, FolderError>;

    /// Best-effort removal of a file or directory tree.
    async fn remove_item(&self, path: &Path) -> Result<(), FolderError>;
}
