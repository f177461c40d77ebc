// In-memory engines - drive the workflow from the CLI simulator and tests
// without a camera or a photogrammetry backend.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

use super::errors::{CaptureError, ReconstructionError};
use super::traits::{
    CaptureEngine, CaptureEngineFactory, ReconstructionEngine, ReconstructionEngineFactory,
};
use super::types::{CaptureConfig, CaptureState, FeedbackSet};

const UPDATE_CAPACITY: usize = 32;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct EngineState {
    state: CaptureState,
    images_taken: usize,
    scan_pass_completed: bool,
    paused: bool,
    scan_passes: usize,
    flips: usize,
    started_with: Option<(PathBuf, CaptureConfig)>,
    start_error: Option<CaptureError>,
}

/// Capture engine whose state and feedback are pushed by the caller.
#[derive(Debug)]
pub struct SimulatedCaptureEngine {
    inner: Mutex<EngineState>,
    states: broadcast::Sender<CaptureState>,
    feedback: broadcast::Sender<FeedbackSet>,
}

impl Default for SimulatedCaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCaptureEngine {
    pub fn new() -> Self {
        let (states, _) = broadcast::channel(UPDATE_CAPACITY);
        let (feedback, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            inner: Mutex::new(EngineState {
                state: CaptureState::Initializing,
                images_taken: 0,
                scan_pass_completed: false,
                paused: false,
                scan_passes: 1,
                flips: 0,
                started_with: None,
                start_error: None,
            }),
            states,
            feedback,
        }
    }

    /// Makes the next `start` call fail with `error`.
    pub fn fail_start_with(&self, error: CaptureError) {
        lock(&self.inner).start_error = Some(error);
    }

    pub fn emit_state(&self, state: CaptureState) {
        lock(&self.inner).state = state.clone();
        // Nobody listening once the workflow has let go of this engine.
        let _ = self.states.send(state);
    }

    pub fn emit_feedback(&self, feedback: FeedbackSet) {
        let _ = self.feedback.send(feedback);
    }

    pub fn capture_images(&self, count: usize) {
        lock(&self.inner).images_taken += count;
    }

    pub fn complete_scan_pass(&self) {
        lock(&self.inner).scan_pass_completed = true;
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.inner).paused
    }

    /// Passes started so far, the initial one included.
    pub fn scan_passes(&self) -> usize {
        lock(&self.inner).scan_passes
    }

    pub fn flips(&self) -> usize {
        lock(&self.inner).flips
    }

    pub fn started_with(&self) -> Option<(PathBuf, CaptureConfig)> {
        lock(&self.inner).started_with.clone()
    }

    pub fn state_subscribers(&self) -> usize {
        self.states.receiver_count()
    }

    pub fn feedback_subscribers(&self) -> usize {
        self.feedback.receiver_count()
    }

    fn begin_pass(&self, flipped: bool) {
        let mut inner = lock(&self.inner);
        inner.scan_passes += 1;
        inner.scan_pass_completed = false;
        if flipped {
            inner.flips += 1;
        }
    }
}

impl CaptureEngine for SimulatedCaptureEngine {
    fn start(&self, images_directory: &Path, config: &CaptureConfig) -> Result<(), CaptureError> {
        let mut inner = lock(&self.inner);
        if let Some(error) = inner.start_error.take() {
            return Err(error);
        }
        inner.started_with = Some((images_directory.to_path_buf(), config.clone()));
        inner.state = CaptureState::Ready;
        debug!(images = %images_directory.display(), "Simulated capture started");
        Ok(())
    }

    fn pause(&self) {
        lock(&self.inner).paused = true;
    }

    fn resume(&self) {
        lock(&self.inner).paused = false;
    }

    fn finish(&self) {
        self.emit_state(CaptureState::Finishing);
        self.emit_state(CaptureState::Completed);
    }

    fn cancel(&self) {
        self.emit_state(CaptureState::Failed(CaptureError::Cancelled));
    }

    fn begin_new_scan_pass(&self) {
        self.begin_pass(false);
    }

    fn begin_new_scan_pass_after_flip(&self) {
        self.begin_pass(true);
    }

    fn state_updates(&self) -> broadcast::Receiver<CaptureState> {
        self.states.subscribe()
    }

    fn feedback_updates(&self) -> broadcast::Receiver<FeedbackSet> {
        self.feedback.subscribe()
    }

    fn images_taken(&self) -> usize {
        lock(&self.inner).images_taken
    }

    fn user_completed_scan_pass(&self) -> bool {
        lock(&self.inner).scan_pass_completed
    }

    fn state(&self) -> CaptureState {
        lock(&self.inner).state.clone()
    }
}

/// Hands out fresh simulated engines and remembers each one.
#[derive(Debug, Default)]
pub struct SimulatedEngineFactory {
    created: Mutex<Vec<Arc<SimulatedCaptureEngine>>>,
    next_start_error: Mutex<Option<CaptureError>>,
}

impl SimulatedEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next engine handed out fails to start with `error`.
    pub fn fail_next_start(&self, error: CaptureError) {
        *lock(&self.next_start_error) = Some(error);
    }

    pub fn latest(&self) -> Option<Arc<SimulatedCaptureEngine>> {
        lock(&self.created).last().cloned()
    }

    pub fn created(&self) -> Vec<Arc<SimulatedCaptureEngine>> {
        lock(&self.created).clone()
    }
}

impl CaptureEngineFactory for SimulatedEngineFactory {
    fn create(&self) -> Arc<dyn CaptureEngine> {
        let engine = Arc::new(SimulatedCaptureEngine::new());
        if let Some(error) = lock(&self.next_start_error).take() {
            engine.fail_start_with(error);
        }
        lock(&self.created).push(Arc::clone(&engine));
        engine
    }
}

#[derive(Debug)]
pub struct SimulatedReconstructionEngine {
    images_directory: PathBuf,
    checkpoint_directory: PathBuf,
    cancelled: Mutex<bool>,
}

impl SimulatedReconstructionEngine {
    pub fn new(images_directory: &Path, checkpoint_directory: &Path) -> Self {
        Self {
            images_directory: images_directory.to_path_buf(),
            checkpoint_directory: checkpoint_directory.to_path_buf(),
            cancelled: Mutex::new(false),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }
}

impl ReconstructionEngine for SimulatedReconstructionEngine {
    fn images_directory(&self) -> &Path {
        &self.images_directory
    }

    fn checkpoint_directory(&self) -> &Path {
        &self.checkpoint_directory
    }

    fn cancel(&self) {
        *lock(&self.cancelled) = true;
    }
}

#[derive(Debug, Default)]
pub struct SimulatedReconstructionFactory {
    created: Mutex<Vec<Arc<SimulatedReconstructionEngine>>>,
    next_error: Mutex<Option<ReconstructionError>>,
}

impl SimulatedReconstructionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, error: ReconstructionError) {
        *lock(&self.next_error) = Some(error);
    }

    pub fn created(&self) -> Vec<Arc<SimulatedReconstructionEngine>> {
        lock(&self.created).clone()
    }

    pub fn latest(&self) -> Option<Arc<SimulatedReconstructionEngine>> {
        lock(&self.created).last().cloned()
    }
}

impl ReconstructionEngineFactory for SimulatedReconstructionFactory {
    fn create(
        &self,
        images_directory: &Path,
        checkpoint_directory: &Path,
    ) -> Result<Arc<dyn ReconstructionEngine>, ReconstructionError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        let engine = Arc::new(SimulatedReconstructionEngine::new(
            images_directory,
            checkpoint_directory,
        ));
        lock(&self.created).push(Arc::clone(&engine));
        Ok(engine)
    }
}
