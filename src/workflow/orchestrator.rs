use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::errors::{CommandError, FolderError, ReconstructionError, WorkflowError};
use super::session::{CaptureSession, EngineDispatch, EngineEvent};
use super::traits::{
    CaptureEngine, CaptureEngineFactory, FolderManager, ReconstructionEngine,
    ReconstructionEngineFactory,
};
use super::types::{
    CaptureConfig, CaptureState, DerivedState, FeedbackSet, LifecyclePhase, Orbit, OrbitState,
    PhaseSnapshot, ScanFolder,
};
use crate::config::CaptureWorkflowConfig;
use crate::guidance::{GuidanceState, GuidanceStateMachine};
use crate::messages::{MessageDebouncer, DEFAULT_MINIMUM_DURATION};
use crate::telemetry::generate_session_id;

const TRANSITION_HISTORY: usize = 64;

/// Tunables for one workflow instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub minimum_images: usize,
    pub overcapture_enabled: bool,
    pub message_minimum_duration: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            minimum_images: 10,
            overcapture_enabled: true,
            message_minimum_duration: DEFAULT_MINIMUM_DURATION,
        }
    }
}

impl From<&CaptureWorkflowConfig> for WorkflowSettings {
    fn from(config: &CaptureWorkflowConfig) -> Self {
        Self {
            minimum_images: config.capture.minimum_images,
            overcapture_enabled: config.capture.overcapture_enabled,
            message_minimum_duration: config.messages.minimum_duration(),
        }
    }
}

/// External collaborators the workflow drives.
#[derive(Clone)]
pub struct WorkflowDependencies {
    pub folders: Arc<dyn FolderManager>,
    pub capture_engines: Arc<dyn CaptureEngineFactory>,
    pub reconstruction_engines: Arc<dyn ReconstructionEngineFactory>,
}

/// What the next lifecycle step enters.
enum Entry {
    Phase(LifecyclePhase),
    Failure(WorkflowError),
}

struct WorkflowCore {
    snapshot: PhaseSnapshot,
    capture: Option<CaptureSession>,
    reconstruction: Option<Arc<dyn ReconstructionEngine>>,
    scan_folder: Option<ScanFolder>,
    derived: DerivedState,
    last_feedback: FeedbackSet,
    next_epoch: u64,
}

impl WorkflowCore {
    fn phase(&self) -> LifecyclePhase {
        self.snapshot.phase()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|session| session.epoch == epoch)
    }

    fn capture_engine(&self) -> Option<&Arc<dyn CaptureEngine>> {
        self.capture.as_ref().map(|session| &session.engine)
    }

    fn require(
        &self,
        command: &'static str,
        allowed: &[LifecyclePhase],
    ) -> Result<(), CommandError> {
        let phase = self.phase();
        if allowed.contains(&phase) {
            Ok(())
        } else {
            debug!(command, %phase, "Command rejected");
            Err(CommandError::InvalidPhase { command, phase })
        }
    }
}

struct Shared {
    core: Mutex<WorkflowCore>,
    dependencies: WorkflowDependencies,
    settings: WorkflowSettings,
    messages: MessageDebouncer,
    current: watch::Sender<PhaseSnapshot>,
    history: broadcast::Sender<PhaseSnapshot>,
    dispatch: mpsc::UnboundedSender<EngineDispatch>,
    coordinator: JoinHandle<()>,
}

/// Lifecycle controller for the capture workflow.
///
/// Owns the capture and reconstruction engine handles, turns engine events
/// into lifecycle transitions and feeds capture feedback into the message
/// debouncer. Clones share the same workflow. All state changes are
/// serialized: presentation commands take the workflow lock directly, and
/// engine events are forwarded to one coordinator task that takes the same
/// lock.
#[derive(Clone)]
pub struct CaptureWorkflow {
    shared: Arc<Shared>,
}

impl CaptureWorkflow {
    /// Creates a workflow in `NotSet`. Must be called inside a Tokio runtime.
    pub fn new(dependencies: WorkflowDependencies, settings: WorkflowSettings) -> Self {
        let (current, _) = watch::channel(PhaseSnapshot::default());
        let (history, _) = broadcast::channel(TRANSITION_HISTORY);
        let messages = MessageDebouncer::new(settings.message_minimum_duration);

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let (dispatch, events) = mpsc::unbounded_channel();
            let coordinator = tokio::spawn(run_coordinator(weak.clone(), events));
            Shared {
                core: Mutex::new(WorkflowCore {
                    snapshot: PhaseSnapshot::default(),
                    capture: None,
                    reconstruction: None,
                    scan_folder: None,
                    derived: DerivedState::default(),
                    last_feedback: FeedbackSet::new(),
                    next_epoch: 0,
                }),
                dependencies,
                settings,
                messages,
                current,
                history,
                dispatch,
                coordinator,
            }
        });

        Self { shared }
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        self.shared.current.borrow().clone()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.shared.current.borrow().phase()
    }

    /// Error shown while in `Failed`.
    pub fn failure(&self) -> Option<WorkflowError> {
        self.shared.current.borrow().error().cloned()
    }

    /// Receiver holding the latest published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PhaseSnapshot> {
        self.shared.current.subscribe()
    }

    /// Every snapshot published from now on, pass-through phases included.
    pub fn transitions(&self) -> broadcast::Receiver<PhaseSnapshot> {
        self.shared.history.subscribe()
    }

    pub fn messages(&self) -> &MessageDebouncer {
        &self.shared.messages
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.shared.settings
    }

    /// Enters `Ready`: new scan folder, new capture engine, then `Capturing`.
    /// Also the retry path after a setup failure left the workflow in `Ready`.
    pub async fn begin_capture(&self) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require(
            "begin capture",
            &[LifecyclePhase::NotSet, LifecyclePhase::Ready],
        )?;
        self.shared
            .transition(&mut core, Entry::Phase(LifecyclePhase::Ready))
            .await?;
        Ok(())
    }

    /// Asks the engine to cancel; its `Failed(Cancelled)` report restarts
    /// the workflow.
    pub async fn cancel_capture(&self) -> Result<(), CommandError> {
        let core = self.shared.core.lock().await;
        core.require("cancel capture", &[LifecyclePhase::Capturing])?;
        if let Some(engine) = core.capture_engine() {
            engine.cancel();
        }
        Ok(())
    }

    /// Throws the current attempt away and starts over.
    pub async fn restart(&self) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        if core.phase() == LifecyclePhase::NotSet {
            return Err(CommandError::InvalidPhase {
                command: "restart",
                phase: LifecyclePhase::NotSet,
            });
        }
        self.shared
            .transition(&mut core, Entry::Phase(LifecyclePhase::Restart))
            .await?;
        Ok(())
    }

    pub async fn acknowledge_failure(&self) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require("acknowledge failure", &[LifecyclePhase::Failed])?;
        self.shared
            .transition(&mut core, Entry::Phase(LifecyclePhase::Restart))
            .await?;
        Ok(())
    }

    pub async fn reconstruction_finished(&self) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require("finish reconstruction", &[LifecyclePhase::Reconstructing])?;
        self.shared
            .transition(&mut core, Entry::Phase(LifecyclePhase::Viewing))
            .await?;
        Ok(())
    }

    pub async fn reconstruction_failed(
        &self,
        error: ReconstructionError,
    ) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require("fail reconstruction", &[LifecyclePhase::Reconstructing])?;
        self.shared
            .transition(&mut core, Entry::Failure(error.into()))
            .await?;
        Ok(())
    }

    pub async fn finish_viewing(&self) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require("finish viewing", &[LifecyclePhase::Viewing])?;
        self.shared
            .transition(&mut core, Entry::Phase(LifecyclePhase::Completed))
            .await?;
        Ok(())
    }

    pub async fn pause_capture(&self) -> Result<(), CommandError> {
        let core = self.shared.core.lock().await;
        core.require("pause capture", &[LifecyclePhase::Capturing])?;
        if let Some(engine) = core.capture_engine() {
            engine.pause();
        }
        Ok(())
    }

    pub async fn resume_capture(&self) -> Result<(), CommandError> {
        let core = self.shared.core.lock().await;
        core.require("resume capture", &[LifecyclePhase::Capturing])?;
        if let Some(engine) = core.capture_engine() {
            engine.resume();
        }
        Ok(())
    }

    /// Guidance entry state for the current pass, or `None` without a capture
    /// engine.
    pub async fn current_onboarding_state(&self) -> Option<GuidanceState> {
        let core = self.shared.core.lock().await;
        self.shared.onboarding_state(&core)
    }

    /// Pauses capturing and returns a guidance machine seeded for the current
    /// pass.
    pub async fn begin_guidance(&self) -> Result<GuidanceStateMachine, CommandError> {
        let core = self.shared.core.lock().await;
        core.require("begin guidance", &[LifecyclePhase::Capturing])?;

        let Some(engine) = core.capture_engine() else {
            return Err(CommandError::InvalidPhase {
                command: "begin guidance",
                phase: core.phase(),
            });
        };
        let state = self
            .shared
            .onboarding_state(&core)
            .unwrap_or(GuidanceState::TooFewImages);
        engine.pause();

        info!(orbit = %core.derived.orbit, state = %state, "Presenting guidance");
        Ok(GuidanceStateMachine::new(state))
    }

    /// Acts on the state a guidance sub-flow ended in.
    pub async fn apply_guidance(&self, outcome: GuidanceState) -> Result<(), CommandError> {
        let mut core = self.shared.core.lock().await;
        core.require("apply guidance", &[LifecyclePhase::Capturing])?;

        let Some(engine) = core.capture_engine().cloned() else {
            return Err(CommandError::InvalidPhase {
                command: "apply guidance",
                phase: core.phase(),
            });
        };

        match outcome {
            GuidanceState::Reconstruction => {
                info!("Guidance finished capturing, waiting for the engine to complete");
                engine.finish();
                return Ok(());
            }
            GuidanceState::SecondSegment | GuidanceState::ThirdSegment => {
                engine.begin_new_scan_pass_after_flip();
                core.derived.is_object_flipped = true;
                core.derived.orbit = core.derived.orbit.next();
                core.derived.orbit_state = OrbitState::Initial;
            }
            GuidanceState::AdditionalOrbitOnCurrentSegment => {
                engine.begin_new_scan_pass();
                core.derived.orbit = core.derived.orbit.next();
                core.derived.orbit_state = OrbitState::Initial;
            }
            other => {
                debug!(state = %other, "Guidance dismissed, resuming current pass");
            }
        }

        engine.resume();
        info!(
            orbit = %core.derived.orbit,
            flipped = core.derived.is_object_flipped,
            "Capture resumed after guidance"
        );
        Ok(())
    }

    pub async fn derived_state(&self) -> DerivedState {
        self.shared.core.lock().await.derived
    }

    pub async fn orbit(&self) -> Orbit {
        self.shared.core.lock().await.derived.orbit
    }

    pub async fn orbit_state(&self) -> OrbitState {
        self.shared.core.lock().await.derived.orbit_state
    }

    pub async fn is_object_flipped(&self) -> bool {
        self.shared.core.lock().await.derived.is_object_flipped
    }

    pub async fn set_show_preview_model(&self, show: bool) {
        self.shared.core.lock().await.derived.show_preview_model = show;
    }

    /// Instruction for the pass on the current orbit.
    pub async fn orbit_guidance_text(&self, is_object_flippable: bool) -> &'static str {
        self.orbit().await.guidance_text(is_object_flippable)
    }

    pub async fn scan_folder(&self) -> Option<ScanFolder> {
        self.shared.core.lock().await.scan_folder.clone()
    }

    pub async fn capture_engine(&self) -> Option<Arc<dyn CaptureEngine>> {
        self.shared.core.lock().await.capture_engine().cloned()
    }

    pub async fn has_reconstruction_engine(&self) -> bool {
        self.shared.core.lock().await.reconstruction.is_some()
    }
}

impl Shared {
    /// Publishes `entry` and runs entry actions until a phase settles.
    async fn transition(
        self: &Arc<Self>,
        core: &mut WorkflowCore,
        entry: Entry,
    ) -> Result<(), FolderError> {
        let mut next = Some(entry);

        while let Some(entry) = next.take() {
            let snapshot = match entry {
                Entry::Phase(phase) => PhaseSnapshot::at(phase),
                Entry::Failure(error) => PhaseSnapshot::failed(error),
            };

            // Leaving Failed drops its error together with the old snapshot.
            let previous = std::mem::replace(&mut core.snapshot, snapshot);
            info!(from = %previous.phase(), to = %core.phase(), "Lifecycle transition");
            self.publish(&core.snapshot);

            next = self.enter(core).await?;
        }

        Ok(())
    }

    fn publish(&self, snapshot: &PhaseSnapshot) {
        self.current.send_replace(snapshot.clone());
        // No subscribers is fine.
        let _ = self.history.send(snapshot.clone());
    }

    async fn enter(
        self: &Arc<Self>,
        core: &mut WorkflowCore,
    ) -> Result<Option<Entry>, FolderError> {
        match core.phase() {
            LifecyclePhase::NotSet | LifecyclePhase::Reconstructing => Ok(None),
            LifecyclePhase::Ready => self.enter_ready(core).await,
            LifecyclePhase::Capturing => {
                core.derived.orbit = Orbit::Orbit1;
                core.derived.orbit_state = OrbitState::Initial;
                Ok(None)
            }
            LifecyclePhase::PrepareToReconstruct => {
                Ok(Some(self.enter_prepare_to_reconstruct(core).await))
            }
            LifecyclePhase::Viewing => {
                self.enter_viewing(core);
                Ok(None)
            }
            LifecyclePhase::Completed | LifecyclePhase::Restart => {
                self.reset(core).await;
                Ok(Some(Entry::Phase(LifecyclePhase::Ready)))
            }
            LifecyclePhase::Failed => {
                if let Some(error) = core.snapshot.error() {
                    warn!(error = %error, "Capture workflow failed");
                }
                Ok(None)
            }
        }
    }

    async fn enter_ready(
        self: &Arc<Self>,
        core: &mut WorkflowCore,
    ) -> Result<Option<Entry>, FolderError> {
        self.discard_engines(core).await;

        let folder = match self.dependencies.folders.create_new_scan_directory() {
            Ok(folder) => folder,
            Err(err) => {
                error!(error = %err, "Failed to create scan folder, capture not started");
                return Err(err);
            }
        };
        core.scan_folder = Some(folder.clone());

        let engine = self.dependencies.capture_engines.create();
        let state_updates = engine.state_updates();
        let feedback_updates = engine.feedback_updates();
        let config = CaptureConfig {
            checkpoint_directory: folder.snapshots.clone(),
            overcapture_enabled: self.settings.overcapture_enabled,
        };

        if let Err(err) = engine.start(&folder.images, &config) {
            error!(
                error = %err,
                images = %folder.images.display(),
                "Capture engine failed to start"
            );
            return Ok(Some(Entry::Failure(err.into())));
        }

        core.next_epoch += 1;
        let session_id = generate_session_id();
        info!(
            session_id = %session_id,
            epoch = core.next_epoch,
            folder = %folder.root.display(),
            "Capture session started"
        );
        core.capture = Some(CaptureSession::attach(
            engine,
            core.next_epoch,
            session_id,
            state_updates,
            feedback_updates,
            self.dispatch.clone(),
        ));

        Ok(Some(Entry::Phase(LifecyclePhase::Capturing)))
    }

    async fn enter_prepare_to_reconstruct(self: &Arc<Self>, core: &mut WorkflowCore) -> Entry {
        self.release_capture(core).await;

        let Some(folder) = core.scan_folder.as_ref() else {
            error!("No scan folder to reconstruct from");
            return Entry::Failure(
                ReconstructionError::Setup("no scan folder for this capture".to_string()).into(),
            );
        };

        match self
            .dependencies
            .reconstruction_engines
            .create(&folder.images, &folder.snapshots)
        {
            Ok(engine) => {
                info!(images = %folder.images.display(), "Reconstruction engine created");
                core.reconstruction = Some(engine);
                Entry::Phase(LifecyclePhase::Reconstructing)
            }
            Err(err) => {
                error!(error = %err, "Failed to create reconstruction engine");
                Entry::Failure(err.into())
            }
        }
    }

    fn enter_viewing(&self, core: &mut WorkflowCore) {
        core.reconstruction = None;

        let Some(folder) = core.scan_folder.as_ref() else {
            return;
        };
        let folders = Arc::clone(&self.dependencies.folders);
        let snapshots = folder.snapshots.clone();
        tokio::spawn(async move {
            match folders.remove_item(&snapshots).await {
                Ok(()) => debug!(path = %snapshots.display(), "Removed snapshots folder"),
                Err(err) => debug!(error = %err, "Could not remove snapshots folder"),
            }
        });
    }

    async fn reset(&self, core: &mut WorkflowCore) {
        self.discard_engines(core).await;
        core.scan_folder = None;
        core.derived = DerivedState::default();
    }

    async fn discard_engines(&self, core: &mut WorkflowCore) {
        self.release_capture(core).await;
        if let Some(reconstruction) = core.reconstruction.take() {
            reconstruction.cancel();
        }
    }

    /// Drops the capture engine and its listeners. Messages for feedback that
    /// was still active are released so they expire normally.
    async fn release_capture(&self, core: &mut WorkflowCore) {
        if let Some(mut session) = core.capture.take() {
            session.shutdown().await;
            debug!(
                session_id = %session.session_id,
                epoch = session.epoch,
                "Capture engine released"
            );
        }

        for code in std::mem::take(&mut core.last_feedback) {
            self.messages.remove(code.message()).await;
        }
    }

    fn onboarding_state(&self, core: &WorkflowCore) -> Option<GuidanceState> {
        let engine = core.capture_engine()?;
        if engine.images_taken() < self.settings.minimum_images {
            return Some(GuidanceState::TooFewImages);
        }
        Some(core.derived.orbit.onboarding_state(engine.user_completed_scan_pass()))
    }

    async fn handle_engine_event(self: &Arc<Self>, dispatch: EngineDispatch) {
        let mut core = self.core.lock().await;
        if !core.is_current(dispatch.epoch) {
            debug!(epoch = dispatch.epoch, "Dropping event from a released capture engine");
            return;
        }

        match dispatch.event {
            EngineEvent::State(state) => self.on_capture_state(&mut core, state).await,
            EngineEvent::Feedback(feedback) => self.on_feedback(&mut core, feedback).await,
        }
    }

    async fn on_capture_state(self: &Arc<Self>, core: &mut WorkflowCore, state: CaptureState) {
        if core.phase() != LifecyclePhase::Capturing {
            debug!(?state, phase = %core.phase(), "Ignoring capture state outside capturing");
            return;
        }

        let entry = match state {
            CaptureState::Completed => Entry::Phase(LifecyclePhase::PrepareToReconstruct),
            CaptureState::Failed(err) if err.is_cancelled() => {
                info!("Capture cancelled by the user, restarting");
                Entry::Phase(LifecyclePhase::Restart)
            }
            CaptureState::Failed(err) => Entry::Failure(err.into()),
            CaptureState::Capturing => {
                core.derived.orbit_state = OrbitState::Capturing;
                return;
            }
            other => {
                debug!(state = ?other, "Capture engine state changed");
                return;
            }
        };

        if let Err(err) = self.transition(core, entry).await {
            error!(error = %err, "Capture could not be set up again, waiting for a retry");
        }
    }

    async fn on_feedback(&self, core: &mut WorkflowCore, feedback: FeedbackSet) {
        let previous = std::mem::replace(&mut core.last_feedback, feedback);
        let cleared: Vec<_> = previous.difference(&core.last_feedback).copied().collect();
        let raised: Vec<_> = core.last_feedback.difference(&previous).copied().collect();

        for code in cleared {
            self.messages.remove(code.message()).await;
        }
        for code in raised {
            self.messages.add(code.message()).await;
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.coordinator.abort();
    }
}

async fn run_coordinator(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<EngineDispatch>,
) {
    while let Some(dispatch) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_engine_event(dispatch).await;
    }
}
