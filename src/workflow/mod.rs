// Workflow Module - capture lifecycle orchestration
//
// Drives one capture attempt from folder setup through capturing,
// reconstruction and viewing, and owns the engine handles along the way.

pub mod errors;
pub mod folders;
pub mod orchestrator;
pub mod simulated;
pub mod traits;
pub mod types;

mod session;


pub use errors::{CaptureError, CommandError, FolderError, ReconstructionError, WorkflowError};
pub use folders::FileSystemFolderManager;
pub use orchestrator::{CaptureWorkflow, WorkflowDependencies, WorkflowSettings};
pub use simulated::{
    SimulatedCaptureEngine, SimulatedEngineFactory, SimulatedReconstructionEngine,
    SimulatedReconstructionFactory,
};
pub use traits::{
    CaptureEngine, CaptureEngineFactory, FolderManager, ReconstructionEngine,
    ReconstructionEngineFactory,
};
pub use types::{
    CaptureConfig, CaptureState, DerivedState, FeedbackCode, FeedbackSet, LifecyclePhase, Orbit,
    OrbitState, PhaseSnapshot, ScanFolder,
};
