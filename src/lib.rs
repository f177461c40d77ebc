// Capture Workflow Library - object capture orchestration core
// This exposes the core components for the CLI simulator and integration tests

pub mod config;
pub mod guidance;
pub mod messages;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{CaptureWorkflowConfig, ObservabilityConfig};
pub use guidance::{GuidanceInput, GuidanceState, GuidanceStateMachine};
pub use messages::{MessageDebouncer, TimedMessage};
pub use telemetry::{create_session_span, generate_session_id, init_telemetry};
pub use workflow::{
    CaptureEngine, CaptureError, CaptureState, CaptureWorkflow, CommandError, FeedbackCode,
    FileSystemFolderManager, LifecyclePhase, PhaseSnapshot, WorkflowDependencies, WorkflowError,
    WorkflowSettings,
};
