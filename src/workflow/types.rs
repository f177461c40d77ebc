use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::errors::{CaptureError, WorkflowError};
use crate::guidance::GuidanceState;

/// Top-level stage of the capture-to-viewing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePhase {
    #[default]
    NotSet,
    Ready,
    Capturing,
    PrepareToReconstruct,
    Reconstructing,
    Viewing,
    Completed,
    Restart,
    Failed,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::NotSet => "not-set",
            LifecyclePhase::Ready => "ready",
            LifecyclePhase::Capturing => "capturing",
            LifecyclePhase::PrepareToReconstruct => "prepare-to-reconstruct",
            LifecyclePhase::Reconstructing => "reconstructing",
            LifecyclePhase::Viewing => "viewing",
            LifecyclePhase::Completed => "completed",
            LifecyclePhase::Restart => "restart",
            LifecyclePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The published lifecycle value. A `Failed` snapshot can only be built
/// together with its error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhaseSnapshot {
    phase: LifecyclePhase,
    error: Option<WorkflowError>,
}

impl PhaseSnapshot {
    pub(crate) fn at(phase: LifecyclePhase) -> Self {
        debug_assert_ne!(phase, LifecyclePhase::Failed, "failed snapshots need an error");
        Self { phase, error: None }
    }

    pub(crate) fn failed(error: WorkflowError) -> Self {
        Self {
            phase: LifecyclePhase::Failed,
            error: Some(error),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }
}

/// One of the three passes around the object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Orbit {
    #[default]
    Orbit1,
    Orbit2,
    Orbit3,
}

impl Orbit {
    pub const ALL: [Orbit; 3] = [Orbit::Orbit1, Orbit::Orbit2, Orbit::Orbit3];

    /// The following orbit; the last one stays put.
    pub fn next(self) -> Self {
        match self {
            Orbit::Orbit1 => Orbit::Orbit2,
            Orbit::Orbit2 | Orbit::Orbit3 => Orbit::Orbit3,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Orbit::Orbit1 => 1,
            Orbit::Orbit2 => 2,
            Orbit::Orbit3 => 3,
        }
    }

    pub fn guidance_text(self, is_object_flippable: bool) -> &'static str {
        match (self, is_object_flippable) {
            (Orbit::Orbit1, _) => "Move slowly around your object.",
            (Orbit::Orbit2 | Orbit::Orbit3, true) => "Flip object on its side and move around.",
            (Orbit::Orbit2, false) => "Move low and capture again.",
            (Orbit::Orbit3, false) => "Move above your object and capture again.",
        }
    }

    /// Guidance entry state for this orbit's pass.
    pub fn onboarding_state(self, scan_pass_completed: bool) -> GuidanceState {
        match (self, scan_pass_completed) {
            (Orbit::Orbit1, true) => GuidanceState::FirstSegmentComplete,
            (Orbit::Orbit1, false) => GuidanceState::FirstSegmentNeedsWork,
            (Orbit::Orbit2, true) => GuidanceState::SecondSegmentComplete,
            (Orbit::Orbit2, false) => GuidanceState::SecondSegmentNeedsWork,
            (Orbit::Orbit3, true) => GuidanceState::ThirdSegmentComplete,
            (Orbit::Orbit3, false) => GuidanceState::ThirdSegmentNeedsWork,
        }
    }
}

impl fmt::Display for Orbit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "orbit{}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrbitState {
    #[default]
    Initial,
    Capturing,
}

/// Transient condition reported by the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackCode {
    ObjectTooClose,
    ObjectTooFar,
    MovingTooFast,
    EnvironmentLowLight,
    EnvironmentTooDark,
    OutOfFieldOfView,
    ObjectNotFlippable,
    OverCapturing,
    ObjectNotDetected,
}

impl FeedbackCode {
    /// Text shown to the user while the condition holds.
    pub fn message(&self) -> &'static str {
        match self {
            FeedbackCode::ObjectTooClose => "Move farther away",
            FeedbackCode::ObjectTooFar => "Move closer",
            FeedbackCode::MovingTooFast => "Move slower",
            FeedbackCode::EnvironmentLowLight => "More light required",
            FeedbackCode::EnvironmentTooDark => "Not enough light",
            FeedbackCode::OutOfFieldOfView => "Aim at your object",
            FeedbackCode::ObjectNotFlippable => "Object not flippable",
            FeedbackCode::OverCapturing => "Circle around to complete the section",
            FeedbackCode::ObjectNotDetected => "Can't find your object",
        }
    }
}

/// Feedback codes active in one engine tick, kept sorted so diffs apply in a
/// stable order.
pub type FeedbackSet = BTreeSet<FeedbackCode>;

/// Coarse state of the capture engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Initializing,
    Ready,
    Detecting,
    Capturing,
    Finishing,
    Completed,
    Failed(CaptureError),
}

/// Options handed to the capture engine on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub checkpoint_directory: PathBuf,
    pub overcapture_enabled: bool,
}

/// A timestamped capture directory and its subfolders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFolder {
    pub root: PathBuf,
    pub images: PathBuf,
    pub snapshots: PathBuf,
    pub models: PathBuf,
}

impl ScanFolder {
    pub fn at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            images: root.join("Images"),
            snapshots: root.join("Snapshots"),
            models: root.join("Models"),
            root,
        }
    }
}

/// Per-session bookkeeping derived from engine events and guidance choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedState {
    pub orbit: Orbit,
    pub orbit_state: OrbitState,
    pub is_object_flipped: bool,
    pub show_preview_model: bool,
}
