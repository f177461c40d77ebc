use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of the guidance dialogue shown between scan passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidanceState {
    Dismiss,
    TooFewImages,
    FirstSegment,
    FirstSegmentNeedsWork,
    FirstSegmentComplete,
    SecondSegment,
    SecondSegmentNeedsWork,
    SecondSegmentComplete,
    ThirdSegment,
    ThirdSegmentNeedsWork,
    ThirdSegmentComplete,
    FlipObject,
    FlipObjectASecondTime,
    FlippingObjectNotRecommended,
    CaptureFromLowerAngle,
    CaptureFromHigherAngle,
    Reconstruction,
    AdditionalOrbitOnCurrentSegment,
}

impl GuidanceState {
    pub const ALL: [GuidanceState; 18] = [
        GuidanceState::Dismiss,
        GuidanceState::TooFewImages,
        GuidanceState::FirstSegment,
        GuidanceState::FirstSegmentNeedsWork,
        GuidanceState::FirstSegmentComplete,
        GuidanceState::SecondSegment,
        GuidanceState::SecondSegmentNeedsWork,
        GuidanceState::SecondSegmentComplete,
        GuidanceState::ThirdSegment,
        GuidanceState::ThirdSegmentNeedsWork,
        GuidanceState::ThirdSegmentComplete,
        GuidanceState::FlipObject,
        GuidanceState::FlipObjectASecondTime,
        GuidanceState::FlippingObjectNotRecommended,
        GuidanceState::CaptureFromLowerAngle,
        GuidanceState::CaptureFromHigherAngle,
        GuidanceState::Reconstruction,
        GuidanceState::AdditionalOrbitOnCurrentSegment,
    ];

    /// States a guidance sub-flow may be seeded with.
    pub const ENTRY_STATES: [GuidanceState; 7] = [
        GuidanceState::TooFewImages,
        GuidanceState::FirstSegmentNeedsWork,
        GuidanceState::FirstSegmentComplete,
        GuidanceState::SecondSegmentNeedsWork,
        GuidanceState::SecondSegmentComplete,
        GuidanceState::ThirdSegmentNeedsWork,
        GuidanceState::ThirdSegmentComplete,
    ];

    pub fn is_entry_state(&self) -> bool {
        Self::ENTRY_STATES.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceState::Dismiss => "dismiss",
            GuidanceState::TooFewImages => "too-few-images",
            GuidanceState::FirstSegment => "first-segment",
            GuidanceState::FirstSegmentNeedsWork => "first-segment-needs-work",
            GuidanceState::FirstSegmentComplete => "first-segment-complete",
            GuidanceState::SecondSegment => "second-segment",
            GuidanceState::SecondSegmentNeedsWork => "second-segment-needs-work",
            GuidanceState::SecondSegmentComplete => "second-segment-complete",
            GuidanceState::ThirdSegment => "third-segment",
            GuidanceState::ThirdSegmentNeedsWork => "third-segment-needs-work",
            GuidanceState::ThirdSegmentComplete => "third-segment-complete",
            GuidanceState::FlipObject => "flip-object",
            GuidanceState::FlipObjectASecondTime => "flip-object-a-second-time",
            GuidanceState::FlippingObjectNotRecommended => "flipping-object-not-recommended",
            GuidanceState::CaptureFromLowerAngle => "capture-from-lower-angle",
            GuidanceState::CaptureFromHigherAngle => "capture-from-higher-angle",
            GuidanceState::Reconstruction => "reconstruction",
            GuidanceState::AdditionalOrbitOnCurrentSegment => "additional-orbit-on-current-segment",
        }
    }
}

impl fmt::Display for GuidanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuidanceState {
    type Err = ParseGuidanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        GuidanceState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| ParseGuidanceError::UnknownState(wanted.to_string()))
    }
}

/// A button the user pressed on a guidance screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidanceInput {
    Continue { is_flippable: bool },
    Skip { is_flippable: bool },
    Finish,
    ObjectCannotBeFlipped,
    FlipObjectAnyway,
}

impl fmt::Display for GuidanceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuidanceInput::Continue { is_flippable } => write!(f, "continue:{is_flippable}"),
            GuidanceInput::Skip { is_flippable } => write!(f, "skip:{is_flippable}"),
            GuidanceInput::Finish => f.write_str("finish"),
            GuidanceInput::ObjectCannotBeFlipped => f.write_str("object-cannot-be-flipped"),
            GuidanceInput::FlipObjectAnyway => f.write_str("flip-object-anyway"),
        }
    }
}

impl FromStr for GuidanceInput {
    type Err = ParseGuidanceError;

    /// Accepts the `Display` form; `continue` and `skip` default to a
    /// flippable object when the `:bool` suffix is omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (name, flag) = match raw.split_once(':') {
            Some((name, flag)) => (name, Some(flag)),
            None => (raw, None),
        };

        let is_flippable = match flag {
            None => true,
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| ParseGuidanceError::UnknownInput(raw.to_string()))?,
        };

        match (name, flag) {
            ("continue", _) => Ok(GuidanceInput::Continue { is_flippable }),
            ("skip", _) => Ok(GuidanceInput::Skip { is_flippable }),
            ("finish", None) => Ok(GuidanceInput::Finish),
            ("object-cannot-be-flipped", None) => Ok(GuidanceInput::ObjectCannotBeFlipped),
            ("flip-object-anyway", None) => Ok(GuidanceInput::FlipObjectAnyway),
            _ => Err(ParseGuidanceError::UnknownInput(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseGuidanceError {
    #[error("unknown guidance state '{0}'")]
    UnknownState(String),
    #[error("unknown guidance input '{0}'")]
    UnknownInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_parse_back() {
        for state in GuidanceState::ALL {
            assert_eq!(state.to_string().parse::<GuidanceState>(), Ok(state));
        }
        assert!(matches!(
            "second-pass".parse::<GuidanceState>(),
            Err(ParseGuidanceError::UnknownState(_))
        ));
    }

    #[test]
    fn test_input_parsing() {
        assert_eq!(
            "continue:false".parse::<GuidanceInput>(),
            Ok(GuidanceInput::Continue { is_flippable: false })
        );
        assert_eq!(
            "skip".parse::<GuidanceInput>(),
            Ok(GuidanceInput::Skip { is_flippable: true })
        );
        assert_eq!("finish".parse::<GuidanceInput>(), Ok(GuidanceInput::Finish));
        assert!("finish:true".parse::<GuidanceInput>().is_err());
        assert!("continue:maybe".parse::<GuidanceInput>().is_err());
    }

    #[test]
    fn test_entry_states() {
        assert!(GuidanceState::TooFewImages.is_entry_state());
        assert!(GuidanceState::ThirdSegmentComplete.is_entry_state());
        assert!(!GuidanceState::FirstSegment.is_entry_state());
        assert!(!GuidanceState::Reconstruction.is_entry_state());
    }
}
