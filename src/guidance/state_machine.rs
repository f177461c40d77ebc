use tracing::debug;

use super::types::{GuidanceInput, GuidanceState};

/// An edge of the guidance table: any of `inputs` moves to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub inputs: &'static [GuidanceInput],
    pub destination: GuidanceState,
}

const CONTINUE_ANY: &[GuidanceInput] = &[
    GuidanceInput::Continue { is_flippable: true },
    GuidanceInput::Continue { is_flippable: false },
];
const CONTINUE_FLIPPABLE: &[GuidanceInput] = &[GuidanceInput::Continue { is_flippable: true }];
const CONTINUE_UNFLIPPABLE: &[GuidanceInput] = &[GuidanceInput::Continue { is_flippable: false }];
const SKIP_ANY: &[GuidanceInput] = &[
    GuidanceInput::Skip { is_flippable: true },
    GuidanceInput::Skip { is_flippable: false },
];
const SKIP_FLIPPABLE: &[GuidanceInput] = &[GuidanceInput::Skip { is_flippable: true }];
const SKIP_UNFLIPPABLE: &[GuidanceInput] = &[GuidanceInput::Skip { is_flippable: false }];
const FINISH: &[GuidanceInput] = &[GuidanceInput::Finish];
const CANNOT_FLIP: &[GuidanceInput] = &[GuidanceInput::ObjectCannotBeFlipped];
const FLIP_ANYWAY: &[GuidanceInput] = &[GuidanceInput::FlipObjectAnyway];

static TOO_FEW_IMAGES: [Transition; 1] = [Transition {
    inputs: CONTINUE_ANY,
    destination: GuidanceState::FirstSegment,
}];

static FIRST_SEGMENT_NEEDS_WORK: [Transition; 2] = [
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::FirstSegment,
    },
    Transition {
        inputs: SKIP_ANY,
        destination: GuidanceState::FlipObject,
    },
];

static FIRST_SEGMENT_COMPLETE: [Transition; 3] = [
    Transition {
        inputs: FINISH,
        destination: GuidanceState::Reconstruction,
    },
    Transition {
        inputs: CONTINUE_FLIPPABLE,
        destination: GuidanceState::FlipObject,
    },
    Transition {
        inputs: CONTINUE_UNFLIPPABLE,
        destination: GuidanceState::FlippingObjectNotRecommended,
    },
];

static FLIP_OBJECT: [Transition; 2] = [
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::SecondSegment,
    },
    Transition {
        inputs: CANNOT_FLIP,
        destination: GuidanceState::CaptureFromLowerAngle,
    },
];

static FLIPPING_OBJECT_NOT_RECOMMENDED: [Transition; 2] = [
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::CaptureFromLowerAngle,
    },
    Transition {
        inputs: FLIP_ANYWAY,
        destination: GuidanceState::FlipObject,
    },
];

static CAPTURE_FROM_LOWER_ANGLE: [Transition; 2] = [
    Transition {
        inputs: FINISH,
        destination: GuidanceState::Reconstruction,
    },
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::AdditionalOrbitOnCurrentSegment,
    },
];

static SECOND_SEGMENT_NEEDS_WORK: [Transition; 3] = [
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::Dismiss,
    },
    Transition {
        inputs: SKIP_FLIPPABLE,
        destination: GuidanceState::FlipObjectASecondTime,
    },
    Transition {
        inputs: SKIP_UNFLIPPABLE,
        destination: GuidanceState::CaptureFromHigherAngle,
    },
];

static SECOND_SEGMENT_COMPLETE: [Transition; 2] = [
    Transition {
        inputs: CONTINUE_FLIPPABLE,
        destination: GuidanceState::FlipObjectASecondTime,
    },
    Transition {
        inputs: CONTINUE_UNFLIPPABLE,
        destination: GuidanceState::CaptureFromHigherAngle,
    },
];

static FLIP_OBJECT_A_SECOND_TIME: [Transition; 2] = [
    Transition {
        inputs: FINISH,
        destination: GuidanceState::Reconstruction,
    },
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::ThirdSegment,
    },
];

static CAPTURE_FROM_HIGHER_ANGLE: [Transition; 2] = [
    Transition {
        inputs: FINISH,
        destination: GuidanceState::Reconstruction,
    },
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::AdditionalOrbitOnCurrentSegment,
    },
];

static THIRD_SEGMENT_NEEDS_WORK: [Transition; 2] = [
    Transition {
        inputs: FINISH,
        destination: GuidanceState::Reconstruction,
    },
    Transition {
        inputs: CONTINUE_ANY,
        destination: GuidanceState::Dismiss,
    },
];

static THIRD_SEGMENT_COMPLETE: [Transition; 1] = [Transition {
    inputs: FINISH,
    destination: GuidanceState::Reconstruction,
}];

/// Outgoing edges of `state`. Segment-in-progress states, `dismiss`,
/// `reconstruction` and `additional-orbit-on-current-segment` have none.
pub fn transitions(state: GuidanceState) -> &'static [Transition] {
    match state {
        GuidanceState::TooFewImages => &TOO_FEW_IMAGES,
        GuidanceState::FirstSegmentNeedsWork => &FIRST_SEGMENT_NEEDS_WORK,
        GuidanceState::FirstSegmentComplete => &FIRST_SEGMENT_COMPLETE,
        GuidanceState::FlipObject => &FLIP_OBJECT,
        GuidanceState::FlippingObjectNotRecommended => &FLIPPING_OBJECT_NOT_RECOMMENDED,
        GuidanceState::CaptureFromLowerAngle => &CAPTURE_FROM_LOWER_ANGLE,
        GuidanceState::SecondSegmentNeedsWork => &SECOND_SEGMENT_NEEDS_WORK,
        GuidanceState::SecondSegmentComplete => &SECOND_SEGMENT_COMPLETE,
        GuidanceState::FlipObjectASecondTime => &FLIP_OBJECT_A_SECOND_TIME,
        GuidanceState::CaptureFromHigherAngle => &CAPTURE_FROM_HIGHER_ANGLE,
        GuidanceState::ThirdSegmentNeedsWork => &THIRD_SEGMENT_NEEDS_WORK,
        GuidanceState::ThirdSegmentComplete => &THIRD_SEGMENT_COMPLETE,
        GuidanceState::FirstSegment
        | GuidanceState::SecondSegment
        | GuidanceState::ThirdSegment
        | GuidanceState::Dismiss
        | GuidanceState::Reconstruction
        | GuidanceState::AdditionalOrbitOnCurrentSegment => &[],
    }
}

/// Pure lookup of the destination for `input` from `state`.
pub fn next_state(state: GuidanceState, input: GuidanceInput) -> Option<GuidanceState> {
    transitions(state)
        .iter()
        .find(|transition| transition.inputs.contains(&input))
        .map(|transition| transition.destination)
}

/// Guidance dialogue driven by user input on the review screens.
///
/// A fresh machine is created each time the guidance sheet is presented,
/// seeded with the state computed by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceStateMachine {
    current: GuidanceState,
}

impl Default for GuidanceStateMachine {
    fn default() -> Self {
        Self {
            current: GuidanceState::FirstSegment,
        }
    }
}

impl GuidanceStateMachine {
    /// Seeds the machine. Anything other than an entry state starts at
    /// `first-segment`.
    pub fn new(initial: GuidanceState) -> Self {
        if !initial.is_entry_state() {
            debug!(state = %initial, "Not an entry state, starting at first-segment");
            return Self::default();
        }
        Self { current: initial }
    }

    pub fn current_state(&self) -> GuidanceState {
        self.current
    }

    /// Applies `input`. Returns `false` and leaves the state untouched when the
    /// table has no edge for it.
    pub fn enter(&mut self, input: GuidanceInput) -> bool {
        if transitions(self.current).is_empty() {
            debug!(state = %self.current, "No transitions available");
            return false;
        }

        match next_state(self.current, input) {
            Some(destination) => {
                debug!(
                    from = %self.current,
                    to = %destination,
                    input = %input,
                    "Guidance transition"
                );
                self.current = destination;
                true
            }
            None => {
                debug!(state = %self.current, input = %input, "No transition for input");
                false
            }
        }
    }

    /// Every input accepted from the current state, in table order.
    pub fn current_state_inputs(&self) -> Vec<GuidanceInput> {
        transitions(self.current)
            .iter()
            .flat_map(|transition| transition.inputs.iter().copied())
            .collect()
    }

    pub fn reset(&mut self, to: GuidanceState) -> bool {
        if !to.is_entry_state() {
            debug!(state = %to, "Refusing reset to a non-entry state");
            return false;
        }
        self.current = to;
        true
    }

    /// True once the dialogue reached a state with no further edges.
    pub fn is_finished(&self) -> bool {
        transitions(self.current).is_empty()
    }
}
