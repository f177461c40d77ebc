// Guidance table tests
// Walks documented dialogue paths and checks the table is deterministic

use capture_workflow::guidance::{
    next_state, transitions, GuidanceInput, GuidanceState, GuidanceStateMachine,
};
use proptest::prelude::*;

fn input_strategy() -> impl Strategy<Value = GuidanceInput> {
    prop_oneof![
        any::<bool>().prop_map(|is_flippable| GuidanceInput::Continue { is_flippable }),
        any::<bool>().prop_map(|is_flippable| GuidanceInput::Skip { is_flippable }),
        Just(GuidanceInput::Finish),
        Just(GuidanceInput::ObjectCannotBeFlipped),
        Just(GuidanceInput::FlipObjectAnyway),
    ]
}

fn state_strategy() -> impl Strategy<Value = GuidanceState> {
    prop::sample::select(GuidanceState::ALL.to_vec())
}

fn entry_state_strategy() -> impl Strategy<Value = GuidanceState> {
    prop::sample::select(GuidanceState::ENTRY_STATES.to_vec())
}

#[test]
fn test_flippable_object_walks_to_third_segment() {
    let mut machine = GuidanceStateMachine::new(GuidanceState::SecondSegmentComplete);
    assert!(machine.enter(GuidanceInput::Continue { is_flippable: true }));
    assert_eq!(machine.current_state(), GuidanceState::FlipObjectASecondTime);
    assert!(machine.enter(GuidanceInput::Continue { is_flippable: false }));
    assert_eq!(machine.current_state(), GuidanceState::ThirdSegment);
    assert!(machine.is_finished());
}

#[test]
fn test_skipping_unfinished_first_segment_leads_to_flip() {
    let mut machine = GuidanceStateMachine::new(GuidanceState::FirstSegmentNeedsWork);
    assert!(!machine.enter(GuidanceInput::Finish));
    assert_eq!(machine.current_state(), GuidanceState::FirstSegmentNeedsWork);

    assert!(machine.enter(GuidanceInput::Skip { is_flippable: false }));
    assert_eq!(machine.current_state(), GuidanceState::FlipObject);

    assert!(machine.enter(GuidanceInput::Continue { is_flippable: false }));
    assert_eq!(machine.current_state(), GuidanceState::SecondSegment);
    assert!(machine.current_state_inputs().is_empty());
}

#[test]
fn test_too_few_images_returns_to_first_segment() {
    let mut machine = GuidanceStateMachine::new(GuidanceState::TooFewImages);
    assert!(!machine.enter(GuidanceInput::Skip { is_flippable: true }));

    assert!(machine.enter(GuidanceInput::Continue { is_flippable: true }));
    assert_eq!(machine.current_state(), GuidanceState::FirstSegment);
    assert!(machine.reset(GuidanceState::ThirdSegmentComplete));
    assert_eq!(machine.current_state_inputs(), vec![GuidanceInput::Finish]);
}

#[test]
fn test_second_segment_needs_work_skip_depends_on_flippability() {
    assert_eq!(
        next_state(
            GuidanceState::SecondSegmentNeedsWork,
            GuidanceInput::Skip { is_flippable: true }
        ),
        Some(GuidanceState::FlipObjectASecondTime)
    );
    assert_eq!(
        next_state(
            GuidanceState::SecondSegmentNeedsWork,
            GuidanceInput::Skip { is_flippable: false }
        ),
        Some(GuidanceState::CaptureFromHigherAngle)
    );
    assert_eq!(
        next_state(GuidanceState::SecondSegmentNeedsWork, GuidanceInput::Finish),
        None
    );
}

#[test]
fn test_terminal_states_have_no_edges() {
    for state in [
        GuidanceState::Dismiss,
        GuidanceState::FirstSegment,
        GuidanceState::SecondSegment,
        GuidanceState::ThirdSegment,
        GuidanceState::Reconstruction,
        GuidanceState::AdditionalOrbitOnCurrentSegment,
    ] {
        assert!(transitions(state).is_empty(), "{state} should be terminal");
    }
}

#[test]
fn test_every_entry_state_can_be_left() {
    for state in GuidanceState::ENTRY_STATES {
        assert!(
            !GuidanceStateMachine::new(state).current_state_inputs().is_empty(),
            "{state} has no inputs"
        );
    }
}

proptest! {
    #[test]
    fn each_input_matches_at_most_one_edge(state in state_strategy(), input in input_strategy()) {
        let matches = transitions(state)
            .iter()
            .filter(|transition| transition.inputs.contains(&input))
            .count();
        prop_assert!(matches <= 1);
    }

    #[test]
    fn machine_agrees_with_table(
        seed in entry_state_strategy(),
        inputs in prop::collection::vec(input_strategy(), 0..12),
    ) {
        let mut machine = GuidanceStateMachine::new(seed);
        let mut expected = seed;

        for input in inputs {
            let accepted = machine.enter(input);
            match next_state(expected, input) {
                Some(destination) => {
                    prop_assert!(accepted);
                    expected = destination;
                }
                None => prop_assert!(!accepted),
            }
            prop_assert_eq!(machine.current_state(), expected);
        }
    }

    #[test]
    fn state_and_input_names_parse_back(state in state_strategy(), input in input_strategy()) {
        prop_assert_eq!(state.to_string().parse::<GuidanceState>().unwrap(), state);
        prop_assert_eq!(input.to_string().parse::<GuidanceInput>().unwrap(), input);
    }
}
