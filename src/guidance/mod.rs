// Guidance Module - review-screen dialogue between scan passes
//
// The transition table is fixed product behaviour: every (state, input) pair
// either maps to exactly one destination or is rejected.

pub mod state_machine;
pub mod types;

pub use state_machine::{next_state, transitions, GuidanceStateMachine, Transition};
pub use types::{GuidanceInput, GuidanceState, ParseGuidanceError};
