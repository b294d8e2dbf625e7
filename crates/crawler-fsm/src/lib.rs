//! Per-device finite-state machine.
//!
//! A device moves through a fixed set of states as a worker drives it through
//! one crawl. The transition table is the single source of truth for which
//! moves are legal; nothing outside this crate is allowed to construct a
//! `StateTransition` directly.

mod error;
mod state;
mod transition;

pub use error::TransitionError;
pub use state::DeviceState;
pub use transition::{create_transition, valid_transitions, StateTransition};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_connecting_is_legal() {
        let t = create_transition(DeviceState::Queued, DeviceState::Connecting, None).unwrap();
        assert_eq!(t.from, DeviceState::Queued);
        assert_eq!(t.to, DeviceState::Connecting);
        assert!(t.error.is_none());
    }

    #[test]
    fn done_is_terminal() {
        assert!(valid_transitions(DeviceState::Done).is_empty());
        assert!(create_transition(DeviceState::Done, DeviceState::Queued, None).is_err());
    }

    #[test]
    fn error_only_retries_to_queued() {
        assert_eq!(valid_transitions(DeviceState::Error), &[DeviceState::Queued]);
        assert!(create_transition(DeviceState::Error, DeviceState::Collecting, None).is_err());
    }

    #[test]
    fn every_state_is_reachable_in_the_table() {
        // Sanity check that the table is exhaustive over the enum, so a new
        // variant can't silently fall through `valid_transitions`.
        for state in DeviceState::ALL {
            let _ = valid_transitions(*state);
        }
    }

    #[test]
    fn rejected_transition_carries_both_states() {
        let err = create_transition(DeviceState::Queued, DeviceState::Done, None).unwrap_err();
        match err {
            TransitionError::Illegal { from, to } => {
                assert_eq!(from, DeviceState::Queued);
                assert_eq!(to, DeviceState::Done);
            }
        }
    }
}
