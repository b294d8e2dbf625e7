use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::state::DeviceState;

/// An accepted, timestamped move from one state to another.
///
/// Only `create_transition` can build one of these, so a `StateTransition`
/// in hand is a proof the move was legal at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub device_id: i64,
    pub from: DeviceState,
    pub to: DeviceState,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

/// The legal moves out of each state (`spec.md` §4.2's transition table).
pub fn valid_transitions(from: DeviceState) -> &'static [DeviceState] {
    match from {
        DeviceState::Queued => &[DeviceState::Connecting],
        DeviceState::Connecting => &[DeviceState::Collecting, DeviceState::Error],
        DeviceState::Collecting => &[DeviceState::Discovered, DeviceState::Error],
        DeviceState::Discovered => &[DeviceState::Enriched, DeviceState::Done, DeviceState::Error],
        DeviceState::Enriched => &[DeviceState::Done, DeviceState::Error],
        DeviceState::Error => &[DeviceState::Queued],
        DeviceState::Done => &[],
    }
}

fn is_valid(from: DeviceState, to: DeviceState) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate and timestamp a transition. Device-id stamping is deferred to the
/// caller (the store knows which row this transition applies to), so this
/// returns a transition with `device_id` left at `0`; `Store::update_state`
/// fills it in before persisting.
pub fn create_transition(
    from: DeviceState,
    to: DeviceState,
    error: Option<String>,
) -> Result<StateTransition, TransitionError> {
    if !is_valid(from, to) {
        return Err(TransitionError::Illegal { from, to });
    }
    Ok(StateTransition {
        device_id: 0,
        from,
        to,
        at: Utc::now(),
        error,
    })
}
