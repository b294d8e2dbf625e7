use thiserror::Error;

use crate::state::DeviceState;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: DeviceState, to: DeviceState },
}
