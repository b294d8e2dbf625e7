use thiserror::Error;

/// Errors surfaced by one worker's drive of a single device.
///
/// None of these ever unwind the worker thread: `pool::drive_device` catches
/// every variant, writes an `ERROR` transition, and moves on to the next
/// claim. See `spec.md` §7's error table for the policy behind each
/// variant.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("session error: {0}")]
    Session(#[from] crawler_core::NetsshError),

    #[error("store error: {0}")]
    Store(#[from] crawler_store::StoreError),

    #[error("invalid fsm transition: {0}")]
    Transition(#[from] crawler_fsm::TransitionError),
}

impl WorkerError {
    /// Whether this is an SSH authentication failure, which spec.md §7
    /// forbids retrying (retrying risks locking the device account).
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::Session(
                crawler_core::NetsshError::AuthenticationError(_)
                    | crawler_core::NetsshError::AuthenticationFailed { .. }
                    | crawler_core::NetsshError::AuthError(_)
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
