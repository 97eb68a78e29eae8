use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("maximum function-call rounds exceeded: {rounds} (configured max: {max})")]
    MaxTurnsExceeded {
        /// Dispatch rounds completed before giving up.
        rounds: u32,
        /// The configured ceiling.
        max: u32,
    },

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
