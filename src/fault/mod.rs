//! Fault injection against running participants.
//!
//! Workers suspend, resume, and kill participants at random while a run is
//! in progress, never killing more than half of them.

mod control;
mod counter;
mod engine;
mod operations;
mod state;

pub use control::ProcessControl;
pub use counter::{termination_ceiling, SaturatingCounter};
pub use engine::{FaultConfig, FaultInjectionEngine, FaultRunSummary, InjectionOutcome, WorkerReport};
pub use operations::{OperationPicker, OperationWeights};
pub use state::{ControlSignal, FaultOperation, ProcessState};

use thiserror::Error;

use crate::participant::ParticipantId;

#[derive(Error, Debug)]
pub enum FaultError {
    #[error("Invalid operation weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid jitter range: {min_ms}ms > {max_ms}ms")]
    InvalidJitter { min_ms: u64, max_ms: u64 },

    #[error("Participant {0} registered twice")]
    DuplicateParticipant(ParticipantId),
}
