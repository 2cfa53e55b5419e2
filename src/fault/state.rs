//! Participant lifecycle states and the fault operations that move between them.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one participant process.
///
/// `Terminated` is absorbing. `Running` may stop or terminate; `Stopped`
/// may only resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    Running,
    Stopped,
    Terminated,
}

impl ProcessState {
    /// Whether the injection path may move a process from `self` to `desired`.
    pub fn valid_transition(self, desired: ProcessState) -> bool {
        match self {
            ProcessState::Running => {
                matches!(desired, ProcessState::Stopped | ProcessState::Terminated)
            }
            ProcessState::Stopped => desired == ProcessState::Running,
            ProcessState::Terminated => false,
        }
    }

    pub fn is_terminated(self) -> bool {
        self == ProcessState::Terminated
    }
}

/// OS-level control signal sent to a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// SIGSTOP
    Stop,
    /// SIGCONT
    Continue,
    /// SIGTERM
    Terminate,
    /// SIGKILL, teardown only.
    Kill,
}

impl ControlSignal {
    pub fn name(self) -> &'static str {
        match self {
            ControlSignal::Stop => "SIGSTOP",
            ControlSignal::Continue => "SIGCONT",
            ControlSignal::Terminate => "SIGTERM",
            ControlSignal::Kill => "SIGKILL",
        }
    }
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An operation a fault worker may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultOperation {
    Stop,
    Continue,
    Terminate,
}

impl FaultOperation {
    pub const ALL: [FaultOperation; 3] = [
        FaultOperation::Stop,
        FaultOperation::Continue,
        FaultOperation::Terminate,
    ];

    /// State the participant ends up in once the operation is applied.
    pub fn target_state(self) -> ProcessState {
        match self {
            FaultOperation::Stop => ProcessState::Stopped,
            FaultOperation::Continue => ProcessState::Running,
            FaultOperation::Terminate => ProcessState::Terminated,
        }
    }

    pub fn signal(self) -> ControlSignal {
        match self {
            FaultOperation::Stop => ControlSignal::Stop,
            FaultOperation::Continue => ControlSignal::Continue,
            FaultOperation::Terminate => ControlSignal::Terminate,
        }
    }
}
