//! Validation outcomes and their diagnostics.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::event::Seq;
use crate::participant::ParticipantId;

/// What went wrong on a failing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Own broadcasts were not numbered 1, 2, 3, ...
    BroadcastOrder { expected: Seq, actual: Seq },
    /// Deliveries from one sender were not numbered 1, 2, 3, ...
    DeliveryOrder {
        sender: ParticipantId,
        expected: Seq,
        actual: Seq,
    },
    /// A message was delivered before one of the messages it depends on.
    MissingDependency {
        sender: ParticipantId,
        seq: Seq,
        dependency: ParticipantId,
        required: Seq,
        delivered: Seq,
    },
    /// A delivered message never appears as a broadcast in the sender's log.
    UnknownBroadcast { sender: ParticipantId, seq: Seq },
    Malformed { reason: String },
    /// The participant's own log could not be read.
    Unreadable { reason: String },
    /// The sender's log could not be read, so the message's dependencies are unknown.
    UnverifiableDelivery {
        sender: ParticipantId,
        seq: Seq,
        reason: String,
    },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BroadcastOrder { expected, actual } => write!(
                f,
                "Messages broadcast out of order. Expected message {} but broadcast message {}",
                expected, actual
            ),
            Self::DeliveryOrder {
                sender,
                expected,
                actual,
            } => write!(
                f,
                "Message from {} delivered out of order. Expected message {}, but delivered message {}",
                sender, expected, actual
            ),
            Self::MissingDependency {
                sender,
                seq,
                dependency,
                required,
                delivered,
            } => write!(
                f,
                "Message {} from {} delivered too early. It depends on {} messages from {}, but only {} were delivered",
                seq, sender, required, dependency, delivered
            ),
            Self::UnknownBroadcast { sender, seq } => {
                write!(f, "Message {} from {} was never broadcast", seq, sender)
            }
            Self::Malformed { reason } => write!(f, "Malformed line: {}", reason),
            Self::Unreadable { reason } => write!(f, "Log could not be read: {}", reason),
            Self::UnverifiableDelivery { sender, seq, reason } => write!(
                f,
                "Message {} from {} cannot be checked, sender log could not be read: {}",
                seq, sender, reason
            ),
        }
    }
}

/// A failing line with enough context to find it again. `line` is 0 when
/// the violation concerns the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub file: PathBuf,
    pub line: usize,
    pub content: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.file.to_string_lossy());
        if self.line == 0 {
            return write!(f, "File {}: {}", name, self.kind);
        }
        write!(f, "File {}, Line {}: {}", name, self.line, self.kind)
    }
}

/// Pass or fail for one participant's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub participant: ParticipantId,
    pub violation: Option<Violation>,
}

impl ValidationVerdict {
    pub fn pass(participant: ParticipantId) -> Self {
        Self {
            participant,
            violation: None,
        }
    }

    pub fn fail(participant: ParticipantId, violation: Violation) -> Self {
        Self {
            participant,
            violation: Some(violation),
        }
    }

    /// Fail for a log that could not be read at all.
    pub fn unreadable(participant: ParticipantId, file: PathBuf, error: &std::io::Error) -> Self {
        Self::fail(
            participant,
            Violation {
                file,
                line: 0,
                content: String::new(),
                kind: ViolationKind::Unreadable {
                    reason: error.to_string(),
                },
            },
        )
    }

    pub fn passed(&self) -> bool {
        self.violation.is_none()
    }
}

/// Verdicts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub verdicts: Vec<ValidationVerdict>,
    /// True if checking stopped at the first failing participant.
    pub short_circuited: bool,
}

impl ValidationSummary {
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(ValidationVerdict::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationVerdict> {
        self.verdicts.iter().filter(|v| !v.passed())
    }
}
