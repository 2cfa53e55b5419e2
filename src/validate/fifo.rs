//! FIFO broadcast checking.

use std::collections::HashMap;
use std::path::Path;

use super::event::{parse_log, DeliveryLogEvent, LineParse, Seq};
use super::verdict::{ValidationVerdict, Violation, ViolationKind};
use super::{BroadcastKind, BroadcastValidation, GeneratedConfig, RunLayout, ValidationError};
use crate::participant::ParticipantId;

/// Check a single log: own broadcasts numbered 1, 2, 3, ... and deliveries
/// from every sender numbered 1, 2, 3, ... Returns the first violation.
pub fn check_fifo_log(file: &Path, contents: &str) -> Option<Violation> {
    let mut next_broadcast: Seq = 1;
    let mut next_from: HashMap<ParticipantId, Seq> = HashMap::new();

    for entry in parse_log(contents) {
        let kind = match entry.parsed {
            LineParse::Ignored => continue,
            LineParse::Malformed(reason) => ViolationKind::Malformed { reason },
            LineParse::Event(DeliveryLogEvent::Broadcast { seq }) => {
                if seq == next_broadcast {
                    next_broadcast += 1;
                    continue;
                }
                ViolationKind::BroadcastOrder {
                    expected: next_broadcast,
                    actual: seq,
                }
            }
            LineParse::Event(DeliveryLogEvent::Deliver { sender, seq }) => {
                let next = next_from.entry(sender).or_insert(1);
                if seq == *next {
                    *next += 1;
                    continue;
                }
                ViolationKind::DeliveryOrder {
                    sender,
                    expected: *next,
                    actual: seq,
                }
            }
        };
        return Some(Violation {
            file: file.to_path_buf(),
            line: entry.line,
            content: entry.text.to_string(),
            kind,
        });
    }
    None
}

#[derive(Debug, Clone)]
pub struct FifoValidator {
    layout: RunLayout,
}

impl FifoValidator {
    pub fn new(layout: RunLayout) -> Self {
        Self { layout }
    }
}

impl BroadcastValidation for FifoValidator {
    fn layout(&self) -> &RunLayout {
        &self.layout
    }

    fn kind(&self) -> BroadcastKind {
        BroadcastKind::Fifo
    }

    fn generate_config(&self) -> Result<GeneratedConfig, ValidationError> {
        GeneratedConfig::create(
            &self.layout.hosts_contents(),
            &format!("{}\n", self.layout.messages),
        )
    }

    fn check_process(&self, id: ParticipantId) -> Result<ValidationVerdict, ValidationError> {
        let (path, contents) = self.layout.read_log(id);
        let contents = match contents {
            Ok(contents) => contents,
            Err(e) => return Ok(ValidationVerdict::unreadable(id, path, &e)),
        };
        Ok(match check_fifo_log(&path, &contents) {
            None => ValidationVerdict::pass(id),
            Some(violation) => ValidationVerdict::fail(id, violation),
        })
    }
}
