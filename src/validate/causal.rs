//! Causal broadcast checking.
//!
//! Message `m` from sender `s` depends on `s`'s message `m - 1` and on
//! every message `s` had delivered from its declared dependencies before it
//! logged `b m`. A receiver may deliver `(s, m)` only after delivering all
//! of those. Requirements are read from the sender's own log and cached.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use super::dependencies::DependencyMap;
use super::event::{parse_log, DeliveryLogEvent, LineParse, Seq};
use super::verdict::{ValidationVerdict, Violation, ViolationKind};
use super::{BroadcastKind, BroadcastValidation, GeneratedConfig, RunLayout, ValidationError};
use crate::participant::ParticipantId;

/// Per-message delivery requirements of one sender.
#[derive(Debug, Default, PartialEq, Eq)]
struct SenderTable {
    /// `requirements[m - 1]`: dependency -> deliveries required before message `m`.
    requirements: Vec<BTreeMap<ParticipantId, Seq>>,
}

impl SenderTable {
    fn from_log(sender: ParticipantId, deps: &[ParticipantId], contents: &str) -> Self {
        let mut delivered: BTreeMap<ParticipantId, Seq> = deps
            .iter()
            .filter(|d| **d != sender)
            .map(|d| (*d, 0))
            .collect();
        let mut requirements = Vec::new();

        for entry in parse_log(contents) {
            match entry.parsed {
                LineParse::Event(DeliveryLogEvent::Broadcast { seq }) => {
                    // Out-of-order broadcasts are reported against the sender itself.
                    if seq == requirements.len() as Seq + 1 {
                        requirements.push(delivered.clone());
                    }
                }
                LineParse::Event(DeliveryLogEvent::Deliver { sender: from, .. }) => {
                    if let Some(count) = delivered.get_mut(&from) {
                        *count += 1;
                    }
                }
                LineParse::Ignored | LineParse::Malformed(_) => {}
            }
        }
        Self { requirements }
    }

    fn requirements(&self, seq: Seq) -> Option<&BTreeMap<ParticipantId, Seq>> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.requirements.get(index)
    }
}

pub struct CausalValidator {
    layout: RunLayout,
    dependencies: DependencyMap,
    tables: DashMap<ParticipantId, Arc<SenderTable>>,
}

impl CausalValidator {
    pub fn new(layout: RunLayout, dependencies: DependencyMap) -> Result<Self, ValidationError> {
        if dependencies.processes() != layout.processes {
            return Err(ValidationError::DependencyMismatch {
                expected: layout.processes,
                actual: dependencies.processes(),
            });
        }
        Ok(Self {
            layout,
            dependencies,
            tables: DashMap::new(),
        })
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Requirements of `sender`, or why its log could not be read.
    fn table_for(&self, sender: ParticipantId) -> Result<Arc<SenderTable>, String> {
        if let Some(table) = self.tables.get(&sender).map(|t| Arc::clone(t.value())) {
            return Ok(table);
        }
        let (path, contents) = self.layout.read_log(sender);
        let contents = contents.map_err(|e| format!("{}: {}", path.display(), e))?;
        let table = Arc::new(SenderTable::from_log(
            sender,
            self.dependencies.of(sender),
            &contents,
        ));
        self.tables.insert(sender, Arc::clone(&table));
        Ok(table)
    }

    fn check_log(&self, file: &Path, contents: &str) -> Option<Violation> {
        let mut next_broadcast: Seq = 1;
        let mut delivered: HashMap<ParticipantId, Seq> = HashMap::new();

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
                    match self.check_delivery(&delivered, sender, seq) {
                        None => {
                            delivered.insert(sender, seq);
                            continue;
                        }
                        Some(kind) => kind,
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

    fn check_delivery(
        &self,
        delivered: &HashMap<ParticipantId, Seq>,
        sender: ParticipantId,
        seq: Seq,
    ) -> Option<ViolationKind> {
        let expected = delivered.get(&sender).copied().unwrap_or(0) + 1;
        if seq != expected {
            return Some(ViolationKind::DeliveryOrder {
                sender,
                expected,
                actual: seq,
            });
        }
        if !sender.in_range(self.layout.processes) {
            return Some(ViolationKind::UnknownBroadcast { sender, seq });
        }

        let table = match self.table_for(sender) {
            Ok(table) => table,
            Err(reason) => return Some(ViolationKind::UnverifiableDelivery { sender, seq, reason }),
        };
        let Some(requirements) = table.requirements(seq) else {
            return Some(ViolationKind::UnknownBroadcast { sender, seq });
        };
        for (&dependency, &required) in requirements {
            let have = delivered.get(&dependency).copied().unwrap_or(0);
            if have < required {
                return Some(ViolationKind::MissingDependency {
                    sender,
                    seq,
                    dependency,
                    required,
                    delivered: have,
                });
            }
        }
        None
    }
}

impl BroadcastValidation for CausalValidator {
    fn layout(&self) -> &RunLayout {
        &self.layout
    }

    fn kind(&self) -> BroadcastKind {
        BroadcastKind::Causal
    }

    fn generate_config(&self) -> Result<GeneratedConfig, ValidationError> {
        let config = format!("{}\n{}", self.layout.messages, self.dependencies.body());
        GeneratedConfig::create(&self.layout.hosts_contents(), &config)
    }

    fn check_process(&self, id: ParticipantId) -> Result<ValidationVerdict, ValidationError> {
        let (path, contents) = self.layout.read_log(id);
        let contents = match contents {
            Ok(contents) => contents,
            Err(e) => return Ok(ValidationVerdict::unreadable(id, path, &e)),
        };
        Ok(match self.check_log(&path, &contents) {
            None => ValidationVerdict::pass(id),
            Some(violation) => ValidationVerdict::fail(id, violation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_snapshots_dependency_deliveries() {
        let deps = [ParticipantId(2), ParticipantId(3)];
        let log = "d 2 1\nb 1\nd 3 1\nd 2 2\nd 4 1\nb 2\nb 3\n";
        let table = SenderTable::from_log(ParticipantId(1), &deps, log);
        assert_eq!(table.requirements.len(), 3);
        assert_eq!(table.requirements(1).unwrap()[&ParticipantId(2)], 1);
        assert_eq!(table.requirements(1).unwrap()[&ParticipantId(3)], 0);
        assert_eq!(table.requirements(2).unwrap()[&ParticipantId(2)], 2);
        assert_eq!(table.requirements(3).unwrap()[&ParticipantId(3)], 1);
        assert!(!table.requirements(2).unwrap().contains_key(&ParticipantId(4)));
        assert!(table.requirements(0).is_none());
        assert!(table.requirements(4).is_none());
    }

    #[test]
    fn own_id_is_not_a_dependency() {
        let table = SenderTable::from_log(ParticipantId(1), &[ParticipantId(1)], "d 1 1\nb 1\n");
        assert!(table.requirements(1).unwrap().is_empty());
    }
}
