//! Registration bookkeeping shared by the barrier and the completion signal.

use std::collections::BTreeMap;

use super::protocol::RejectReason;
use crate::participant::{EpochMillis, ParticipantId};

/// One client contact: who registered and the time it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub participant: ParticipantId,
    pub timestamp_ms: EpochMillis,
}

/// Outcome of offering a registration to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Recorded. `complete` is true for exactly the registration that filled the table.
    Accepted { complete: bool },
    Rejected(RejectReason),
}

/// Append-only id -> timestamp table that fills up at `expected` entries.
#[derive(Debug)]
pub struct RegistrationTable {
    expected: u32,
    entries: BTreeMap<ParticipantId, EpochMillis>,
}

impl RegistrationTable {
    pub fn new(expected: u32) -> Self {
        Self {
            expected,
            entries: BTreeMap::new(),
        }
    }

    pub fn admit(&mut self, registration: Registration) -> Admission {
        let Registration {
            participant,
            timestamp_ms,
        } = registration;

        if !participant.in_range(self.expected) {
            return Admission::Rejected(RejectReason::OutOfRange {
                expected: self.expected,
            });
        }
        if self.entries.contains_key(&participant) {
            return Admission::Rejected(RejectReason::Duplicate);
        }
        if self.is_complete() {
            return Admission::Rejected(RejectReason::Full);
        }

        self.entries.insert(participant, timestamp_ms);
        Admission::Accepted {
            complete: self.is_complete(),
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.entries.len() >= self.expected as usize
    }

    pub fn snapshot(&self) -> BTreeMap<ParticipantId, EpochMillis> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(id: u32, ts: EpochMillis) -> Registration {
        Registration {
            participant: ParticipantId(id),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn fills_on_last_distinct_id() {
        let mut table = RegistrationTable::new(3);
        assert_eq!(table.admit(reg(2, 10)), Admission::Accepted { complete: false });
        assert_eq!(table.admit(reg(1, 11)), Admission::Accepted { complete: false });
        assert_eq!(table.admit(reg(3, 12)), Admission::Accepted { complete: true });
        assert!(table.is_complete());
        assert_eq!(table.snapshot().get(&ParticipantId(1)), Some(&11));
    }

    #[test]
    fn duplicate_does_not_count() {
        let mut table = RegistrationTable::new(2);
        table.admit(reg(1, 10));
        assert_eq!(
            table.admit(reg(1, 99)),
            Admission::Rejected(RejectReason::Duplicate)
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.snapshot()[&ParticipantId(1)], 10);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut table = RegistrationTable::new(2);
        assert_eq!(
            table.admit(reg(0, 1)),
            Admission::Rejected(RejectReason::OutOfRange { expected: 2 })
        );
        assert_eq!(
            table.admit(reg(3, 1)),
            Admission::Rejected(RejectReason::OutOfRange { expected: 2 })
        );
        assert!(table.is_empty());
    }
}
