//! Participant identity and the per-participant file naming scheme.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as reported by participants.
pub type EpochMillis = i64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

/// Logical id of one participant process. Valid ids are `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// All ids of an `n`-participant run, in order.
    pub fn all(n: u32) -> impl Iterator<Item = ParticipantId> {
        (1..=n).map(ParticipantId)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// True if this id belongs to an `n`-participant run.
    pub fn in_range(self, n: u32) -> bool {
        self.0 >= 1 && self.0 <= n
    }

    /// `procNN`, the stem shared by every file this participant owns.
    pub fn file_stem(self) -> String {
        format!("proc{:02}", self.0)
    }

    /// Delivery log written by the participant.
    pub fn output_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.output", self.file_stem()))
    }

    /// Captured standard output of the participant process.
    pub fn stdout_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.stdout", self.file_stem()))
    }

    /// Captured standard error of the participant process.
    pub fn stderr_path(self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.stderr", self.file_stem()))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ParticipantId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
