//! Completion signal: collects one "finished" timestamp per participant.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

use super::service::{Mode, RendezvousConfig, RendezvousService};
use super::RendezvousError;
use crate::participant::{EpochMillis, ParticipantId};

/// Completion timestamps gathered by a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub expected: u32,
    pub end_times: BTreeMap<ParticipantId, EpochMillis>,
    /// The bounded wait expired before every participant reported.
    pub timed_out: bool,
}

impl CompletionReport {
    pub fn is_complete(&self) -> bool {
        !self.timed_out && self.end_times.len() >= self.expected as usize
    }

    /// Participants that never reported.
    pub fn missing(&self) -> Vec<ParticipantId> {
        ParticipantId::all(self.expected)
            .filter(|id| !self.end_times.contains_key(id))
            .collect()
    }
}

/// Acknowledges each participant's completion report as it arrives and
/// resolves once all `expected` have reported.
pub struct CompletionSignal {
    service: RendezvousService,
}

impl CompletionSignal {
    pub fn new(config: RendezvousConfig) -> Self {
        Self {
            service: RendezvousService::new(config, Mode::Signal),
        }
    }

    /// Start accepting reports. Returns the bound address.
    pub async fn listen(&mut self) -> Result<SocketAddr, RendezvousError> {
        self.service.listen().await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.service.local_addr()
    }

    pub fn expected(&self) -> u32 {
        self.service.expected()
    }

    /// Block until every participant has reported.
    pub async fn wait(&self) -> CompletionReport {
        self.service.wait_complete().await;
        self.report(false)
    }

    /// Wait at most `bound`. Expiry is not an error: the report carries
    /// whatever arrived and `timed_out` is set.
    pub async fn wait_timeout(&self, bound: Duration) -> CompletionReport {
        match tokio::time::timeout(bound, self.service.wait_complete()).await {
            Ok(()) => self.report(false),
            Err(_) => {
                let report = self.report(true);
                tracing::warn!(
                    reported = report.end_times.len(),
                    expected = report.expected,
                    bound_ms = bound.as_millis() as u64,
                    "participants did not finish in time"
                );
                report
            }
        }
    }

    /// Completion timestamps gathered so far.
    pub fn end_times(&self) -> BTreeMap<ParticipantId, EpochMillis> {
        self.service.snapshot()
    }

    pub fn shutdown(&self) {
        self.service.shutdown();
    }

    fn report(&self, timed_out: bool) -> CompletionReport {
        // Completion may land between the timeout firing and this snapshot.
        let timed_out = timed_out && !self.service.is_complete();
        CompletionReport {
            expected: self.service.expected(),
            end_times: self.service.snapshot(),
            timed_out,
        }
    }
}
