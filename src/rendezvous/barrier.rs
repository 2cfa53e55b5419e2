//! Start barrier: releases all N participants together.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use super::service::{Mode, RendezvousConfig, RendezvousService};
use super::RendezvousError;
use crate::participant::{EpochMillis, ParticipantId};

/// Holds every registered participant until all `expected` ids are present,
/// then releases them in one step.
///
/// [`wait`](Self::wait) has no timeout. Wrap it in `tokio::time::timeout`
/// if the caller needs a bound.
pub struct RendezvousBarrier {
    service: RendezvousService,
}

impl RendezvousBarrier {
    pub fn new(config: RendezvousConfig) -> Self {
        Self {
            service: RendezvousService::new(config, Mode::Barrier),
        }
    }

    /// Start accepting registrations. Returns the bound address.
    pub async fn listen(&mut self) -> Result<SocketAddr, RendezvousError> {
        self.service.listen().await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.service.local_addr()
    }

    pub fn expected(&self) -> u32 {
        self.service.expected()
    }

    /// Number of distinct participants registered so far.
    pub fn registered(&self) -> usize {
        self.service.registered()
    }

    /// Block until all participants have registered; returns their start times.
    pub async fn wait(&self) -> BTreeMap<ParticipantId, EpochMillis> {
        self.service.wait_complete().await;
        self.service.snapshot()
    }

    /// Registration timestamps, available only once the barrier has released.
    pub fn start_times(&self) -> Option<BTreeMap<ParticipantId, EpochMillis>> {
        self.service
            .is_complete()
            .then(|| self.service.snapshot())
    }

    pub fn is_released(&self) -> bool {
        self.service.is_complete()
    }

    /// Stop accepting. Parked clients are disconnected without a release.
    pub fn shutdown(&self) {
        self.service.shutdown();
    }
}
