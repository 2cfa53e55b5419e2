//! Participant side of the rendezvous protocol.

use std::net::SocketAddr;

use tokio::net::TcpStream;

use super::protocol::{self, RendezvousMessage};
use super::RendezvousError;
use crate::participant::{now_millis, EpochMillis, ParticipantId};

/// Connects one participant to the barrier and the completion signal.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    participant: ParticipantId,
    barrier: SocketAddr,
    signal: SocketAddr,
}

impl RendezvousClient {
    pub fn new(participant: ParticipantId, barrier: SocketAddr, signal: SocketAddr) -> Self {
        Self {
            participant,
            barrier,
            signal,
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Register at the barrier and block until it releases.
    pub async fn wait_on_barrier(&self) -> Result<(), RendezvousError> {
        self.wait_on_barrier_at(now_millis()).await
    }

    /// Same as [`wait_on_barrier`](Self::wait_on_barrier) with an explicit timestamp.
    pub async fn wait_on_barrier_at(&self, timestamp_ms: EpochMillis) -> Result<(), RendezvousError> {
        match self.register(self.barrier, timestamp_ms).await? {
            RendezvousMessage::Release => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Report that this participant finished its workload.
    pub async fn finished(&self) -> Result<(), RendezvousError> {
        self.finished_at(now_millis()).await
    }

    pub async fn finished_at(&self, timestamp_ms: EpochMillis) -> Result<(), RendezvousError> {
        match self.register(self.signal, timestamp_ms).await? {
            RendezvousMessage::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn register(
        &self,
        addr: SocketAddr,
        timestamp_ms: EpochMillis,
    ) -> Result<RendezvousMessage, RendezvousError> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = RendezvousMessage::Register {
            participant: self.participant,
            timestamp_ms,
        };
        protocol::send_message(&mut stream, &request).await?;
        Ok(protocol::recv_message(&mut stream).await?)
    }
}

fn unexpected(reply: RendezvousMessage) -> RendezvousError {
    match reply {
        RendezvousMessage::Rejected { reason } => RendezvousError::Rejected(reason),
        other => RendezvousError::UnexpectedReply(other),
    }
}
