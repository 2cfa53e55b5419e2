//! TCP rendezvous service shared by the barrier and the completion signal.
//!
//! One accept loop, one task per connection. The registration table sits
//! behind a mutex; completion is published through a watch channel so every
//! parked barrier connection wakes on the same transition.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::connections::ConnectionLimiter;
use super::protocol::{self, RejectReason, RendezvousMessage};
use super::registry::{Admission, Registration, RegistrationTable};
use super::RendezvousError;
use crate::participant::{EpochMillis, ParticipantId};

/// Listener settings for one rendezvous instance.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    pub bind_addr: SocketAddr,
    /// Number of distinct participants the instance waits for.
    pub expected: u32,
    /// Concurrent connections served before new ones are dropped.
    pub max_connections: usize,
    /// How long a connected client may take to send its registration.
    pub read_timeout: Duration,
}

impl RendezvousConfig {
    pub fn new(bind_addr: SocketAddr, expected: u32) -> Self {
        Self {
            bind_addr,
            expected,
            max_connections: 1024,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Whether registered clients are held until the table fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Park every client, release all of them together.
    Barrier,
    /// Acknowledge each report immediately.
    Signal,
}

struct Shared {
    mode: Mode,
    table: Mutex<RegistrationTable>,
    complete: watch::Sender<bool>,
}

impl Shared {
    fn admit(&self, registration: Registration) -> Admission {
        let admission = self.table.lock().admit(registration);
        if let Admission::Accepted { complete: true } = admission {
            self.complete.send_replace(true);
        }
        admission
    }
}

pub(crate) struct RendezvousService {
    config: RendezvousConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    local_addr: Option<SocketAddr>,
}

impl RendezvousService {
    pub(crate) fn new(config: RendezvousConfig, mode: Mode) -> Self {
        // An empty table is already full.
        let (complete, _) = watch::channel(config.expected == 0);
        let shared = Arc::new(Shared {
            mode,
            table: Mutex::new(RegistrationTable::new(config.expected)),
            complete,
        });
        Self {
            config,
            shared,
            cancel: CancellationToken::new(),
            local_addr: None,
        }
    }

    /// Bind and start accepting in the background. Returns the bound address.
    pub(crate) async fn listen(&mut self) -> Result<SocketAddr, RendezvousError> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| RendezvousError::Bind {
                addr: self.config.bind_addr,
                source,
            })?;
        let addr = listener.local_addr()?;
        self.local_addr = Some(addr);

        tracing::info!(
            %addr,
            mode = ?self.shared.mode,
            expected = self.config.expected,
            "rendezvous listening"
        );

        let limiter = Arc::new(ConnectionLimiter::new(self.config.max_connections));
        tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            limiter,
            self.cancel.clone(),
            self.config.read_timeout,
        ));
        Ok(addr)
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub(crate) fn expected(&self) -> u32 {
        self.config.expected
    }

    /// Resolve once every expected participant has registered.
    pub(crate) async fn wait_complete(&self) {
        let mut rx = self.shared.complete.subscribe();
        wait_until_complete(&mut rx).await;
    }

    pub(crate) fn is_complete(&self) -> bool {
        *self.shared.complete.borrow()
    }

    pub(crate) fn registered(&self) -> usize {
        self.shared.table.lock().len()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<ParticipantId, EpochMillis> {
        self.shared.table.lock().snapshot()
    }

    /// Stop accepting and drop parked connections.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RendezvousService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The sender is owned by `Shared`, which outlives every receiver.
async fn wait_until_complete(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|complete| *complete).await;
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    limiter: Arc<ConnectionLimiter>,
    cancel: CancellationToken,
    read_timeout: Duration,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(mode = ?shared.mode, "rendezvous accept loop stopped");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "rendezvous accept failed");
                        continue;
                    }
                };
                let Some(permit) = limiter.try_acquire() else {
                    tracing::warn!(
                        %peer,
                        max = limiter.max_connections(),
                        "rendezvous connection limit reached, dropping client"
                    );
                    continue;
                };
                let shared = shared.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handle_connection(stream, &shared, &cancel, read_timeout).await {
                        tracing::debug!(%peer, error = %e, "rendezvous connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    shared: &Shared,
    cancel: &CancellationToken,
    read_timeout: Duration,
) -> Result<(), RendezvousError> {
    let message = tokio::time::timeout(read_timeout, protocol::recv_message(&mut stream))
        .await
        .map_err(|_| RendezvousError::Timeout)??;

    let RendezvousMessage::Register {
        participant,
        timestamp_ms,
    } = message
    else {
        let reply = RendezvousMessage::Rejected {
            reason: RejectReason::UnexpectedMessage,
        };
        protocol::send_message(&mut stream, &reply).await?;
        return Ok(());
    };

    let admission = shared.admit(Registration {
        participant,
        timestamp_ms,
    });

    let complete = match admission {
        Admission::Rejected(reason) => {
            tracing::warn!(%participant, %reason, "registration rejected");
            protocol::send_message(&mut stream, &RendezvousMessage::Rejected { reason }).await?;
            return Ok(());
        }
        Admission::Accepted { complete } => complete,
    };

    tracing::debug!(%participant, timestamp_ms, mode = ?shared.mode, "participant registered");
    if complete {
        tracing::info!(mode = ?shared.mode, "all participants registered");
    }

    match shared.mode {
        Mode::Signal => {
            protocol::send_message(&mut stream, &RendezvousMessage::Ack).await?;
        }
        Mode::Barrier => {
            let mut rx = shared.complete.subscribe();
            tokio::select! {
                () = wait_until_complete(&mut rx) => {
                    protocol::send_message(&mut stream, &RendezvousMessage::Release).await?;
                }
                () = cancel.cancelled() => {}
            }
        }
    }
    Ok(())
}
