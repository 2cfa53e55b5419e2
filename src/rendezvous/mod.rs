//! Rendezvous services: the start barrier and the completion signal.
//!
//! Both are TCP listeners speaking the framed protocol in [`protocol`].
//! Participants use [`RendezvousClient`] to register.

mod barrier;
mod client;
mod connections;
pub mod protocol;
mod registry;
mod service;
mod signal;

use std::net::SocketAddr;

use thiserror::Error;

pub use barrier::RendezvousBarrier;
pub use client::RendezvousClient;
pub use connections::{ConnectionLimiter, ConnectionPermit};
pub use protocol::{ProtocolError, RejectReason, RendezvousMessage};
pub use registry::{Admission, Registration, RegistrationTable};
pub use service::RendezvousConfig;
pub use signal::{CompletionReport, CompletionSignal};

#[derive(Error, Debug)]
pub enum RendezvousError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Registration rejected: {0}")]
    Rejected(RejectReason),

    #[error("Unexpected reply: {0:?}")]
    UnexpectedReply(RendezvousMessage),

    #[error("Timed out waiting for peer")]
    Timeout,
}
