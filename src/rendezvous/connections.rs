//! Concurrent connection limiting for the rendezvous listeners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Caps the number of connections handled at once.
pub struct ConnectionLimiter {
    active: AtomicUsize,
    max_connections: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_connections: max_connections.max(1),
        }
    }

    /// Take a slot for a spawned connection task, if one is free.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        loop {
            let current = self.active.load(Ordering::Relaxed);
            if current >= self.max_connections {
                return None;
            }
            if self
                .active
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Some(ConnectionPermit {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Releases its slot on drop.
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.active.fetch_sub(1, Ordering::SeqCst);
    }
}
