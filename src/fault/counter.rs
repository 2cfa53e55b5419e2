//! Bounded counter used to cap irrevocable terminations.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counter whose increment fails once `ceiling` is reached.
#[derive(Debug)]
pub struct SaturatingCounter {
    value: AtomicUsize,
    ceiling: usize,
}

impl SaturatingCounter {
    pub fn new(ceiling: usize) -> Self {
        Self {
            value: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Counter capped at [`termination_ceiling`] for `n` participants.
    pub fn for_participants(n: usize) -> Self {
        Self::new(termination_ceiling(n))
    }

    /// Increment if below the ceiling. Returns false when saturated.
    pub fn reserve(&self) -> bool {
        loop {
            let current = self.value.load(Ordering::Acquire);
            if current >= self.ceiling {
                return false;
            }
            if self
                .value
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn is_saturated(&self) -> bool {
        self.value() >= self.ceiling
    }
}

/// Most participants the random path may kill out of `n`: `n / 2` when `n`
/// is even, `(n - 1) / 2` when odd. Never more than half.
pub fn termination_ceiling(n: usize) -> usize {
    if n % 2 == 0 {
        n / 2
    } else {
        (n - 1) / 2
    }
}
