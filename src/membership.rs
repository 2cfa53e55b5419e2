//! Dependency file generation for causal runs.

use crate::participant::ParticipantId;
use crate::validate::{DependencyMap, ValidationError};

/// Participant `i` depends on the `k` participants that follow it on a ring
/// of `n`: `(i + x) mod n + 1` for `x` in `0..k`.
pub fn ring_dependencies(n: u32, k: u32) -> Result<DependencyMap, ValidationError> {
    if n == 0 {
        return Err(ValidationError::Dependencies("need at least one participant".into()));
    }
    if k > n {
        return Err(ValidationError::Dependencies(format!(
            "{} dependencies requested but only {} participants",
            k, n
        )));
    }

    let mut map = DependencyMap::new(n);
    for id in ParticipantId::all(n) {
        let deps = (0..k)
            .map(|x| ParticipantId((id.get() + x) % n + 1))
            .collect();
        map.set(id, deps);
    }
    Ok(map)
}
