//! Per-character turn serialization.
//!
//! For a given character, at most one turn may be in flight. A second
//! request is rejected with a retryable conflict instead of queued: a
//! queued turn would parse its intent against a map that the first turn may
//! change under it.

use std::sync::Arc;

use dashmap::DashMap;

use keeper_domain::CharacterId;

/// Single-flight locks keyed by character id.
#[derive(Clone, Default)]
pub struct TurnLocks {
    in_flight: Arc<DashMap<CharacterId, ()>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the character for one turn. Returns None when a turn is
    /// already running.
    pub fn acquire(&self, id: &CharacterId) -> Option<TurnGuard> {
        use dashmap::mapref::entry::Entry;
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(TurnGuard {
                    locks: self.in_flight.clone(),
                    id: id.clone(),
                })
            }
        }
    }
}

/// Releases the character slot on drop, including on error paths.
pub struct TurnGuard {
    locks: Arc<DashMap<CharacterId, ()>>,
    id: CharacterId,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.locks.remove(&self.id);
    }
}
