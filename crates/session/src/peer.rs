//! The opponent slot: written once, read from anywhere.
//!
//! Presence notifications can report an arrival before matchmaking has decided
//! our role. Such arrivals are parked until the role is known: a first mover
//! then opens the slot (the earliest parked arrival wins), while a second
//! mover or observer binds it to the member matchmaking picked and ignores
//! later arrivals.

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use crate::latch::Latch;

#[derive(Debug)]
enum Seating {
    Undecided(Vec<String>),
    Open,
    Closed,
}

#[derive(Debug)]
struct SlotState {
    peer: Option<String>,
    seating: Seating,
}

#[derive(Debug)]
pub struct PeerSlot {
    state: RwLock<SlotState>,
    arrived: Latch,
}

impl Default for PeerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSlot {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SlotState {
                peer: None,
                seating: Seating::Undecided(Vec::new()),
            }),
            arrived: Latch::new(),
        }
    }

    pub fn peer(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .peer
            .clone()
    }

    /// Released the first time the slot is claimed.
    pub fn arrived(&self) -> &Latch {
        &self.arrived
    }

    /// Another member entered presence. Returns `true` if this arrival claimed the slot.
    pub fn observe_arrival(&self, id: &str) -> bool {
        let mut state = self.write();
        if let Seating::Undecided(parked) = &mut state.seating {
            if !parked.iter().any(|p| p == id) {
                parked.push(id.to_string());
            }
            return false;
        }
        if matches!(state.seating, Seating::Open) {
            self.claim(state, id)
        } else {
            false
        }
    }

    /// We move first: accept arrivals from now on. Returns the peer if one had
    /// already arrived.
    pub fn open(&self) -> Option<String> {
        let mut state = self.write();
        let parked = match std::mem::replace(&mut state.seating, Seating::Open) {
            Seating::Undecided(parked) => parked,
            other => {
                state.seating = other;
                return state.peer.clone();
            }
        };
        let Some(first) = parked.into_iter().next() else {
            return None;
        };
        self.claim(state, &first);
        Some(first)
    }

    /// Matchmaking already knows who the peer is. Later arrivals are ignored.
    pub fn bind(&self, id: &str) -> bool {
        let mut state = self.write();
        state.seating = Seating::Closed;
        self.claim(state, id)
    }

    fn claim(&self, mut state: RwLockWriteGuard<'_, SlotState>, id: &str) -> bool {
        if state.peer.is_some() {
            return false;
        }
        state.peer = Some(id.to_string());
        drop(state);
        self.arrived.release();
        true
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_slot_first_arrival_wins() {
        let slot = PeerSlot::new();
        assert_eq!(slot.open(), None);
        assert!(slot.observe_arrival("bob"));
        assert!(!slot.observe_arrival("carol"));
        assert_eq!(slot.peer().as_deref(), Some("bob"));
        assert!(slot.arrived().is_released());
    }

    #[test]
    fn test_duplicate_arrival_is_idempotent() {
        let slot = PeerSlot::new();
        slot.open();
        assert!(slot.observe_arrival("bob"));
        // Same notification delivered again
        assert!(!slot.observe_arrival("bob"));
        assert_eq!(slot.peer().as_deref(), Some("bob"));
        // The latch was already released and can not fire a second time
        assert!(!slot.arrived().release());
    }

    #[test]
    fn test_arrivals_before_role_are_parked() {
        let slot = PeerSlot::new();
        assert!(!slot.observe_arrival("bob"));
        assert!(!slot.observe_arrival("carol"));
        assert_eq!(slot.peer(), None);
        assert!(!slot.arrived().is_released());

        assert_eq!(slot.open().as_deref(), Some("bob"));
        assert!(slot.arrived().is_released());
    }

    #[test]
    fn test_bind_ignores_later_arrivals() {
        let slot = PeerSlot::new();
        // A third member shows up before matchmaking finishes
        slot.observe_arrival("carol");
        assert!(slot.bind("alice"));
        assert!(!slot.observe_arrival("dave"));
        assert_eq!(slot.peer().as_deref(), Some("alice"));
    }
}
