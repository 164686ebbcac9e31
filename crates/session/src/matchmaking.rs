//! Role assignment from the room's presence list.
//!
//! Members are ordered by arrival (ties broken by id), so every participant
//! computes the same seating from the same list: the earliest plays white,
//! the next plays black, and everyone later watches.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::Result;
use crate::latch::Latch;
use crate::peer::PeerSlot;
use crate::session::Role;
use crate::transport::{PresenceMember, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub role: Role,
    /// The opponent when already known. A first mover learns it later.
    pub peer: Option<String>,
    /// The first two members in arrival order, for display.
    pub players: Vec<PresenceMember>,
}

/// Members sorted by `joined_at`, then by id.
pub fn arrival_order(members: &[PresenceMember]) -> Vec<PresenceMember> {
    let mut ordered = members.to_vec();
    ordered.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.client_id.cmp(&b.client_id))
    });
    ordered
}

/// Seat `local_id` given the current presence list. If `local_id` is missing
/// from the list it is treated as the latest arrival.
pub fn assign(local_id: &str, members: &[PresenceMember]) -> Assignment {
    let ordered = arrival_order(members);
    let index = ordered
        .iter()
        .position(|m| m.client_id == local_id)
        .unwrap_or(ordered.len());

    let first = ordered.first().map(|m| m.client_id.clone());
    let (role, peer) = match index {
        0 => (Role::FirstMover, None),
        1 => (Role::SecondMover, first),
        _ => (Role::Observer, first),
    };

    Assignment {
        role,
        peer,
        players: ordered.into_iter().take(2).collect(),
    }
}

/// Wait (bounded) for our own presence entry, read the member list and seat
/// ourselves, then settle the peer slot accordingly.
pub async fn matchmake(
    transport: &dyn Transport,
    room: &str,
    entered: &Latch,
    timeout: Duration,
    slot: &PeerSlot,
) -> Result<Assignment> {
    if tokio::time::timeout(timeout, entered.wait()).await.is_err() {
        warn!(
            room,
            timeout_ms = timeout.as_millis() as u64,
            "Own presence entry not seen in time; reading members anyway"
        );
    }

    let members = transport.members(room).await?;
    let mut assignment = assign(transport.client_id(), &members);

    match assignment.role {
        Role::FirstMover => {
            // An arrival may already have been parked by the presence monitor
            assignment.peer = slot.open();
        }
        Role::SecondMover | Role::Observer => {
            if let Some(peer) = &assignment.peer {
                slot.bind(peer);
            }
        }
    }

    info!(
        room,
        role = %assignment.role,
        peer = ?assignment.peer,
        members = members.len(),
        "Matchmaking complete"
    );
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn member(id: &str, secs: i64) -> PresenceMember {
        PresenceMember {
            client_id: id.into(),
            data: None,
            joined_at: at(secs),
        }
    }

    #[test]
    fn test_earlier_arrival_moves_first() {
        let members = [member("bob", 2), member("alice", 1)];
        assert_eq!(assign("alice", &members).role, Role::FirstMover);

        let bob = assign("bob", &members);
        assert_eq!(bob.role, Role::SecondMover);
        assert_eq!(bob.peer.as_deref(), Some("alice"));
    }

    #[test]
    fn test_assignment_ignores_list_order() {
        let forward = [member("alice", 1), member("bob", 2), member("carol", 3)];
        let reversed = [member("carol", 3), member("bob", 2), member("alice", 1)];
        for id in ["alice", "bob", "carol"] {
            assert_eq!(assign(id, &forward), assign(id, &reversed));
        }
    }

    #[test]
    fn test_timestamp_tie_broken_by_id() {
        let members = [member("zed", 5), member("amy", 5)];
        assert_eq!(assign("amy", &members).role, Role::FirstMover);
        assert_eq!(assign("zed", &members).role, Role::SecondMover);
    }

    #[test]
    fn test_third_arrival_observes() {
        let members = [member("alice", 1), member("bob", 2), member("carol", 3)];
        let carol = assign("carol", &members);
        assert_eq!(carol.role, Role::Observer);
        assert_eq!(carol.peer.as_deref(), Some("alice"));
        let names: Vec<_> = carol.players.iter().map(|m| m.client_id.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[test]
    fn test_alone_or_missing() {
        assert_eq!(assign("alice", &[member("alice", 1)]).role, Role::FirstMover);
        assert_eq!(assign("alice", &[]).role, Role::FirstMover);
        // Not yet listed: seated after everyone present
        assert_eq!(assign("bob", &[member("alice", 1)]).role, Role::SecondMover);
    }
}
