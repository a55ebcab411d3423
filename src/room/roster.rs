//! Room participant registry
//!
//! Single source of truth for who is in the room right now. Every
//! roster-bearing signaling message carries a full snapshot; the registry
//! reduces each snapshot to an added/removed diff so the peer layer can
//! react to topology changes instead of re-deriving them.

use crate::signaling::protocol::UserInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A remote (or local) member of the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable participant ID
    pub id: String,
    /// Display name announced at join time
    pub name: String,
}

impl From<&UserInfo> for Participant {
    fn from(user: &UserInfo) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
        }
    }
}

impl From<UserInfo> for Participant {
    fn from(user: UserInfo) -> Self {
        Self {
            id: user.id,
            name: user.name,
        }
    }
}

/// Topology change produced by applying a roster snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    /// Participants present in the snapshot but not before
    pub added: Vec<Participant>,
    /// Participants present before but absent from the snapshot
    pub removed: Vec<Participant>,
}

impl RosterDiff {
    /// True when the snapshot changed nothing
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute the diff between two rosters, keyed by participant id.
///
/// Pure and order-insensitive: the same membership in any order yields an
/// empty diff.
pub fn diff(previous: &[Participant], incoming: &[Participant]) -> RosterDiff {
    let added = incoming
        .iter()
        .filter(|i| !previous.iter().any(|p| p.id == i.id))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|p| !incoming.iter().any(|i| i.id == p.id))
        .cloned()
        .collect();

    RosterDiff { added, removed }
}

/// Join-ordered roster of remote participants.
///
/// Never contains the local participant and never contains duplicate ids.
#[derive(Debug)]
pub struct Roster {
    local_id: String,
    participants: Vec<Participant>,
}

impl Roster {
    /// Create an empty roster for the given local participant
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            participants: Vec::new(),
        }
    }

    /// Remote participants in join order
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Number of remote participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True when no remote participant is present
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Whether `id` is currently in the room
    pub fn contains(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    /// Look up a participant by id
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Apply a full roster snapshot and return what changed.
    ///
    /// The local participant and duplicate ids are filtered out of the
    /// snapshot. Retained members keep their join order (display names
    /// refresh from the snapshot); new members append in snapshot order.
    pub fn apply_snapshot(&mut self, incoming: &[UserInfo]) -> RosterDiff {
        let mut seen = HashSet::new();
        let incoming: Vec<Participant> = incoming
            .iter()
            .filter(|u| u.id != self.local_id)
            .filter(|u| seen.insert(u.id.clone()))
            .map(Participant::from)
            .collect();

        let changes = diff(&self.participants, &incoming);

        self.participants
            .retain(|p| incoming.iter().any(|i| i.id == p.id));
        for member in &mut self.participants {
            if let Some(update) = incoming.iter().find(|i| i.id == member.id) {
                member.name = update.name.clone();
            }
        }
        self.participants.extend(changes.added.iter().cloned());

        changes
    }

    /// Drop everyone; returns the members that were present
    pub fn clear(&mut self) -> Vec<Participant> {
        std::mem::take(&mut self.participants)
    }
}
