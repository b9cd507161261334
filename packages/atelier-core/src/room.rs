//! Live session rooms.
//!
//! A [`Room`] holds one host slot, a spectator set and the participant roster
//! for a lesson or event. Rooms are created on first join and deleted as soon
//! as they have no host, no spectators and no participants. Nothing here is
//! persisted: a restart drops every live session.
//!
//! ```text
//!            join(host-capable)             leave(host)
//!   Empty ─────────────────────► Hosted ──────────────────► Unhosted
//!     │                            ▲                           │
//!     │ join(other)                │ join(host-capable)        │ last leave
//!     └──────────► Unhosted ───────┘                           ▼
//!                                                        Empty (deleted)
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::protocol::{ParticipantState, Role};

/// Lifecycle phase of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// No members at all; the registry deletes rooms in this phase.
    Empty,
    /// A host holds the room.
    Hosted,
    /// Members present but nobody holds the host slot.
    Unhosted,
}

/// Where a joining connection ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seat {
    Host,
    /// `notify_host` is the current host, who must learn about the newcomer.
    Spectator { notify_host: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub seat: Seat,
    /// The connection was already in the room; only its name was refreshed.
    pub rejoined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub was_host: bool,
    /// Host to send `spectator-left` to, when a spectator left a hosted room.
    pub notify_host: Option<String>,
    /// The room reached [`RoomPhase::Empty`] and was removed.
    pub deleted: bool,
}

/// State of one live session.
#[derive(Debug, Clone)]
pub struct Room {
    session_id: String,
    host_id: Option<String>,
    spectators: BTreeSet<String>,
    participants: Vec<ParticipantState>,
}

impl Room {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            host_id: None,
            spectators: BTreeSet::new(),
            participants: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn spectators(&self) -> impl Iterator<Item = &str> {
        self.spectators.iter().map(String::as_str)
    }

    pub fn phase(&self) -> RoomPhase {
        if self.host_id.is_some() {
            RoomPhase::Hosted
        } else if self.spectators.is_empty() && self.participants.is_empty() {
            RoomPhase::Empty
        } else {
            RoomPhase::Unhosted
        }
    }

    /// Roster in join order.
    pub fn roster(&self) -> Vec<ParticipantState> {
        self.participants.clone()
    }

    /// Connection ids that receive room broadcasts.
    pub fn members(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    pub fn contains(&self, conn_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == conn_id)
    }

    pub fn participant(&self, conn_id: &str) -> Option<&ParticipantState> {
        self.participants.iter().find(|p| p.id == conn_id)
    }

    fn participant_mut(&mut self, conn_id: &str) -> Option<&mut ParticipantState> {
        self.participants.iter_mut().find(|p| p.id == conn_id)
    }

    /// Add a connection. First host-capable joiner takes the host slot;
    /// everybody else, including later host-capable joiners, spectates.
    pub fn join(&mut self, conn_id: &str, role: Role, name: &str) -> JoinOutcome {
        if let Some(existing) = self.participant_mut(conn_id) {
            existing.name = name.to_string();
            let seat = if self.host_id.as_deref() == Some(conn_id) {
                Seat::Host
            } else {
                Seat::Spectator { notify_host: None }
            };
            return JoinOutcome { seat, rejoined: true };
        }

        self.participants
            .push(ParticipantState::new(conn_id, name, role));

        let seat = if role.can_host() && self.host_id.is_none() {
            self.host_id = Some(conn_id.to_string());
            Seat::Host
        } else {
            self.spectators.insert(conn_id.to_string());
            Seat::Spectator {
                notify_host: self.host_id.clone(),
            }
        };

        JoinOutcome { seat, rejoined: false }
    }

    /// Remove a connection from every role it holds. `None` if it was not a
    /// member. `deleted` is left false; the registry decides that.
    pub fn leave(&mut self, conn_id: &str) -> Option<LeaveOutcome> {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != conn_id);
        let was_participant = self.participants.len() != before;

        let was_host = self.host_id.as_deref() == Some(conn_id);
        if was_host {
            self.host_id = None;
        }

        let was_spectator = self.spectators.remove(conn_id);
        if !(was_participant || was_host || was_spectator) {
            return None;
        }

        let notify_host = if was_spectator { self.host_id.clone() } else { None };

        Some(LeaveOutcome {
            was_host,
            notify_host,
            deleted: false,
        })
    }

    /// Set the hand flag, or flip it when `explicit` is `None`.
    pub fn set_hand(&mut self, conn_id: &str, explicit: Option<bool>) -> Option<bool> {
        let participant = self.participant_mut(conn_id)?;
        participant.is_hand_raised = explicit.unwrap_or(!participant.is_hand_raised);
        Some(participant.is_hand_raised)
    }

    pub fn set_mic(&mut self, conn_id: &str, is_on: bool) -> Option<bool> {
        let participant = self.participant_mut(conn_id)?;
        participant.is_mic_on = is_on;
        Some(is_on)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// All live rooms plus a connection → sessions index for disconnect cleanup.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    memberships: HashMap<String, BTreeSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&Room> {
        self.rooms.get(session_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Sessions the connection currently belongs to.
    pub fn sessions_of(&self, conn_id: &str) -> Vec<String> {
        self.memberships
            .get(conn_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn join(&mut self, session_id: &str, conn_id: &str, role: Role, name: &str) -> JoinOutcome {
        let room = self.rooms.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id = session_id, "Room created");
            Room::new(session_id)
        });

        let outcome = room.join(conn_id, role, name);
        if outcome.seat == Seat::Host && !outcome.rejoined {
            tracing::info!(session_id = session_id, conn_id = conn_id, "Host assigned");
        }

        self.memberships
            .entry(conn_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        outcome
    }

    /// Remove a connection from one room, deleting the room if it emptied.
    pub fn leave(&mut self, session_id: &str, conn_id: &str) -> Option<LeaveOutcome> {
        let room = self.rooms.get_mut(session_id)?;
        let mut outcome = room.leave(conn_id)?;

        if outcome.was_host {
            tracing::info!(session_id = session_id, conn_id = conn_id, "Host left");
        }

        if room.phase() == RoomPhase::Empty {
            self.rooms.remove(session_id);
            outcome.deleted = true;
            tracing::info!(session_id = session_id, "Room deleted");
        }

        if let Some(sessions) = self.memberships.get_mut(conn_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                self.memberships.remove(conn_id);
            }
        }

        Some(outcome)
    }

    /// Remove a connection from every room it joined.
    pub fn leave_all(&mut self, conn_id: &str) -> Vec<(String, LeaveOutcome)> {
        self.sessions_of(conn_id)
            .into_iter()
            .filter_map(|session_id| {
                let outcome = self.leave(&session_id, conn_id)?;
                Some((session_id, outcome))
            })
            .collect()
    }

    /// Apply a hand change in every room of the connection.
    pub fn set_hand(&mut self, conn_id: &str, explicit: Option<bool>) -> Vec<(String, bool)> {
        let mut changed = Vec::new();
        for session_id in self.sessions_of(conn_id) {
            if let Some(state) = self
                .rooms
                .get_mut(&session_id)
                .and_then(|room| room.set_hand(conn_id, explicit))
            {
                changed.push((session_id, state));
            }
        }
        changed
    }

    /// Apply a mic change in every room of the connection.
    pub fn set_mic(&mut self, conn_id: &str, is_on: bool) -> Vec<String> {
        let mut changed = Vec::new();
        for session_id in self.sessions_of(conn_id) {
            if let Some(room) = self.rooms.get_mut(&session_id) {
                if room.set_mic(conn_id, is_on).is_some() {
                    changed.push(session_id);
                }
            }
        }
        changed
    }
}
