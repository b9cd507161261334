//! Signaling hub.
//!
//! One task owns every piece of live state: open connections, presence,
//! rooms and conversation channels. Connection tasks talk to it through
//! [`HubCommand`]s, so each event is applied to completion before the next
//! one starts and a room's broadcasts leave in the order its state changed.
//!
//! Delivery is best-effort and at most once: events for a connection that is
//! gone are dropped without telling the sender.

use std::collections::HashMap;

use atelier_core::messaging::{fan_out_targets, ConversationChannels};
use atelier_core::presence::{PresenceChange, PresenceDrop, PresenceRegistry};
use atelier_core::protocol::{ClientEvent, JoinRoom, ServerEvent};
use atelier_core::room::{LeaveOutcome, RoomRegistry, Seat};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::state::ClientSender;

/// Work items for the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Connect { conn_id: String, sender: ClientSender },
    Event { conn_id: String, event: ClientEvent },
    Disconnect { conn_id: String },
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Counters exposed on `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub online_users: usize,
    pub rooms: usize,
    pub chat_channels: usize,
}

/// Cloneable sender side of the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub fn connect(&self, conn_id: &str, sender: ClientSender) {
        self.submit(HubCommand::Connect {
            conn_id: conn_id.to_string(),
            sender,
        });
    }

    pub fn event(&self, conn_id: &str, event: ClientEvent) {
        self.submit(HubCommand::Event {
            conn_id: conn_id.to_string(),
            event,
        });
    }

    pub fn disconnect(&self, conn_id: &str) {
        self.submit(HubCommand::Disconnect {
            conn_id: conn_id.to_string(),
        });
    }

    /// `None` if the hub task has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Stats { reply });
        rx.await.ok()
    }

    fn submit(&self, command: HubCommand) {
        if self.tx.send(command).is_err() {
            tracing::error!("Signaling hub is not running");
        }
    }
}

/// Owner of all live signaling state.
pub struct SignalingHub {
    echo_conference_messages: bool,
    connections: HashMap<String, ClientSender>,
    presence: PresenceRegistry,
    rooms: RoomRegistry,
    chats: ConversationChannels,
}

impl SignalingHub {
    pub fn new(echo_conference_messages: bool) -> Self {
        Self {
            echo_conference_messages,
            connections: HashMap::new(),
            presence: PresenceRegistry::new(),
            rooms: RoomRegistry::new(),
            chats: ConversationChannels::new(),
        }
    }

    /// Move the hub onto its own task.
    pub fn spawn(self) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        HubHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        tracing::info!("Signaling hub stopped");
    }

    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { conn_id, sender } => self.connect(&conn_id, sender),
            HubCommand::Event { conn_id, event } => self.dispatch(&conn_id, event),
            HubCommand::Disconnect { conn_id } => self.disconnect(&conn_id),
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            online_users: self.presence.online_count(),
            rooms: self.rooms.room_count(),
            chat_channels: self.chats.channel_count(),
        }
    }

    // ── Connection Lifecycle ──────────────────────────────────────────────

    pub fn connect(&mut self, conn_id: &str, sender: ClientSender) {
        tracing::debug!(conn_id = conn_id, "Connection registered with hub");
        self.connections.insert(conn_id.to_string(), sender);
    }

    /// Tear down everything the connection held. After this returns no room,
    /// presence entry or chat channel refers to `conn_id`.
    pub fn disconnect(&mut self, conn_id: &str) {
        self.connections.remove(conn_id);

        if let PresenceDrop::WentOffline { user_id } = self.presence.connection_closed(conn_id) {
            self.broadcast_all(ServerEvent::UserOffline(user_id));
        }

        for (session_id, outcome) in self.rooms.leave_all(conn_id) {
            self.announce_leave(&session_id, conn_id, outcome);
        }

        self.chats.leave_all(conn_id);
        tracing::debug!(conn_id = conn_id, "Connection cleaned up");
    }

    pub fn dispatch(&mut self, conn_id: &str, event: ClientEvent) {
        if !self.connections.contains_key(conn_id) {
            tracing::debug!(conn_id = conn_id, "Event from unknown connection dropped");
            return;
        }

        match event {
            ClientEvent::Setup { user_id } => self.handle_setup(conn_id, user_id),
            ClientEvent::JoinRoom(join) => self.handle_join_room(conn_id, join),
            ClientEvent::LeaveRoom { session_id } => self.handle_leave_room(conn_id, &session_id),
            ClientEvent::ToggleHand { is_hand_raised } => {
                self.handle_toggle_hand(conn_id, is_hand_raised)
            }
            ClientEvent::ToggleMic { is_mic_on } => self.handle_toggle_mic(conn_id, is_mic_on),
            ClientEvent::Offer { target_id, sdp } => self.relay(
                conn_id,
                &target_id,
                ServerEvent::Offer {
                    sdp,
                    host_id: conn_id.to_string(),
                },
            ),
            ClientEvent::Answer { target_id, sdp } => self.relay(
                conn_id,
                &target_id,
                ServerEvent::Answer {
                    sdp,
                    spectator_id: conn_id.to_string(),
                },
            ),
            ClientEvent::IceCandidate {
                target_id,
                candidate,
            } => self.relay(
                conn_id,
                &target_id,
                ServerEvent::IceCandidate {
                    candidate,
                    from: conn_id.to_string(),
                },
            ),
            ClientEvent::ConferenceMessage(message) => {
                self.handle_conference_message(conn_id, message)
            }
            ClientEvent::JoinChat { conversation_id } => {
                self.chats.join(&conversation_id, conn_id);
                tracing::debug!(
                    conn_id = conn_id,
                    conversation_id = conversation_id.as_str(),
                    "Joined chat"
                );
            }
            ClientEvent::Typing { conversation_id } => {
                for other in self.chats.others(&conversation_id, conn_id) {
                    self.send(
                        &other,
                        ServerEvent::Typing {
                            conversation_id: conversation_id.clone(),
                        },
                    );
                }
            }
            ClientEvent::StopTyping { conversation_id } => {
                for other in self.chats.others(&conversation_id, conn_id) {
                    self.send(
                        &other,
                        ServerEvent::StopTyping {
                            conversation_id: conversation_id.clone(),
                        },
                    );
                }
            }
            ClientEvent::NewMessage(message) => self.handle_new_message(conn_id, message),
            ClientEvent::Ping => {
                self.send(conn_id, ServerEvent::Pong);
            }
        }
    }

    // ── Presence ──────────────────────────────────────────────────────────

    fn handle_setup(&mut self, conn_id: &str, user_id: Option<String>) {
        let Some(user_id) = user_id else {
            tracing::warn!(conn_id = conn_id, "Setup without user id ignored");
            return;
        };

        let (change, rebound) = self.presence.connection_opened(&user_id, conn_id);

        if let Some(PresenceDrop::WentOffline { user_id: previous }) = rebound {
            self.broadcast_all(ServerEvent::UserOffline(previous));
        }
        if change == PresenceChange::CameOnline {
            self.broadcast_all(ServerEvent::UserOnline(user_id.clone()));
        }

        self.send(
            conn_id,
            ServerEvent::OnlineUsersList(self.presence.online_users()),
        );
        self.send(conn_id, ServerEvent::Connected { user_id });
    }

    // ── Rooms ─────────────────────────────────────────────────────────────

    fn handle_join_room(&mut self, conn_id: &str, join: JoinRoom) {
        if join.session_id.is_empty() {
            tracing::warn!(conn_id = conn_id, "join-room without session id ignored");
            return;
        }

        let outcome = self
            .rooms
            .join(&join.session_id, conn_id, join.role, &join.name);

        self.broadcast_roster(&join.session_id);

        if outcome.rejoined {
            return;
        }

        match outcome.seat {
            Seat::Host => self.broadcast_room(
                &join.session_id,
                ServerEvent::HostReady {
                    host_id: conn_id.to_string(),
                },
            ),
            Seat::Spectator {
                notify_host: Some(host_id),
            } => {
                self.send(
                    &host_id,
                    ServerEvent::SpectatorJoined {
                        spectator_id: conn_id.to_string(),
                        name: join.name,
                    },
                );
            }
            Seat::Spectator { notify_host: None } => {}
        }
    }

    fn handle_leave_room(&mut self, conn_id: &str, session_id: &str) {
        match self.rooms.leave(session_id, conn_id) {
            Some(outcome) => self.announce_leave(session_id, conn_id, outcome),
            None => tracing::debug!(
                conn_id = conn_id,
                session_id = session_id,
                "leave-room for a room the connection is not in"
            ),
        }
    }

    fn announce_leave(&self, session_id: &str, conn_id: &str, outcome: LeaveOutcome) {
        if !outcome.deleted {
            self.broadcast_roster(session_id);
        }
        if outcome.was_host && !outcome.deleted {
            self.broadcast_room(session_id, ServerEvent::HostLeft);
        }
        if let Some(host_id) = outcome.notify_host {
            self.send(
                &host_id,
                ServerEvent::SpectatorLeft {
                    spectator_id: conn_id.to_string(),
                },
            );
        }
    }

    fn handle_toggle_hand(&mut self, conn_id: &str, explicit: Option<bool>) {
        for (session_id, is_hand_raised) in self.rooms.set_hand(conn_id, explicit) {
            self.broadcast_roster(&session_id);
            self.broadcast_room(
                &session_id,
                ServerEvent::HandUpdated {
                    participant_id: conn_id.to_string(),
                    is_hand_raised,
                },
            );
        }
    }

    fn handle_toggle_mic(&mut self, conn_id: &str, is_mic_on: bool) {
        for session_id in self.rooms.set_mic(conn_id, is_mic_on) {
            self.broadcast_roster(&session_id);
            self.broadcast_room(
                &session_id,
                ServerEvent::MicUpdated {
                    participant_id: conn_id.to_string(),
                    is_mic_on,
                },
            );
        }
    }

    fn relay(&self, from: &str, target_id: &str, event: ServerEvent) {
        if !self.send(target_id, event) {
            tracing::debug!(from = from, target = target_id, "Relay target not connected, dropped");
        }
    }

    fn handle_conference_message(&self, conn_id: &str, message: Value) {
        for session_id in self.rooms.sessions_of(conn_id) {
            let Some(room) = self.rooms.get(&session_id) else {
                continue;
            };
            for member in room.members() {
                if member == conn_id && !self.echo_conference_messages {
                    continue;
                }
                self.send(&member, ServerEvent::ReceiveMessage(message.clone()));
            }
        }
    }

    // ── Direct Messages ───────────────────────────────────────────────────

    fn handle_new_message(&self, conn_id: &str, message: Value) {
        let fan_out = match fan_out_targets(&message) {
            Ok(fan_out) => fan_out,
            Err(e) => {
                tracing::warn!(conn_id = conn_id, error = %e, "new message dropped");
                return;
            }
        };

        for recipient in &fan_out.recipients {
            for target in self.presence.connections_of(recipient) {
                self.send(&target, ServerEvent::MessageReceived(message.clone()));
            }
        }
    }

    // ── Delivery ──────────────────────────────────────────────────────────

    /// Returns `false` if the connection is unknown or already closed.
    fn send(&self, conn_id: &str, event: ServerEvent) -> bool {
        match self.connections.get(conn_id) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    fn broadcast_room(&self, session_id: &str, event: ServerEvent) {
        if let Some(room) = self.rooms.get(session_id) {
            for member in room.members() {
                self.send(&member, event.clone());
            }
        }
    }

    fn broadcast_roster(&self, session_id: &str) {
        if let Some(room) = self.rooms.get(session_id) {
            self.broadcast_room(session_id, ServerEvent::UpdateParticipants(room.roster()));
        }
    }

    fn broadcast_all(&self, event: ServerEvent) {
        for sender in self.connections.values() {
            let _ = sender.send(event.clone());
        }
    }
}
