//! Real-time channel protocol.
//!
//! Every frame on the wire is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Event names mirror the browser client (`join-room`, `user online`,
//! `message recieved`, ...). Inbound payloads are loose: some events carry a
//! bare string or boolean, others an object, so [`ClientEvent::parse`] decodes
//! the envelope first and then the payload per event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ── Roles ─────────────────────────────────────────────────────────────────────

/// Platform role a participant declares when joining a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Professor,
    EventHost,
    Student,
    Collector,
    Admin,
    #[default]
    #[serde(other)]
    Guest,
}

impl Role {
    /// Whether this role may take the host slot of a room.
    pub fn can_host(self) -> bool {
        matches!(self, Role::Professor | Role::EventHost)
    }
}

/// Roster entry for one connection in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    /// Connection id of the participant
    pub id: String,
    pub name: String,
    pub role: Role,
    pub is_hand_raised: bool,
    pub is_mic_on: bool,
}

impl ParticipantState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            is_hand_raised: false,
            is_mic_on: false,
        }
    }
}

// ── Client → Server ───────────────────────────────────────────────────────────

/// Payload of `join-room`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[serde(alias = "lessonId")]
    pub session_id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload {
    target_id: String,
    #[serde(default)]
    sdp: Option<Value>,
    #[serde(default)]
    candidate: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Events sent from a client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Bind this connection to a user identity. `None` when the payload
    /// carried no usable id.
    Setup { user_id: Option<String> },

    JoinRoom(JoinRoom),

    /// Leave one live session without disconnecting.
    LeaveRoom { session_id: String },

    /// Raise or lower the hand; `None` flips the current state.
    ToggleHand { is_hand_raised: Option<bool> },

    ToggleMic { is_mic_on: bool },

    Offer { target_id: String, sdp: Value },
    Answer { target_id: String, sdp: Value },
    IceCandidate { target_id: String, candidate: Value },

    /// Opaque chat payload for the live session(s) of this connection.
    ConferenceMessage(Value),

    JoinChat { conversation_id: String },
    Typing { conversation_id: String },
    StopTyping { conversation_id: String },

    /// A persisted message, expected to carry a populated conversation.
    NewMessage(Value),

    Ping,
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let Envelope { event, data } = serde_json::from_str(text)?;

        let parsed = match event.as_str() {
            "setup" => ClientEvent::Setup {
                user_id: id_field(&data, &["userId", "_id", "id"]),
            },
            "join-room" => ClientEvent::JoinRoom(serde_json::from_value(data)?),
            "leave-room" => ClientEvent::LeaveRoom {
                session_id: required_id(&data, &["sessionId", "lessonId"], "sessionId")?,
            },
            "toggle-hand" => ClientEvent::ToggleHand {
                is_hand_raised: data.get("isHandRaised").and_then(Value::as_bool),
            },
            "toggle-mic-status" => {
                let is_mic_on = data
                    .as_bool()
                    .or_else(|| data.get("isMicOn").and_then(Value::as_bool))
                    .ok_or_else(|| Error::Validation("toggle-mic-status needs a boolean".into()))?;
                ClientEvent::ToggleMic { is_mic_on }
            }
            "offer" | "answer" => {
                let payload: RelayPayload = serde_json::from_value(data)?;
                let sdp = payload
                    .sdp
                    .ok_or_else(|| Error::Validation(format!("{} without sdp", event)))?;
                if event == "offer" {
                    ClientEvent::Offer { target_id: payload.target_id, sdp }
                } else {
                    ClientEvent::Answer { target_id: payload.target_id, sdp }
                }
            }
            "ice-candidate" => {
                let payload: RelayPayload = serde_json::from_value(data)?;
                let candidate = payload
                    .candidate
                    .ok_or_else(|| Error::Validation("ice-candidate without candidate".into()))?;
                ClientEvent::IceCandidate { target_id: payload.target_id, candidate }
            }
            "conference-message" => ClientEvent::ConferenceMessage(data),
            "join chat" => ClientEvent::JoinChat {
                conversation_id: required_id(&data, &["conversationId", "_id"], "conversationId")?,
            },
            "typing" => ClientEvent::Typing {
                conversation_id: required_id(&data, &["conversationId", "_id"], "conversationId")?,
            },
            "stop typing" => ClientEvent::StopTyping {
                conversation_id: required_id(&data, &["conversationId", "_id"], "conversationId")?,
            },
            "new message" => ClientEvent::NewMessage(data),
            "ping" => ClientEvent::Ping,
            other => return Err(Error::Validation(format!("Unknown event: {}", other))),
        };

        Ok(parsed)
    }
}

/// Accept either a bare string id or an object carrying one of `keys`.
pub(crate) fn id_field(data: &Value, keys: &[&str]) -> Option<String> {
    let id = match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
        _ => None,
    };
    id.filter(|s| !s.is_empty())
}

fn required_id(data: &Value, keys: &[&str], name: &str) -> Result<String> {
    id_field(data, keys).ok_or_else(|| Error::Validation(format!("missing {}", name)))
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Events sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Setup acknowledged.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { user_id: String },

    /// Full roster of a room, in join order.
    #[serde(rename = "update-participants")]
    UpdateParticipants(Vec<ParticipantState>),

    #[serde(rename = "host-ready", rename_all = "camelCase")]
    HostReady { host_id: String },

    /// Sent to the host only.
    #[serde(rename = "spectator-joined", rename_all = "camelCase")]
    SpectatorJoined { spectator_id: String, name: String },

    /// Sent to the host only.
    #[serde(rename = "spectator-left", rename_all = "camelCase")]
    SpectatorLeft { spectator_id: String },

    #[serde(rename = "host-left")]
    HostLeft,

    #[serde(rename = "hand-updated", rename_all = "camelCase")]
    HandUpdated { participant_id: String, is_hand_raised: bool },

    #[serde(rename = "mic-updated", rename_all = "camelCase")]
    MicUpdated { participant_id: String, is_mic_on: bool },

    /// Relayed offer; `host_id` is the sender's connection id.
    #[serde(rename = "offer", rename_all = "camelCase")]
    Offer { sdp: Value, host_id: String },

    /// Relayed answer; `spectator_id` is the sender's connection id.
    #[serde(rename = "answer", rename_all = "camelCase")]
    Answer { sdp: Value, spectator_id: String },

    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: Value, from: String },

    #[serde(rename = "receive-message")]
    ReceiveMessage(Value),

    #[serde(rename = "user online")]
    UserOnline(String),

    #[serde(rename = "user offline")]
    UserOffline(String),

    #[serde(rename = "online users list")]
    OnlineUsersList(Vec<String>),

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { conversation_id: String },

    #[serde(rename = "stop typing", rename_all = "camelCase")]
    StopTyping { conversation_id: String },

    /// Direct message delivery. The event name keeps the client's spelling.
    #[serde(rename = "message recieved")]
    MessageReceived(Value),

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error { message: String },
}
