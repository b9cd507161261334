//! Direct message fan-out.
//!
//! Two concerns live here: working out who a `new message` must reach, and
//! tracking which connections watch which conversation for typing
//! indicators. Unread counters belong to the persistence layer
//! ([`crate::storage::ConversationStore`]).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::protocol::id_field;

/// A direct conversation with its per-user unread counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// Participant user ids in the order they were added.
    pub participants: Vec<String>,
    pub unread: BTreeMap<String, u32>,
    pub last_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread.get(user_id).copied().unwrap_or(0)
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// The shape clients emit as `new message` and receive as
    /// `message recieved`: the message with its conversation populated.
    pub fn delivery_payload(&self, conversation: &Conversation) -> Value {
        json!({
            "_id": self.id,
            "content": self.content,
            "author": { "_id": self.author_id },
            "conversation": {
                "_id": conversation.id,
                "participants": conversation.participants,
            },
            "createdAt": self.created_at,
        })
    }
}

/// Recipients of a message, author excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub author_id: String,
    pub recipients: Vec<String>,
}

/// Compute the delivery targets of a `new message` payload.
///
/// The payload must carry `conversation.participants` (ids or populated user
/// objects) and an `author` (id or object). Duplicate participants are
/// delivered once.
pub fn fan_out_targets(message: &Value) -> Result<FanOut> {
    let participants = message
        .get("conversation")
        .and_then(|c| c.get("participants"))
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Validation("message without conversation participants".into()))?;

    let author_id = message
        .get("author")
        .and_then(|a| id_field(a, &["_id", "id"]))
        .ok_or_else(|| Error::Validation("message without author".into()))?;

    let mut seen = BTreeSet::new();
    let recipients = participants
        .iter()
        .filter_map(|p| id_field(p, &["_id", "id"]))
        .filter(|id| *id != author_id)
        .filter(|id| seen.insert(id.clone()))
        .collect();

    Ok(FanOut {
        author_id,
        recipients,
    })
}

/// Conversation id ⇄ subscribed connection ids.
#[derive(Debug, Default)]
pub struct ConversationChannels {
    members: HashMap<String, BTreeSet<String>>,
    joined: HashMap<String, BTreeSet<String>>,
}

impl ConversationChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, conversation_id: &str, conn_id: &str) {
        self.members
            .entry(conversation_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        self.joined
            .entry(conn_id.to_string())
            .or_default()
            .insert(conversation_id.to_string());
    }

    /// Everyone watching the conversation except `conn_id`.
    pub fn others(&self, conversation_id: &str, conn_id: &str) -> Vec<String> {
        self.members
            .get(conversation_id)
            .map(|m| m.iter().filter(|c| *c != conn_id).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every subscription of a connection.
    pub fn leave_all(&mut self, conn_id: &str) {
        let Some(conversations) = self.joined.remove(conn_id) else {
            return;
        };
        for conversation_id in conversations {
            if let Some(members) = self.members.get_mut(&conversation_id) {
                members.remove(conn_id);
                if members.is_empty() {
                    self.members.remove(&conversation_id);
                }
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fan_out_excludes_author() {
        let message = json!({
            "content": "hello",
            "author": {"_id": "alice", "name": "Alice"},
            "conversation": {"_id": "conv-1", "participants": [
                {"_id": "alice"}, {"_id": "bob"}
            ]}
        });
        let fan_out = fan_out_targets(&message).unwrap();
        assert_eq!(fan_out.author_id, "alice");
        assert_eq!(fan_out.recipients, vec!["bob".to_string()]);
    }

    #[test]
    fn test_fan_out_accepts_bare_ids_and_dedups() {
        let message = json!({
            "author": "alice",
            "conversation": {"participants": ["alice", "bob", "carol", "bob"]}
        });
        let fan_out = fan_out_targets(&message).unwrap();
        assert_eq!(fan_out.recipients, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[test]
    fn test_fan_out_requires_conversation() {
        let err = fan_out_targets(&json!({"author": "alice", "content": "hi"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = fan_out_targets(&json!({
            "conversation": {"participants": ["alice", "bob"]}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_delivery_payload_feeds_fan_out() {
        let conversation = Conversation {
            id: "conv-1".into(),
            participants: vec!["alice".into(), "bob".into()],
            unread: BTreeMap::new(),
            last_message_id: None,
            updated_at: Utc::now(),
        };
        let message = ChatMessage {
            id: "m1".into(),
            conversation_id: "conv-1".into(),
            author_id: "bob".into(),
            content: "oi".into(),
            created_at: Utc::now(),
        };

        let payload = message.delivery_payload(&conversation);
        let fan_out = fan_out_targets(&payload).unwrap();
        assert_eq!(fan_out.author_id, "bob");
        assert_eq!(fan_out.recipients, vec!["alice".to_string()]);
    }

    #[test]
    fn test_typing_reaches_others_only() {
        let mut channels = ConversationChannels::new();
        channels.join("conv-1", "c1");
        channels.join("conv-1", "c2");
        channels.join("conv-2", "c3");

        assert_eq!(channels.others("conv-1", "c1"), vec!["c2".to_string()]);
        assert!(channels.others("conv-404", "c1").is_empty());
    }

    #[test]
    fn test_leave_all_cleans_empty_channels() {
        let mut channels = ConversationChannels::new();
        channels.join("conv-1", "c1");
        channels.join("conv-2", "c1");
        channels.join("conv-2", "c2");

        channels.leave_all("c1");
        assert_eq!(channels.channel_count(), 1);
        assert!(channels.others("conv-2", "c9").contains(&"c2".to_string()));
        channels.leave_all("c1");
    }
}
