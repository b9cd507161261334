//! Server state management.
//!
//! The live signaling state (presence, rooms, chat channels) is owned by the
//! [`SignalingHub`] task and reached through its [`HubHandle`]. Persistent
//! state sits behind the classroom engine and the conversation store.

use std::sync::Arc;

use atelier_core::classroom::ClassroomEngine;
use atelier_core::protocol::ServerEvent;
use atelier_core::storage::{ConversationStore, Database};
use tokio::sync::mpsc;

use crate::hub::{HubHandle, SignalingHub};

/// Default listen port.
const DEFAULT_PORT: u16 = 5000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// SQLite file; `None` keeps everything in memory.
    pub database_path: Option<String>,
    /// Whether `conference-message` is echoed back to its sender.
    pub echo_conference_messages: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
            echo_conference_messages: true,
        }
    }
}

/// A connected client's outbound channel.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// Command channel into the signaling hub.
    pub hub: HubHandle,

    /// Enrollment and lesson operations.
    pub engine: ClassroomEngine,

    /// Direct conversations and unread counters.
    pub conversations: Arc<dyn ConversationStore>,

    /// Server configuration.
    pub config: RelayConfig,
}

impl RelayState {
    /// Build the state and start the hub task. Must run inside a Tokio runtime.
    pub fn new(config: RelayConfig, db: Database) -> Self {
        let hub = SignalingHub::new(config.echo_conference_messages).spawn();
        let db = Arc::new(db);
        let engine = ClassroomEngine::new(db.clone(), db.clone());

        Self {
            hub,
            engine,
            conversations: db,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 5000);
        assert!(config.database_path.is_none());
        assert!(config.echo_conference_messages);
    }

    #[tokio::test]
    async fn test_state_creation() {
        let db = Database::open(None).await.unwrap();
        let state = RelayState::new(RelayConfig::default(), db);

        let stats = state.hub.stats().await.unwrap();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.rooms, 0);
        assert!(state.engine.available_courses().unwrap().is_empty());
    }
}
