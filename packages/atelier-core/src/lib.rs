//! # Atelier Core
//!
//! Domain logic behind the Atelier e-learning and art-marketplace backend:
//! live classroom rooms, presence, chat fan-out, and the classroom
//! enrollment and lesson engine.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ATELIER CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  In-memory (owned by one dispatcher)      Persistent (SQLite)           │
//! │  ───────────────────────────────────      ────────────────────          │
//! │  ┌─────────────┐  ┌─────────────┐         ┌──────────────────────┐      │
//! │  │  Presence   │  │    Room     │         │      Classroom       │      │
//! │  │             │  │             │         │                      │      │
//! │  │ - online    │  │ - host slot │         │ - enroll (seat CAS)  │      │
//! │  │ - offline   │  │ - roster    │         │ - auto-completion    │      │
//! │  └─────────────┘  └─────────────┘         │ - studied toggle     │      │
//! │  ┌─────────────┐  ┌─────────────┐         └──────────┬───────────┘      │
//! │  │  Messaging  │  │  Protocol   │                    │                  │
//! │  │ - fan-out   │  │ - events    │         ┌──────────▼───────────┐      │
//! │  │ - channels  │  │ - roles     │         │       Storage        │      │
//! │  └─────────────┘  └─────────────┘         └──────────────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types and the shared error taxonomy
//! - [`protocol`] - Real-time channel events and roles
//! - [`presence`] - User to connection registry
//! - [`room`] - Live session state machine and registry
//! - [`messaging`] - Direct message fan-out and conversation channels
//! - [`classroom`] - Enrollment, lesson completion, progress
//! - [`storage`] - Persistence traits and the SQLite implementation

pub mod classroom;
pub mod error;
pub mod messaging;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod storage;

pub use error::{Error, ErrorCategory, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
