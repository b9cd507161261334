//! # Classroom Module
//!
//! Capacity-aware enrollment and per-student lesson tracking.
//!
//! - [`engine::ClassroomEngine`] - enrollment, completion view, studied toggle
//! - [`completion`] - the auto-completion rule for online lessons
//! - [`model`] - records exchanged with storage and the API

pub mod completion;
pub mod engine;
pub mod model;

pub use engine::ClassroomEngine;
pub use model::*;
