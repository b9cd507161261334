//! # Storage Module
//!
//! Persistence contracts consumed by the classroom engine and the chat API,
//! and their SQLite implementation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   ClassroomEngine ──► ClassroomStore   ─┐                               │
//! │                   └─► UserRecordStore  ─┼──► Database (SQLite)          │
//! │   Chat API ─────────► ConversationStore ┘     parking_lot::Mutex        │
//! │                                                                         │
//! │  Atomicity: every trait method runs under one connection lock.          │
//! │  try_claim_seat is a single conditional INSERT, so concurrent           │
//! │  enrollments cannot overfill a classroom.                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub use database::Database;

use chrono::{DateTime, Utc};

use crate::classroom::model::{
    Classroom, ClassroomStatus, ClassroomSummary, Lesson, LessonStatus, NewClassroom, NewLesson,
    SeatClaim,
};
use crate::error::Result;
use crate::messaging::{ChatMessage, Conversation};

/// Classroom rosters and lessons.
pub trait ClassroomStore: Send + Sync {
    fn create_classroom(&self, input: &NewClassroom) -> Result<ClassroomSummary>;

    fn set_classroom_status(&self, classroom_id: &str, status: ClassroomStatus) -> Result<()>;

    fn add_lesson(&self, classroom_id: &str, input: &NewLesson) -> Result<Lesson>;

    fn set_lesson_status(
        &self,
        classroom_id: &str,
        lesson_id: &str,
        status: LessonStatus,
    ) -> Result<Lesson>;

    /// Full classroom, roster in enrollment order, lessons in insertion order.
    fn classroom(&self, classroom_id: &str) -> Result<Option<Classroom>>;

    /// Active classrooms of a course, oldest first.
    fn active_classrooms_for_course(&self, course_id: &str) -> Result<Vec<ClassroomSummary>>;

    /// Every active classroom, oldest first.
    fn active_classrooms(&self) -> Result<Vec<ClassroomSummary>>;

    /// Active classrooms the user sits in, newest first.
    fn classrooms_of_student(&self, user_id: &str) -> Result<Vec<ClassroomSummary>>;

    fn has_active_enrollment(&self, user_id: &str, course_id: &str) -> Result<bool>;

    /// Append the user to the roster iff the classroom is active, below
    /// capacity, and the user has no active seat in the same course. The
    /// check and the append are one atomic step.
    fn try_claim_seat(&self, classroom_id: &str, user_id: &str) -> Result<SeatClaim>;

    /// Undo a claimed seat.
    fn release_seat(&self, classroom_id: &str, user_id: &str) -> Result<()>;
}

/// Per-user learning records.
pub trait UserRecordStore: Send + Sync {
    fn add_enrolled_course(&self, user_id: &str, course_id: &str) -> Result<()>;

    fn enrolled_courses(&self, user_id: &str) -> Result<Vec<String>>;

    /// Completed lesson ids in the order they were completed.
    fn completed_lessons(&self, user_id: &str) -> Result<Vec<String>>;

    /// Returns `false` if the lesson was already in the set.
    fn add_completed_lesson(&self, user_id: &str, lesson_id: &str) -> Result<bool>;

    /// Returns `false` if the lesson was not in the set.
    fn remove_completed_lesson(&self, user_id: &str, lesson_id: &str) -> Result<bool>;

    fn append_study_log(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    fn study_log(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>>;
}

/// Direct conversations, messages and unread counters.
pub trait ConversationStore: Send + Sync {
    /// Find the two-party conversation between `user_id` and `other_id`, or
    /// create it with both counters at zero.
    fn access_conversation(&self, user_id: &str, other_id: &str) -> Result<Conversation>;

    fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Conversations of a user, most recently active first.
    fn conversations_of(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// Persist a message. In the same transaction: every other participant's
    /// unread counter goes up by one, the author's is reset to zero, and the
    /// conversation's last message is updated.
    fn record_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<(ChatMessage, Conversation)>;

    fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Reset exactly this user's unread counter.
    fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<()>;
}
