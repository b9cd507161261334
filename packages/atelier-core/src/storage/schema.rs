//! # Database Schema
//!
//! SQL schema definitions for the Atelier database.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐   ┌────────────────────┐   ┌──────────────────┐   │
//! │  │   classrooms     │   │ classroom_students │   │     lessons      │   │
//! │  ├──────────────────┤   ├────────────────────┤   ├──────────────────┤   │
//! │  │ id               │◄──│ classroom_id       │   │ id               │   │
//! │  │ course_id        │   │ user_id            │   │ classroom_id     │──►│
//! │  │ capacity         │   │ enrolled_at        │   │ mode, date, time │   │
//! │  │ status           │   └────────────────────┘   │ status           │   │
//! │  │ created_at       │                            └──────────────────┘   │
//! │  └──────────────────┘                                                   │
//! │                                                                         │
//! │  ┌──────────────────────┐ ┌────────────────────────┐ ┌─────────────┐    │
//! │  │ user_enrolled_courses│ │ user_completed_lessons │ │  study_log  │    │
//! │  └──────────────────────┘ └────────────────────────┘ └─────────────┘    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌───────────────────────────┐ ┌─────────────┐   │
//! │  │  conversations   │◄──│ conversation_participants │ │  messages   │   │
//! │  │ last_message_id  │   │ unread_count              │ │ author_id   │   │
//! │  └──────────────────┘   └───────────────────────────┘ └─────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are Unix milliseconds. Lesson dates are `YYYY-MM-DD` text.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Classrooms (sections of a course)
CREATE TABLE IF NOT EXISTS classrooms (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    course_id TEXT NOT NULL,
    professor_id TEXT,
    description TEXT,
    capacity INTEGER NOT NULL DEFAULT 30,
    -- 'active' or 'inactive'
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_classrooms_course ON classrooms(course_id, status);

-- Roster; seq preserves enrollment order
CREATE TABLE IF NOT EXISTS classroom_students (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    classroom_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    enrolled_at INTEGER NOT NULL,
    UNIQUE (classroom_id, user_id),
    FOREIGN KEY (classroom_id) REFERENCES classrooms(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_classroom_students_user ON classroom_students(user_id);

-- Lessons of a classroom
CREATE TABLE IF NOT EXISTS lessons (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    classroom_id TEXT NOT NULL,
    title TEXT NOT NULL,
    -- 'scheduled' or 'video'
    kind TEXT NOT NULL,
    -- 'online', 'other' or NULL
    mode TEXT,
    date TEXT,
    -- 'HH:MM'
    time TEXT,
    meeting_link TEXT,
    video_url TEXT,
    -- 'scheduled', 'completed' or 'cancelled'
    status TEXT NOT NULL DEFAULT 'scheduled',
    created_at INTEGER NOT NULL,
    FOREIGN KEY (classroom_id) REFERENCES classrooms(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_lessons_classroom ON lessons(classroom_id);

-- Courses a user has enrolled in
CREATE TABLE IF NOT EXISTS user_enrolled_courses (
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    enrolled_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, course_id)
);

-- Per-user completion set
CREATE TABLE IF NOT EXISTS user_completed_lessons (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    lesson_id TEXT NOT NULL,
    completed_at INTEGER NOT NULL,
    UNIQUE (user_id, lesson_id)
);

-- Append-only study history
CREATE TABLE IF NOT EXISTS study_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    studied_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_study_log_user ON study_log(user_id);

-- Direct conversations
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    last_message_id TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation_participants (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    unread_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    conversation_id TEXT NOT NULL,
    author_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq);
"#;
