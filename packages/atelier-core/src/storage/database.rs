//! # Database
//!
//! SQLite implementation of the storage traits.
//!
//! One connection behind a `parking_lot::Mutex`. Every trait method takes the
//! lock once, so multi-statement operations (seat claim, message send) are
//! atomic with respect to each other.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::schema;
use super::{ClassroomStore, ConversationStore, UserRecordStore};
use crate::classroom::model::{
    Classroom, ClassroomStatus, ClassroomSummary, Lesson, LessonKind, LessonMode, LessonStatus,
    NewClassroom, NewLesson, SeatClaim,
};
use crate::error::{Error, Result};
use crate::messaging::{ChatMessage, Conversation};

const SUMMARY_SELECT: &str = "SELECT c.id, c.name, c.course_id, c.professor_id, c.capacity, \
     c.status, c.created_at, \
     (SELECT COUNT(*) FROM classroom_students s WHERE s.classroom_id = c.id) \
     FROM classrooms c";

const LESSON_SELECT: &str = "SELECT id, title, kind, mode, date, time, meeting_link, video_url, \
     status, created_at FROM lessons";

/// The main database handle
#[derive(Clone)]
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| Error::DatabaseError(format!("Failed to enable foreign keys: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema is version {}", v);
            }
        }

        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ClassroomSummary> {
    let status: String = row.get(5)?;
    Ok(ClassroomSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        course_id: row.get(2)?,
        professor_id: row.get(3)?,
        capacity: row.get(4)?,
        status: ClassroomStatus::parse(&status).unwrap_or(ClassroomStatus::Inactive),
        created_at: from_millis(row.get(6)?),
        student_count: row.get(7)?,
    })
}

fn lesson_from_row(row: &Row<'_>) -> rusqlite::Result<Lesson> {
    let kind: String = row.get(2)?;
    let mode: Option<String> = row.get(3)?;
    let date: Option<String> = row.get(4)?;
    let status: String = row.get(8)?;
    Ok(Lesson {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: LessonKind::parse(&kind).unwrap_or(LessonKind::Scheduled),
        mode: mode.as_deref().and_then(LessonMode::parse),
        date: date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        time: row.get(5)?,
        meeting_link: row.get(6)?,
        video_url: row.get(7)?,
        status: LessonStatus::parse(&status).unwrap_or_default(),
        created_at: from_millis(row.get(9)?),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

fn query_summaries(
    conn: &Connection,
    clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ClassroomSummary>> {
    let sql = format!("{} {}", SUMMARY_SELECT, clause);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare classroom query: {}", e)))?;

    let rows = stmt
        .query_map(args, summary_from_row)
        .map_err(|e| Error::DatabaseError(format!("Failed to query classrooms: {}", e)))?;

    let mut classrooms = Vec::new();
    for row in rows {
        classrooms.push(
            row.map_err(|e| Error::DatabaseError(format!("Failed to read classroom: {}", e)))?,
        );
    }

    Ok(classrooms)
}

fn query_strings(conn: &Connection, sql: &str, key: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params![key], |row| row.get(0))
        .map_err(|e| Error::DatabaseError(format!("Failed to run query: {}", e)))?;

    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(|e| Error::DatabaseError(format!("Failed to read row: {}", e)))?);
    }

    Ok(values)
}

fn load_summary(conn: &Connection, classroom_id: &str) -> Result<Option<ClassroomSummary>> {
    let found = query_summaries(conn, "WHERE c.id = ?1", &[&classroom_id])?;
    Ok(found.into_iter().next())
}

fn load_lesson(conn: &Connection, classroom_id: &str, lesson_id: &str) -> Result<Option<Lesson>> {
    let sql = format!("{} WHERE id = ?1 AND classroom_id = ?2", LESSON_SELECT);
    let result = conn.query_row(&sql, params![lesson_id, classroom_id], lesson_from_row);

    match result {
        Ok(lesson) => Ok(Some(lesson)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::DatabaseError(format!("Failed to get lesson: {}", e))),
    }
}

fn active_enrollment_exists(conn: &Connection, user_id: &str, course_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM classroom_students s
            JOIN classrooms c ON c.id = s.classroom_id
            WHERE s.user_id = ?1 AND c.course_id = ?2 AND c.status = 'active'
        )",
        params![user_id, course_id],
        |row| row.get(0),
    )
    .map_err(|e| Error::DatabaseError(format!("Failed to check enrollment: {}", e)))
}

fn load_conversation(conn: &Connection, conversation_id: &str) -> Result<Option<Conversation>> {
    let result = conn.query_row(
        "SELECT last_message_id, updated_at FROM conversations WHERE id = ?",
        params![conversation_id],
        |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
    );

    let (last_message_id, updated_at) = match result {
        Ok(found) => found,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => {
            return Err(Error::DatabaseError(format!(
                "Failed to get conversation: {}",
                e
            )))
        }
    };

    let mut stmt = conn
        .prepare(
            "SELECT user_id, unread_count FROM conversation_participants
             WHERE conversation_id = ? ORDER BY seq",
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params![conversation_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })
        .map_err(|e| Error::DatabaseError(format!("Failed to query participants: {}", e)))?;

    let mut conversation = Conversation {
        id: conversation_id.to_string(),
        participants: Vec::new(),
        unread: Default::default(),
        last_message_id,
        updated_at: from_millis(updated_at),
    };
    for row in rows {
        let (user_id, unread) =
            row.map_err(|e| Error::DatabaseError(format!("Failed to read participant: {}", e)))?;
        conversation.unread.insert(user_id.clone(), unread);
        conversation.participants.push(user_id);
    }

    Ok(Some(conversation))
}

// ============================================================================
// CLASSROOM OPERATIONS
// ============================================================================

impl ClassroomStore for Database {
    fn create_classroom(&self, input: &NewClassroom) -> Result<ClassroomSummary> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO classrooms (id, name, course_id, professor_id, description, capacity, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                input.name,
                input.course_id,
                input.professor_id,
                input.description,
                input.capacity,
                input.status.as_str(),
                millis(now),
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to create classroom: {}", e)))?;

        load_summary(&conn, &id)?
            .ok_or_else(|| Error::DatabaseError("Classroom vanished after insert".into()))
    }

    fn set_classroom_status(&self, classroom_id: &str, status: ClassroomStatus) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE classrooms SET status = ?1 WHERE id = ?2",
                params![status.as_str(), classroom_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to update classroom: {}", e)))?;

        if updated == 0 {
            return Err(Error::NotFound(format!("classroom {}", classroom_id)));
        }
        Ok(())
    }

    fn add_lesson(&self, classroom_id: &str, input: &NewLesson) -> Result<Lesson> {
        let conn = self.conn.lock();

        if load_summary(&conn, classroom_id)?.is_none() {
            return Err(Error::NotFound(format!("classroom {}", classroom_id)));
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO lessons (id, classroom_id, title, kind, mode, date, time, meeting_link, video_url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                classroom_id,
                input.title,
                input.kind.as_str(),
                input.mode.map(LessonMode::as_str),
                input.date.map(|d| d.format("%Y-%m-%d").to_string()),
                input.time,
                input.meeting_link,
                input.video_url,
                LessonStatus::Scheduled.as_str(),
                millis(Utc::now()),
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to add lesson: {}", e)))?;

        load_lesson(&conn, classroom_id, &id)?
            .ok_or_else(|| Error::DatabaseError("Lesson vanished after insert".into()))
    }

    fn set_lesson_status(
        &self,
        classroom_id: &str,
        lesson_id: &str,
        status: LessonStatus,
    ) -> Result<Lesson> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE lessons SET status = ?1 WHERE id = ?2 AND classroom_id = ?3",
                params![status.as_str(), lesson_id, classroom_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to update lesson: {}", e)))?;

        if updated == 0 {
            return Err(Error::NotFound(format!("lesson {}", lesson_id)));
        }

        load_lesson(&conn, classroom_id, lesson_id)?
            .ok_or_else(|| Error::NotFound(format!("lesson {}", lesson_id)))
    }

    fn classroom(&self, classroom_id: &str) -> Result<Option<Classroom>> {
        let conn = self.conn.lock();

        let Some(summary) = load_summary(&conn, classroom_id)? else {
            return Ok(None);
        };

        let description: Option<String> = conn
            .query_row(
                "SELECT description FROM classrooms WHERE id = ?",
                params![classroom_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to get classroom: {}", e)))?;

        let students = query_strings(
            &conn,
            "SELECT user_id FROM classroom_students WHERE classroom_id = ? ORDER BY seq",
            classroom_id,
        )?;

        let sql = format!("{} WHERE classroom_id = ? ORDER BY seq", LESSON_SELECT);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare lesson query: {}", e)))?;
        let rows = stmt
            .query_map(params![classroom_id], lesson_from_row)
            .map_err(|e| Error::DatabaseError(format!("Failed to query lessons: {}", e)))?;

        let mut lessons = Vec::new();
        for row in rows {
            lessons.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read lesson: {}", e)))?,
            );
        }

        Ok(Some(Classroom {
            summary,
            description,
            students,
            lessons,
        }))
    }

    fn active_classrooms_for_course(&self, course_id: &str) -> Result<Vec<ClassroomSummary>> {
        let conn = self.conn.lock();
        query_summaries(
            &conn,
            "WHERE c.course_id = ?1 AND c.status = 'active' ORDER BY c.created_at ASC, c.seq ASC",
            &[&course_id],
        )
    }

    fn active_classrooms(&self) -> Result<Vec<ClassroomSummary>> {
        let conn = self.conn.lock();
        query_summaries(
            &conn,
            "WHERE c.status = 'active' ORDER BY c.created_at ASC, c.seq ASC",
            &[],
        )
    }

    fn classrooms_of_student(&self, user_id: &str) -> Result<Vec<ClassroomSummary>> {
        let conn = self.conn.lock();
        query_summaries(
            &conn,
            "WHERE c.status = 'active' AND EXISTS (
                 SELECT 1 FROM classroom_students s
                 WHERE s.classroom_id = c.id AND s.user_id = ?1)
             ORDER BY c.created_at DESC, c.seq DESC",
            &[&user_id],
        )
    }

    fn has_active_enrollment(&self, user_id: &str, course_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        active_enrollment_exists(&conn, user_id, course_id)
    }

    fn try_claim_seat(&self, classroom_id: &str, user_id: &str) -> Result<SeatClaim> {
        let conn = self.conn.lock();

        let inserted = conn
            .execute(
                "INSERT INTO classroom_students (classroom_id, user_id, enrolled_at)
                 SELECT c.id, ?2, ?3 FROM classrooms c
                 WHERE c.id = ?1
                   AND c.status = 'active'
                   AND (SELECT COUNT(*) FROM classroom_students s
                        WHERE s.classroom_id = c.id) < c.capacity
                   AND NOT EXISTS (
                        SELECT 1 FROM classroom_students s2
                        JOIN classrooms c2 ON c2.id = s2.classroom_id
                        WHERE s2.user_id = ?2
                          AND c2.course_id = c.course_id
                          AND c2.status = 'active')",
                params![classroom_id, user_id, millis(Utc::now())],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to claim seat: {}", e)))?;

        if inserted == 1 {
            return Ok(SeatClaim::Claimed);
        }

        let Some(summary) = load_summary(&conn, classroom_id)? else {
            return Err(Error::NotFound(format!("classroom {}", classroom_id)));
        };

        if active_enrollment_exists(&conn, user_id, &summary.course_id)? {
            Ok(SeatClaim::AlreadyEnrolled)
        } else {
            Ok(SeatClaim::Full)
        }
    }

    fn release_seat(&self, classroom_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM classroom_students WHERE classroom_id = ?1 AND user_id = ?2",
            params![classroom_id, user_id],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to release seat: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// USER RECORD OPERATIONS
// ============================================================================

impl UserRecordStore for Database {
    fn add_enrolled_course(&self, user_id: &str, course_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO user_enrolled_courses (user_id, course_id, enrolled_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, course_id, millis(Utc::now())],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to record enrolled course: {}", e)))?;
        Ok(())
    }

    fn enrolled_courses(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        query_strings(
            &conn,
            "SELECT course_id FROM user_enrolled_courses WHERE user_id = ? ORDER BY enrolled_at, course_id",
            user_id,
        )
    }

    fn completed_lessons(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        query_strings(
            &conn,
            "SELECT lesson_id FROM user_completed_lessons WHERE user_id = ? ORDER BY seq",
            user_id,
        )
    }

    fn add_completed_lesson(&self, user_id: &str, lesson_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO user_completed_lessons (user_id, lesson_id, completed_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, lesson_id, millis(Utc::now())],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark lesson: {}", e)))?;
        Ok(inserted == 1)
    }

    fn remove_completed_lesson(&self, user_id: &str, lesson_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM user_completed_lessons WHERE user_id = ?1 AND lesson_id = ?2",
                params![user_id, lesson_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to unmark lesson: {}", e)))?;
        Ok(removed > 0)
    }

    fn append_study_log(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO study_log (user_id, studied_at) VALUES (?1, ?2)",
            params![user_id, millis(at)],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to append study log: {}", e)))?;
        Ok(())
    }

    fn study_log(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT studied_at FROM study_log WHERE user_id = ? ORDER BY seq")
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::DatabaseError(format!("Failed to query study log: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let ms = row
                .map_err(|e| Error::DatabaseError(format!("Failed to read study log: {}", e)))?;
            entries.push(from_millis(ms));
        }

        Ok(entries)
    }
}

// ============================================================================
// CONVERSATION OPERATIONS
// ============================================================================

impl ConversationStore for Database {
    fn access_conversation(&self, user_id: &str, other_id: &str) -> Result<Conversation> {
        if user_id.is_empty() || other_id.is_empty() {
            return Err(Error::Validation("both participants are required".into()));
        }
        if user_id == other_id {
            return Err(Error::Validation("cannot start a conversation with yourself".into()));
        }

        let mut conn = self.conn.lock();

        let existing = conn.query_row(
            "SELECT p1.conversation_id FROM conversation_participants p1
             JOIN conversation_participants p2 ON p2.conversation_id = p1.conversation_id
             WHERE p1.user_id = ?1 AND p2.user_id = ?2
               AND (SELECT COUNT(*) FROM conversation_participants p3
                    WHERE p3.conversation_id = p1.conversation_id) = 2
             LIMIT 1",
            params![user_id, other_id],
            |row| row.get::<_, String>(0),
        );

        let conversation_id = match existing {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let id = Uuid::new_v4().to_string();
                let now = millis(Utc::now());
                let tx = conn
                    .transaction()
                    .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

                tx.execute(
                    "INSERT INTO conversations (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![id, now],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to create conversation: {}", e)))?;

                for participant in [user_id, other_id] {
                    tx.execute(
                        "INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
                         VALUES (?1, ?2, 0)",
                        params![id, participant],
                    )
                    .map_err(|e| {
                        Error::DatabaseError(format!("Failed to add participant: {}", e))
                    })?;
                }

                tx.commit()
                    .map_err(|e| Error::DatabaseError(format!("Failed to commit conversation: {}", e)))?;

                tracing::debug!(conversation_id = id.as_str(), "Conversation created");
                id
            }
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "Failed to look up conversation: {}",
                    e
                )))
            }
        };

        load_conversation(&conn, &conversation_id)?
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))
    }

    fn conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        load_conversation(&conn, conversation_id)
    }

    fn conversations_of(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();
        let ids = query_strings(
            &conn,
            "SELECT c.id FROM conversations c
             JOIN conversation_participants p ON p.conversation_id = c.id
             WHERE p.user_id = ? ORDER BY c.updated_at DESC",
            user_id,
        )?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(conversation) = load_conversation(&conn, &id)? {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }

    fn record_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<(ChatMessage, Conversation)> {
        if content.trim().is_empty() {
            return Err(Error::Validation("message content is empty".into()));
        }

        let mut conn = self.conn.lock();

        let Some(conversation) = load_conversation(&conn, conversation_id)? else {
            return Err(Error::NotFound(format!("conversation {}", conversation_id)));
        };
        if !conversation.has_participant(author_id) {
            return Err(Error::Validation(format!(
                "{} is not a participant of this conversation",
                author_id
            )));
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: at,
        };

        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO messages (id, conversation_id, author_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message.id, conversation_id, author_id, content, millis(at)],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store message: {}", e)))?;

        tx.execute(
            "UPDATE conversation_participants
             SET unread_count = CASE WHEN user_id = ?2 THEN 0 ELSE unread_count + 1 END
             WHERE conversation_id = ?1",
            params![conversation_id, author_id],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to update unread counts: {}", e)))?;

        tx.execute(
            "UPDATE conversations SET last_message_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![message.id, millis(at), conversation_id],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to update conversation: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit message: {}", e)))?;

        let conversation = load_conversation(&conn, conversation_id)?
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;

        Ok((message, conversation))
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, author_id, content, created_at FROM messages
                 WHERE conversation_id = ? ORDER BY seq",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![conversation_id], message_from_row)
            .map_err(|e| Error::DatabaseError(format!("Failed to query messages: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read message: {}", e)))?,
            );
        }

        Ok(messages)
    }

    fn mark_read(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE conversation_participants SET unread_count = 0
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark as read: {}", e)))?;

        if updated == 0 {
            return Err(Error::NotFound(format!(
                "participant {} in conversation {}",
                user_id, conversation_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_classroom(db: &Database, course: &str, capacity: u32) -> ClassroomSummary {
        db.create_classroom(&NewClassroom::new("Turma", course, capacity))
            .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let db = tokio_test::block_on(Database::open(None)).unwrap();
        assert!(db.active_classrooms().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file_twice_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atelier.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(Some(path)).await.unwrap();
            seeded_classroom(&db, "course-1", 2).await;
        }

        let db = Database::open(Some(path)).await.unwrap();
        assert_eq!(db.active_classrooms().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_seat_respects_capacity() {
        let db = Database::open(None).await.unwrap();
        let room = seeded_classroom(&db, "course-1", 1).await;

        assert_eq!(db.try_claim_seat(&room.id, "x").unwrap(), SeatClaim::Claimed);
        assert_eq!(db.try_claim_seat(&room.id, "y").unwrap(), SeatClaim::Full);

        let classroom = db.classroom(&room.id).unwrap().unwrap();
        assert_eq!(classroom.students, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_claim_seat_rejects_second_seat_in_course() {
        let db = Database::open(None).await.unwrap();
        let first = seeded_classroom(&db, "course-1", 5).await;
        let second = seeded_classroom(&db, "course-1", 5).await;

        assert_eq!(db.try_claim_seat(&first.id, "x").unwrap(), SeatClaim::Claimed);
        assert_eq!(
            db.try_claim_seat(&second.id, "x").unwrap(),
            SeatClaim::AlreadyEnrolled
        );
        assert_eq!(
            db.try_claim_seat(&first.id, "x").unwrap(),
            SeatClaim::AlreadyEnrolled
        );
    }

    #[tokio::test]
    async fn test_claim_seat_inactive_or_missing() {
        let db = Database::open(None).await.unwrap();
        let room = seeded_classroom(&db, "course-1", 5).await;
        db.set_classroom_status(&room.id, ClassroomStatus::Inactive).unwrap();

        assert_eq!(db.try_claim_seat(&room.id, "x").unwrap(), SeatClaim::Full);
        assert!(matches!(
            db.try_claim_seat("nope", "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_overfill() {
        let db = Database::open(None).await.unwrap();
        let room = seeded_classroom(&db, "course-1", 3).await;

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let db = db.clone();
                let id = room.id.clone();
                std::thread::spawn(move || db.try_claim_seat(&id, &format!("user-{}", i)).unwrap())
            })
            .collect();

        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c == SeatClaim::Claimed)
            .count();

        assert_eq!(claimed, 3);
        assert_eq!(db.classroom(&room.id).unwrap().unwrap().students.len(), 3);
    }

    #[tokio::test]
    async fn test_release_seat() {
        let db = Database::open(None).await.unwrap();
        let room = seeded_classroom(&db, "course-1", 1).await;
        db.try_claim_seat(&room.id, "x").unwrap();
        db.release_seat(&room.id, "x").unwrap();

        assert!(!db.has_active_enrollment("x", "course-1").unwrap());
        assert_eq!(db.try_claim_seat(&room.id, "y").unwrap(), SeatClaim::Claimed);
    }

    #[tokio::test]
    async fn test_classroom_ordering() {
        let db = Database::open(None).await.unwrap();
        let old = seeded_classroom(&db, "course-1", 5).await;
        let new = seeded_classroom(&db, "course-1", 5).await;
        seeded_classroom(&db, "course-2", 5).await;

        let ids: Vec<_> = db
            .active_classrooms_for_course("course-1")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![old.id.clone(), new.id.clone()]);

        db.try_claim_seat(&old.id, "x").unwrap();
        db.try_claim_seat(&new.id, "y").unwrap();
        db.try_claim_seat(&new.id, "x").unwrap();
        let mine = db.classrooms_of_student("x").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, old.id);
        assert_eq!(mine[0].student_count, 1);
    }

    #[tokio::test]
    async fn test_lessons_round_trip() {
        let db = Database::open(None).await.unwrap();
        let room = seeded_classroom(&db, "course-1", 5).await;
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let online = db
            .add_lesson(&room.id, &NewLesson::online("Aula 1", date, "19:30"))
            .unwrap();
        db.add_lesson(&room.id, &NewLesson::video("Aula 2", "https://cdn/aula2.mp4"))
            .unwrap();

        let classroom = db.classroom(&room.id).unwrap().unwrap();
        assert_eq!(classroom.lessons.len(), 2);
        assert_eq!(classroom.lessons[0], online);
        assert_eq!(classroom.lessons[0].date, Some(date));
        assert_eq!(classroom.lessons[1].kind, LessonKind::Video);

        let cancelled = db
            .set_lesson_status(&room.id, &online.id, LessonStatus::Cancelled)
            .unwrap();
        assert_eq!(cancelled.status, LessonStatus::Cancelled);

        assert!(matches!(
            db.add_lesson("nope", &NewLesson::video("x", "y")),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_set_is_idempotent() {
        let db = Database::open(None).await.unwrap();

        assert!(db.add_completed_lesson("x", "l1").unwrap());
        assert!(!db.add_completed_lesson("x", "l1").unwrap());
        assert!(db.add_completed_lesson("x", "l2").unwrap());
        assert_eq!(db.completed_lessons("x").unwrap(), vec!["l1", "l2"]);

        assert!(db.remove_completed_lesson("x", "l1").unwrap());
        assert!(!db.remove_completed_lesson("x", "l1").unwrap());
        assert_eq!(db.completed_lessons("x").unwrap(), vec!["l2"]);
    }

    #[tokio::test]
    async fn test_unread_counters() {
        let db = Database::open(None).await.unwrap();
        let conversation = db.access_conversation("a", "b").unwrap();
        assert_eq!(conversation.unread_for("a"), 0);
        assert_eq!(conversation.unread_for("b"), 0);

        let (message, after) = db
            .record_message(&conversation.id, "a", "olá", Utc::now())
            .unwrap();
        assert_eq!(after.unread_for("a"), 0);
        assert_eq!(after.unread_for("b"), 1);
        assert_eq!(after.last_message_id.as_deref(), Some(message.id.as_str()));

        db.record_message(&conversation.id, "a", "tudo bem?", Utc::now())
            .unwrap();
        let (_, after) = db
            .record_message(&conversation.id, "b", "sim", Utc::now())
            .unwrap();
        assert_eq!(after.unread_for("a"), 1);
        assert_eq!(after.unread_for("b"), 0);

        db.mark_read(&conversation.id, "a").unwrap();
        let after = db.conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(after.unread_for("a"), 0);
        assert_eq!(after.unread_for("b"), 0);

        assert_eq!(db.messages(&conversation.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mark_read_after_single_message() {
        let db = Database::open(None).await.unwrap();
        let conversation = db.access_conversation("a", "b").unwrap();

        let (_, after) = db
            .record_message(&conversation.id, "a", "olá", Utc::now())
            .unwrap();
        assert_eq!(after.unread_for("a"), 0);
        assert_eq!(after.unread_for("b"), 1);

        db.mark_read(&conversation.id, "b").unwrap();
        let after = db.conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(after.unread_for("a"), 0);
        assert_eq!(after.unread_for("b"), 0);
    }

    #[tokio::test]
    async fn test_mark_read_leaves_other_counter() {
        let db = Database::open(None).await.unwrap();
        let conversation = db.access_conversation("a", "b").unwrap();

        db.record_message(&conversation.id, "a", "um", Utc::now())
            .unwrap();
        db.record_message(&conversation.id, "a", "dois", Utc::now())
            .unwrap();

        db.mark_read(&conversation.id, "a").unwrap();
        let after = db.conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(after.unread_for("a"), 0);
        assert_eq!(after.unread_for("b"), 2);
    }

    #[tokio::test]
    async fn test_access_conversation_reuses_pair() {
        let db = Database::open(None).await.unwrap();
        let first = db.access_conversation("a", "b").unwrap();
        let again = db.access_conversation("b", "a").unwrap();
        let other = db.access_conversation("a", "c").unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(db.conversations_of("a").unwrap().len(), 2);
        assert!(db.access_conversation("a", "a").is_err());
    }

    #[tokio::test]
    async fn test_record_message_validation() {
        let db = Database::open(None).await.unwrap();
        let conversation = db.access_conversation("a", "b").unwrap();

        assert!(matches!(
            db.record_message("missing", "a", "hi", Utc::now()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.record_message(&conversation.id, "z", "hi", Utc::now()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.record_message(&conversation.id, "a", "   ", Utc::now()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.mark_read(&conversation.id, "z"),
            Err(Error::NotFound(_))
        ));
    }
}
