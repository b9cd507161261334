//! Classroom and lesson records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Seats per classroom when none is given.
pub const DEFAULT_CAPACITY: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassroomStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Scheduled,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonMode {
    Online,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

text_enum!(ClassroomStatus { Active => "active", Inactive => "inactive" });
text_enum!(LessonKind { Scheduled => "scheduled", Video => "video" });
text_enum!(LessonMode { Online => "online", Other => "other" });
text_enum!(LessonStatus { Scheduled => "scheduled", Completed => "completed", Cancelled => "cancelled" });

/// Input for creating a classroom.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClassroom {
    pub name: String,
    pub course_id: String,
    #[serde(default)]
    pub professor_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub status: ClassroomStatus,
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

impl NewClassroom {
    pub fn new(name: impl Into<String>, course_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            course_id: course_id.into(),
            professor_id: None,
            description: None,
            capacity,
            status: ClassroomStatus::Active,
        }
    }
}

/// Listing row: a classroom without its roster and lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomSummary {
    pub id: String,
    pub name: String,
    pub course_id: String,
    pub professor_id: Option<String>,
    pub capacity: u32,
    pub student_count: u32,
    pub status: ClassroomStatus,
    pub created_at: DateTime<Utc>,
}

impl ClassroomSummary {
    pub fn has_space(&self) -> bool {
        self.student_count < self.capacity
    }
}

/// A classroom with its roster (enrollment order) and lessons.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    #[serde(flatten)]
    pub summary: ClassroomSummary,
    pub description: Option<String>,
    pub students: Vec<String>,
    pub lessons: Vec<Lesson>,
}

/// Input for adding a lesson.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LessonKind,
    #[serde(default)]
    pub mode: Option<LessonMode>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Wall-clock start, `HH:MM`.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

impl NewLesson {
    /// An online lesson scheduled at `date` `time`.
    pub fn online(title: impl Into<String>, date: NaiveDate, time: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: LessonKind::Scheduled,
            mode: Some(LessonMode::Online),
            date: Some(date),
            time: Some(time.into()),
            meeting_link: None,
            video_url: None,
        }
    }

    pub fn video(title: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: LessonKind::Video,
            mode: None,
            date: None,
            time: None,
            meeting_link: None,
            video_url: Some(video_url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LessonKind,
    pub mode: Option<LessonMode>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub meeting_link: Option<String>,
    pub video_url: Option<String>,
    pub status: LessonStatus,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the atomic seat claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatClaim {
    Claimed,
    /// Classroom at capacity (or no longer active).
    Full,
    /// The user already holds an active seat in the same course.
    AlreadyEnrolled,
}

/// Successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub classroom_id: String,
    pub course_id: String,
    pub user_id: String,
}

/// A course with at least one active classroom that still has a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableCourse {
    pub course_id: String,
    /// Oldest classroom with space, the one enrollment would pick.
    pub classroom_id: String,
    pub student_count: u32,
    pub capacity: u32,
}

/// A lesson as seen by one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
    pub percent: f64,
}

impl Progress {
    pub fn of(completed: u32, total: u32) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (f64::from(completed) * 100.0 / f64::from(total)).round()
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

/// Classroom detail for a viewer, with lazily derived completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomView {
    #[serde(flatten)]
    pub summary: ClassroomSummary,
    pub description: Option<String>,
    pub lessons: Vec<LessonView>,
    pub progress: Progress,
    /// Lessons auto-completed by this read.
    pub newly_completed: Vec<String>,
}

/// Result of toggling a lesson's studied flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudiedToggle {
    /// New state: `true` if the lesson is now marked studied.
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enums() {
        assert_eq!(LessonMode::parse("online"), Some(LessonMode::Online));
        assert_eq!(LessonMode::parse("hybrid"), None);
        assert_eq!(LessonStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(ClassroomStatus::parse("inactive"), Some(ClassroomStatus::Inactive));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(Progress::of(0, 0).percent, 0.0);
        assert_eq!(Progress::of(1, 3).percent, 33.0);
        assert_eq!(Progress::of(4, 4).percent, 100.0);
    }

    #[test]
    fn test_new_classroom_defaults() {
        let input: NewClassroom =
            serde_json::from_str(r#"{"name":"Turma A","courseId":"course-1"}"#).unwrap();
        assert_eq!(input.capacity, DEFAULT_CAPACITY);
        assert_eq!(input.status, ClassroomStatus::Active);
    }

    #[test]
    fn test_new_lesson_wire_shape() {
        let input: NewLesson = serde_json::from_str(
            r#"{"title":"Aula 1","type":"scheduled","mode":"online","date":"2024-03-01","time":"19:30"}"#,
        )
        .unwrap();
        assert_eq!(input.kind, LessonKind::Scheduled);
        assert_eq!(input.mode, Some(LessonMode::Online));
        assert_eq!(input.time.as_deref(), Some("19:30"));
    }
}
