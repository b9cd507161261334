//! Classroom enrollment and lesson engine.
//!
//! ## Enrollment
//!
//! ```text
//! enroll(user, course)
//!   │
//!   ├─ active seat in course already? ──────────────► AlreadyEnrolled
//!   │
//!   ├─ for each active classroom, oldest first, with space:
//!   │     try_claim_seat (atomic) ── Full ──► next classroom
//!   │            │
//!   │         Claimed
//!   │            ▼
//!   │     add_enrolled_course (up to 2 attempts)
//!   │            ├─ ok ─────────────────────────────► Enrollment
//!   │            └─ still failing ─► release_seat ──► EnrollmentRolledBack
//!   │
//!   └─ no classroom left ───────────────────────────► NoSeats
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::completion::{is_auto_complete_due, parse_lesson_time};
use super::model::{
    AvailableCourse, ClassroomStatus, ClassroomSummary, ClassroomView, Enrollment, Lesson,
    LessonStatus, LessonView, NewClassroom, NewLesson, Progress, SeatClaim, StudiedToggle,
};
use crate::error::{Error, Result};
use crate::storage::{ClassroomStore, Database, UserRecordStore};

/// Attempts at updating the user record before the seat is released.
const RECORD_ATTEMPTS: u32 = 2;

/// Entry point for classroom operations. Cheap to clone.
#[derive(Clone)]
pub struct ClassroomEngine {
    classrooms: Arc<dyn ClassroomStore>,
    users: Arc<dyn UserRecordStore>,
}

impl ClassroomEngine {
    pub fn new(classrooms: Arc<dyn ClassroomStore>, users: Arc<dyn UserRecordStore>) -> Self {
        Self { classrooms, users }
    }

    /// Engine backed by one SQLite database for both stores.
    pub fn with_database(db: Database) -> Self {
        let db = Arc::new(db);
        Self::new(db.clone(), db)
    }

    // ── Administration ────────────────────────────────────────────────────

    pub fn create_classroom(&self, input: &NewClassroom) -> Result<ClassroomSummary> {
        if input.name.trim().is_empty() {
            return Err(Error::Validation("classroom name is required".into()));
        }
        if input.course_id.trim().is_empty() {
            return Err(Error::Validation("courseId is required".into()));
        }

        let classroom = self.classrooms.create_classroom(input)?;
        tracing::info!(
            classroom_id = classroom.id.as_str(),
            course_id = classroom.course_id.as_str(),
            capacity = classroom.capacity,
            "Classroom created"
        );
        Ok(classroom)
    }

    pub fn set_classroom_status(&self, classroom_id: &str, status: ClassroomStatus) -> Result<()> {
        self.classrooms.set_classroom_status(classroom_id, status)
    }

    pub fn add_lesson(&self, classroom_id: &str, input: &NewLesson) -> Result<Lesson> {
        if input.title.trim().is_empty() {
            return Err(Error::Validation("lesson title is required".into()));
        }
        if let Some(time) = input.time.as_deref() {
            if parse_lesson_time(time).is_err() {
                return Err(Error::Validation(format!(
                    "lesson time must be HH:MM or HH:MM:SS, got {}",
                    time
                )));
            }
        }
        self.classrooms.add_lesson(classroom_id, input)
    }

    pub fn set_lesson_status(
        &self,
        classroom_id: &str,
        lesson_id: &str,
        status: LessonStatus,
    ) -> Result<Lesson> {
        self.classrooms.set_lesson_status(classroom_id, lesson_id, status)
    }

    // ── Enrollment ────────────────────────────────────────────────────────

    /// Seat a user in the oldest active classroom of the course that has
    /// room, and record the course on the user.
    pub fn enroll(&self, user_id: &str, course_id: &str) -> Result<Enrollment> {
        if user_id.is_empty() || course_id.is_empty() {
            return Err(Error::Validation("userId and courseId are required".into()));
        }

        if self.classrooms.has_active_enrollment(user_id, course_id)? {
            return Err(Error::AlreadyEnrolled);
        }

        let candidates = self.classrooms.active_classrooms_for_course(course_id)?;
        for classroom in candidates.iter().filter(|c| c.has_space()) {
            match self.classrooms.try_claim_seat(&classroom.id, user_id)? {
                SeatClaim::Claimed => {
                    self.record_enrollment(&classroom.id, user_id, course_id)?;
                    tracing::info!(
                        user_id = user_id,
                        course_id = course_id,
                        classroom_id = classroom.id.as_str(),
                        "Student enrolled"
                    );
                    return Ok(Enrollment {
                        classroom_id: classroom.id.clone(),
                        course_id: course_id.to_string(),
                        user_id: user_id.to_string(),
                    });
                }
                SeatClaim::Full => {
                    tracing::debug!(
                        classroom_id = classroom.id.as_str(),
                        "Classroom filled up, trying next"
                    );
                }
                SeatClaim::AlreadyEnrolled => return Err(Error::AlreadyEnrolled),
            }
        }

        tracing::info!(user_id = user_id, course_id = course_id, "No seats available");
        Err(Error::NoSeats)
    }

    /// Second half of enrollment. On repeated failure the claimed seat is
    /// given back so the roster and the user record stay consistent.
    fn record_enrollment(&self, classroom_id: &str, user_id: &str, course_id: &str) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=RECORD_ATTEMPTS {
            match self.users.add_enrolled_course(user_id, course_id) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        user_id = user_id,
                        course_id = course_id,
                        attempt = attempt,
                        error = %e,
                        "Failed to record enrolled course"
                    );
                    last_error = Some(e);
                }
            }
        }

        if let Err(e) = self.classrooms.release_seat(classroom_id, user_id) {
            tracing::error!(
                user_id = user_id,
                classroom_id = classroom_id,
                error = %e,
                "Failed to release seat after enrollment failure"
            );
            return Err(Error::DatabaseError(format!(
                "enrollment incomplete and seat not released: {}",
                e
            )));
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(Error::EnrollmentRolledBack(reason))
    }

    // ── Lessons ───────────────────────────────────────────────────────────

    /// Classroom as seen by `user_id` at `now`. Online lessons whose window
    /// has passed are added to the user's completion set as part of the read.
    pub fn lesson_completion_view(
        &self,
        classroom_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClassroomView> {
        let classroom = self
            .classrooms
            .classroom(classroom_id)?
            .ok_or_else(|| Error::NotFound(format!("classroom {}", classroom_id)))?;

        let completed: HashSet<String> =
            self.users.completed_lessons(user_id)?.into_iter().collect();

        let total = classroom.lessons.len() as u32;
        let mut done = 0;
        let mut newly_completed = Vec::new();
        let mut lessons = Vec::with_capacity(classroom.lessons.len());

        for lesson in classroom.lessons {
            let mut is_completed = completed.contains(&lesson.id);

            if !is_completed && is_auto_complete_due(&lesson, now) {
                if self.users.add_completed_lesson(user_id, &lesson.id)? {
                    tracing::info!(
                        user_id = user_id,
                        lesson_id = lesson.id.as_str(),
                        "Lesson auto-completed"
                    );
                    newly_completed.push(lesson.id.clone());
                }
                is_completed = true;
            }

            if is_completed {
                done += 1;
            }
            lessons.push(LessonView {
                lesson,
                completed: is_completed,
            });
        }

        Ok(ClassroomView {
            summary: classroom.summary,
            description: classroom.description,
            lessons,
            progress: Progress::of(done, total),
            newly_completed,
        })
    }

    /// Flip the studied flag of a lesson. Marking appends to the study log;
    /// unmarking leaves the log untouched.
    pub fn mark_lesson_as_studied(
        &self,
        classroom_id: &str,
        lesson_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StudiedToggle> {
        if user_id.is_empty() {
            return Err(Error::Validation("userId is required".into()));
        }

        let classroom = self
            .classrooms
            .classroom(classroom_id)?
            .ok_or_else(|| Error::NotFound(format!("classroom {}", classroom_id)))?;

        if !classroom.lessons.iter().any(|l| l.id == lesson_id) {
            return Err(Error::NotFound(format!("lesson {}", lesson_id)));
        }

        if self.users.remove_completed_lesson(user_id, lesson_id)? {
            return Ok(StudiedToggle { completed: false });
        }

        self.users.add_completed_lesson(user_id, lesson_id)?;
        self.users.append_study_log(user_id, now)?;
        Ok(StudiedToggle { completed: true })
    }

    // ── Listings ──────────────────────────────────────────────────────────

    /// Courses that can still take a student, each with the classroom
    /// enrollment would pick.
    pub fn available_courses(&self) -> Result<Vec<AvailableCourse>> {
        let mut seen = HashSet::new();
        let courses = self
            .classrooms
            .active_classrooms()?
            .into_iter()
            .filter(|c| c.has_space())
            .filter(|c| seen.insert(c.course_id.clone()))
            .map(|c| AvailableCourse {
                course_id: c.course_id,
                classroom_id: c.id,
                student_count: c.student_count,
                capacity: c.capacity,
            })
            .collect();
        Ok(courses)
    }

    /// Active classrooms the user is enrolled in, newest first.
    pub fn student_classrooms(&self, user_id: &str) -> Result<Vec<ClassroomSummary>> {
        self.classrooms.classrooms_of_student(user_id)
    }

    pub fn enrolled_courses(&self, user_id: &str) -> Result<Vec<String>> {
        self.users.enrolled_courses(user_id)
    }

    pub fn study_log(&self, user_id: &str) -> Result<Vec<DateTime<Utc>>> {
        self.users.study_log(user_id)
    }
}
