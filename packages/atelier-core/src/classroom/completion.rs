//! Lazy auto-completion of online lessons.
//!
//! An online lesson counts as attended once its scheduled start plus
//! [`LESSON_DURATION_HOURS`] lies in the past. Nothing schedules this: the
//! check runs whenever a student reads the classroom.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use super::model::{Lesson, LessonMode, LessonStatus};

/// Length of the window after the start time before a lesson auto-completes.
pub const LESSON_DURATION_HOURS: i64 = 2;

/// Parse a wall-clock lesson time, `HH:MM` or `HH:MM:SS`.
pub fn parse_lesson_time(raw: &str) -> chrono::ParseResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M").or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
}

/// Scheduled start of a lesson, read as UTC. `None` if date or time is
/// missing or the time does not parse.
pub fn scheduled_start(lesson: &Lesson) -> Option<DateTime<Utc>> {
    let date = lesson.date?;
    let raw = lesson.time.as_deref()?.trim();

    let time = match parse_lesson_time(raw) {
        Ok(time) => time,
        Err(e) => {
            tracing::warn!(
                lesson_id = lesson.id.as_str(),
                time = raw,
                error = %e,
                "Unparseable lesson time, skipping auto-complete"
            );
            return None;
        }
    };

    Some(date.and_time(time).and_utc())
}

/// Whether a lesson should be auto-completed at `now`.
pub fn is_auto_complete_due(lesson: &Lesson, now: DateTime<Utc>) -> bool {
    if lesson.mode != Some(LessonMode::Online) || lesson.status == LessonStatus::Cancelled {
        return false;
    }
    match scheduled_start(lesson) {
        Some(start) => now > start + Duration::hours(LESSON_DURATION_HOURS),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::model::LessonKind;
    use chrono::{NaiveDate, TimeZone};

    fn lesson(mode: Option<LessonMode>, time: Option<&str>) -> Lesson {
        Lesson {
            id: "lesson-1".into(),
            title: "Perspectiva".into(),
            kind: LessonKind::Scheduled,
            mode,
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            time: time.map(str::to_string),
            meeting_link: None,
            video_url: None,
            status: LessonStatus::Scheduled,
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_window_boundary() {
        let l = lesson(Some(LessonMode::Online), Some("19:30"));
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 21, 30, 0).unwrap();

        assert!(!is_auto_complete_due(&l, end));
        assert!(is_auto_complete_due(&l, end + Duration::seconds(1)));
        assert!(!is_auto_complete_due(&l, end - Duration::hours(1)));
    }

    #[test]
    fn test_only_online_lessons() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_auto_complete_due(&lesson(Some(LessonMode::Other), Some("10:00")), now));
        assert!(!is_auto_complete_due(&lesson(None, Some("10:00")), now));
    }

    #[test]
    fn test_missing_or_bad_time() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_auto_complete_due(&lesson(Some(LessonMode::Online), None), now));
        assert!(!is_auto_complete_due(&lesson(Some(LessonMode::Online), Some("7pm")), now));

        let mut undated = lesson(Some(LessonMode::Online), Some("10:00"));
        undated.date = None;
        assert!(!is_auto_complete_due(&undated, now));
    }

    #[test]
    fn test_cancelled_lesson_never_completes() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut l = lesson(Some(LessonMode::Online), Some("10:00"));
        l.status = LessonStatus::Cancelled;
        assert!(!is_auto_complete_due(&l, now));
    }

    #[test]
    fn test_seconds_precision_time() {
        let l = lesson(Some(LessonMode::Online), Some("08:15:00"));
        assert_eq!(
            scheduled_start(&l),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap())
        );
    }
}
