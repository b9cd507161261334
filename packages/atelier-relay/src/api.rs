//! REST API handlers.
//!
//! Classroom administration, enrollment, lesson progress and direct
//! conversations. Storage calls are synchronous SQLite work and run on the
//! blocking pool.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use atelier_core::classroom::{ClassroomStatus, LessonStatus, NewClassroom, NewLesson};
use atelier_core::messaging::{ChatMessage, Conversation};
use atelier_core::{Error, ErrorCategory, Result};

use crate::state::RelayState;

// ── Request / Response Types ─────────────────────────────────────────────────

/// POST /api/classrooms/enroll
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub user_id: String,
    pub course_id: String,
}

/// GET /api/classrooms/:id/view
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/classrooms/:id/lessons/:lesson_id/studied
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudiedRequest {
    pub user_id: String,
}

/// POST /api/classrooms/:id/status
#[derive(Debug, Deserialize)]
pub struct ClassroomStatusRequest {
    pub status: ClassroomStatus,
}

/// POST /api/classrooms/:id/lessons/:lesson_id/status
#[derive(Debug, Deserialize)]
pub struct LessonStatusRequest {
    pub status: LessonStatus,
}

/// POST /api/chat/conversations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConversationRequest {
    pub user_id: String,
    pub other_user_id: String,
}

/// POST /api/chat/messages
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub author_id: String,
    pub content: String,
}

/// POST /api/chat/read
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub conversation_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub message: ChatMessage,
    pub conversation: Conversation,
    /// What the author's client emits as `new message` to notify recipients.
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecords {
    pub user_id: String,
    pub enrolled_courses: Vec<String>,
    pub study_log: Vec<DateTime<Utc>>,
}

/// Generic response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(status: StatusCode, msg: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        status,
        Json(ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status for an error category.
pub fn status_for(error: &Error) -> StatusCode {
    match error.category() {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Capacity | ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(data) => ApiResponse::success(data).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, recoverable = e.is_recoverable(), "Request failed");
            } else {
                tracing::debug!(error = %e, recoverable = e.is_recoverable(), "Request rejected");
            }
            error_response(status, &e.to_string()).into_response()
        }
    }
}

/// Run synchronous storage work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::DatabaseError(format!("Storage task failed: {}", e)))?
}

// ── Classroom Handlers ───────────────────────────────────────────────────────

/// POST /api/classrooms
pub async fn create_classroom(
    State(state): State<RelayState>,
    Json(req): Json<NewClassroom>,
) -> Response {
    let engine = state.engine.clone();
    let result = blocking(move || engine.create_classroom(&req)).await;
    match result {
        Ok(summary) => (StatusCode::CREATED, ApiResponse::success(summary)).into_response(),
        Err(e) => respond::<()>(Err(e)),
    }
}

/// POST /api/classrooms/:id/status
pub async fn set_classroom_status(
    State(state): State<RelayState>,
    Path(classroom_id): Path<String>,
    Json(req): Json<ClassroomStatusRequest>,
) -> Response {
    let engine = state.engine.clone();
    respond(
        blocking(move || {
            engine.set_classroom_status(&classroom_id, req.status)?;
            Ok(serde_json::json!({ "id": classroom_id, "status": req.status }))
        })
        .await,
    )
}

/// POST /api/classrooms/:id/lessons
pub async fn add_lesson(
    State(state): State<RelayState>,
    Path(classroom_id): Path<String>,
    Json(req): Json<NewLesson>,
) -> Response {
    let engine = state.engine.clone();
    let result = blocking(move || engine.add_lesson(&classroom_id, &req)).await;
    match result {
        Ok(lesson) => (StatusCode::CREATED, ApiResponse::success(lesson)).into_response(),
        Err(e) => respond::<()>(Err(e)),
    }
}

/// POST /api/classrooms/:id/lessons/:lesson_id/status
pub async fn set_lesson_status(
    State(state): State<RelayState>,
    Path((classroom_id, lesson_id)): Path<(String, String)>,
    Json(req): Json<LessonStatusRequest>,
) -> Response {
    let engine = state.engine.clone();
    respond(blocking(move || engine.set_lesson_status(&classroom_id, &lesson_id, req.status)).await)
}

/// GET /api/classrooms/available
pub async fn available_courses(State(state): State<RelayState>) -> Response {
    let engine = state.engine.clone();
    respond(blocking(move || engine.available_courses()).await)
}

/// GET /api/classrooms/student/:user_id
pub async fn student_classrooms(
    State(state): State<RelayState>,
    Path(user_id): Path<String>,
) -> Response {
    let engine = state.engine.clone();
    respond(blocking(move || engine.student_classrooms(&user_id)).await)
}

/// POST /api/classrooms/enroll
pub async fn enroll(State(state): State<RelayState>, Json(req): Json<EnrollRequest>) -> Response {
    let engine = state.engine.clone();
    respond(blocking(move || engine.enroll(&req.user_id, &req.course_id)).await)
}

/// GET /api/classrooms/:id/view?userId=
pub async fn classroom_view(
    State(state): State<RelayState>,
    Path(classroom_id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return respond::<()>(Err(Error::Validation("userId is required".into())));
    };
    let engine = state.engine.clone();
    respond(
        blocking(move || engine.lesson_completion_view(&classroom_id, &user_id, Utc::now())).await,
    )
}

/// POST /api/classrooms/:id/lessons/:lesson_id/studied
pub async fn mark_lesson_as_studied(
    State(state): State<RelayState>,
    Path((classroom_id, lesson_id)): Path<(String, String)>,
    Json(req): Json<StudiedRequest>,
) -> Response {
    let engine = state.engine.clone();
    respond(
        blocking(move || {
            engine.mark_lesson_as_studied(&classroom_id, &lesson_id, &req.user_id, Utc::now())
        })
        .await,
    )
}

/// GET /api/users/:user_id/records
pub async fn user_records(
    State(state): State<RelayState>,
    Path(user_id): Path<String>,
) -> Response {
    let engine = state.engine.clone();
    respond(
        blocking(move || {
            Ok(UserRecords {
                enrolled_courses: engine.enrolled_courses(&user_id)?,
                study_log: engine.study_log(&user_id)?,
                user_id,
            })
        })
        .await,
    )
}

// ── Chat Handlers ────────────────────────────────────────────────────────────

/// POST /api/chat/conversations
pub async fn access_conversation(
    State(state): State<RelayState>,
    Json(req): Json<AccessConversationRequest>,
) -> Response {
    let store = state.conversations.clone();
    respond(blocking(move || store.access_conversation(&req.user_id, &req.other_user_id)).await)
}

/// GET /api/chat/conversations?userId=
pub async fn list_conversations(
    State(state): State<RelayState>,
    Query(query): Query<ViewerQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return respond::<()>(Err(Error::Validation("userId is required".into())));
    };
    let store = state.conversations.clone();
    respond(blocking(move || store.conversations_of(&user_id)).await)
}

/// POST /api/chat/messages
///
/// Persists the message only. Live delivery happens when the author's client
/// emits the returned `payload` as `new message`, so each recipient
/// connection gets it once.
pub async fn send_message(
    State(state): State<RelayState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let store = state.conversations.clone();
    let result = blocking(move || {
        store.record_message(&req.conversation_id, &req.author_id, &req.content, Utc::now())
    })
    .await;

    match result {
        Ok((message, conversation)) => {
            let payload = message.delivery_payload(&conversation);
            (
                StatusCode::CREATED,
                ApiResponse::success(SentMessage {
                    message,
                    conversation,
                    payload,
                }),
            )
                .into_response()
        }
        Err(e) => respond::<()>(Err(e)),
    }
}

/// GET /api/chat/conversations/:id/messages
pub async fn list_messages(
    State(state): State<RelayState>,
    Path(conversation_id): Path<String>,
) -> Response {
    let store = state.conversations.clone();
    respond(
        blocking(move || {
            if store.conversation(&conversation_id)?.is_none() {
                return Err(Error::NotFound(format!("conversation {}", conversation_id)));
            }
            store.messages(&conversation_id)
        })
        .await,
    )
}

/// POST /api/chat/read
pub async fn mark_read(
    State(state): State<RelayState>,
    Json(req): Json<MarkReadRequest>,
) -> Response {
    let store = state.conversations.clone();
    respond(
        blocking(move || {
            store.mark_read(&req.conversation_id, &req.user_id)?;
            Ok(serde_json::json!({ "conversationId": req.conversation_id, "unread": 0 }))
        })
        .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::NoSeats), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::AlreadyEnrolled), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::EnrollmentRolledBack("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse {
            ok: true,
            data: Some(3),
            error: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "ok": true, "data": 3 }));

        let (status, Json(body)) = error_response(StatusCode::CONFLICT, "full");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({ "ok": false, "error": "full" })
        );
    }

    #[test]
    fn test_request_decoding() {
        let req: EnrollRequest =
            serde_json::from_str(r#"{"userId":"u1","courseId":"c1"}"#).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.course_id, "c1");

        let status: LessonStatusRequest =
            serde_json::from_str(r#"{"status":"cancelled"}"#).unwrap();
        assert_eq!(status.status, LessonStatus::Cancelled);
    }
}
