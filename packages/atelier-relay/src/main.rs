//! Atelier Relay Server
//!
//! The real-time and REST front of the Atelier learning platform:
//!
//! 1. **Live sessions**: WebSocket signaling for lessons and events. One
//!    host per room, everyone else spectates; SDP offers, answers and ICE
//!    candidates are relayed between them.
//!
//! 2. **Presence and chat**: who is online, typing indicators, and fan-out of
//!    direct messages to every open connection of each recipient.
//!
//! 3. **Classrooms**: capacity-checked enrollment, lesson progress with lazy
//!    auto-completion of online lessons, and the studied toggle.
//!
//! Media never passes through the server; only signaling does.

mod api;
mod handler;
mod hub;
mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use atelier_core::storage::Database;
use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "atelier-relay", version, about = "Atelier signaling and classroom server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000, env = "RELAY_PORT")]
    port: u16,

    /// SQLite database file. In-memory when omitted.
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,

    /// Echo conference messages back to their sender
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "ECHO_CONFERENCE_MESSAGES"
    )]
    echo_conference_messages: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "atelier_relay=info,atelier_core=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RelayConfig {
        port: args.port,
        database_path: args.database_path,
        echo_conference_messages: args.echo_conference_messages,
    };

    let db = Database::open(config.database_path.as_deref()).await?;
    match &config.database_path {
        Some(path) => tracing::info!(path = path.as_str(), "Database opened"),
        None => tracing::warn!("No database path given, using in-memory storage"),
    }

    let state = RelayState::new(config.clone(), db);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Atelier relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// All routes with CORS and request tracing.
fn build_router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        // Classrooms
        .route("/api/classrooms", post(api::create_classroom))
        .route("/api/classrooms/available", get(api::available_courses))
        .route("/api/classrooms/enroll", post(api::enroll))
        .route(
            "/api/classrooms/student/:user_id",
            get(api::student_classrooms),
        )
        .route("/api/classrooms/:id/status", post(api::set_classroom_status))
        .route("/api/classrooms/:id/view", get(api::classroom_view))
        .route("/api/classrooms/:id/lessons", post(api::add_lesson))
        .route(
            "/api/classrooms/:id/lessons/:lesson_id/status",
            post(api::set_lesson_status),
        )
        .route(
            "/api/classrooms/:id/lessons/:lesson_id/studied",
            post(api::mark_lesson_as_studied),
        )
        .route("/api/users/:user_id/records", get(api::user_records))
        // Chat
        .route(
            "/api/chat/conversations",
            get(api::list_conversations).post(api::access_conversation),
        )
        .route(
            "/api/chat/conversations/:id/messages",
            get(api::list_messages),
        )
        .route("/api/chat/messages", post(api::send_message))
        .route("/api/chat/read", post(api::mark_read))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "atelier-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    match state.hub.stats().await {
        Some(stats) => Json(json!({
            "connections": stats.connections,
            "online_users": stats.online_users,
            "rooms": stats.rooms,
            "chat_channels": stats.chat_channels,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
        .into_response(),
        None => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "hub stopped" })),
        )
            .into_response(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    use atelier_core::protocol::ServerEvent;

    async fn serve() -> String {
        let db = Database::open(None).await.unwrap();
        let state = RelayState::new(RelayConfig::default(), db);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    async fn next_event<S>(ws: &mut S) -> ServerEvent
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket closed: {:?}", other),
            }
        }
    }

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn setup_user(ws: &mut Client, user_id: &str) {
        let frame = json!({"event": "setup", "data": user_id}).to_string();
        ws.send(Message::Text(frame)).await.unwrap();
        loop {
            if let ServerEvent::Connected { .. } = next_event(ws).await {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_health_handler() {
        let db = Database::open(None).await.unwrap();
        let app = build_router(RelayState::new(RelayConfig::default(), db));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "atelier-relay");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["atelier-relay"]).unwrap();
        assert!(args.echo_conference_messages);

        let args = Args::try_parse_from([
            "atelier-relay",
            "--port",
            "7000",
            "--echo-conference-messages",
            "false",
        ])
        .unwrap();
        assert_eq!(args.port, 7000);
        assert!(!args.echo_conference_messages);
    }

    #[tokio::test]
    async fn test_router_rejects_malformed_enroll() {
        let db = Database::open(None).await.unwrap();
        let app = build_router(RelayState::new(RelayConfig::default(), db));

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/classrooms/enroll")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"userId":"","courseId":"c1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::get("/api/classrooms/available")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_websocket_setup_and_join() {
        let addr = serve().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        ws.send(Message::Text(
            json!({"event": "setup", "data": {"_id": "alice"}}).to_string(),
        ))
        .await
        .unwrap();

        assert_eq!(
            next_event(&mut ws).await,
            ServerEvent::UserOnline("alice".into())
        );
        assert_eq!(
            next_event(&mut ws).await,
            ServerEvent::OnlineUsersList(vec!["alice".into()])
        );
        assert_eq!(
            next_event(&mut ws).await,
            ServerEvent::Connected {
                user_id: "alice".into()
            }
        );

        ws.send(Message::Text(
            json!({
                "event": "join-room",
                "data": {"sessionId": "lesson-1", "role": "professor", "name": "Ana"}
            })
            .to_string(),
        ))
        .await
        .unwrap();

        match next_event(&mut ws).await {
            ServerEvent::UpdateParticipants(roster) => {
                assert_eq!(roster.len(), 1);
                assert_eq!(roster[0].name, "Ana");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            next_event(&mut ws).await,
            ServerEvent::HostReady { .. }
        ));

        ws.send(Message::Text("not json".into())).await.unwrap();
        assert!(matches!(
            next_event(&mut ws).await,
            ServerEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_rest_enrollment_flow() {
        let addr = serve().await;
        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let health: serde_json::Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let created = client
            .post(format!("{}/api/classrooms", base))
            .json(&json!({"name": "Turma A", "courseId": "course-1", "capacity": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let enrolled = client
            .post(format!("{}/api/classrooms/enroll", base))
            .json(&json!({"userId": "u1", "courseId": "course-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(enrolled.status(), reqwest::StatusCode::OK);

        let full = client
            .post(format!("{}/api/classrooms/enroll", base))
            .json(&json!({"userId": "u2", "courseId": "course-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(full.status(), reqwest::StatusCode::CONFLICT);
        let body: serde_json::Value = full.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "No seats available for this course.");

        let missing_user = client
            .get(format!("{}/api/classrooms/whatever/view", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_user.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rest_message_reaches_recipient_once() {
        let addr = serve().await;
        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let (mut alice, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        let (mut bob, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        setup_user(&mut alice, "alice").await;
        setup_user(&mut bob, "bob").await;

        let conversation: serde_json::Value = client
            .post(format!("{}/api/chat/conversations", base))
            .json(&json!({"userId": "alice", "otherUserId": "bob"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let conversation_id = conversation["data"]["id"].as_str().unwrap().to_string();

        let sent: serde_json::Value = client
            .post(format!("{}/api/chat/messages", base))
            .json(&json!({
                "conversationId": conversation_id,
                "authorId": "alice",
                "content": "oi"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let payload = sent["data"]["payload"].clone();
        assert_eq!(payload["content"], "oi");

        alice
            .send(Message::Text(
                json!({"event": "new message", "data": payload}).to_string(),
            ))
            .await
            .unwrap();

        loop {
            match next_event(&mut bob).await {
                ServerEvent::MessageReceived(message) => {
                    assert_eq!(message, payload);
                    break;
                }
                ServerEvent::UserOnline(_) => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }

        bob.send(Message::Text(json!({"event": "ping"}).to_string()))
            .await
            .unwrap();
        assert_eq!(next_event(&mut bob).await, ServerEvent::Pong);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let addr = serve().await;
        let stats: serde_json::Value = reqwest::get(format!("http://{}/stats", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["connections"], 0);
        assert_eq!(stats["rooms"], 0);
    }
}
