//! API routes
//!
//! JSON surface over the chat sessions. Each mutating call delivers any
//! replies that are already due, applies the operation, and returns the
//! session view; if a reply is still pending, a background task wakes at its
//! due time so the typing indicator clears without polling.

mod error;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{Message, Step, Variant};
use crate::core::ChatController;
use crate::{lock, AppState, SharedSession};

pub use error::{ApiError, ErrorBody};

/// Canned phrases offered as one-tap buttons
pub const QUICK_ACTIONS: [&str; 4] = ["how to apply", "build resume", "skill tests", "help"];

/// Longest message accepted from a client, in characters
const MAX_INPUT_CHARS: usize = 2000;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub variant: Variant,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickActionRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResponse {
    pub response: String,
    pub category: Option<String>,
}

/// What a client renders for one session
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub variant: Variant,
    pub is_open: bool,
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub messages: Vec<Message>,
}

impl SessionView {
    fn new(id: Uuid, controller: &ChatController) -> Self {
        let session = controller.session();
        Self {
            id,
            variant: session.variant,
            is_open: session.is_open,
            is_typing: controller.is_typing(),
            step: session.step(),
            user_name: session.user_name().map(str::to_string),
            messages: session.messages.clone(),
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn quick_actions() -> Json<Vec<&'static str>> {
    Json(QUICK_ACTIONS.to_vec())
}

async fn match_input(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, ApiError> {
    check_length(&request.input)?;
    let reply = state.matcher.respond(&request.input, &mut rand::rng());
    Ok(Json(MatchResponse {
        response: reply.text,
        category: reply.category,
    }))
}

async fn create_session(
    State(state): State<AppState>,
    request: Option<Json<CreateSessionRequest>>,
) -> (StatusCode, Json<SessionView>) {
    let variant = request.map(|Json(r)| r.variant).unwrap_or_default();
    let (id, session) = state.sessions.create(state.knowledge.clone(), variant);
    tracing::info!(%id, ?variant, "Chat session created");

    let view = SessionView::new(id, &lock(&session).controller);
    (StatusCode::CREATED, Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, |_| {})
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id) {
        tracing::info!(%id, "Chat session ended");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

async fn open_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, ChatController::open)
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, ChatController::close)
}

async fn toggle_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, ChatController::toggle)
}

async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SessionView>, ApiError> {
    check_length(&request.text)?;
    apply(&state, id, |c| {
        c.submit(&request.text);
    })
}

async fn submit_quick_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<QuickActionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    check_length(&request.query)?;
    apply(&state, id, |c| {
        c.quick_action(&request.query);
    })
}

/// Run `op` on a session and return the resulting view
fn apply<F>(state: &AppState, id: Uuid, op: F) -> Result<Json<SessionView>, ApiError>
where
    F: FnOnce(&mut ChatController),
{
    let shared = state.sessions.get(id).ok_or_else(|| not_found(id))?;

    let (view, spawn) = {
        let mut session = lock(&shared);
        session.controller.deliver_due();
        op(&mut session.controller);
        (SessionView::new(id, &session.controller), session.claim_delivery())
    };

    if spawn {
        spawn_delivery(shared);
    }
    Ok(Json(view))
}

/// Deliver pending replies as they fall due, then exit.
///
/// At most one of these runs per session; the flag is cleared under the
/// session lock once the queue is empty, so a later submission starts a new one.
fn spawn_delivery(shared: SharedSession) {
    tokio::spawn(async move {
        loop {
            let next = {
                let mut session = lock(&shared);
                let next = session.controller.next_due();
                if next.is_none() {
                    session.delivery_scheduled = false;
                }
                next
            };
            let Some(due) = next else {
                break;
            };
            tokio::time::sleep_until(due).await;
            lock(&shared).controller.deliver_due();
        }
    });
}

fn check_length(text: &str) -> Result<(), ApiError> {
    if text.chars().count() > MAX_INPUT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message exceeds maximum length of {} characters",
            MAX_INPUT_CHARS
        )));
    }
    Ok(())
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("session not found: {}", id))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/quick-actions", get(quick_actions))
        .route("/v1/match", post(match_input))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/open", post(open_session))
        .route("/v1/sessions/:id/close", post(close_session))
        .route("/v1/sessions/:id/toggle", post(toggle_session))
        .route("/v1/sessions/:id/messages", post(submit_message))
        .route("/v1/sessions/:id/quick-action", post(submit_quick_action))
}
