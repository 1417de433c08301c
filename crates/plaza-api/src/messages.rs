use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use plaza_db::queries::messages::MessageCursor;
use plaza_gateway::chat;
use plaza_types::api::{ConversationResponse, MessageResponse, SendMessageRequest};
use plaza_types::models::ChatTarget;

use crate::auth::{AppState, db_call};
use crate::error::ApiError;
use crate::groups::ensure_member;
use crate::middleware::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: the `created_at` of the oldest message already loaded.
    pub before: Option<DateTime<Utc>>,
    /// Id of that message, so others sent in the same millisecond are kept.
    pub before_id: Option<Uuid>,
}

impl HistoryQuery {
    fn cursor(&self) -> Option<MessageCursor> {
        self.before.map(|created_at| MessageCursor {
            created_at,
            id: self.before_id,
        })
    }
}

fn default_limit() -> u32 {
    50
}

/// Messages sent over REST take the same path as gateway commands, so
/// connected recipients see them live.
async fn send(
    state: &AppState,
    sender: Uuid,
    target: ChatTarget,
    content: String,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message = chat::send_message(&state.db, &state.dispatcher, sender, target, content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn direct_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let me = current.id;
    let messages = db_call(&state, move |db| {
        db.users().get_by_id(user_id)?;
        Ok(db.messages().list_direct(me, user_id, query.limit, query.cursor())?)
    })
    .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

pub async fn send_direct(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    send(&state, current.id, ChatTarget::User(user_id), req.content).await
}

pub async fn group_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let me = current.id;
    let messages = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        Ok(db.messages().list_group(group_id, query.limit, query.cursor())?)
    })
    .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

pub async fn send_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current.id;
    db_call(&state, move |db| {
        db.groups().get(group_id)?;
        Ok(())
    })
    .await?;
    send(&state, me, ChatTarget::Group(group_id), req.content).await
}

pub async fn conversations(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    let rows = db_call(&state, move |db| Ok(db.messages().list_conversations(current.id)?)).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
