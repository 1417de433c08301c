use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use plaza_types::api::{NotificationResponse, UnreadCountResponse};

use crate::auth::{AppState, db_call};
use crate::error::ApiError;
use crate::middleware::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let rows = db_call(&state, move |db| {
        Ok(db
            .notifications()
            .list(current.id, query.unread, query.limit, query.offset)?)
    })
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = db_call(&state, move |db| Ok(db.notifications().unread_count(current.id)?)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    db_call(&state, move |db| {
        Ok(db.notifications().mark_read(notification_id, current.id)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    db_call(&state, move |db| Ok(db.notifications().mark_all_read(current.id)?)).await?;
    Ok(Json(UnreadCountResponse { count: 0 }))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    db_call(&state, move |db| Ok(db.notifications().delete(notification_id, current.id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}
