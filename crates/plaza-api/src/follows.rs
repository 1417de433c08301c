use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use plaza_types::api::{FollowResponse, UserSummary};
use plaza_types::models::{FollowStatus, NotificationKind};

use crate::auth::{AppState, db_call};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::notify;

/// Following a private user creates a pending request; anyone else is
/// followed immediately.
pub async fn follow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current.id;
    let (status, follower_name) = db_call(&state, move |db| {
        let target = db.users().get_by_id(user_id)?;
        let status = db.followers().follow(me, user_id, target.is_private)?;
        Ok((status, db.users().get_by_id(me)?.first_name))
    })
    .await?;

    debug!("{} follows {}: {}", me, user_id, status);

    let (kind, message) = match status {
        FollowStatus::Pending => (
            NotificationKind::FollowRequest,
            format!("{follower_name} wants to follow you"),
        ),
        FollowStatus::Accepted => (
            NotificationKind::NewFollower,
            format!("{follower_name} started following you"),
        ),
    };
    notify(&state, user_id, kind, me, None, message).await;

    Ok((StatusCode::CREATED, Json(FollowResponse { status })))
}

/// Also cancels a pending request.
pub async fn unfollow(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| Ok(db.followers().unfollow(me, user_id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = db_call(&state, move |db| {
        Ok(db.followers().list_pending_requests(current.id)?)
    })
    .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(follower_id): Path<Uuid>,
) -> Result<Json<FollowResponse>, ApiError> {
    let me = current.id;
    let my_name = db_call(&state, move |db| {
        db.followers().accept(follower_id, me)?;
        Ok(db.users().get_by_id(me)?.first_name)
    })
    .await?;

    notify(
        &state,
        follower_id,
        NotificationKind::FollowAccepted,
        me,
        None,
        format!("{my_name} accepted your follow request"),
    )
    .await;

    Ok(Json(FollowResponse {
        status: FollowStatus::Accepted,
    }))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(follower_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| Ok(db.followers().decline(follower_id, me)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}
