use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use plaza_db::models::NewGroupEvent;
use plaza_types::api::{
    CreateEventRequest, EventDetailResponse, GroupEventResponse, RespondEventRequest,
};
use plaza_types::models::NotificationKind;

use crate::auth::{AppState, db_call};
use crate::error::{ApiError, require_text};
use crate::groups::ensure_member;
use crate::middleware::CurrentUser;
use crate::notify_all;

pub async fn list_events(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<GroupEventResponse>>, ApiError> {
    let me = current.id;
    let events = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        Ok(db.group_events().list_by_group(group_id)?)
    })
    .await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// Every other member of the group is notified.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&req.title, "title")?;

    let me = current.id;
    let new_event = NewGroupEvent {
        group_id,
        creator_id: me,
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        event_time: req.event_time,
    };
    let (event, members, group_title) = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        let event = db.group_events().create(new_event)?;
        let members = db.groups().member_ids(group_id)?;
        Ok((event, members, db.groups().get(group_id)?.title))
    })
    .await?;

    let others: Vec<Uuid> = members.into_iter().filter(|id| *id != me).collect();
    notify_all(
        &state,
        &others,
        NotificationKind::GroupEvent,
        me,
        Some(event.id),
        format!("New event in {group_title}: {}", event.title),
    )
    .await;

    Ok((StatusCode::CREATED, Json(GroupEventResponse::from(event))))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventDetailResponse>, ApiError> {
    let me = current.id;
    let (event, responses) = db_call(&state, move |db| {
        let event = db.group_events().get(event_id)?;
        ensure_member(db, event.group_id, me)?;
        Ok((event, db.group_events().responses(event_id)?))
    })
    .await?;

    Ok(Json(EventDetailResponse {
        event: event.into(),
        responses: responses.into_iter().map(Into::into).collect(),
    }))
}

/// Going or not going. Answering again replaces the previous answer.
pub async fn respond_event(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<RespondEventRequest>,
) -> Result<Json<GroupEventResponse>, ApiError> {
    let me = current.id;
    let event = db_call(&state, move |db| {
        let event = db.group_events().get(event_id)?;
        ensure_member(db, event.group_id, me)?;
        Ok(db.group_events().respond(event_id, me, req.response)?)
    })
    .await?;
    Ok(Json(event.into()))
}
