use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use plaza_db::Database;
use plaza_db::models::{GroupRow, NewPost};
use plaza_types::api::{
    CreateGroupPostRequest, CreateGroupRequest, GroupResponse, InvitationResponse, InviteRequest,
    JoinRequestResponse, MemberResponse, PostResponse,
};
use plaza_types::models::{MemberRole, NotificationKind, PostPrivacy};

use crate::auth::{AppState, db_call};
use crate::error::{ApiError, require_text};
use crate::middleware::CurrentUser;
use crate::{Page, notify, notify_all};

#[derive(Debug, Deserialize)]
pub struct GroupQuery {
    /// Only groups the caller belongs to.
    #[serde(default)]
    pub mine: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

fn group_response(row: GroupRow, role: Option<MemberRole>) -> GroupResponse {
    GroupResponse {
        id: row.id,
        creator_id: row.creator_id,
        title: row.title,
        description: row.description,
        member_count: row.member_count,
        role,
        created_at: row.created_at,
    }
}

/// Fails unless `user` belongs to an existing `group`.
pub(crate) fn ensure_member(db: &Database, group: Uuid, user: Uuid) -> Result<(), ApiError> {
    db.groups().get(group)?;
    if !db.groups().is_member(group, user)? {
        return Err(ApiError::Forbidden("only group members can do this"));
    }
    Ok(())
}

fn ensure_admin(db: &Database, group: Uuid, user: Uuid) -> Result<(), ApiError> {
    db.groups().get(group)?;
    if db.groups().member_role(group, user)? != Some(MemberRole::Admin) {
        return Err(ApiError::Forbidden("only group admins can do this"));
    }
    Ok(())
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Vec<GroupResponse>>, ApiError> {
    let me = current.id;
    let groups = db_call(&state, move |db| {
        let rows = if query.mine {
            db.groups().list_for_user(me)?
        } else {
            db.groups().list(query.limit, query.offset)?
        };

        rows.into_iter()
            .map(|row| -> Result<GroupResponse, ApiError> {
                let role = db.groups().member_role(row.id, me)?;
                Ok(group_response(row, role))
            })
            .collect()
    })
    .await?;
    Ok(Json(groups))
}

/// The creator becomes the group's first admin.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&req.title, "title")?;

    let me = current.id;
    let group = db_call(&state, move |db| {
        Ok(db.groups().create(me, req.title.trim(), req.description.trim())?)
    })
    .await?;

    info!("{} created group {}", me, group.id);
    Ok((StatusCode::CREATED, Json(group_response(group, Some(MemberRole::Admin)))))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupResponse>, ApiError> {
    let me = current.id;
    let group = db_call(&state, move |db| {
        let row = db.groups().get(group_id)?;
        let role = db.groups().member_role(group_id, me)?;
        Ok(group_response(row, role))
    })
    .await?;
    Ok(Json(group))
}

/// Only the creator may delete a group.
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| {
        let group = db.groups().get(group_id)?;
        if group.creator_id != me {
            return Err(ApiError::Forbidden("only the creator can delete this group"));
        }
        Ok(db.groups().delete(group_id)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn members(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    let members = db_call(&state, move |db| {
        db.groups().get(group_id)?;
        Ok(db.groups().list_members(group_id)?)
    })
    .await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

/// The creator cannot leave their own group.
pub async fn leave(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| {
        let group = db.groups().get(group_id)?;
        if group.creator_id == me {
            return Err(ApiError::Forbidden("the creator cannot leave the group"));
        }
        Ok(db.groups().remove_member(group_id, me)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn group_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let me = current.id;
    let posts = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        Ok(db.posts().list_by_group(group_id, page.limit, page.offset)?)
    })
    .await?;
    Ok(Json(posts.into_iter().map(Into::into).collect()))
}

pub async fn create_group_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateGroupPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&req.content, "content")?;

    let me = current.id;
    let new_post = NewPost {
        author_id: me,
        group_id: Some(group_id),
        content: req.content,
        image: req.image,
        privacy: PostPrivacy::Public,
        allowed_user_ids: Vec::new(),
    };
    let post = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        Ok(db.posts().create(new_post)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

// -- Invitations --

/// Any member may invite. The invitee is notified.
pub async fn invite(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<InviteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current.id;
    let invitee = req.user_id;
    let (invitation, inviter_name) = db_call(&state, move |db| {
        ensure_member(db, group_id, me)?;
        db.users().get_by_id(invitee)?;
        let invitation = db.groups().invite(group_id, me, invitee)?;
        Ok((invitation, db.users().get_by_id(me)?.first_name))
    })
    .await?;

    notify(
        &state,
        invitee,
        NotificationKind::GroupInvitation,
        me,
        Some(invitation.id),
        format!("{inviter_name} invited you to {}", invitation.group_title),
    )
    .await;

    Ok((StatusCode::CREATED, Json(InvitationResponse::from(invitation))))
}

pub async fn my_invitations(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<InvitationResponse>>, ApiError> {
    let invitations =
        db_call(&state, move |db| Ok(db.groups().list_pending_invitations(current.id)?)).await?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

async fn respond_invitation(
    state: AppState,
    me: Uuid,
    invitation_id: Uuid,
    accept: bool,
) -> Result<Json<InvitationResponse>, ApiError> {
    let invitation = db_call(&state, move |db| {
        Ok(db.groups().respond_invitation(invitation_id, me, accept)?)
    })
    .await?;
    Ok(Json(invitation.into()))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<InvitationResponse>, ApiError> {
    respond_invitation(state, current.id, invitation_id, true).await
}

pub async fn reject_invitation(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<InvitationResponse>, ApiError> {
    respond_invitation(state, current.id, invitation_id, false).await
}

// -- Join requests --

pub async fn join_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<JoinRequestResponse>>, ApiError> {
    let me = current.id;
    let requests = db_call(&state, move |db| {
        ensure_admin(db, group_id, me)?;
        Ok(db.groups().list_pending_join_requests(group_id)?)
    })
    .await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

/// Every admin of the group is notified.
pub async fn request_join(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current.id;
    let (request, admins, title) = db_call(&state, move |db| {
        let group = db.groups().get(group_id)?;
        let request = db.groups().request_join(group_id, me)?;
        Ok((request, db.groups().admin_ids(group_id)?, group.title))
    })
    .await?;

    notify_all(
        &state,
        &admins,
        NotificationKind::GroupJoinRequest,
        me,
        Some(request.id),
        format!("{} wants to join {title}", request.user.first_name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(JoinRequestResponse::from(request))))
}

async fn respond_join_request(
    state: AppState,
    me: Uuid,
    request_id: Uuid,
    accept: bool,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    let (request, title) = db_call(&state, move |db| {
        let pending = db.groups().get_join_request(request_id)?;
        ensure_admin(db, pending.group_id, me)?;
        let request = db.groups().respond_join_request(request_id, accept)?;
        Ok((request, db.groups().get(pending.group_id)?.title))
    })
    .await?;

    if accept {
        notify(
            &state,
            request.user.id,
            NotificationKind::GroupJoinAccepted,
            me,
            Some(request.group_id),
            format!("You are now a member of {title}"),
        )
        .await;
    }

    Ok(Json(request.into()))
}

pub async fn accept_join_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    respond_join_request(state, current.id, request_id, true).await
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    respond_join_request(state, current.id, request_id, false).await
}
