use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use plaza_db::Database;
use plaza_db::models::ProfileUpdate;
use plaza_types::api::{
    PostResponse, ProfileResponse, SetPrivacyRequest, UpdateProfileRequest, UserResponse,
    UserSummary,
};
use plaza_types::models::NotificationKind;

use crate::auth::{AppState, db_call};
use crate::error::{ApiError, require_text};
use crate::middleware::CurrentUser;
use crate::{Page, notify_all};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Follower lists and posts of a private profile are for accepted followers.
fn ensure_profile_visible(db: &Database, viewer: Uuid, user: Uuid) -> Result<(), ApiError> {
    db.users().get_by_id(user)?;
    if !db.followers().can_view_profile(viewer, user)? {
        return Err(ApiError::Forbidden("this profile is private"));
    }
    Ok(())
}

pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = db_call(&state, move |db| Ok(db.users().get_by_id(current.id)?)).await?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(first_name) = &req.first_name {
        require_text(first_name, "first_name")?;
    }
    if let Some(last_name) = &req.last_name {
        require_text(last_name, "last_name")?;
    }

    let update = ProfileUpdate {
        first_name: req.first_name.map(|s| s.trim().to_string()),
        last_name: req.last_name.map(|s| s.trim().to_string()),
        date_of_birth: req.date_of_birth,
        nickname: req.nickname,
        about_me: req.about_me,
        avatar: req.avatar,
    };
    let user = db_call(&state, move |db| Ok(db.users().update_profile(current.id, update)?)).await?;
    Ok(Json(user.into()))
}

/// Going public accepts every pending follow request; those followers are told.
pub async fn set_privacy(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<SetPrivacyRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let me = current.id;
    let (user, accepted) = db_call(&state, move |db| {
        let accepted = db.users().set_privacy(me, req.is_private)?;
        Ok((db.users().get_by_id(me)?, accepted))
    })
    .await?;

    notify_all(
        &state,
        &accepted,
        NotificationKind::FollowAccepted,
        me,
        None,
        format!("{} accepted your follow request", user.first_name),
    )
    .await;

    Ok(Json(user.into()))
}

/// `?q=` searches by name, nickname or email prefix; without it, lists users.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = db_call(&state, move |db| match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => Ok(db.users().search(q, query.limit)?),
        _ => Ok(db.users().list(query.limit, query.offset)?),
    })
    .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Private profiles only show their summary to non-followers.
pub async fn profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let viewer = current.id;
    let profile = db_call(&state, move |db| {
        let user = db.users().get_by_id(user_id)?;
        let visible = db.followers().can_view_profile(viewer, user_id)?;
        let followers = db.followers().count_followers(user_id)?;
        let following = db.followers().count_following(user_id)?;
        let follow_status = db.followers().status(viewer, user_id)?;

        Ok(ProfileResponse {
            summary: user.brief().into(),
            is_private: user.is_private,
            profile: visible.then(|| user.into()),
            followers,
            following,
            follow_status,
        })
    })
    .await?;
    Ok(Json(profile))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let viewer = current.id;
    let posts = db_call(&state, move |db| {
        ensure_profile_visible(db, viewer, user_id)?;
        Ok(db.posts().list_by_user(user_id, viewer, page.limit, page.offset)?)
    })
    .await?;
    Ok(Json(posts.into_iter().map(Into::into).collect()))
}

pub async fn followers(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let viewer = current.id;
    let users = db_call(&state, move |db| {
        ensure_profile_visible(db, viewer, user_id)?;
        Ok(db.followers().list_followers(user_id)?)
    })
    .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn following(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let viewer = current.id;
    let users = db_call(&state, move |db| {
        ensure_profile_visible(db, viewer, user_id)?;
        Ok(db.followers().list_following(user_id)?)
    })
    .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn register_login_and_fetch_me() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;

        let (status, body) = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": "ALICE@example.com", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        assert_ne!(token, alice.token);

        let (status, me) = app.get("/users/me", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["first_name"], "alice");
        assert!(me.get("password").is_none());
    }

    #[tokio::test]
    async fn duplicate_email_and_bad_password_are_rejected() {
        let app = TestApp::new();
        app.register("alice", false).await;

        let (status, _) = app
            .request(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": "alice@example.com",
                    "password": "another password",
                    "first_name": "Alice",
                    "last_name": "Again",
                    "date_of_birth": "1990-01-01",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": "alice@example.com", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;

        let (status, _) = app.request(Method::POST, "/auth/logout", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.get("/users/me", &alice.token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn private_profile_hides_details_from_strangers() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;
        let shy = app.register("shy", true).await;

        let (status, body) = app.get(&format!("/users/{}", shy.id), &alice.token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_private"], true);
        assert!(body["profile"].is_null());
        assert_eq!(body["summary"]["first_name"], "shy");

        let (status, _) = app.get(&format!("/users/{}/posts", shy.id), &alice.token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.get(&format!("/users/{}", shy.id), &shy.token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["email"], "shy@example.com");
    }

    #[tokio::test]
    async fn update_profile_and_search() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;
        app.register("bob", false).await;

        let (status, body) = app
            .request(
                Method::PATCH,
                "/users/me",
                Some(&alice.token),
                Some(json!({ "nickname": "ally", "about_me": "hi" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nickname"], "ally");
        assert_eq!(body["first_name"], "alice");

        let (status, body) = app.get("/users?q=al", &alice.token).await;
        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["nickname"], "ally");

        let (_, body) = app.get("/users", &alice.token).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = app
            .request(
                Method::PATCH,
                "/users/me",
                Some(&alice.token),
                Some(json!({ "nickname": null })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["nickname"].is_null());
        assert_eq!(body["about_me"], "hi");
    }

    #[tokio::test]
    async fn going_public_accepts_pending_requests() {
        let app = TestApp::new();
        let alice = app.register("alice", false).await;
        let bob = app.register("bob", false).await;
        let shy = app.register("shy", true).await;

        for fan in [&alice, &bob] {
            let (status, body) = app
                .post(&format!("/users/{}/follow", shy.id), &fan.token, json!({}))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["status"], "pending");
        }

        let (status, body) = app
            .request(
                Method::PUT,
                "/users/me/privacy",
                Some(&shy.token),
                Some(json!({ "is_private": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_private"], false);

        let (_, profile) = app.get(&format!("/users/{}", shy.id), &alice.token).await;
        assert_eq!(profile["follow_status"], "accepted");
        assert_eq!(profile["followers"], 2);

        for fan in [&alice, &bob] {
            let (_, notifications) = app.get("/notifications", &fan.token).await;
            assert_eq!(notifications[0]["kind"], "follow_accepted");
            assert_eq!(notifications[0]["actor_id"], shy.id.to_string());
        }
    }
}
