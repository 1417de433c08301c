pub mod auth;
pub mod error;
pub mod events;
pub mod follows;
pub mod gateway;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod users;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use uuid::Uuid;

use plaza_db::models::NewNotification;
use plaza_types::models::NotificationKind;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// `?limit=&offset=` for list endpoints.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// Store a notification and push it over the gateway. Never fails the request.
pub(crate) async fn notify(
    state: &AppState,
    user_id: Uuid,
    kind: NotificationKind,
    actor_id: Uuid,
    reference_id: Option<Uuid>,
    message: String,
) {
    plaza_gateway::notifier::notify(
        &state.db,
        &state.dispatcher,
        NewNotification {
            user_id,
            kind,
            actor_id: Some(actor_id),
            reference_id,
            message,
        },
    )
    .await;
}

/// [`notify`] for each of `recipients`.
pub(crate) async fn notify_all(
    state: &AppState,
    recipients: &[Uuid],
    kind: NotificationKind,
    actor_id: Uuid,
    reference_id: Option<Uuid>,
    message: String,
) {
    plaza_gateway::notifier::notify_many(
        &state.db,
        &state.dispatcher,
        recipients,
        NewNotification {
            user_id: actor_id,
            kind,
            actor_id: Some(actor_id),
            reference_id,
            message,
        },
    )
    .await;
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// All routes. Everything except auth, health and the gateway upgrade
/// requires a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(gateway::ws_upgrade));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        // Users
        .route("/users", get(users::search))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route("/users/me/privacy", put(users::set_privacy))
        .route("/users/{user_id}", get(users::profile))
        .route("/users/{user_id}/posts", get(users::user_posts))
        .route("/users/{user_id}/followers", get(users::followers))
        .route("/users/{user_id}/following", get(users::following))
        // Followers
        .route("/users/{user_id}/follow", post(follows::follow).delete(follows::unfollow))
        .route("/follow-requests", get(follows::pending_requests))
        .route("/follow-requests/{follower_id}/accept", post(follows::accept_request))
        .route("/follow-requests/{follower_id}/decline", post(follows::decline_request))
        // Posts
        .route("/posts", get(posts::feed).post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/{post_id}/comments", get(posts::list_comments).post(posts::create_comment))
        .route("/comments/{comment_id}", delete(posts::delete_comment))
        // Groups
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group).delete(groups::delete_group))
        .route("/groups/{group_id}/members", get(groups::members))
        .route("/groups/{group_id}/leave", post(groups::leave))
        .route("/groups/{group_id}/posts", get(groups::group_posts).post(groups::create_group_post))
        .route("/groups/{group_id}/invitations", post(groups::invite))
        .route("/invitations", get(groups::my_invitations))
        .route("/invitations/{invitation_id}/accept", post(groups::accept_invitation))
        .route("/invitations/{invitation_id}/reject", post(groups::reject_invitation))
        .route(
            "/groups/{group_id}/join-requests",
            get(groups::join_requests).post(groups::request_join),
        )
        .route("/join-requests/{request_id}/accept", post(groups::accept_join_request))
        .route("/join-requests/{request_id}/reject", post(groups::reject_join_request))
        // Group events
        .route("/groups/{group_id}/events", get(events::list_events).post(events::create_event))
        .route("/events/{event_id}", get(events::get_event))
        .route("/events/{event_id}/response", put(events::respond_event))
        // Chat
        .route(
            "/groups/{group_id}/messages",
            get(messages::group_history).post(messages::send_group),
        )
        .route("/messages/{user_id}", get(messages::direct_history).post(messages::send_direct))
        .route("/conversations", get(messages::conversations))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/notifications/{notification_id}", delete(notifications::delete))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
