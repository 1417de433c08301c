use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use plaza_db::models::{NewComment, NewPost};
use plaza_types::api::{CommentResponse, CreateCommentRequest, CreatePostRequest, PostResponse};
use plaza_types::models::{NotificationKind, PostPrivacy};

use crate::auth::{AppState, db_call};
use crate::error::{ApiError, require_text};
use crate::middleware::CurrentUser;
use crate::{Page, notify};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedScope {
    /// Every post the viewer can see.
    #[default]
    All,
    /// Only posts by users the viewer follows.
    Following,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub scope: FeedScope,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let viewer = current.id;
    let (limit, offset) = (query.limit, query.offset);
    let posts = db_call(&state, move |db| {
        let posts = match query.scope {
            FeedScope::All => db.posts().list(viewer, limit, offset)?,
            FeedScope::Following => db.posts().list_followed_by_user(viewer, limit, offset)?,
        };
        Ok(posts)
    })
    .await?;
    Ok(Json(posts.into_iter().map(Into::into).collect()))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&req.content, "content")?;
    if req.privacy != PostPrivacy::Private && !req.allowed_user_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "allowed_user_ids only applies to private posts".into(),
        ));
    }

    let new_post = NewPost {
        author_id: current.id,
        group_id: None,
        content: req.content,
        image: req.image,
        privacy: req.privacy,
        allowed_user_ids: req.allowed_user_ids,
    };
    let post = db_call(&state, move |db| Ok(db.posts().create(new_post)?)).await?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = db_call(&state, move |db| Ok(db.posts().get_visible(post_id, current.id)?)).await?;
    Ok(Json(post.into()))
}

/// Only the author may delete a post.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| {
        let post = db.posts().get_visible(post_id, me)?;
        if post.author.id != me {
            return Err(ApiError::Forbidden("only the author can delete this post"));
        }
        Ok(db.posts().delete(post_id)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(post_id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let viewer = current.id;
    let comments = db_call(&state, move |db| {
        db.posts().get_visible(post_id, viewer)?;
        Ok(db.comments().list_by_post(post_id, page.limit, page.offset)?)
    })
    .await?;
    Ok(Json(comments.into_iter().map(Into::into).collect()))
}

/// Commenting requires seeing the post. The post author is notified.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&req.content, "content")?;

    let me = current.id;
    let new_comment = NewComment {
        post_id,
        author_id: me,
        content: req.content,
        image: req.image,
    };
    let (comment, post_author) = db_call(&state, move |db| {
        let post = db.posts().get_visible(post_id, me)?;
        let comment = db.comments().create(new_comment)?;
        Ok((comment, post.author.id))
    })
    .await?;

    if post_author != me {
        notify(
            &state,
            post_author,
            NotificationKind::NewComment,
            me,
            Some(post_id),
            format!("{} commented on your post", comment.author.first_name),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

/// The comment's author or the post's author may delete a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = current.id;
    db_call(&state, move |db| {
        let comment = db.comments().get(comment_id)?;
        if comment.author.id != me {
            let post = db.posts().get(comment.post_id)?;
            if post.author.id != me {
                return Err(ApiError::Forbidden(
                    "only the comment or post author can delete this comment",
                ));
            }
        }
        Ok(db.comments().delete(comment_id)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};

    use super::FeedScope;
    use crate::test_support::TestApp;

    fn contents(body: &Value) -> Vec<&str> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["content"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn feed_scope_parses_from_query_text() {
        let scope: FeedScope = serde_json::from_value(json!("following")).unwrap();
        assert_eq!(scope, FeedScope::Following);
        assert_eq!(FeedScope::default(), FeedScope::All);
    }

    #[tokio::test]
    async fn feed_respects_privacy_tiers() {
        let app = TestApp::new();
        let author = app.register("author", false).await;
        let follower = app.register("follower", false).await;
        let chosen = app.register("chosen", false).await;
        let stranger = app.register("stranger", false).await;

        app.post(&format!("/users/{}/follow", author.id), &follower.token, json!({}))
            .await;

        for (content, privacy, allowed) in [
            ("open", "public", vec![]),
            ("friends", "almost_private", vec![]),
            ("secret", "private", vec![chosen.id.to_string()]),
        ] {
            let (status, _) = app
                .post(
                    "/posts",
                    &author.token,
                    json!({ "content": content, "privacy": privacy, "allowed_user_ids": allowed }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = app.get("/posts", &stranger.token).await;
        assert_eq!(contents(&body), vec!["open"]);

        let (_, body) = app.get("/posts", &follower.token).await;
        assert_eq!(contents(&body), vec!["friends", "open"]);

        let (_, body) = app.get("/posts", &chosen.token).await;
        assert_eq!(contents(&body), vec!["secret", "open"]);

        let (_, body) = app.get("/posts", &author.token).await;
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (_, body) = app.get("/posts?scope=following", &follower.token).await;
        assert_eq!(contents(&body), vec!["friends", "open"]);
        let (_, body) = app.get("/posts?scope=following", &chosen.token).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hidden_post_looks_missing() {
        let app = TestApp::new();
        let author = app.register("author", false).await;
        let stranger = app.register("stranger", false).await;

        let (_, post) = app
            .post("/posts", &author.token, json!({ "content": "mine", "privacy": "private" }))
            .await;
        let uri = format!("/posts/{}", post["id"].as_str().unwrap());

        let (status, _) = app.get(&uri, &stranger.token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.get(&uri, &author.token).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn blank_content_and_stray_allow_list_are_rejected() {
        let app = TestApp::new();
        let author = app.register("author", false).await;

        let (status, _) = app.post("/posts", &author.token, json!({ "content": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/posts",
                &author.token,
                json!({ "content": "hi", "allowed_user_ids": [author.id.to_string()] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn comments_notify_and_follow_ownership_rules() {
        let app = TestApp::new();
        let author = app.register("author", false).await;
        let reader = app.register("reader", false).await;
        let other = app.register("other", false).await;

        let (_, post) = app.post("/posts", &author.token, json!({ "content": "hello" })).await;
        let post_id = post["id"].as_str().unwrap().to_string();

        let comments_uri = format!("/posts/{post_id}/comments");
        let (status, comment) = app
            .post(&comments_uri, &reader.token, json!({ "content": "nice" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let comment_uri = format!("/comments/{}", comment["id"].as_str().unwrap());

        let (_, post) = app.get(&format!("/posts/{post_id}"), &reader.token).await;
        assert_eq!(post["comment_count"], 1);

        let (_, notifications) = app.get("/notifications", &author.token).await;
        assert_eq!(notifications[0]["kind"], "new_comment");
        assert_eq!(notifications[0]["reference_id"], post_id.as_str());

        let (status, _) = app.request(Method::DELETE, &comment_uri, Some(&other.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The post author moderates their own thread
        let (status, _) = app
            .request(Method::DELETE, &comment_uri, Some(&author.token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, comments) = app.get(&format!("/posts/{post_id}/comments"), &reader.token).await;
        assert!(comments.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_author_deletes_a_post() {
        let app = TestApp::new();
        let author = app.register("author", false).await;
        let reader = app.register("reader", false).await;

        let (_, post) = app.post("/posts", &author.token, json!({ "content": "bye" })).await;
        let uri = format!("/posts/{}", post["id"].as_str().unwrap());

        let (status, _) = app.request(Method::DELETE, &uri, Some(&reader.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.request(Method::DELETE, &uri, Some(&author.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.get(&uri, &author.token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
