use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{error, info};

use plaza_db::models::NewUser;
use plaza_db::{Database, DbError};
use plaza_gateway::dispatcher::Dispatcher;
use plaza_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::error::{ApiError, require_text};
use crate::middleware::{CurrentUser, SESSION_COOKIE};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub session_ttl: chrono::Duration,
}

/// Run synchronous database work off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("background task failed".into())
        })?
}

const MIN_PASSWORD_LEN: usize = 8;

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let email = req.email.trim().to_string();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("email is not valid".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    require_text(&req.first_name, "first_name")?;
    require_text(&req.last_name, "last_name")?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    let new_user = NewUser {
        email,
        password_hash,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        date_of_birth: req.date_of_birth,
        nickname: req.nickname,
        about_me: req.about_me,
        avatar: req.avatar,
        is_private: req.is_private,
    };

    let ttl = state.session_ttl;
    let (user, token) = db_call(&state, move |db| {
        let user = db.users().create(new_user)?;
        let token = db.sessions().create(user.id, ttl)?;
        Ok((user, token))
    })
    .await?;

    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token.clone())),
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let user = db_call(&state, move |db| match db.users().get_by_email(&email) {
        Ok(user) => Ok(user),
        Err(DbError::NotFound(_)) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    })
    .await?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(format!("stored password hash is invalid: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let ttl = state.session_ttl;
    let user_id = user.id;
    let token = db_call(&state, move |db| Ok(db.sessions().create(user_id, ttl)?)).await?;

    Ok((
        jar.add(session_cookie(token.clone())),
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = current.token;
    db_call(&state, move |db| Ok(db.sessions().delete(&token)?)).await?;

    Ok((
        StatusCode::NO_CONTENT,
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
    ))
}
