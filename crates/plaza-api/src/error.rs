use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use plaza_db::DbError;
use plaza_gateway::GatewayError;
use plaza_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not signed in")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{0}")]
    Internal(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Forbidden(reason) => Self::Forbidden(reason),
            GatewayError::Db(e) => Self::Db(e),
            GatewayError::Join(e) => Self::Internal(format!("spawn_blocking join error: {e}")),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Db(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Db(DbError::AlreadyExists(_) | DbError::InvalidState(_)) => StatusCode::CONFLICT,
            Self::Db(DbError::InvalidInput(_) | DbError::InvalidReference) => {
                StatusCode::BAD_REQUEST
            }
            Self::Db(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Server errors are logged in full; the client only sees a generic message.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Reject blank required text.
pub(crate) fn require_text(value: &str, field: &'static str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}
