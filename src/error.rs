use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::i18n::{Locale, Message};

/// AuthErrorCode
///
/// Failure categories reported by the auth provider that the client shows to the user.
/// Anything not listed maps to `Unknown` and gets the generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    Unknown,
}

impl AuthErrorCode {
    /// Maps a GoTrue `error_code` (or the legacy OAuth `error` field) to a category.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "email_exists" | "user_already_exists" => Self::EmailAlreadyInUse,
            "email_address_invalid" | "email_address_not_authorized" => Self::InvalidEmail,
            "weak_password" => Self::WeakPassword,
            "user_not_found" => Self::UserNotFound,
            "invalid_credentials" | "invalid_grant" => Self::WrongPassword,
            "over_request_rate_limit" | "over_email_send_rate_limit" => Self::TooManyRequests,
            _ => Self::Unknown,
        }
    }

    /// Stable code exposed to the client.
    pub fn code(self) -> &'static str {
        match self {
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::InvalidEmail => "auth/invalid-email",
            Self::WeakPassword => "auth/weak-password",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::TooManyRequests => "auth/too-many-requests",
            Self::Unknown => "auth/unknown",
        }
    }

    pub fn message(self) -> Message {
        match self {
            Self::EmailAlreadyInUse => Message::EmailAlreadyInUse,
            Self::InvalidEmail => Message::InvalidEmail,
            Self::WeakPassword => Message::WeakPassword,
            Self::UserNotFound => Message::UserNotFound,
            Self::WrongPassword => Message::WrongPassword,
            Self::TooManyRequests => Message::TooManyRequests,
            Self::Unknown => Message::GenericFailure,
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Self::EmailAlreadyInUse => StatusCode::CONFLICT,
            Self::UserNotFound | Self::WrongPassword => StatusCode::UNAUTHORIZED,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidEmail | Self::WeakPassword | Self::Unknown => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Landmark not found")]
    LandmarkNotFound,

    #[error("Rating {0} is outside 1..=5")]
    InvalidRating(i32),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Auth provider rejected the request: {}", .0.code())]
    Auth(AuthErrorCode),

    #[error("Auth provider error: {0}")]
    AuthProvider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session resolution timed out")]
    SessionTimeout,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::LandmarkNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidRating(_) | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(code) => code.status(),
            AppError::AuthProvider(_) | AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SessionTimeout => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated => "not-authenticated",
            AppError::LandmarkNotFound => "landmark-not-found",
            AppError::InvalidRating(_) => "invalid-rating",
            AppError::MalformedPayload(_) => "malformed-payload",
            AppError::Auth(code) => code.code(),
            AppError::AuthProvider(_) => "auth-provider-unavailable",
            AppError::Storage(_) => "storage-failure",
            AppError::Database(_) => "database-failure",
            AppError::SessionTimeout => "session-timeout",
        }
    }

    fn message(&self) -> Message {
        match self {
            AppError::NotAuthenticated => Message::NotAuthenticated,
            AppError::LandmarkNotFound => Message::LandmarkNotFound,
            AppError::InvalidRating(_) => Message::InvalidRating,
            AppError::MalformedPayload(_) => Message::MalformedPayload,
            AppError::Auth(code) => code.message(),
            AppError::AuthProvider(_) | AppError::Storage(_) | AppError::Database(_) => {
                Message::Unexpected
            }
            AppError::SessionTimeout => Message::ServiceUnavailable,
        }
    }

    /// Attaches the caller's locale so the response message is translated.
    pub fn localize(self, locale: Locale) -> LocalizedError {
        LocalizedError {
            error: self,
            locale,
        }
    }
}

/// ErrorBody
///
/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct LocalizedError {
    pub error: AppError,
    pub locale: Locale,
}

impl IntoResponse for LocalizedError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "request failed");
        } else {
            tracing::debug!(error = %self.error, "request rejected");
        }

        let body = ErrorBody {
            error: self.error.code().to_string(),
            message: self.error.message().text(self.locale).to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.localize(Locale::default()).into_response()
    }
}
