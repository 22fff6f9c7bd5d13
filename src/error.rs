use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, warn};

use crate::api::validation::ErrorResponse;
use crate::domain::{JobId, JobStatus, UserId};

/// Errors surfaced by the job store and the user directory.
///
/// `Conflict` is how a compare-and-swap reports that the persisted status no
/// longer matches what the caller observed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("job {0} changed concurrently")]
    Conflict(JobId),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Operation-level errors. Every booking operation returns one of these;
/// notification delivery failures are logged by the caller and never mapped
/// here.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("a valid API token is required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("cannot {action} job {job} while it is {status}")]
    InvalidTransition {
        job: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("job {0} was taken or changed by someone else")]
    Conflict(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        BookingError::Forbidden(msg.into())
    }
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::JobNotFound(_) | BookingError::UserNotFound(_) => StatusCode::NOT_FOUND,
            BookingError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            BookingError::Validation(msg) => {
                warn!("Validation error: {}", msg);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: serde_json::json!({"message": msg}),
                })
            }
            BookingError::Unauthenticated => {
                warn!("Request rejected: missing or unknown API token");
                HttpResponse::Unauthorized().json(ErrorResponse {
                    error: "Authentication required".to_string(),
                    fields: serde_json::json!({"message": self.to_string()}),
                })
            }
            BookingError::Forbidden(msg) => {
                warn!("Forbidden: {}", msg);
                HttpResponse::Forbidden().json(ErrorResponse {
                    error: "Forbidden".to_string(),
                    fields: serde_json::json!({"message": msg}),
                })
            }
            BookingError::JobNotFound(id) => {
                warn!("Job not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({"message": format!("Job with id {} not found", id)}),
                })
            }
            BookingError::UserNotFound(id) => {
                warn!("User not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({"message": format!("User with id {} not found", id)}),
                })
            }
            BookingError::InvalidTransition { job, status, action } => {
                warn!("Invalid transition: cannot {} job {} in status {}", action, job, status);
                HttpResponse::UnprocessableEntity().json(ErrorResponse {
                    error: "Invalid job state".to_string(),
                    fields: serde_json::json!({"message": self.to_string()}),
                })
            }
            BookingError::Conflict(id) => {
                warn!("Lost update race on job {}", id);
                HttpResponse::Conflict().json(ErrorResponse {
                    error: "Conflict".to_string(),
                    fields: serde_json::json!({"message": self.to_string()}),
                })
            }
            BookingError::Store(e) => {
                error!("Store error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Internal storage error"}),
                })
            }
        }
    }
}
