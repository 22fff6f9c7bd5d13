use actix_web::HttpRequest;

use crate::booking::BookingService;
use crate::domain::User;
use crate::error::BookingError;

pub mod booking;
pub mod health;
pub mod validation;

// Re-export commonly used items
pub use booking::booking_config;
pub use health::health_config;

/// Header carrying the caller's API token.
pub const API_TOKEN_HEADER: &str = "X-Api-Token";

fn token_from_headers(req: &HttpRequest) -> Option<&str> {
    if let Some(value) = req.headers().get(API_TOKEN_HEADER) {
        return value.to_str().ok().map(str::trim);
    }
    req.headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Resolves the calling user from `X-Api-Token` or a bearer token.
pub async fn authenticate(
    service: &BookingService,
    req: &HttpRequest,
) -> Result<User, BookingError> {
    let token = token_from_headers(req).ok_or(BookingError::Unauthenticated)?;
    service.authenticate(token).await
}
