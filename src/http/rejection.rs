//! Responses for requests the admission middleware turns away.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Why a request was not passed to the inner handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejection {
    /// Neither a credential nor a client address could be determined.
    ///
    /// Converts to `400 Bad Request`.
    #[error("API_KEY or IP is required")]
    MissingIdentity,

    /// The rate limiter failed, usually because the counter store is down.
    ///
    /// Converts to `500 Internal Server Error`. The cause is logged, never
    /// sent to the client.
    #[error("Internal Server Error")]
    Internal,

    /// The identity has used up its requests for the current window.
    ///
    /// Converts to `429 Too Many Requests`.
    #[error("you have reached the maximum number of requests or actions allowed within a certain time frame")]
    LimitReached,
}

impl AdmissionRejection {
    /// The HTTP status this rejection maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingIdentity => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LimitReached => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AdmissionRejection {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
