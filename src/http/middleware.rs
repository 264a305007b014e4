//! Admission middleware.
//!
//! Every request is resolved to an identity (API credential header, else
//! client IP), checked against the rate limiter, and either passed to the
//! inner handler untouched or rejected. Each request ends in exactly one of:
//! missing identity (400), limiter error (500), denied (429), or allowed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{self, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, instrument, trace};

use super::rejection::AdmissionRejection;
use crate::ratelimit::{Decision, Identity, RateLimiter, StoreError};

/// Header carrying the API credential unless configured otherwise.
pub const DEFAULT_IDENTITY_HEADER: &str = "api_key";

/// Shared state of the admission middleware.
#[derive(Clone)]
pub struct Admission {
    /// The rate limiter deciding each request
    limiter: Arc<RateLimiter>,
    /// Header carrying the API credential
    identity_header: HeaderName,
    /// Deadline for a single rate limit check
    store_timeout: Option<Duration>,
}

impl Admission {
    /// Create admission state around a rate limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
            store_timeout: None,
        }
    }

    /// Read the credential from `header` instead of `API_KEY`.
    pub fn with_identity_header(mut self, header: HeaderName) -> Self {
        self.identity_header = header;
        self
    }

    /// Fail a check with a server error when the store does not answer in time.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// The header the credential is read from.
    pub fn identity_header(&self) -> &HeaderName {
        &self.identity_header
    }

    /// Resolve the identity a request is counted under.
    ///
    /// The credential header wins when present and non-empty; otherwise the
    /// host part of the peer address is used. Header bytes are taken as
    /// UTF-8, with invalid sequences replaced, so a non-empty credential is
    /// never demoted to the address.
    pub fn identify<B>(&self, request: &http::Request<B>) -> Option<Identity> {
        let credential = request
            .headers()
            .get(&self.identity_header)
            .map(|value| String::from_utf8_lossy(value.as_bytes()));

        let address = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string());

        Identity::resolve(credential.as_deref(), address.as_deref())
    }

    /// Run the rate limit check for an identity.
    pub async fn evaluate(&self, identity: &Identity) -> Result<(), AdmissionRejection> {
        match self.check(identity).await {
            Ok(Decision::Allow) => {
                trace!(kind = %identity.kind(), "Request admitted");
                Ok(())
            }
            Ok(Decision::Deny) => {
                debug!(kind = %identity.kind(), "Request rejected: rate limit reached");
                Err(AdmissionRejection::LimitReached)
            }
            Err(e) => {
                error!(kind = %identity.kind(), error = %e, "Rate limit check failed");
                Err(AdmissionRejection::Internal)
            }
        }
    }

    async fn check(&self, identity: &Identity) -> Result<Decision, StoreError> {
        let Some(limit) = self.store_timeout else {
            return self.limiter.check(identity).await;
        };

        tokio::time::timeout(limit, self.limiter.check(identity))
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Unavailable(format!(
                    "no reply within {}",
                    humantime::format_duration(limit)
                )))
            })
    }
}

/// Admission middleware for use with `axum::middleware::from_fn_with_state`.
#[instrument(
    skip_all,
    fields(method = %request.method(), path = %request.uri().path())
)]
pub async fn admit(State(admission): State<Admission>, request: Request, next: Next) -> Response {
    let Some(identity) = admission.identify(&request) else {
        debug!("Request rejected: no credential or client address");
        return AdmissionRejection::MissingIdentity.into_response();
    };

    match admission.evaluate(&identity).await {
        Ok(()) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}
