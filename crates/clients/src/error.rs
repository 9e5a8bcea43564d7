use std::fmt;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// External service a request was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Backend state store
    Backend,
    /// Sentry monitoring provider
    Sentry,
    /// Slack chat provider
    Slack,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backend => "backend",
            Self::Sentry => "sentry",
            Self::Slack => "slack",
        })
    }
}

/// Errors returned by the HTTP clients.
#[derive(Debug, Error)]
pub enum Error {
    /// The service answered with an unexpected status or a failure flag.
    #[error("{service} request failed with status {status}: {message}")]
    ExternalApi {
        /// Service that failed
        service: Service,
        /// HTTP status of the response
        status: StatusCode,
        /// Error message reported by the service
        message: String,
    },
    /// The service kept rejecting credentials after re-authenticating.
    #[error("{service} rejected the credentials after re-authenticating")]
    Unauthorized {
        /// Service that rejected the credentials
        service: Service,
    },
    /// A required response header was absent or not valid text.
    #[error("{service} response is missing the `{header}` header")]
    MissingHeader {
        /// Service that sent the response
        service: Service,
        /// Header name
        header: &'static str,
    },
    /// Transport level failure or undecodable body.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body had an unexpected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    /// A request URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Status reported by the service, if the failure came from a response.
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ExternalApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Return the response if its status equals `expected`, otherwise an [`Error::ExternalApi`]
/// carrying the service's reported message.
pub(crate) async fn expect_status(
    service: Service,
    resp: Response,
    expected: StatusCode,
) -> Result<Response> {
    if resp.status() == expected {
        return Ok(resp);
    }
    Err(external_api_error(service, resp).await)
}

/// Build an [`Error::ExternalApi`] from a failed response.
pub(crate) async fn external_api_error(service: Service, resp: Response) -> Error {
    #[derive(Deserialize)]
    struct Body {
        error: String,
    }

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<Body>(&text) {
        Ok(body) => body.error,
        Err(_) if !text.trim().is_empty() => text,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_owned(),
    };
    Error::ExternalApi { service, status, message }
}
