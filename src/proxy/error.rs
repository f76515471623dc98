// src/proxy/error.rs
use hyper::{Body, Response, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No live backends available")]
    NoLiveBackends,

    #[error("Max attempts reached after {0} backends")]
    AttemptsExhausted(u32),

    #[error("Failed to read request body: {0}")]
    RequestBody(#[source] hyper::Error),

    #[error("Upstream error: {0}")]
    Upstream(#[from] hyper::Error),

    #[error("Invalid upstream uri: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("Request timeout")]
    Timeout,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoLiveBackends | ProxyError::AttemptsExhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) | ProxyError::InvalidUri(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let message = match status {
            StatusCode::SERVICE_UNAVAILABLE => "Service not available",
            StatusCode::BAD_REQUEST => "Bad request",
            StatusCode::GATEWAY_TIMEOUT => "Gateway timeout",
            _ => "Bad gateway",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response
    }
}
