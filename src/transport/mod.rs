//! The seam between the request engine and the network.
//!
//! Transports move one [`HttpRequest`] over the wire and hand back the raw
//! status, content type and body. They never interpret status codes; that is
//! the engine's job, so blocking and async clients classify identically.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use http::Method;
use serde_json::Value;

pub mod blocking;
pub mod nonblocking;
#[cfg(test)]
pub(crate) mod scripted;

pub use blocking::UreqTransport;
pub use nonblocking::ReqwestTransport;

/// A fully resolved request: absolute URL, auth and context headers applied.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// True for `application/json`, ignoring parameters such as `charset`.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    Timeout(String),
    /// DNS, TCP or TLS failure before a response arrived.
    Connect(String),
    Other(String),
}

impl TransportError {
    /// Timeouts and connection drops are routine while the mower sleeps.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connect(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout(s) => write!(f, "timeout: {}", s),
            TransportError::Connect(s) => write!(f, "connection failed: {}", s),
            TransportError::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for TransportError {}

/// Blocking transport.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;

    /// Backoff between retries.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// Non-blocking transport.
pub trait AsyncTransport {
    fn send(&self, request: &HttpRequest) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;

    fn pause(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>) -> RawResponse {
        RawResponse {
            status: 200,
            content_type: content_type.map(str::to_string),
            body: Vec::new(),
        }
    }

    #[test]
    fn json_detection_ignores_parameters() {
        assert!(response(Some("application/json")).is_json());
        assert!(response(Some("application/json; charset=utf-8")).is_json());
        assert!(response(Some("Application/JSON;")).is_json());
        assert!(!response(Some("image/svg+xml")).is_json());
        assert!(!response(None).is_json());
    }

    #[test]
    fn only_timeouts_and_connect_errors_retry() {
        assert!(TransportError::Timeout("t".into()).is_retryable());
        assert!(TransportError::Connect("c".into()).is_retryable());
        assert!(!TransportError::Other("o".into()).is_retryable());
    }
}
