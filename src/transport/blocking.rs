//! Blocking transport using `ureq`.
//!
//! One agent per client so connections are pooled across calls. Status codes
//! are returned as data, not errors; the engine decides what they mean.

use http::Method;
use log::trace;
use ureq::typestate::{WithBody, WithoutBody};
use ureq::{Agent, RequestBuilder};

use super::{HttpRequest, RawResponse, Transport, TransportError};

pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let config = Agent::config_builder().http_status_as_error(false).build();
        UreqTransport { agent: config.into() }
    }

    /// Use a preconfigured agent. It must not turn status codes into errors.
    pub fn with_agent(agent: Agent) -> Self {
        UreqTransport { agent }
    }

    fn prepare<B>(builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
        let mut builder = builder.config().timeout_global(Some(request.timeout)).build();
        for (k, v) in &request.query {
            builder = builder.query(k.as_str(), v.as_str());
        }
        for (k, v) in &request.headers {
            builder = builder.header(*k, v.as_str());
        }
        builder
    }

    fn without_body(builder: RequestBuilder<WithoutBody>, request: &HttpRequest) -> Result<http::Response<ureq::Body>, ureq::Error> {
        Self::prepare(builder, request).call()
    }

    fn with_body(builder: RequestBuilder<WithBody>, request: &HttpRequest) -> Result<http::Response<ureq::Body>, ureq::Error> {
        let builder = Self::prepare(builder, request);
        match &request.body {
            Some(body) => builder.send_json(body),
            None => builder.send_empty(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        trace!("{} {}", request.method, request.url);
        let url = request.url.as_str();
        let result = match request.method {
            Method::GET => Self::without_body(self.agent.get(url), request),
            Method::DELETE => Self::without_body(self.agent.delete(url), request),
            Method::POST => Self::with_body(self.agent.post(url), request),
            Method::PUT => Self::with_body(self.agent.put(url), request),
            Method::PATCH => Self::with_body(self.agent.patch(url), request),
            ref other => return Err(TransportError::Other(format!("unsupported method {}", other))),
        };
        let response = result.map_err(TransportError::from)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.into_body().read_to_vec().map_err(TransportError::from)?;
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

impl From<ureq::Error> for TransportError {
    fn from(value: ureq::Error) -> Self {
        let message = value.to_string();
        match value {
            ureq::Error::Timeout(_) => TransportError::Timeout(message),
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => TransportError::Timeout(message),
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
                TransportError::Connect(message)
            }
            _ => TransportError::Other(message),
        }
    }
}
