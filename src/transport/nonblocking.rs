//! Async transport using `reqwest`.

use log::trace;

use super::{AsyncTransport, HttpRequest, RawResponse, TransportError};

/// Holds one `reqwest::Client`; its connection pool lives as long as the transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("building http client failed: {}", e)))?;
        Ok(ReqwestTransport { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

impl AsyncTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        trace!("{} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout)
            .query(&request.query);
        for (k, v) in &request.headers {
            builder = builder.header(*k, v.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(TransportError::from)?;
        Ok(RawResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            TransportError::Timeout(value.to_string())
        } else if value.is_connect() {
            TransportError::Connect(value.to_string())
        } else {
            TransportError::Other(value.to_string())
        }
    }
}
