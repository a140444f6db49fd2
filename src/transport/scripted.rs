//! In-memory transport replaying canned responses, for tests.

use std::collections::VecDeque;
use std::future::{Future, ready};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use super::{AsyncTransport, HttpRequest, RawResponse, Transport, TransportError};

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    /// Fixed replies by URL suffix, checked before the queue.
    routes: Mutex<Vec<(String, RawResponse)>>,
    sent: Mutex<Vec<HttpRequest>>,
    pauses: Mutex<Vec<Duration>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, reply: Result<RawResponse, TransportError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn json(self, status: u16, body: Value) -> Self {
        self.reply(Ok(RawResponse {
            status,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: serde_json::to_vec(&body).unwrap(),
        }))
    }

    pub(crate) fn status(self, status: u16) -> Self {
        self.reply(Ok(RawResponse {
            status,
            content_type: None,
            body: Vec::new(),
        }))
    }

    pub(crate) fn bytes(self, body: &[u8]) -> Self {
        self.reply(Ok(RawResponse {
            status: 200,
            content_type: Some("image/svg+xml".to_string()),
            body: body.to_vec(),
        }))
    }

    pub(crate) fn timeout(self) -> Self {
        self.reply(Err(TransportError::Timeout("timed out".to_string())))
    }

    /// Answer every request whose URL ends with `suffix`, regardless of order.
    pub(crate) fn route(self, suffix: &str, status: u16, body: Value) -> Self {
        self.routes.lock().unwrap().push((
            suffix.to_string(),
            RawResponse {
                status,
                content_type: Some("application/json".to_string()),
                body: serde_json::to_vec(&body).unwrap(),
            },
        ));
        self
    }

    /// Successful login followed by a one-mower listing for `serial`.
    pub(crate) fn logged_in(self, serial: &str) -> Self {
        self.json(200, serde_json::json!({"contextId": "ctx-1", "userId": "user-1"}))
            .json(200, serde_json::json!([{"alm_sn": serial}]))
    }

    pub(crate) fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_paths(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.url).collect()
    }

    pub(crate) fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }

    fn next(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let routed = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(suffix, _)| request.url.ends_with(suffix.as_str()))
            .map(|(_, response)| response.clone());
        if let Some(response) = routed {
            return Ok(response);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other(format!("no scripted reply for {}", request.url))))
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.next(request)
    }

    fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}

impl AsyncTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        ready(self.next(request))
    }

    fn pause(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.pauses.lock().unwrap().push(duration);
        ready(())
    }
}
