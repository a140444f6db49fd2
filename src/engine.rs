//! Request engine: the decision logic shared by the blocking and async clients.
//!
//! A [`Call`] is a small state machine for one logical request. The client
//! drives it: it asks for the next [`Step`], performs it (pause, send,
//! re-authenticate) with its own transport, and feeds the result back. The
//! machine never touches the network itself, so both clients retry, back off
//! and classify status codes in exactly the same way.
//!
//! Status handling
//! - 200: JSON when the content type says so, raw bytes otherwise. Any 2xx on
//!   PUT/DELETE/PATCH is [`Payload::Accepted`].
//! - 204, 500, 501, long-poll 504: no payload, not an error. The mower sleeps a
//!   lot and the relay answers 5xx while it does.
//! - 400, 403, 405: no payload, never retried.
//! - 401: re-authenticate once and replay, except on the login call itself.
//! - anything else: logged, or raised when `raise_request_exceptions` is set.
//! - timeouts and connection failures: retried up to [`RetryPolicy::max_attempts`].

use std::time::Duration;

use http::Method;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::error::{IndegoError, UsageError};
use crate::transport::{RawResponse, TransportError};

pub const DEFAULT_API_URL: &str = "https://api.indego.iot.bosch-si.com:443/api/v1/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LONGPOLL_TIMEOUT_SECS: u64 = 120;
/// Upstream resets held connections shortly after five minutes.
pub const MAX_LONGPOLL_TIMEOUT_SECS: u64 = 300;
/// Added to the long-poll hold time so the server gives up before we do.
pub const LONGPOLL_MARGIN: Duration = Duration::from_secs(30);

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
    /// A mutating request was accepted; its body is irrelevant.
    Accepted,
}

/// One logical API call, before session details are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Relative to the API base URL, e.g. `alms/{serial}/state`.
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
    /// The authenticate call: sent without a session and never re-authenticated.
    pub login: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            login: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::PUT | Method::DELETE | Method::PATCH)
    }

    pub fn is_longpoll(&self) -> bool {
        self.query.iter().any(|(k, v)| *k == "longpoll" && v == "true")
    }

    /// Path plus query string, for log lines and error messages.
    pub fn display_path(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Build the state request, optionally forced and/or long-polling.
///
/// `last_state` is the last known state code; the server holds a long-poll
/// open until the code differs from it or the timeout elapses.
pub fn state_request(
    serial: &str,
    force: bool,
    longpoll: bool,
    longpoll_timeout: u64,
    last_state: Option<i64>,
) -> Result<ApiRequest, UsageError> {
    let mut request = ApiRequest::get(format!("alms/{}/state", serial));
    if longpoll {
        if longpoll_timeout == 0 || longpoll_timeout > MAX_LONGPOLL_TIMEOUT_SECS {
            return Err(UsageError::LongpollTimeout(longpoll_timeout));
        }
        request = request
            .with_query("longpoll", "true")
            .with_query("timeout", longpoll_timeout)
            .with_query("last", last_state.unwrap_or(0))
            .with_timeout(Duration::from_secs(longpoll_timeout) + LONGPOLL_MARGIN);
    }
    if force {
        request = request.with_query("forceRefresh", "true");
    }
    Ok(request)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sends per logical request, including the replay after a re-login.
    pub max_attempts: u32,
    /// Zero-based attempt from which each send is preceded by `backoff`.
    pub backoff_from_attempt: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_from_attempt: 3,
            backoff: Duration::from_secs(30),
        }
    }
}

/// What classifying a single response decided.
#[derive(Debug)]
pub enum Outcome {
    Done(Result<Option<Payload>, IndegoError>),
    Reauthenticate,
}

/// Map one HTTP response onto an outcome. Pure; no retry bookkeeping.
pub fn classify(request: &ApiRequest, response: RawResponse, raise: bool) -> Outcome {
    let path = request.display_path();
    let status = response.status;
    match status {
        204 => {
            debug!("204: no content from server for {}", path);
            Outcome::Done(Ok(None))
        }
        200..=299 if request.is_mutating() => Outcome::Done(Ok(Some(Payload::Accepted))),
        200..=299 => {
            if !response.is_json() {
                return Outcome::Done(Ok(Some(Payload::Bytes(response.body))));
            }
            if response.body.is_empty() {
                return Outcome::Done(Ok(None));
            }
            match serde_json::from_slice(&response.body) {
                Ok(value) => Outcome::Done(Ok(Some(Payload::Json(value)))),
                Err(e) => {
                    error!("Invalid JSON from {}: {}", path, e);
                    Outcome::Done(if raise {
                        Err(IndegoError::InvalidBody {
                            path,
                            message: e.to_string(),
                        })
                    } else {
                        Ok(None)
                    })
                }
            }
        }
        400 => {
            error!(
                "400: Bad Request for {}, won't retry. Message: {}",
                path,
                String::from_utf8_lossy(&response.body)
            );
            Outcome::Done(Ok(None))
        }
        401 if request.login => {
            info!("401: Unauthorized on login, credentials rejected");
            Outcome::Done(Ok(None))
        }
        401 => {
            info!("401: Unauthorized for {}, logging in again", path);
            Outcome::Reauthenticate
        }
        403 => {
            error!("403: Forbidden for {}, won't retry", path);
            Outcome::Done(Ok(None))
        }
        405 => {
            error!("405: Method {} not allowed for {}, won't retry", request.method, path);
            Outcome::Done(Ok(None))
        }
        500 => {
            info!("500: Internal Server Error for {}", path);
            Outcome::Done(Ok(None))
        }
        501 => {
            info!("501: Not implemented yet for {}", path);
            Outcome::Done(Ok(None))
        }
        504 if request.is_longpoll() => {
            debug!("504: longpoll stopped, no updates");
            Outcome::Done(Ok(None))
        }
        _ => {
            error!("Request to {} failed with HTTP status code: {}", path, status);
            Outcome::Done(if raise {
                Err(IndegoError::Http { status, path })
            } else {
                Ok(None)
            })
        }
    }
}

/// The next thing the driving client has to do.
#[derive(Debug)]
pub enum Step {
    /// Send the request, after sleeping for `pause` if set.
    Send { pause: Option<Duration> },
    /// Log in again, then report back through [`Call::on_reauthenticated`].
    Reauthenticate,
    Done(Result<Option<Payload>, IndegoError>),
}

/// Retry and re-authentication bookkeeping for one logical request.
#[derive(Debug)]
pub struct Call<'p> {
    request: ApiRequest,
    policy: &'p RetryPolicy,
    raise: bool,
    attempt: u32,
    reauthenticated: bool,
    failed: bool,
}

impl<'p> Call<'p> {
    pub fn new(request: ApiRequest, policy: &'p RetryPolicy, raise: bool) -> Self {
        Call {
            request,
            policy,
            raise,
            attempt: 0,
            reauthenticated: false,
            failed: false,
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Zero-based index of the current send.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the call ended because the mower or server could not be reached.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn start(&mut self) -> Step {
        self.next_attempt()
    }

    pub fn on_response(&mut self, result: Result<RawResponse, TransportError>) -> Step {
        match result {
            Ok(response) => {
                let status = response.status;
                match classify(&self.request, response, self.raise) {
                    Outcome::Reauthenticate if self.reauthenticated => {
                        error!("401: still unauthorized for {} after logging in again", self.request.path);
                        Step::Done(Ok(None))
                    }
                    Outcome::Reauthenticate => {
                        self.reauthenticated = true;
                        Step::Reauthenticate
                    }
                    Outcome::Done(result) => {
                        self.failed = status >= 500 && !(status == 504 && self.request.is_longpoll());
                        Step::Done(result)
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                error!("{}: Timeout on Bosch servers for {}, retrying", e, self.request.path);
                self.attempt += 1;
                self.next_attempt()
            }
            Err(e) => {
                error!("Request to {} gave an unhandled error: {}", self.request.path, e);
                self.failed = true;
                Step::Done(if self.raise {
                    Err(IndegoError::Transport(e.to_string()))
                } else {
                    Ok(None)
                })
            }
        }
    }

    pub fn on_reauthenticated(&mut self, success: bool) -> Step {
        if !success {
            warn!("Logging in again failed, giving up on {}", self.request.path);
            return Step::Done(Ok(None));
        }
        self.attempt += 1;
        self.next_attempt()
    }

    fn next_attempt(&mut self) -> Step {
        if self.attempt >= self.policy.max_attempts {
            warn!(
                "Tried {} times to reach {} but did not succeed, please try again later",
                self.attempt, self.request.path
            );
            self.failed = true;
            return Step::Done(Ok(None));
        }
        let pause = (self.attempt >= self.policy.backoff_from_attempt).then(|| {
            warn!(
                "{} attempts done, waiting {} seconds",
                self.attempt,
                self.policy.backoff.as_secs()
            );
            self.policy.backoff
        });
        Step::Send { pause }
    }
}
