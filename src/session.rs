//! Session and authentication state.
//!
//! Two ways in:
//! - `Basic`: username and password are posted to `authenticate`; the returned
//!   context id goes into `x-im-context-id` on every later call. A 401 mid
//!   session triggers a fresh login.
//! - `Token`: a bearer token obtained elsewhere (SingleKey ID). An optional
//!   refresh callback is asked for a current token before every request.
//!
//! A login is staged in a [`PendingLogin`] and only committed once the mower
//! listing came back, so an abandoned login never leaves the session half
//! updated.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::Method;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::engine::{ApiRequest, Payload};
use crate::error::UsageError;
use crate::models::indego::{LoginResponse, MowerSummary};
use crate::transport::HttpRequest;
use crate::utils::decode;

/// Returns a fresh access token, or `None` to keep the current one.
pub type TokenRefresher = Arc<dyn Fn() -> Option<String> + Send + Sync>;

pub const CONTEXT_HEADER: &str = "x-im-context-id";

pub enum Credentials {
    Basic { username: String, password: SecretString },
    Token { token: SecretString, refresh: Option<TokenRefresher> },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Credentials::Token {
            token: SecretString::from(token.into()),
            refresh: None,
        }
    }

    pub fn token_with_refresh(token: impl Into<String>, refresh: TokenRefresher) -> Self {
        Credentials::Token {
            token: SecretString::from(token.into()),
            refresh: Some(refresh),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Token { refresh, .. } => f
                .debug_struct("Token")
                .field("token", &"[REDACTED]")
                .field("refresh", &refresh.is_some())
                .finish(),
        }
    }
}

/// Snapshot of the session, as seen by callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub authenticated: bool,
    pub context_id: Option<String>,
    pub user_id: Option<String>,
    pub serial: Option<String>,
    pub mowers_in_account: Vec<MowerSummary>,
    /// Consecutive calls that ended without reaching the mower.
    pub offline_failures: u32,
}

/// Identifiers from a successful `authenticate`, not yet committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingLogin {
    context_id: Option<String>,
    user_id: Option<String>,
    serial: Option<String>,
}

pub struct SessionManager {
    credentials: Credentials,
    base_url: String,
    state: Mutex<Session>,
    /// Current bearer token in token mode.
    token: Mutex<Option<SecretString>>,
}

impl SessionManager {
    pub fn new(credentials: Credentials, serial: Option<String>, api_url: &str) -> Self {
        let token = match &credentials {
            Credentials::Token { token, .. } => Some(token.clone()),
            Credentials::Basic { .. } => None,
        };
        let base_url = if api_url.ends_with('/') {
            api_url.to_string()
        } else {
            format!("{}/", api_url)
        };
        SessionManager {
            credentials,
            base_url,
            state: Mutex::new(Session {
                serial,
                ..Session::default()
            }),
            token: Mutex::new(token),
        }
    }

    fn state(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Session {
        self.state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    pub fn ensure_authenticated(&self) -> Result<(), UsageError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(UsageError::NotAuthenticated)
        }
    }

    pub fn serial(&self) -> Option<String> {
        self.state().serial.clone()
    }

    pub fn require_serial(&self) -> Result<String, UsageError> {
        self.serial().ok_or(UsageError::SerialUnknown)
    }

    pub fn user_id(&self) -> Option<String> {
        self.state().user_id.clone()
    }

    pub fn mowers_in_account(&self) -> Vec<MowerSummary> {
        self.state().mowers_in_account.clone()
    }

    pub fn offline_failures(&self) -> u32 {
        self.state().offline_failures
    }

    pub fn is_token_mode(&self) -> bool {
        matches!(self.credentials, Credentials::Token { .. })
    }

    /// The `authenticate` call, or `None` in token mode where there is nothing to post.
    pub fn login_request(&self) -> Option<ApiRequest> {
        match self.credentials {
            Credentials::Basic { .. } => {
                let mut request = ApiRequest::new(Method::POST, "authenticate").with_body(json!({
                    "device": "",
                    "os_type": "Android",
                    "os_version": "4.0",
                    "dvc_manuf": "unknown",
                    "dvc_type": "unknown",
                }));
                request.login = true;
                Some(request)
            }
            Credentials::Token { .. } => None,
        }
    }

    /// Turn the `authenticate` response into a staged login.
    pub fn parse_login(&self, payload: Option<Payload>) -> Option<PendingLogin> {
        match payload {
            Some(Payload::Json(value)) => match decode::<LoginResponse>(value) {
                Ok(response) if response.context_id.is_some() => Some(PendingLogin {
                    context_id: response.context_id,
                    user_id: response.user_id,
                    serial: response.alm_sn,
                }),
                Ok(_) => {
                    warn!("Login response carried no context id");
                    None
                }
                Err(e) => {
                    warn!("Unreadable login response: {}", e);
                    None
                }
            },
            _ => {
                info!("Login failed, check your credentials");
                None
            }
        }
    }

    pub fn mowers_request(&self) -> ApiRequest {
        let mut request = ApiRequest::get("alms");
        // a 401 here means the credentials are bad, there is nothing to retry with
        request.login = self.is_token_mode();
        request
    }

    /// Commit a login once the mower listing is back. Returns whether the
    /// session is now authenticated.
    pub fn commit_login(&self, pending: PendingLogin, mowers: Option<Payload>) -> bool {
        let listing = match mowers {
            Some(Payload::Json(value)) => match decode::<Vec<MowerSummary>>(value) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("Unreadable mower listing: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut state = self.state();
        if self.is_token_mode() && listing.is_none() {
            info!("Token rejected or mower listing unavailable");
            state.authenticated = false;
            return false;
        }

        state.authenticated = true;
        state.context_id = pending.context_id;
        if pending.user_id.is_some() {
            state.user_id = pending.user_id;
        }
        if state.serial.is_none() {
            state.serial = pending.serial;
        }
        match listing {
            Some(list) => {
                if state.serial.is_none() {
                    state.serial = list.iter().find_map(|m| m.alm_sn.clone());
                    if let Some(serial) = &state.serial {
                        info!("Found {} mower(s), using {}", list.len(), serial);
                    }
                }
                state.mowers_in_account = list;
            }
            None => warn!("Could not list the mowers in this account"),
        }
        if state.serial.is_none() {
            warn!("No mower serial known for this account");
        }
        debug!("Logged in, user {:?}", state.user_id);
        true
    }

    pub fn fail_login(&self) {
        self.state().authenticated = false;
    }

    /// Resolve a logical request into a wire request for the current session.
    pub fn prepare(&self, request: &ApiRequest) -> HttpRequest {
        let context_id = self.state().context_id.clone();
        self.build(request, context_id)
    }

    /// Like [`prepare`](Self::prepare), using the identifiers of a staged login.
    pub fn prepare_pending(&self, request: &ApiRequest, pending: &PendingLogin) -> HttpRequest {
        self.build(request, pending.context_id.clone())
    }

    fn build(&self, request: &ApiRequest, context_id: Option<String>) -> HttpRequest {
        let mut headers = vec![("Content-Type", "application/json".to_string())];
        match &self.credentials {
            Credentials::Basic { username, password } if request.login => {
                let raw = format!("{}:{}", username, password.expose_secret());
                headers.push(("Authorization", format!("Basic {}", BASE64.encode(raw))));
            }
            Credentials::Basic { .. } => {
                if let Some(id) = context_id {
                    headers.push((CONTEXT_HEADER, id));
                }
            }
            Credentials::Token { refresh, .. } => {
                let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(fresh) = refresh.as_ref().and_then(|f| f()) {
                    *token = Some(SecretString::from(fresh));
                }
                if let Some(token) = token.as_ref() {
                    headers.push(("Authorization", format!("Bearer {}", token.expose_secret())));
                }
            }
        }
        HttpRequest {
            method: request.method.clone(),
            url: format!("{}{}", self.base_url, request.path),
            query: request.query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            headers,
            body: request.body.clone(),
            timeout: request.timeout,
        }
    }

    /// Track reachability across calls.
    pub fn note_result(&self, failed: bool) {
        let mut state = self.state();
        if failed {
            state.offline_failures += 1;
        } else {
            state.offline_failures = 0;
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .field("state", &self.snapshot())
            .finish()
    }
}
