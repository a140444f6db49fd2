//! Async HTTP client for the Bosch Indego API.
//!
//! Same surface as [`IndegoClient`](crate::client::IndegoClient), driven by an
//! [`AsyncTransport`] (`reqwest` by default). Backoff sleeps without blocking
//! the runtime and `update_all` fetches every resource concurrently.
//!
//! Dropping a future mid-request is safe: a login only lands in the session
//! once it completed, and fetched data is merged after the fetch returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures_util::future::join_all;
use log::{debug, info, warn};

use crate::command::{self, MowerCommand};
use crate::config::ClientConfig;
use crate::engine::{self, ApiRequest, Call, Payload, RetryPolicy, Step};
use crate::error::{IndegoError, Result, UsageError};
use crate::models::indego::{
    Alert, Calendar, CalendarSelection, Config, GenericData, Location, MowerSummary, Network, OperatingData,
    PredictiveSchedule, Security, Setup, State, User,
};
use crate::session::{PendingLogin, Session, SessionManager};
use crate::state::{MowerData, Resource};
use crate::transport::{AsyncTransport, ReqwestTransport};

pub struct IndegoAsyncClient<T: AsyncTransport = ReqwestTransport> {
    transport: T,
    session: SessionManager,
    data: MowerData,
    map_filename: Option<PathBuf>,
    raise: bool,
    retry: RetryPolicy,
    timeout: Duration,
}

impl IndegoAsyncClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new().map_err(|e| IndegoError::Transport(e.to_string()))?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: AsyncTransport + Sync> IndegoAsyncClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        IndegoAsyncClient {
            transport,
            session: SessionManager::new(config.credentials, config.serial, &config.api_url),
            data: MowerData::default(),
            map_filename: config.map_filename,
            raise: config.raise_request_exceptions,
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    /// Log in unless already authenticated.
    pub async fn start(&mut self) -> Result<bool> {
        if self.session.is_authenticated() {
            return Ok(true);
        }
        self.login().await
    }

    /// Release the connection pool.
    pub async fn close(self) {
        debug!("Closing client for {:?}", self.session.serial());
        drop(self);
    }

    pub async fn login(&mut self) -> Result<bool> {
        debug!("Logging in");
        self.authenticate().await
    }

    pub fn session(&self) -> Session {
        self.session.snapshot()
    }

    pub fn data(&self) -> &MowerData {
        &self.data
    }

    pub fn serial(&self) -> Option<String> {
        let serial = self.session.serial();
        if serial.is_none() {
            warn!("Serial not yet set, please login first");
        }
        serial
    }

    pub fn mowers_in_account(&self) -> Vec<MowerSummary> {
        self.session.mowers_in_account()
    }

    pub fn map_filename(&self) -> Option<&Path> {
        self.map_filename.as_deref()
    }

    // =====================
    // Updates
    // =====================

    /// Fetch the state and every resource of the regular update cycle
    /// concurrently. A failing resource does not cancel the others; the
    /// failures are returned.
    pub async fn update_all(&mut self, force: bool) -> Vec<IndegoError> {
        let mut errors = Vec::new();
        let serial = match self
            .session
            .ensure_authenticated()
            .and_then(|_| self.session.require_serial())
        {
            Ok(serial) => serial,
            Err(e) => return vec![e.into()],
        };
        let user_id = self.session.user_id();

        let mut jobs = Vec::new();
        let last = self.data.state.as_ref().and_then(|s| s.state);
        match engine::state_request(&serial, force, false, engine::DEFAULT_LONGPOLL_TIMEOUT_SECS, last) {
            Ok(request) => jobs.push((Resource::State, request)),
            Err(e) => errors.push(e.into()),
        }
        for resource in Resource::REFRESHED_BY_UPDATE_ALL {
            match resource {
                Resource::UpdatesAvailable if !self.data.online => {
                    debug!("Mower offline, not checking for updates");
                    continue;
                }
                Resource::User if user_id.is_none() => {
                    debug!("No user id in this session, skipping user");
                    continue;
                }
                _ => {}
            }
            match resource.path(&serial, user_id.as_deref()) {
                Ok(path) => jobs.push((resource, ApiRequest::get(path))),
                Err(e) => errors.push(e.into()),
            }
        }

        let results = join_all(jobs.iter().map(|(_, request)| self.execute(request.clone()))).await;
        for ((resource, _), result) in jobs.into_iter().zip(results) {
            let merged = result.and_then(|payload| self.merge(resource, payload));
            if let Err(e) = merged {
                warn!("Updating {} failed: {}", resource.name(), e);
                errors.push(e);
            }
        }
        errors
    }

    pub async fn update_generic_data(&mut self) -> Result<()> {
        self.update(Resource::GenericData).await
    }

    pub async fn get_generic_data(&mut self) -> Result<Option<&GenericData>> {
        self.update_generic_data().await?;
        Ok(self.data.generic_data.as_ref())
    }

    pub async fn update_alerts(&mut self) -> Result<()> {
        self.update(Resource::Alerts).await
    }

    pub async fn get_alerts(&mut self) -> Result<&[Alert]> {
        self.update_alerts().await?;
        Ok(&self.data.alerts)
    }

    pub async fn update_last_completed_mow(&mut self) -> Result<()> {
        self.update(Resource::LastCompletedMow).await
    }

    pub async fn get_last_completed_mow(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.update_last_completed_mow().await?;
        Ok(self.data.last_completed_mow)
    }

    pub async fn update_next_mow(&mut self) -> Result<()> {
        self.update(Resource::NextMow).await
    }

    pub async fn get_next_mow(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.update_next_mow().await?;
        Ok(self.data.next_mow)
    }

    pub async fn update_location(&mut self) -> Result<()> {
        self.update(Resource::Location).await
    }

    pub async fn get_location(&mut self) -> Result<Option<&Location>> {
        self.update_location().await?;
        Ok(self.data.location.as_ref())
    }

    pub async fn update_network(&mut self) -> Result<()> {
        self.update(Resource::Network).await
    }

    pub async fn get_network(&mut self) -> Result<Option<&Network>> {
        self.update_network().await?;
        Ok(self.data.network.as_ref())
    }

    pub async fn update_operating_data(&mut self) -> Result<()> {
        self.update(Resource::OperatingData).await
    }

    pub async fn get_operating_data(&mut self) -> Result<Option<&OperatingData>> {
        self.update_operating_data().await?;
        Ok(self.data.operating_data.as_ref())
    }

    pub async fn update_calendar(&mut self) -> Result<()> {
        self.update(Resource::Calendar).await
    }

    pub async fn get_calendar(&mut self) -> Result<Option<&Calendar>> {
        self.update_calendar().await?;
        Ok(self.data.calendar.as_ref())
    }

    pub async fn update_predictive_calendar(&mut self) -> Result<()> {
        self.update(Resource::PredictiveCalendar).await
    }

    pub async fn get_predictive_calendar(&mut self) -> Result<Option<&Calendar>> {
        self.update_predictive_calendar().await?;
        Ok(self.data.predictive_calendar.as_ref())
    }

    pub async fn update_predictive_schedule(&mut self) -> Result<()> {
        self.update(Resource::PredictiveSchedule).await
    }

    pub async fn get_predictive_schedule(&mut self) -> Result<Option<&PredictiveSchedule>> {
        self.update_predictive_schedule().await?;
        Ok(self.data.predictive_schedule.as_ref())
    }

    pub async fn update_updates_available(&mut self) -> Result<()> {
        if !self.data.online {
            debug!("Mower offline, not checking for updates");
            return Ok(());
        }
        self.update(Resource::UpdatesAvailable).await
    }

    pub async fn get_updates_available(&mut self) -> Result<bool> {
        self.update_updates_available().await?;
        Ok(self.data.update_available)
    }

    pub async fn update_user(&mut self) -> Result<()> {
        self.update(Resource::User).await
    }

    pub async fn get_user(&mut self) -> Result<Option<&User>> {
        self.update_user().await?;
        Ok(self.data.user.as_ref())
    }

    pub async fn update_config(&mut self) -> Result<()> {
        self.update(Resource::Config).await
    }

    pub async fn get_config(&mut self) -> Result<Option<&Config>> {
        self.update_config().await?;
        Ok(self.data.config.as_ref())
    }

    pub async fn update_setup(&mut self) -> Result<()> {
        self.update(Resource::Setup).await
    }

    pub async fn get_setup(&mut self) -> Result<Option<&Setup>> {
        self.update_setup().await?;
        Ok(self.data.setup.as_ref())
    }

    pub async fn update_security(&mut self) -> Result<()> {
        self.update(Resource::Security).await
    }

    pub async fn get_security(&mut self) -> Result<Option<&Security>> {
        self.update_security().await?;
        Ok(self.data.security.as_ref())
    }

    pub async fn update_state(&mut self, force: bool, longpoll: bool, longpoll_timeout: u64) -> Result<()> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let last = self.data.state.as_ref().and_then(|s| s.state);
        let request = engine::state_request(&serial, force, longpoll, longpoll_timeout, last)?;
        let payload = self.execute(request).await?;
        self.merge(Resource::State, payload)
    }

    pub async fn get_state(&mut self, force: bool, longpoll: bool, longpoll_timeout: u64) -> Result<Option<&State>> {
        self.update_state(force, longpoll, longpoll_timeout).await?;
        Ok(self.data.state.as_ref())
    }

    pub async fn download_map(&mut self, filename: Option<&Path>) -> Result<bool> {
        if let Some(path) = filename {
            self.map_filename = Some(path.to_path_buf());
        }
        let path = self.map_filename.clone().ok_or(UsageError::NoMapFilename)?;
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let bytes = match self.execute(ApiRequest::get(format!("alms/{}/map", serial))).await? {
            Some(Payload::Bytes(bytes)) => bytes,
            Some(Payload::Json(value)) => value.to_string().into_bytes(),
            _ => return Ok(false),
        };
        tokio::fs::write(&path, bytes).await?;
        info!("Map saved to {}", path.display());
        Ok(true)
    }

    // =====================
    // Commands
    // =====================

    pub async fn put_command(&self, command: &str) -> Result<bool> {
        let command: MowerCommand = command.parse()?;
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        self.send_accepted(command::command_request(&serial, command)).await
    }

    pub async fn put_mow_mode(&self, enabled: bool) -> Result<bool> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        self.send_accepted(command::mow_mode_request(&serial, enabled)).await
    }

    pub async fn put_predictive_cal(&self, calendar: Option<&CalendarSelection>) -> Result<bool> {
        let default = CalendarSelection::default_predictive();
        let calendar = calendar.unwrap_or(&default);
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let request = command::predictive_calendar_request(&serial, calendar)?;
        self.send_accepted(request).await
    }

    pub async fn delete_alert(&mut self, index: usize) -> Result<bool> {
        let Some(alert_id) = self.data.alert_id_at(index)? else {
            return Ok(false);
        };
        let deleted = self.send_accepted(command::delete_alert_request(&alert_id)).await?;
        if deleted {
            self.data.remove_alert(&alert_id);
        }
        Ok(deleted)
    }

    pub async fn delete_all_alerts(&mut self) -> Result<usize> {
        let ids = self.data.alert_ids()?;
        let results = join_all(ids.iter().map(|id| self.send_accepted(command::delete_alert_request(id)))).await;
        let mut deleted = 0;
        for (id, result) in ids.iter().zip(results) {
            if result? {
                self.data.remove_alert(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn put_alert_read(&mut self, index: usize) -> Result<bool> {
        let Some(alert_id) = self.data.alert_id_at(index)? else {
            return Ok(false);
        };
        let read = self.send_accepted(command::alert_read_request(&alert_id)).await?;
        if read {
            self.data.mark_alert_read(&alert_id);
        }
        Ok(read)
    }

    pub async fn put_all_alerts_read(&mut self) -> Result<usize> {
        let ids = self.data.alert_ids()?;
        let results = join_all(ids.iter().map(|id| self.send_accepted(command::alert_read_request(id)))).await;
        let mut marked = 0;
        for (id, result) in ids.iter().zip(results) {
            if result? {
                self.data.mark_alert_read(id);
                marked += 1;
            }
        }
        Ok(marked)
    }

    // =====================
    // Request plumbing
    // =====================

    async fn update(&mut self, resource: Resource) -> Result<()> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let user_id = self.session.user_id();
        let request = ApiRequest::get(resource.path(&serial, user_id.as_deref())?);
        let payload = self.execute(request).await?;
        self.merge(resource, payload)
    }

    fn merge(&mut self, resource: Resource, payload: Option<Payload>) -> Result<()> {
        match self.data.apply(resource, payload) {
            Err(e) if !self.raise => {
                warn!("Ignoring unreadable {} response: {}", resource.name(), e);
                Ok(())
            }
            result => result,
        }
    }

    async fn send_accepted(&self, request: ApiRequest) -> Result<bool> {
        Ok(matches!(self.execute(request).await?, Some(Payload::Accepted)))
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<Option<Payload>> {
        self.session.ensure_authenticated()?;
        if !request.is_longpoll() {
            request.timeout = self.timeout;
        }
        let mut call = Call::new(request, &self.retry, self.raise);
        let mut step = call.start();
        loop {
            step = match step {
                Step::Send { pause } => {
                    if let Some(duration) = pause {
                        self.transport.pause(duration).await;
                    }
                    let http = self.session.prepare(call.request());
                    let response = self.transport.send(&http).await;
                    call.on_response(response)
                }
                Step::Reauthenticate => {
                    let success = self.authenticate().await?;
                    call.on_reauthenticated(success)
                }
                Step::Done(result) => {
                    self.session.note_result(call.failed());
                    return result;
                }
            };
        }
    }

    async fn authenticate(&self) -> Result<bool> {
        let pending = match self.session.login_request() {
            Some(request) => {
                let payload = self.login_call(request, None).await?;
                match self.session.parse_login(payload) {
                    Some(pending) => pending,
                    None => {
                        self.session.fail_login();
                        return Ok(false);
                    }
                }
            }
            None => PendingLogin::default(),
        };
        let listing = self.login_call(self.session.mowers_request(), Some(&pending)).await?;
        Ok(self.session.commit_login(pending, listing))
    }

    /// Like `execute`, for the calls of a login in progress. A 401 here ends the call.
    async fn login_call(&self, request: ApiRequest, pending: Option<&PendingLogin>) -> Result<Option<Payload>> {
        let request = request.with_timeout(self.timeout);
        let mut call = Call::new(request, &self.retry, self.raise);
        let mut step = call.start();
        loop {
            step = match step {
                Step::Send { pause } => {
                    if let Some(duration) = pause {
                        self.transport.pause(duration).await;
                    }
                    let http = match pending {
                        Some(pending) => self.session.prepare_pending(call.request(), pending),
                        None => self.session.prepare(call.request()),
                    };
                    let response = self.transport.send(&http).await;
                    call.on_response(response)
                }
                Step::Reauthenticate => call.on_reauthenticated(false),
                Step::Done(result) => {
                    self.session.note_result(call.failed());
                    return result;
                }
            };
        }
    }
}
