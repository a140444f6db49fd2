//! Blocking HTTP client for the Bosch Indego API.
//!
//! - Blocking client using `ureq` by default; any [`Transport`] can be plugged in.
//! - Retry, backoff and status handling live in [`crate::engine`]; this file
//!   only drives a [`Call`] with blocking I/O.
//! - Fetched data is merged into [`MowerData`], see [`crate::state`].
//!
//! Authentication
//! - Username/password login with a context id, or a bearer token with an
//!   optional refresh callback. A 401 mid-session triggers one re-login.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
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
use crate::transport::{HttpRequest, Transport, UreqTransport};

pub struct IndegoClient<T: Transport = UreqTransport> {
    transport: T,
    session: SessionManager,
    data: MowerData,
    map_filename: Option<PathBuf>,
    raise: bool,
    retry: RetryPolicy,
    timeout: Duration,
}

impl IndegoClient<UreqTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> IndegoClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        IndegoClient {
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
    pub fn start(&mut self) -> Result<bool> {
        if self.session.is_authenticated() {
            return Ok(true);
        }
        self.login()
    }

    /// Release the connection pool.
    pub fn close(self) {
        debug!("Closing client for {:?}", self.session.serial());
    }

    /// Authenticate and list the account's mowers. `Ok(false)` when the
    /// credentials were rejected.
    pub fn login(&mut self) -> Result<bool> {
        debug!("Logging in");
        self.authenticate()
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

    /// Refresh the state and every resource of the regular update cycle.
    ///
    /// Each resource is attempted even when an earlier one failed; the
    /// failures are returned.
    pub fn update_all(&mut self, force: bool) -> Vec<IndegoError> {
        if let Err(e) = self.session.ensure_authenticated() {
            return vec![e.into()];
        }
        let mut errors = Vec::new();
        if let Err(e) = self.update_state(force, false, engine::DEFAULT_LONGPOLL_TIMEOUT_SECS) {
            errors.push(e);
        }
        for resource in Resource::REFRESHED_BY_UPDATE_ALL {
            let result = match resource {
                Resource::UpdatesAvailable => self.update_updates_available(),
                Resource::User if self.session.user_id().is_none() => {
                    debug!("No user id in this session, skipping user");
                    Ok(())
                }
                other => self.update(other),
            };
            if let Err(e) = result {
                warn!("Updating {} failed: {}", resource.name(), e);
                errors.push(e);
            }
        }
        errors
    }

    pub fn update_generic_data(&mut self) -> Result<()> {
        self.update(Resource::GenericData)
    }

    pub fn get_generic_data(&mut self) -> Result<Option<&GenericData>> {
        self.update_generic_data()?;
        Ok(self.data.generic_data.as_ref())
    }

    pub fn update_alerts(&mut self) -> Result<()> {
        self.update(Resource::Alerts)
    }

    pub fn get_alerts(&mut self) -> Result<&[Alert]> {
        self.update_alerts()?;
        Ok(&self.data.alerts)
    }

    pub fn update_last_completed_mow(&mut self) -> Result<()> {
        self.update(Resource::LastCompletedMow)
    }

    pub fn get_last_completed_mow(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.update_last_completed_mow()?;
        Ok(self.data.last_completed_mow)
    }

    pub fn update_next_mow(&mut self) -> Result<()> {
        self.update(Resource::NextMow)
    }

    pub fn get_next_mow(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.update_next_mow()?;
        Ok(self.data.next_mow)
    }

    pub fn update_location(&mut self) -> Result<()> {
        self.update(Resource::Location)
    }

    pub fn get_location(&mut self) -> Result<Option<&Location>> {
        self.update_location()?;
        Ok(self.data.location.as_ref())
    }

    pub fn update_network(&mut self) -> Result<()> {
        self.update(Resource::Network)
    }

    pub fn get_network(&mut self) -> Result<Option<&Network>> {
        self.update_network()?;
        Ok(self.data.network.as_ref())
    }

    pub fn update_operating_data(&mut self) -> Result<()> {
        self.update(Resource::OperatingData)
    }

    pub fn get_operating_data(&mut self) -> Result<Option<&OperatingData>> {
        self.update_operating_data()?;
        Ok(self.data.operating_data.as_ref())
    }

    pub fn update_calendar(&mut self) -> Result<()> {
        self.update(Resource::Calendar)
    }

    pub fn get_calendar(&mut self) -> Result<Option<&Calendar>> {
        self.update_calendar()?;
        Ok(self.data.calendar.as_ref())
    }

    pub fn update_predictive_calendar(&mut self) -> Result<()> {
        self.update(Resource::PredictiveCalendar)
    }

    pub fn get_predictive_calendar(&mut self) -> Result<Option<&Calendar>> {
        self.update_predictive_calendar()?;
        Ok(self.data.predictive_calendar.as_ref())
    }

    pub fn update_predictive_schedule(&mut self) -> Result<()> {
        self.update(Resource::PredictiveSchedule)
    }

    pub fn get_predictive_schedule(&mut self) -> Result<Option<&PredictiveSchedule>> {
        self.update_predictive_schedule()?;
        Ok(self.data.predictive_schedule.as_ref())
    }

    /// Only asked while the mower is online; an offline mower cannot report it.
    pub fn update_updates_available(&mut self) -> Result<()> {
        if !self.data.online {
            debug!("Mower offline, not checking for updates");
            return Ok(());
        }
        self.update(Resource::UpdatesAvailable)
    }

    pub fn get_updates_available(&mut self) -> Result<bool> {
        self.update_updates_available()?;
        Ok(self.data.update_available)
    }

    pub fn update_user(&mut self) -> Result<()> {
        self.update(Resource::User)
    }

    pub fn get_user(&mut self) -> Result<Option<&User>> {
        self.update_user()?;
        Ok(self.data.user.as_ref())
    }

    pub fn update_config(&mut self) -> Result<()> {
        self.update(Resource::Config)
    }

    pub fn get_config(&mut self) -> Result<Option<&Config>> {
        self.update_config()?;
        Ok(self.data.config.as_ref())
    }

    pub fn update_setup(&mut self) -> Result<()> {
        self.update(Resource::Setup)
    }

    pub fn get_setup(&mut self) -> Result<Option<&Setup>> {
        self.update_setup()?;
        Ok(self.data.setup.as_ref())
    }

    pub fn update_security(&mut self) -> Result<()> {
        self.update(Resource::Security)
    }

    pub fn get_security(&mut self) -> Result<Option<&Security>> {
        self.update_security()?;
        Ok(self.data.security.as_ref())
    }

    /// Fetch the live state, merging whatever fields come back.
    ///
    /// With `longpoll` the server holds the request until the state code
    /// differs from the last known one or `longpoll_timeout` seconds pass.
    pub fn update_state(&mut self, force: bool, longpoll: bool, longpoll_timeout: u64) -> Result<()> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let last = self.data.state.as_ref().and_then(|s| s.state);
        let request = engine::state_request(&serial, force, longpoll, longpoll_timeout, last)?;
        let payload = self.execute(request)?;
        self.merge(Resource::State, payload)
    }

    pub fn get_state(&mut self, force: bool, longpoll: bool, longpoll_timeout: u64) -> Result<Option<&State>> {
        self.update_state(force, longpoll, longpoll_timeout)?;
        Ok(self.data.state.as_ref())
    }

    /// Save the garden map (SVG). `filename` replaces the configured target.
    /// Returns whether a map was written.
    pub fn download_map(&mut self, filename: Option<&Path>) -> Result<bool> {
        if let Some(path) = filename {
            self.map_filename = Some(path.to_path_buf());
        }
        let path = self.map_filename.clone().ok_or(UsageError::NoMapFilename)?;
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let bytes = match self.execute(ApiRequest::get(format!("alms/{}/map", serial)))? {
            Some(Payload::Bytes(bytes)) => bytes,
            Some(Payload::Json(value)) => value.to_string().into_bytes(),
            _ => return Ok(false),
        };
        fs::write(&path, bytes)?;
        info!("Map saved to {}", path.display());
        Ok(true)
    }

    // =====================
    // Commands
    // =====================

    /// Send `mow`, `pause` or `returnToDock`. Anything else fails before sending.
    pub fn put_command(&self, command: &str) -> Result<bool> {
        let command: MowerCommand = command.parse()?;
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        self.send_accepted(command::command_request(&serial, command))
    }

    /// `true` switches to predictive (SmartMowing), `false` to manual.
    pub fn put_mow_mode(&self, enabled: bool) -> Result<bool> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        self.send_accepted(command::mow_mode_request(&serial, enabled))
    }

    /// Write the predictive calendar; `None` writes the default nightly windows.
    pub fn put_predictive_cal(&self, calendar: Option<&CalendarSelection>) -> Result<bool> {
        let default;
        let calendar = match calendar {
            Some(c) => c,
            None => {
                default = CalendarSelection::default_predictive();
                &default
            }
        };
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let request = command::predictive_calendar_request(&serial, calendar)?;
        self.send_accepted(request)
    }

    pub fn delete_alert(&mut self, index: usize) -> Result<bool> {
        let Some(alert_id) = self.data.alert_id_at(index)? else {
            return Ok(false);
        };
        let deleted = self.send_accepted(command::delete_alert_request(&alert_id))?;
        if deleted {
            self.data.remove_alert(&alert_id);
        }
        Ok(deleted)
    }

    /// Returns how many alerts were deleted.
    pub fn delete_all_alerts(&mut self) -> Result<usize> {
        let mut deleted = 0;
        for alert_id in self.data.alert_ids()? {
            if self.send_accepted(command::delete_alert_request(&alert_id))? {
                self.data.remove_alert(&alert_id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn put_alert_read(&mut self, index: usize) -> Result<bool> {
        let Some(alert_id) = self.data.alert_id_at(index)? else {
            return Ok(false);
        };
        let read = self.send_accepted(command::alert_read_request(&alert_id))?;
        if read {
            self.data.mark_alert_read(&alert_id);
        }
        Ok(read)
    }

    /// Returns how many alerts were marked read.
    pub fn put_all_alerts_read(&mut self) -> Result<usize> {
        let mut marked = 0;
        for alert_id in self.data.alert_ids()? {
            if self.send_accepted(command::alert_read_request(&alert_id))? {
                self.data.mark_alert_read(&alert_id);
                marked += 1;
            }
        }
        Ok(marked)
    }

    // =====================
    // Request plumbing
    // =====================

    fn update(&mut self, resource: Resource) -> Result<()> {
        self.session.ensure_authenticated()?;
        let serial = self.session.require_serial()?;
        let user_id = self.session.user_id();
        let request = ApiRequest::get(resource.path(&serial, user_id.as_deref())?);
        let payload = self.execute(request)?;
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

    fn send_accepted(&self, request: ApiRequest) -> Result<bool> {
        Ok(matches!(self.execute(request)?, Some(Payload::Accepted)))
    }

    /// One logical request in the current session, re-authenticating on 401.
    fn execute(&self, mut request: ApiRequest) -> Result<Option<Payload>> {
        self.session.ensure_authenticated()?;
        if !request.is_longpoll() {
            request.timeout = self.timeout;
        }
        self.drive(request, |r| self.session.prepare(r), || self.authenticate())
    }

    fn authenticate(&self) -> Result<bool> {
        let pending = match self.session.login_request() {
            Some(request) => {
                let request = request.with_timeout(self.timeout);
                let payload = self.drive(request, |r| self.session.prepare(r), || Ok(false))?;
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
        let listing = self.drive(
            self.session.mowers_request().with_timeout(self.timeout),
            |r| self.session.prepare_pending(r, &pending),
            || Ok(false),
        )?;
        Ok(self.session.commit_login(pending, listing))
    }

    fn drive(
        &self,
        request: ApiRequest,
        prepare: impl Fn(&ApiRequest) -> HttpRequest,
        mut reauthenticate: impl FnMut() -> Result<bool>,
    ) -> Result<Option<Payload>> {
        let mut call = Call::new(request, &self.retry, self.raise);
        let mut step = call.start();
        loop {
            step = match step {
                Step::Send { pause } => {
                    if let Some(duration) = pause {
                        self.transport.pause(duration);
                    }
                    let http = prepare(call.request());
                    call.on_response(self.transport.send(&http))
                }
                Step::Reauthenticate => {
                    let success = reauthenticate()?;
                    call.on_reauthenticated(success)
                }
                Step::Done(result) => {
                    self.session.note_result(call.failed());
                    return result;
                }
            };
        }
    }
}
