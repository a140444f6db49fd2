//! Collected mower data and the per-resource merge rules.
//!
//! Every fetch ends in [`MowerData::apply`]. A missing payload never touches
//! the stored record (operating data aside, whose absence marks the mower
//! offline). `state` merges field by field; every other resource is replaced.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use log::{info, warn};
use serde_json::Value;

use crate::engine::Payload;
use crate::error::{IndegoError, UsageError};
use crate::models::indego::{
    Alert, Calendar, CalendarSelection, Config, GenericData, LastCutting, Location, Network, NextCutting,
    OperatingData, PredictiveSchedule, Security, Setup, State, UpdatesAvailable, User,
};
use crate::models::lookup;
use crate::utils::decode;

/// An API resource that can be fetched and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    GenericData,
    State,
    OperatingData,
    Alerts,
    LastCompletedMow,
    NextMow,
    Location,
    Network,
    Calendar,
    PredictiveCalendar,
    PredictiveSchedule,
    UpdatesAvailable,
    User,
    Config,
    Setup,
    Security,
}

impl Resource {
    /// What `update_all` refreshes. `State` is fetched separately since it
    /// takes the force flag.
    pub const REFRESHED_BY_UPDATE_ALL: [Resource; 9] = [
        Resource::GenericData,
        Resource::Alerts,
        Resource::LastCompletedMow,
        Resource::Location,
        Resource::NextMow,
        Resource::OperatingData,
        Resource::UpdatesAvailable,
        Resource::User,
        Resource::Network,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Resource::GenericData => "generic data",
            Resource::State => "state",
            Resource::OperatingData => "operating data",
            Resource::Alerts => "alerts",
            Resource::LastCompletedMow => "last completed mow",
            Resource::NextMow => "next mow",
            Resource::Location => "location",
            Resource::Network => "network",
            Resource::Calendar => "calendar",
            Resource::PredictiveCalendar => "predictive calendar",
            Resource::PredictiveSchedule => "predictive schedule",
            Resource::UpdatesAvailable => "updates available",
            Resource::User => "user",
            Resource::Config => "config",
            Resource::Setup => "setup",
            Resource::Security => "security",
        }
    }

    pub fn path(&self, serial: &str, user_id: Option<&str>) -> Result<String, UsageError> {
        let path = match self {
            Resource::GenericData => format!("alms/{}", serial),
            Resource::State => format!("alms/{}/state", serial),
            Resource::OperatingData => format!("alms/{}/operatingData", serial),
            Resource::Alerts => "alerts".to_string(),
            Resource::LastCompletedMow => format!("alms/{}/predictive/lastcutting", serial),
            Resource::NextMow => format!("alms/{}/predictive/nextcutting", serial),
            Resource::Location => format!("alms/{}/predictive/location", serial),
            Resource::Network => format!("alms/{}/network", serial),
            Resource::Calendar => format!("alms/{}/calendar", serial),
            Resource::PredictiveCalendar => format!("alms/{}/predictive/calendar", serial),
            Resource::PredictiveSchedule => format!("alms/{}/predictive/schedule", serial),
            Resource::UpdatesAvailable => format!("alms/{}/updates", serial),
            Resource::User => format!("users/{}", user_id.ok_or(UsageError::UserUnknown)?),
            Resource::Config => format!("alms/{}/config", serial),
            Resource::Setup => format!("alms/{}/setup", serial),
            Resource::Security => format!("alms/{}/security", serial),
        };
        Ok(path)
    }
}

/// Everything known about the mower, as of the last successful fetches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MowerData {
    pub generic_data: Option<GenericData>,
    pub state: Option<State>,
    pub operating_data: Option<OperatingData>,
    pub alerts: Vec<Alert>,
    pub alerts_loaded: bool,
    pub last_completed_mow: Option<DateTime<FixedOffset>>,
    pub next_mow: Option<DateTime<FixedOffset>>,
    pub location: Option<Location>,
    pub network: Option<Network>,
    pub calendar: Option<Calendar>,
    pub predictive_calendar: Option<Calendar>,
    pub predictive_schedule: Option<PredictiveSchedule>,
    pub update_available: bool,
    pub user: Option<User>,
    pub config: Option<Config>,
    pub setup: Option<Setup>,
    pub security: Option<Security>,
    /// Whether the last operating data fetch returned anything.
    pub online: bool,
}

impl MowerData {
    pub fn apply(&mut self, resource: Resource, payload: Option<Payload>) -> Result<(), IndegoError> {
        self.apply_at(resource, payload, Local::now().naive_local())
    }

    /// Merge one fetch result; `now` anchors calendar projections.
    pub fn apply_at(
        &mut self,
        resource: Resource,
        payload: Option<Payload>,
        now: NaiveDateTime,
    ) -> Result<(), IndegoError> {
        let value = match payload {
            Some(Payload::Json(value)) => value,
            Some(Payload::Bytes(_)) => {
                warn!("Expected JSON for {}, got binary data", resource.name());
                Value::Null
            }
            Some(Payload::Accepted) | None => Value::Null,
        };
        if value.is_null() {
            if resource == Resource::OperatingData {
                self.online = false;
            }
            return Ok(());
        }

        match resource {
            Resource::GenericData => {
                self.generic_data = Some(decode::<GenericData>(value)?.derive());
                self.refresh_battery();
            }
            Resource::OperatingData => {
                self.operating_data = Some(decode::<OperatingData>(value)?.derive());
                self.refresh_battery();
                self.online = true;
            }
            Resource::State => {
                let patch = decode::<State>(value)?.derive();
                match self.state.as_mut() {
                    Some(state) => state.merge(patch),
                    None => self.state = Some(patch),
                }
            }
            Resource::Alerts => {
                let alerts: Vec<Alert> = decode(value)?;
                self.alerts = alerts.into_iter().map(Alert::derive).collect();
                self.alerts_loaded = true;
            }
            Resource::LastCompletedMow => {
                self.last_completed_mow = decode::<LastCutting>(value)?.last_mowed;
            }
            Resource::NextMow => {
                self.next_mow = decode::<NextCutting>(value)?.mow_next;
            }
            Resource::Location => self.location = Some(decode(value)?),
            Resource::Network => self.network = Some(decode(value)?),
            Resource::Calendar => {
                if let Some(cal) = first_calendar(value)? {
                    self.calendar = Some(cal.derive(now));
                }
            }
            Resource::PredictiveCalendar => {
                if let Some(cal) = first_calendar(value)? {
                    self.predictive_calendar = Some(cal.derive(now));
                }
            }
            Resource::PredictiveSchedule => {
                self.predictive_schedule = Some(decode::<PredictiveSchedule>(value)?.derive(now));
            }
            Resource::UpdatesAvailable => {
                self.update_available = decode::<UpdatesAvailable>(value)?.available.unwrap_or(false);
            }
            Resource::User => self.user = Some(decode(value)?),
            Resource::Config => self.config = Some(decode(value)?),
            Resource::Setup => self.setup = Some(decode(value)?),
            Resource::Security => self.security = Some(decode(value)?),
        }
        Ok(())
    }

    /// Battery percentage on a 0-100 scale needs both the model's range and a fresh reading.
    fn refresh_battery(&mut self) {
        if let Some(operating) = self.operating_data.as_mut() {
            let range = self.generic_data.as_ref().and_then(|g| g.model_voltage);
            operating.battery.update_percent_adjusted(range);
        }
    }

    pub fn state_description(&self) -> Option<&'static str> {
        match &self.state {
            Some(state) => Some(lookup::state_description(state.state)),
            None => {
                warn!("Please call update_state before asking for the state description");
                None
            }
        }
    }

    pub fn state_description_detail(&self) -> Option<&'static str> {
        match &self.state {
            Some(state) => Some(lookup::state_description_detail(state.state)),
            None => {
                warn!("Please call update_state before asking for the state description");
                None
            }
        }
    }

    pub fn alerts_count(&self) -> usize {
        self.alerts.len()
    }

    /// Upcoming mow windows from the calendar, local time without zone.
    pub fn next_mows(&self) -> Option<Vec<NaiveDateTime>> {
        match &self.calendar {
            Some(calendar) => Some(calendar.next_starts()),
            None => {
                warn!("Please call update_calendar before asking for the next mows");
                None
            }
        }
    }

    /// Upcoming mow windows placed in the time zone of the mower's location.
    pub fn next_mows_with_tz(&self) -> Option<Vec<DateTime<Tz>>> {
        let (Some(location), Some(calendar)) = (&self.location, &self.calendar) else {
            if self.location.is_none() {
                warn!("Please call update_location before asking for the next mows");
            }
            if self.calendar.is_none() {
                warn!("Please call update_calendar before asking for the next mows");
            }
            return None;
        };
        let zone = match location.timezone.as_deref().map(str::parse::<Tz>) {
            Some(Ok(zone)) => zone,
            Some(Err(e)) => {
                warn!("Unknown time zone in location: {}", e);
                return None;
            }
            None => {
                warn!("Location has no time zone");
                return None;
            }
        };
        Some(
            calendar
                .next_starts()
                .into_iter()
                .filter_map(|start| zone.from_local_datetime(&start).earliest())
                .collect(),
        )
    }

    /// Server id of the alert at `index`. `Ok(None)` when there are no alerts.
    pub fn alert_id_at(&self, index: usize) -> Result<Option<String>, UsageError> {
        if !self.alerts_loaded {
            return Err(UsageError::AlertsNotLoaded);
        }
        if self.alerts.is_empty() {
            info!("No alerts to get");
            return Ok(None);
        }
        self.alerts
            .get(index)
            .map(|a| a.alert_id.clone())
            .ok_or(UsageError::AlertIndex {
                index,
                count: self.alerts.len(),
            })
    }

    /// Ids of every loaded alert.
    pub fn alert_ids(&self) -> Result<Vec<String>, UsageError> {
        if !self.alerts_loaded {
            return Err(UsageError::AlertsNotLoaded);
        }
        if self.alerts.is_empty() {
            info!("No alerts to update");
        }
        Ok(self.alerts.iter().filter_map(|a| a.alert_id.clone()).collect())
    }

    pub(crate) fn remove_alert(&mut self, alert_id: &str) {
        self.alerts.retain(|a| a.alert_id.as_deref() != Some(alert_id));
    }

    pub(crate) fn mark_alert_read(&mut self, alert_id: &str) {
        for alert in self.alerts.iter_mut().filter(|a| a.alert_id.as_deref() == Some(alert_id)) {
            alert.read_status = Some("read".to_string());
        }
    }
}

fn first_calendar(value: Value) -> Result<Option<Calendar>, IndegoError> {
    let selection: CalendarSelection = decode(value)?;
    let first = selection.cals.into_iter().next();
    if first.is_none() {
        warn!("Calendar response contained no calendars");
    }
    Ok(first)
}

fn or_dash<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for MowerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.generic_data {
            Some(g) => write!(f, "{} ({})", g.model_description, g.alm_sn.as_deref().unwrap_or("-"))?,
            None => write!(f, "Indego mower")?,
        }
        match self.user.as_ref().and_then(|u| u.display_name.as_deref()) {
            Some(name) => writeln!(f, " owned by {}.", name)?,
            None => writeln!(f, ".")?,
        }
        if let Some(state) = &self.state {
            writeln!(
                f,
                "  state: {} ({}), mowed {}%",
                lookup::state_description(state.state),
                lookup::state_description_detail(state.state),
                or_dash(state.mowed)
            )?;
        }
        if let Some(g) = &self.generic_data {
            writeln!(f, "  mode: {}", g.mowing_mode_description)?;
        }
        if let Some(op) = &self.operating_data {
            writeln!(
                f,
                "  battery: {}% raw, {}% adjusted, {} cycles",
                or_dash(op.battery.percent),
                or_dash(op.battery.percent_adjusted),
                or_dash(op.battery.cycles)
            )?;
            writeln!(
                f,
                "  runtime: {}h operating, {}h charging, {}h cutting",
                or_dash(op.runtime.total.operate),
                or_dash(op.runtime.total.charge),
                or_dash(op.runtime.total.cut)
            )?;
        }
        writeln!(
            f,
            "  last mowed: {}, next mow: {}",
            or_dash(self.last_completed_mow),
            or_dash(self.next_mow)
        )?;
        write!(
            f,
            "  online: {}, alerts: {}, update available: {}",
            self.online,
            self.alerts_count(),
            self.update_available
        )
    }
}
