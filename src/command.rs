//! Control requests: mower commands, mow mode, calendar writes and alert
//! housekeeping. Everything is validated here, before a request exists.

use std::fmt;
use std::str::FromStr;

use serde_json::json;

use crate::engine::ApiRequest;
use crate::error::UsageError;
use crate::models::indego::CalendarSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MowerCommand {
    Mow,
    Pause,
    ReturnToDock,
}

impl MowerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            MowerCommand::Mow => "mow",
            MowerCommand::Pause => "pause",
            MowerCommand::ReturnToDock => "returnToDock",
        }
    }
}

impl fmt::Display for MowerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MowerCommand {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mow" => Ok(MowerCommand::Mow),
            "pause" => Ok(MowerCommand::Pause),
            "returnToDock" => Ok(MowerCommand::ReturnToDock),
            other => Err(UsageError::InvalidCommand(other.to_string())),
        }
    }
}

/// Accepts `true`/`false` in lower or title case.
pub fn parse_mow_mode(raw: &str) -> Result<bool, UsageError> {
    match raw {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        other => Err(UsageError::InvalidMowMode(other.to_string())),
    }
}

pub fn command_request(serial: &str, command: MowerCommand) -> ApiRequest {
    ApiRequest::put(format!("alms/{}/state", serial), json!({ "state": command.as_str() }))
}

/// `true` selects predictive (SmartMowing), `false` manual.
pub fn mow_mode_request(serial: &str, enabled: bool) -> ApiRequest {
    ApiRequest::put(format!("alms/{}/predictive", serial), json!({ "enabled": enabled }))
}

pub fn predictive_calendar_request(serial: &str, calendar: &CalendarSelection) -> Result<ApiRequest, UsageError> {
    calendar.validate().map_err(UsageError::InvalidCalendar)?;
    let body = serde_json::to_value(calendar).map_err(|e| UsageError::InvalidCalendar(e.to_string()))?;
    Ok(ApiRequest::put(format!("alms/{}/predictive/calendar", serial), body))
}

pub fn delete_alert_request(alert_id: &str) -> ApiRequest {
    ApiRequest::delete(format!("alerts/{}", alert_id))
}

pub fn alert_read_request(alert_id: &str) -> ApiRequest {
    ApiRequest::put(format!("alerts/{}", alert_id), json!({ "read_status": "read" }))
}
