//! Records for the Indego API resources.
//!
//! Notes
//! - Every wire field is optional; the API omits fields freely and `None` means "not reported".
//! - Fields marked `#[serde(skip)]` are derived after decoding (descriptions, adjusted battery,
//!   calendar projections) and are never sent back.
//! - Field names keep the API's spelling via `rename` where it is not snake_case.

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::models::lookup::{self, ModelVoltage};
use crate::utils::{
    deserialize_bosch_datetime, deserialize_lenient_f64, deserialize_lenient_string, next_occurrence,
};

// =====================
// Session / account
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub context_id: Option<String>,
    pub user_id: Option<String>,
    pub alm_sn: Option<String>,
}

/// One entry of the `alms` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MowerSummary {
    pub alm_sn: Option<String>,
    pub alm_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct User {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "optIn")]
    pub opt_in: Option<bool>,
    #[serde(rename = "optInApp")]
    pub opt_in_app: Option<bool>,
}

// =====================
// Alerts
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Alert {
    pub alm_sn: Option<String>,
    pub alert_id: Option<String>,
    pub error_code: Option<String>,
    pub headline: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bosch_datetime")]
    pub date: Option<DateTime<FixedOffset>>,
    pub message: Option<String>,
    pub read_status: Option<String>,
    pub flag: Option<String>,
    pub push: Option<bool>,
    #[serde(skip)]
    pub alert_description: String,
}

impl Alert {
    pub(crate) fn derive(mut self) -> Self {
        self.alert_description = lookup::alert_description(self.error_code.as_deref()).to_string();
        self
    }
}

// =====================
// Generic data / battery
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenericData {
    pub alm_name: Option<String>,
    pub alm_sn: Option<String>,
    pub service_counter: Option<i64>,
    pub needs_service: Option<bool>,
    pub alm_mode: Option<String>,
    #[serde(rename = "bareToolnumber")]
    pub bare_tool_number: Option<String>,
    pub alm_firmware_version: Option<String>,
    #[serde(skip)]
    pub model_description: String,
    #[serde(skip)]
    pub model_voltage: Option<ModelVoltage>,
    #[serde(skip)]
    pub mowing_mode_description: String,
}

impl GenericData {
    pub(crate) fn derive(mut self) -> Self {
        let tool = self.bare_tool_number.as_deref();
        self.model_description = lookup::model_description(tool).to_string();
        self.model_voltage = lookup::model_voltage(tool);
        self.mowing_mode_description = lookup::mowing_mode_description(self.alm_mode.as_deref()).to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Battery {
    pub percent: Option<i64>,
    pub voltage: Option<f64>,
    pub cycles: Option<i64>,
    pub discharge: Option<f64>,
    pub ambient_temp: Option<i64>,
    pub battery_temp: Option<i64>,
    #[serde(skip)]
    pub percent_adjusted: Option<i64>,
}

impl Battery {
    /// Rescale the raw reading onto 0-100 using the model's reporting range.
    ///
    /// Clears the value when the range is unknown so it never reflects an old model.
    pub fn update_percent_adjusted(&mut self, range: Option<ModelVoltage>) {
        self.percent_adjusted = match (self.percent, range) {
            (Some(percent), Some(range)) if range.max > range.min => {
                let span = (range.max - range.min) as f64 / 100.0;
                Some(((percent - range.min) as f64 / span).round() as i64)
            }
            _ => None,
        };
    }
}

// =====================
// Runtime / operating data
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuntimeDetail {
    pub operate: Option<i64>,
    pub charge: Option<i64>,
    #[serde(skip)]
    pub cut: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Runtime {
    #[serde(default)]
    pub total: RuntimeDetail,
    #[serde(default)]
    pub session: RuntimeDetail,
}

impl Runtime {
    /// Totals are reported in hundredths; session counters are used as-is.
    pub(crate) fn derive(mut self) -> Self {
        let hours = |v: i64| (v as f64 / 100.0).round() as i64;
        self.total.charge = self.total.charge.map(hours);
        self.total.operate = self.total.operate.map(hours);
        if self.total.charge.unwrap_or(0) != 0 {
            self.total.cut = self.total.operate.zip(self.total.charge).map(|(o, c)| o - c);
        }
        self.session.cut = match (self.session.operate, self.session.charge) {
            (Some(operate), Some(charge)) if charge != 0 => Some(operate - charge),
            _ => Some(0),
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Garden {
    pub id: Option<i64>,
    pub name: Option<i64>,
    pub signal_id: Option<i64>,
    pub size: Option<i64>,
    pub inner_bounds: Option<i64>,
    pub cuts: Option<i64>,
    pub runtime: Option<i64>,
    pub charge: Option<i64>,
    pub bumps: Option<i64>,
    pub stops: Option<i64>,
    pub last_mow: Option<i64>,
    pub map_cell_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OperatingData {
    #[serde(rename = "hmiKeys", default, deserialize_with = "deserialize_lenient_string")]
    pub hmi_keys: Option<String>,
    #[serde(default)]
    pub battery: Battery,
    #[serde(default)]
    pub garden: Garden,
    #[serde(default)]
    pub runtime: Runtime,
}

impl OperatingData {
    pub(crate) fn derive(mut self) -> Self {
        self.runtime = self.runtime.derive();
        self
    }
}

// =====================
// Live state
// =====================

/// Live mower state. Long-poll responses carry only changed fields, so
/// updates go through [`State::merge`] rather than replacing the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct State {
    pub state: Option<i64>,
    pub map_update_available: Option<bool>,
    pub mowed: Option<i64>,
    pub mowmode: Option<i64>,
    pub error: Option<i64>,
    #[serde(rename = "xPos")]
    pub x_pos: Option<i64>,
    #[serde(rename = "yPos")]
    pub y_pos: Option<i64>,
    pub charge: Option<i64>,
    pub operate: Option<i64>,
    pub runtime: Option<Runtime>,
    pub mapsvgcache_ts: Option<i64>,
    #[serde(rename = "svg_xPos")]
    pub svg_x_pos: Option<i64>,
    #[serde(rename = "svg_yPos")]
    pub svg_y_pos: Option<i64>,
    pub config_change: Option<bool>,
    pub mow_trig: Option<bool>,
}

impl State {
    pub(crate) fn derive(mut self) -> Self {
        self.runtime = self.runtime.map(Runtime::derive);
        self
    }

    /// Overwrite only the fields present in `patch`.
    pub fn merge(&mut self, patch: State) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if patch.$field.is_some() {
                    self.$field = patch.$field;
                })*
            };
        }
        take!(
            state,
            map_update_available,
            mowed,
            mowmode,
            error,
            x_pos,
            y_pos,
            charge,
            operate,
            runtime,
            mapsvgcache_ts,
            svg_x_pos,
            svg_y_pos,
            config_change,
            mow_trig,
        );
    }
}

// =====================
// Snapshots replaced wholesale
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Network {
    pub mcc: Option<i64>,
    pub mnc: Option<i64>,
    pub rssi: Option<i64>,
    #[serde(rename = "currMode")]
    pub curr_mode: Option<String>,
    #[serde(rename = "configMode")]
    pub config_mode: Option<String>,
    #[serde(rename = "steeredRssi")]
    pub steered_rssi: Option<i64>,
    #[serde(rename = "networkCount")]
    pub network_count: Option<i64>,
    pub networks: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    pub region: Option<i64>,
    pub language: Option<i64>,
    pub border_cut: Option<i64>,
    pub is_pin_set: Option<bool>,
    pub wire_id: Option<i64>,
    pub bump_sensitivity: Option<i64>,
    pub alarm_mode: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub has_owner: Option<bool>,
    pub has_pin: Option<bool>,
    pub has_map: Option<bool>,
    pub has_auto_cal: Option<bool>,
    pub has_integrity_check_passed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Security {
    pub enabled: Option<bool>,
    pub autolock: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LastCutting {
    #[serde(default, deserialize_with = "deserialize_bosch_datetime")]
    pub last_mowed: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NextCutting {
    #[serde(default, deserialize_with = "deserialize_bosch_datetime")]
    pub mow_next: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UpdatesAvailable {
    pub available: Option<bool>,
}

// =====================
// Calendars
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CalendarSlot {
    #[serde(rename = "En", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "StHr", skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<u32>,
    #[serde(rename = "StMin", skip_serializing_if = "Option::is_none")]
    pub start_minute: Option<u32>,
    #[serde(rename = "EnHr", skip_serializing_if = "Option::is_none")]
    pub end_hour: Option<u32>,
    #[serde(rename = "EnMin", skip_serializing_if = "Option::is_none")]
    pub end_minute: Option<u32>,
    /// Tag used by predictive and exclusion schedules (e.g. `"C"`, `"P"`).
    #[serde(rename = "Attr", skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    #[serde(skip)]
    pub start: Option<NaiveTime>,
    #[serde(skip)]
    pub end: Option<NaiveTime>,
    /// Next concrete start of this slot, local time.
    #[serde(skip)]
    pub next_start: Option<NaiveDateTime>,
}

impl CalendarSlot {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        CalendarSlot {
            enabled: Some(true),
            start_hour: Some(start.0),
            start_minute: Some(start.1),
            end_hour: Some(end.0),
            end_minute: Some(end.1),
            ..Default::default()
        }
    }

    fn derive(mut self, day: Option<u32>, now: NaiveDateTime) -> Self {
        self.start = self
            .start_hour
            .zip(self.start_minute)
            .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
        self.end = self
            .end_hour
            .zip(self.end_minute)
            .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
        self.next_start = match (self.enabled, day, self.start_hour, self.start_minute) {
            (Some(true), Some(day), Some(h), Some(m)) => next_occurrence(day, h, m, now),
            _ => None,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CalendarDay {
    /// 0 = Monday.
    pub day: Option<u32>,
    #[serde(default)]
    pub slots: Vec<CalendarSlot>,
    #[serde(skip)]
    pub day_name: Option<String>,
}

impl CalendarDay {
    pub(crate) fn derive(mut self, now: NaiveDateTime) -> Self {
        self.day_name = self.day.and_then(lookup::day_name).map(str::to_string);
        let day = self.day;
        self.slots = self.slots.into_iter().map(|s| s.derive(day, now)).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Calendar {
    pub cal: Option<i64>,
    #[serde(default)]
    pub days: Vec<CalendarDay>,
}

impl Calendar {
    pub(crate) fn derive(mut self, now: NaiveDateTime) -> Self {
        self.days = self.days.into_iter().map(|d| d.derive(now)).collect();
        self
    }

    /// Start times of every enabled slot, in calendar order.
    pub fn next_starts(&self) -> Vec<NaiveDateTime> {
        self.days
            .iter()
            .flat_map(|d| d.slots.iter())
            .filter_map(|s| s.next_start)
            .collect()
    }
}

/// Envelope used by the calendar endpoints, both for reading and writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CalendarSelection {
    pub sel_cal: Option<i64>,
    #[serde(default)]
    pub cals: Vec<Calendar>,
}

impl CalendarSelection {
    /// Mowing windows every night: 00:00-08:00 and 20:00-23:59, all of Sunday.
    pub fn default_predictive() -> Self {
        let days = (0..7)
            .map(|day| CalendarDay {
                day: Some(day),
                slots: if day == 6 {
                    vec![CalendarSlot::new((0, 0), (23, 59))]
                } else {
                    vec![CalendarSlot::new((0, 0), (8, 0)), CalendarSlot::new((20, 0), (23, 59))]
                },
                day_name: None,
            })
            .collect();
        CalendarSelection {
            sel_cal: Some(1),
            cals: vec![Calendar { cal: Some(1), days }],
        }
    }

    /// Checks what the API would otherwise reject with an opaque 400.
    pub fn validate(&self) -> Result<(), String> {
        if self.cals.is_empty() {
            return Err("at least one calendar is required".to_string());
        }
        for cal in &self.cals {
            for day in &cal.days {
                match day.day {
                    Some(d) if d <= 6 => {}
                    other => return Err(format!("day must be between 0 and 6, got {:?}", other)),
                }
                for slot in &day.slots {
                    for hour in [slot.start_hour, slot.end_hour].into_iter().flatten() {
                        if hour > 23 {
                            return Err(format!("hour must be between 0 and 23, got {}", hour));
                        }
                    }
                    for minute in [slot.start_minute, slot.end_minute].into_iter().flatten() {
                        if minute > 59 {
                            return Err(format!("minute must be between 0 and 59, got {}", minute));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PredictiveSchedule {
    #[serde(default)]
    pub schedule_days: Vec<CalendarDay>,
    #[serde(default)]
    pub exclusion_days: Vec<CalendarDay>,
}

impl PredictiveSchedule {
    pub(crate) fn derive(mut self, now: NaiveDateTime) -> Self {
        self.schedule_days = self.schedule_days.into_iter().map(|d| d.derive(now)).collect();
        self.exclusion_days = self.exclusion_days.into_iter().map(|d| d.derive(now)).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn wednesday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn alert_description_falls_back_for_unknown_codes() {
        let known: Alert = serde_json::from_value(json!({"alert_id": "a", "error_code": "104"})).unwrap();
        assert_eq!(known.derive().alert_description, "Stop button pushed");

        let unknown: Alert = serde_json::from_value(json!({"alert_id": "b", "error_code": "7777"})).unwrap();
        assert_eq!(unknown.derive().alert_description, lookup::DEFAULT_LOOKUP_VALUE);
    }

    #[test]
    fn alert_with_bad_date_still_decodes() {
        let alert: Alert = serde_json::from_value(json!({"alert_id": "a", "date": "not a date"})).unwrap();
        assert_eq!(alert.date, None);
        assert_eq!(alert.alert_id.as_deref(), Some("a"));
    }

    #[test]
    fn generic_data_derivations() {
        let data: GenericData =
            serde_json::from_value(json!({"alm_mode": "smart", "bareToolnumber": "3600HA2300"})).unwrap();
        let data = data.derive();
        assert_eq!(data.model_description, "Indego 1000");
        assert_eq!(data.model_voltage, Some(ModelVoltage { min: 297, max: 369 }));
        assert_eq!(data.mowing_mode_description, "SmartMowing");
    }

    #[test]
    fn battery_adjusted_percent() {
        let mut battery = Battery {
            percent: Some(86),
            ..Default::default()
        };
        battery.update_percent_adjusted(Some(ModelVoltage { min: 0, max: 100 }));
        assert_eq!(battery.percent_adjusted, Some(86));

        battery.percent = Some(350);
        battery.update_percent_adjusted(Some(ModelVoltage { min: 297, max: 369 }));
        let expected = ((350.0_f64 - 297.0) / ((369.0 - 297.0) / 100.0)).round() as i64;
        assert_eq!(battery.percent_adjusted, Some(expected));
        assert_eq!(expected, 74);

        battery.update_percent_adjusted(None);
        assert_eq!(battery.percent_adjusted, None);
    }

    #[test]
    fn runtime_totals_are_scaled() {
        let runtime: Runtime = serde_json::from_value(json!({
            "total": {"operate": 81106, "charge": 11834},
            "session": {"operate": 12, "charge": 0}
        }))
        .unwrap();
        let runtime = runtime.derive();
        assert_eq!(runtime.total.operate, Some(811));
        assert_eq!(runtime.total.charge, Some(118));
        assert_eq!(runtime.total.cut, Some(693));
        assert_eq!(runtime.session.cut, Some(0));
    }

    #[test]
    fn state_merge_keeps_absent_fields() {
        let mut state: State = serde_json::from_value(json!({"state": 64513, "mowed": 97, "xPos": 5})).unwrap();
        let patch: State = serde_json::from_value(json!({"state": 513})).unwrap();
        state.merge(patch);
        assert_eq!(state.state, Some(513));
        assert_eq!(state.mowed, Some(97));
        assert_eq!(state.x_pos, Some(5));
    }

    #[test]
    fn calendar_slots_project_next_start() {
        let cal: Calendar = serde_json::from_value(json!({
            "cal": 3,
            "days": [
                {"day": 0, "slots": [{"En": true, "StHr": 10, "StMin": 0, "EnHr": 13, "EnMin": 0}, {"En": false}]},
                {"day": 4, "slots": [{"En": true, "StHr": 10, "StMin": 0, "EnHr": 13, "EnMin": 0}]}
            ]
        }))
        .unwrap();
        let cal = cal.derive(wednesday_noon());
        assert_eq!(cal.days[0].day_name.as_deref(), Some("monday"));
        assert_eq!(cal.days[0].slots[0].start, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(cal.days[0].slots[1].next_start, None);
        let starts = cal.next_starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].date(), NaiveDate::from_ymd_opt(2020, 7, 6).unwrap());
        assert_eq!(starts[1].date(), NaiveDate::from_ymd_opt(2020, 7, 3).unwrap());
    }

    #[test]
    fn calendar_serializes_only_wire_fields() {
        let slot = CalendarSlot {
            enabled: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&slot).unwrap(), json!({"En": false}));
    }

    #[test]
    fn default_predictive_calendar_is_valid() {
        let cal = CalendarSelection::default_predictive();
        assert_eq!(cal.cals[0].days.len(), 7);
        assert_eq!(cal.cals[0].days[6].slots.len(), 1);
        assert!(cal.validate().is_ok());
    }

    #[test]
    fn calendar_validation_rejects_bad_values() {
        let mut cal = CalendarSelection::default_predictive();
        cal.cals[0].days[0].slots[0].start_hour = Some(24);
        assert!(cal.validate().is_err());

        let mut cal = CalendarSelection::default_predictive();
        cal.cals[0].days[0].day = Some(7);
        assert!(cal.validate().is_err());

        assert!(CalendarSelection::default().validate().is_err());
    }

    #[test]
    fn location_accepts_quoted_coordinates() {
        let loc: Location =
            serde_json::from_value(json!({"latitude": "1.1234", "longitude": 2.5, "timezone": "Europe/Amsterdam"}))
                .unwrap();
        assert_eq!(loc.latitude, Some(1.1234));
        assert_eq!(loc.longitude, Some(2.5));
    }
}
