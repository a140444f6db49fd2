//! Static lookup tables for codes reported by the Indego API.
//!
//! The vendor adds codes over time, so every lookup falls back to
//! [`DEFAULT_LOOKUP_VALUE`] instead of failing.

pub const DEFAULT_LOOKUP_VALUE: &str = "Not in database.";

/// Voltage (or percentage) range the raw battery reading is reported in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelVoltage {
    pub min: i64,
    pub max: i64,
}

pub fn state_description(code: Option<i64>) -> &'static str {
    let Some(code) = code else { return "None" };
    match code {
        0 | 257..=263 | 64513 => "Docked",
        513..=519 | 769..=776 => "Mowing",
        1025 => "Diagnostic mode",
        1026 => "End of life",
        1281 => "Software update",
        1537 => "Stuck",
        99999 => "Offline",
        _ => DEFAULT_LOOKUP_VALUE,
    }
}

pub fn state_description_detail(code: Option<i64>) -> &'static str {
    let Some(code) = code else { return "None" };
    match code {
        0 => "Reading status",
        257 => "Charging",
        258 | 260 | 261 => "Docked",
        259 => "Docked - Software update",
        262 => "Docked - Loading map",
        263 => "Docked - Saving map",
        513 => "Mowing",
        514 => "Relocalising",
        515 => "Loading map",
        516 => "Learning lawn",
        517 => "Paused",
        518 => "Border cut",
        519 => "Idle in lawn",
        769 | 770 => "Returning to Dock",
        771 => "Returning to Dock - Battery low",
        772 => "Returning to dock - Calendar timeslot ended",
        773 => "Returning to dock - Battery temp range",
        774 => "Returning to dock - requested by user/app",
        775 => "Returning to dock - Lawn complete",
        776 => "Returning to dock - Relocalising",
        1025 => "Diagnostic mode",
        1026 => "End of life",
        1281 => "Software update",
        1537 => "Stuck on lawn, help needed",
        64513 => "Sleeping",
        99999 => "Offline",
        _ => DEFAULT_LOOKUP_VALUE,
    }
}

pub fn model_description(bare_tool_number: Option<&str>) -> &'static str {
    match bare_tool_number.unwrap_or_default() {
        "3600HA2300" => "Indego 1000",
        "3600HA2301" => "Indego 1200",
        "3600HA2302" => "Indego 1100",
        "3600HA2303" => "Indego 13C",
        "3600HA2304" => "Indego 10C",
        "3600HB0100" => "Indego 350",
        "3600HB0101" => "Indego 400",
        "3600HB0102" => "Indego S+ 350",
        "3600HB0103" => "Indego S+ 400",
        "3600HB0105" => "Indego S+ 350 2020",
        "3600HB0106" => "Indego S+ 400 2020",
        "3600HB0301" => "Indego M+ 700",
        _ => DEFAULT_LOOKUP_VALUE,
    }
}

/// `None` for unknown models; the adjusted battery percentage is then left unset.
pub fn model_voltage(bare_tool_number: Option<&str>) -> Option<ModelVoltage> {
    match bare_tool_number? {
        // 1000, 1200, 1100, 13C, 10C report a raw voltage (x10)
        "3600HA2300" | "3600HA2301" | "3600HA2302" | "3600HA2303" | "3600HA2304" => {
            Some(ModelVoltage { min: 297, max: 369 })
        }
        "3600HB0100" | "3600HB0101" | "3600HB0102" | "3600HB0103" | "3600HB0105" | "3600HB0106"
        | "3600HB0301" => Some(ModelVoltage { min: 0, max: 100 }),
        _ => None,
    }
}

pub fn mowing_mode_description(alm_mode: Option<&str>) -> &'static str {
    match alm_mode.unwrap_or_default() {
        "smart" => "SmartMowing",
        "calendar" => "Calendar",
        "manual" => "Manual",
        _ => DEFAULT_LOOKUP_VALUE,
    }
}

pub fn alert_description(error_code: Option<&str>) -> &'static str {
    match error_code.unwrap_or_default() {
        "104" => "Stop button pushed",
        "115" => "Mower is stuck",
        "149" => "Mower outside perimeter cable",
        "151" => "Perimeter cable signal missing",
        "ntfy_blade_life" => "Reminder blade life",
        _ => DEFAULT_LOOKUP_VALUE,
    }
}

pub fn day_name(day: u32) -> Option<&'static str> {
    const DAYS: [&str; 7] = ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];
    DAYS.get(day as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_fall_back_to_default() {
        assert_eq!(state_description(Some(4242)), DEFAULT_LOOKUP_VALUE);
        assert_eq!(state_description_detail(Some(4242)), DEFAULT_LOOKUP_VALUE);
        assert_eq!(alert_description(Some("999")), DEFAULT_LOOKUP_VALUE);
        assert_eq!(alert_description(None), DEFAULT_LOOKUP_VALUE);
        assert_eq!(model_description(Some("3600XX0000")), DEFAULT_LOOKUP_VALUE);
        assert_eq!(mowing_mode_description(Some("turbo")), DEFAULT_LOOKUP_VALUE);
        assert_eq!(model_voltage(Some("3600XX0000")), None);
    }

    #[test]
    fn state_code_groups() {
        assert_eq!(state_description(Some(258)), "Docked");
        assert_eq!(state_description(Some(64513)), "Docked");
        assert_eq!(state_description(Some(517)), "Mowing");
        assert_eq!(state_description(Some(774)), "Mowing");
        assert_eq!(state_description(None), "None");
        assert_eq!(state_description_detail(Some(517)), "Paused");
        assert_eq!(state_description_detail(Some(64513)), "Sleeping");
    }

    #[test]
    fn model_tables() {
        assert_eq!(model_description(Some("3600HB0102")), "Indego S+ 350");
        assert_eq!(model_voltage(Some("3600HA2300")), Some(ModelVoltage { min: 297, max: 369 }));
        assert_eq!(model_voltage(Some("3600HB0301")), Some(ModelVoltage { min: 0, max: 100 }));
        assert_eq!(day_name(0), Some("monday"));
        assert_eq!(day_name(6), Some("sunday"));
        assert_eq!(day_name(7), None);
    }
}
