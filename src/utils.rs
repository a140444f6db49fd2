use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, NaiveTime};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a timestamp as sent by the Bosch API.
///
/// The API emits RFC 3339 with a varying number of fractional digits
/// (`2020-07-01T13:22:43.15+02:00`, `2020-07-02T09:26:39.589Z`); some
/// older firmware omits the colon in the offset.
pub fn parse_bosch_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map_err(|e| debug!("Unparseable timestamp {:?}: {}", raw, e))
        .ok()
}

/// Project a weekday (0 = Monday) and time of day onto the nearest date from `now`.
///
/// A slot whose weekday already passed this week rolls forward 7 days. The
/// comparison is by date, so a slot earlier today still resolves to today.
pub fn next_occurrence(day: u32, hour: u32, minute: u32, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date();
    let offset = i64::from(day) - i64::from(today.weekday().num_days_from_monday());
    let mut date = today + Duration::days(offset);
    if date < today {
        date = date + Duration::days(7);
    }
    Some(date.and_time(time))
}

/// Deserialize a response body into a typed record, keeping the failing field path.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_path_to_error::Error<serde_json::Error>> {
    serde_path_to_error::deserialize(value)
}

pub(crate) fn deserialize_bosch_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_bosch_datetime))
}

/// Numbers sometimes arrive quoted (`"latitude": "52.1"`).
pub(crate) fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Strings sometimes arrive as bare numbers (`"hmiKeys": 213`).
pub(crate) fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn parses_short_fraction_with_offset() {
        let parsed = parse_bosch_datetime("2020-07-01T13:22:43.15+02:00").unwrap();
        let expected = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2020, 7, 1, 13, 22, 43)
            .unwrap()
            + Duration::milliseconds(150);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parses_without_fraction_and_zulu() {
        let parsed = parse_bosch_datetime("2020-07-03T10:00:00+02:00").unwrap();
        assert_eq!(parsed.naive_utc().to_string(), "2020-07-03 08:00:00");
        let zulu = parse_bosch_datetime("2020-07-02T09:26:39.589Z").unwrap();
        assert_eq!(zulu.offset().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_bosch_datetime(""), None);
        assert_eq!(parse_bosch_datetime("yesterday"), None);
    }

    #[test]
    fn next_occurrence_rolls_forward_a_week() {
        // Wednesday 2020-07-01 12:00
        let now = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();

        // Monday already passed this week
        let monday = next_occurrence(0, 10, 0, now).unwrap();
        assert_eq!(monday, NaiveDate::from_ymd_opt(2020, 7, 6).unwrap().and_hms_opt(10, 0, 0).unwrap());

        // Friday is later this week
        let friday = next_occurrence(4, 10, 30, now).unwrap();
        assert_eq!(friday, NaiveDate::from_ymd_opt(2020, 7, 3).unwrap().and_hms_opt(10, 30, 0).unwrap());

        // Same weekday stays on today even when the hour passed
        let today = next_occurrence(2, 8, 0, now).unwrap();
        assert_eq!(today, NaiveDate::from_ymd_opt(2020, 7, 1).unwrap().and_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_rejects_invalid_time() {
        let now = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(next_occurrence(1, 25, 0, now), None);
    }
}
