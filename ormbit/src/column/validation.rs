use crate::column::ColumnType;
use crate::error::ValidationError;
use crate::value::Value;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").ok());
static TZ_OFFSET_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^([+-])(\d{1,2}):?(\d{2})$").ok());

const NAIVE_FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
const TZ_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

pub(crate) fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Int(ts) => DateTime::<Utc>::from_timestamp(*ts, 0).map(|dt| dt.naive_utc()),
        Value::Float(ts) => DateTime::<Utc>::from_timestamp(ts.trunc() as i64, 0).map(|dt| dt.naive_utc()),
        Value::Text(s) => {
            let s = s.trim();
            if let Some(with_tz) = parse_timestamp_tz(value) {
                return Some(with_tz.naive_local());
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
        }
        _ => None,
    }
}

pub(crate) fn parse_timestamp_tz(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::Int(_) | Value::Float(_) => parse_timestamp(value).map(|naive| naive.and_utc().fixed_offset()),
        Value::Text(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .or_else(|| TZ_FORMATS.iter().find_map(|fmt| DateTime::parse_from_str(s, fmt).ok()))
        }
        _ => None,
    }
}

/// Timestamps without zone information are read as UTC.
pub(crate) fn parse_timestamp_tz_or_utc(value: &Value) -> Option<DateTime<FixedOffset>> {
    parse_timestamp_tz(value).or_else(|| parse_timestamp(value).map(|naive| naive.and_utc().fixed_offset()))
}

pub(crate) fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok().or_else(|| parse_timestamp(value).map(|dt| dt.date())),
        Value::Int(_) | Value::Float(_) => parse_timestamp(value).map(|dt| dt.date()),
        _ => None,
    }
}

pub(crate) fn parse_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Text(s) => {
            let s = s.trim();
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .ok()
                .or_else(|| NaiveTime::parse_from_str(s, "%H:%M").ok())
                .or_else(|| parse_timestamp(value).map(|dt| dt.time()))
        }
        Value::Int(_) => parse_timestamp(value).map(|dt| dt.time()),
        _ => None,
    }
}

/// Offset in seconds east of UTC.
pub(crate) fn parse_timezone_offset(value: &Value) -> Option<i32> {
    match value {
        Value::Int(seconds) if (-43_200..=50_400).contains(seconds) => Some(*seconds as i32),
        Value::Text(s) => {
            let caps = TZ_OFFSET_PATTERN.as_ref()?.captures(s.trim())?;
            let hours: i32 = caps.get(2)?.as_str().parse().ok()?;
            let minutes: i32 = caps.get(3)?.as_str().parse().ok()?;
            if hours > 14 || minutes > 59 {
                return None;
            }
            let seconds = hours * 3600 + minutes * 60;
            Some(if caps.get(1)?.as_str() == "-" { -seconds } else { seconds })
        }
        _ => None,
    }
}

pub(crate) fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" => Some(true),
            "0" | "false" | "f" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn parse_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Text(s) => serde_json::from_str(s).ok(),
        Value::Json(_) | Value::Row(_) | Value::Rows(_) | Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(value.to_json()),
        _ => None,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Int(_) => true,
        Value::Float(f) => f.fract() == 0.0,
        Value::Text(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_ipv4(s: &str) -> bool {
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

fn is_file_payload(value: &Value) -> bool {
    match value {
        Value::Row(row) => row.contains_key("tmp_name") || row.contains_key("path") || row.contains_key("name"),
        Value::Text(path) => !path.trim().is_empty(),
        _ => false,
    }
}

fn is_image_payload(value: &Value) -> bool {
    let mime_ok = |mime: &str| mime.starts_with("image/");
    match value {
        Value::Row(row) => match row.get("type").and_then(|t| t.as_str()) {
            Some(mime) => mime_ok(mime),
            None => is_file_payload(value),
        },
        _ => is_file_payload(value),
    }
}

/// Checks that a non-null, non-expression value fits the column type.
pub fn check_type(kind: ColumnType, value: &Value, is_for_condition: bool) -> Vec<ValidationError> {
    let ok = match kind {
        ColumnType::Int => is_integer(value),
        ColumnType::Float => value.as_f64().is_some(),
        ColumnType::Bool => parse_bool(value).is_some(),
        ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Enum | ColumnType::Blob => {
            matches!(value, Value::Text(_) | Value::Int(_) | Value::Float(_))
        }
        ColumnType::Email => match value {
            Value::Text(s) if is_for_condition => !s.is_empty(),
            Value::Text(s) => EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(s)),
            _ => false,
        },
        ColumnType::Json | ColumnType::Jsonb => parse_json(value).is_some(),
        ColumnType::Timestamp => parse_timestamp(value).is_some(),
        ColumnType::TimestampWithTz => parse_timestamp_tz_or_utc(value).is_some(),
        ColumnType::UnixTimestamp => is_integer(value) || parse_timestamp(value).is_some(),
        ColumnType::Date => parse_date(value).is_some(),
        ColumnType::Time => parse_time(value).is_some(),
        ColumnType::TimezoneOffset => parse_timezone_offset(value).is_some(),
        ColumnType::Ipv4Address => matches!(value, Value::Text(s) if is_ipv4(s.trim())),
        ColumnType::File => is_file_payload(value),
        ColumnType::Image => is_image_payload(value),
    };
    if ok {
        return vec![];
    }
    let error = match kind {
        ColumnType::Int => ValidationError::ValueMustBeInteger,
        ColumnType::Float => ValidationError::ValueMustBeFloat,
        ColumnType::Bool => ValidationError::ValueMustBeBoolean,
        ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Enum | ColumnType::Blob => ValidationError::ValueMustBeString,
        ColumnType::Email => ValidationError::ValueMustBeEmail,
        ColumnType::Json | ColumnType::Jsonb => ValidationError::ValueMustBeJson,
        ColumnType::Timestamp | ColumnType::UnixTimestamp => ValidationError::ValueMustBeTimestamp,
        ColumnType::TimestampWithTz => ValidationError::ValueMustBeTimestampWithTz,
        ColumnType::Date => ValidationError::ValueMustBeDate,
        ColumnType::Time => ValidationError::ValueMustBeTime,
        ColumnType::TimezoneOffset => ValidationError::ValueMustBeTimezoneOffset,
        ColumnType::Ipv4Address => ValidationError::ValueMustBeIpv4Address,
        ColumnType::File => ValidationError::ValueMustBeFile,
        ColumnType::Image => ValidationError::ValueMustBeImage,
    };
    vec![error]
}

/// Membership check against allowed values. Lists (conditions like `IN`) check each item.
pub fn check_allowed_values(value: &Value, allowed: &[Value]) -> Vec<ValidationError> {
    match value {
        Value::Json(serde_json::Value::Array(items)) => {
            let all_allowed = items.iter().all(|item| {
                let item = Value::from(item.clone());
                allowed.iter().any(|a| a.same_key(&item))
            });
            if all_allowed { vec![] } else { vec![ValidationError::OneOfValuesIsNotAllowed] }
        }
        _ if allowed.iter().any(|a| a.same_key(value)) => vec![],
        _ => vec![ValidationError::ValueIsNotAllowed],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_accept_numeric_text() {
        assert!(check_type(ColumnType::Int, &Value::Text("12".into()), false).is_empty());
        assert_eq!(check_type(ColumnType::Int, &Value::Text("1.5".into()), false), vec![ValidationError::ValueMustBeInteger]);
        assert_eq!(check_type(ColumnType::Int, &Value::Float(1.5), false), vec![ValidationError::ValueMustBeInteger]);
    }

    #[test]
    fn timestamps_accept_common_shapes() {
        for raw in ["2024-03-01 10:20:30", "2024-03-01T10:20:30", "2024-03-01", "2024-03-01T10:20:30+02:00"] {
            assert!(parse_timestamp(&Value::Text(raw.into())).is_some(), "{}", raw);
        }
        assert!(parse_timestamp(&Value::Int(1_700_000_000)).is_some());
        assert_eq!(check_type(ColumnType::Timestamp, &Value::Text("yesterday".into()), false), vec![ValidationError::ValueMustBeTimestamp]);
    }

    #[test]
    fn timezone_offsets() {
        assert_eq!(parse_timezone_offset(&Value::Text("+03:00".into())), Some(10_800));
        assert_eq!(parse_timezone_offset(&Value::Text("-0530".into())), Some(-19_800));
        assert_eq!(parse_timezone_offset(&Value::Text("+25:00".into())), None);
    }

    #[test]
    fn email_and_ip_shapes() {
        assert!(check_type(ColumnType::Email, &Value::Text("ann@example.com".into()), false).is_empty());
        assert!(!check_type(ColumnType::Email, &Value::Text("ann".into()), false).is_empty());
        assert!(check_type(ColumnType::Email, &Value::Text("ann".into()), true).is_empty());
        assert!(check_type(ColumnType::Ipv4Address, &Value::Text("10.0.0.1".into()), false).is_empty());
        assert!(!check_type(ColumnType::Ipv4Address, &Value::Text("10.0.0.256".into()), false).is_empty());
    }

    #[test]
    fn allowed_values_membership() {
        let allowed = vec![Value::from("a"), Value::from("b")];
        assert!(check_allowed_values(&Value::from("a"), &allowed).is_empty());
        assert_eq!(check_allowed_values(&Value::from("c"), &allowed), vec![ValidationError::ValueIsNotAllowed]);
        let list = Value::Json(serde_json::json!(["a", "z"]));
        assert_eq!(check_allowed_values(&list, &allowed), vec![ValidationError::OneOfValuesIsNotAllowed]);
    }
}
