use crate::column::normalize::{DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
use crate::column::validation::{parse_date, parse_json, parse_timestamp, parse_timestamp_tz_or_utc};
use crate::column::{Column, ColumnType};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;

/// Reshapes a stored value into one of the named formats of its column type.
pub fn default_value_formatter(value: &Value, format: &str, column: &Column) -> OrmResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let unsupported = || OrmError::InvalidArgument(format!("Value format '{}' is not supported for column '{}' of type {}", format, column.name(), column.kind()));
    let not_parsable = || OrmError::UnexpectedValue(format!("Value of column '{}' cannot be formatted as '{}': {}", column.name(), format, value));
    match (column.kind(), format) {
        (ColumnType::Timestamp, "date") | (ColumnType::UnixTimestamp, "date") => {
            parse_timestamp(value).map(|dt| Value::Text(dt.format(DATE_FORMAT).to_string())).ok_or_else(not_parsable)
        }
        (ColumnType::Timestamp, "time") | (ColumnType::UnixTimestamp, "time") => {
            parse_timestamp(value).map(|dt| Value::Text(dt.format(TIME_FORMAT).to_string())).ok_or_else(not_parsable)
        }
        (ColumnType::Timestamp, "unix_ts") => parse_timestamp(value).map(|dt| Value::Int(dt.and_utc().timestamp())).ok_or_else(not_parsable),
        (ColumnType::TimestampWithTz, "date") => {
            parse_timestamp_tz_or_utc(value).map(|dt| Value::Text(dt.format(DATE_FORMAT).to_string())).ok_or_else(not_parsable)
        }
        (ColumnType::TimestampWithTz, "time") => {
            parse_timestamp_tz_or_utc(value).map(|dt| Value::Text(dt.format(TIME_FORMAT).to_string())).ok_or_else(not_parsable)
        }
        (ColumnType::TimestampWithTz, "unix_ts") => parse_timestamp_tz_or_utc(value).map(|dt| Value::Int(dt.timestamp())).ok_or_else(not_parsable),
        (ColumnType::UnixTimestamp, "date_time") => {
            parse_timestamp(value).map(|dt| Value::Text(dt.format(TIMESTAMP_FORMAT).to_string())).ok_or_else(not_parsable)
        }
        (ColumnType::Date, "unix_ts") => parse_date(value)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Value::Int(dt.and_utc().timestamp()))
            .ok_or_else(not_parsable),
        (ColumnType::Json | ColumnType::Jsonb, "array") => match parse_json(value).ok_or_else(not_parsable)? {
            serde_json::Value::Null => Ok(Value::Null),
            json @ serde_json::Value::Array(_) => Ok(Value::from(json)),
            _ => Err(not_parsable()),
        },
        (ColumnType::Json | ColumnType::Jsonb, "object") => match parse_json(value).ok_or_else(not_parsable)? {
            serde_json::Value::Null => Ok(Value::Null),
            json @ serde_json::Value::Object(_) => Ok(Value::from(json)),
            _ => Err(not_parsable()),
        },
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_formats() {
        let column = Column::new("created_at", ColumnType::Timestamp);
        let value = Value::from("2024-03-01 10:20:30");
        assert_eq!(default_value_formatter(&value, "date", &column).unwrap(), Value::from("2024-03-01"));
        assert_eq!(default_value_formatter(&value, "time", &column).unwrap(), Value::from("10:20:30"));
        assert_eq!(default_value_formatter(&value, "unix_ts", &column).unwrap(), Value::Int(1_709_288_430));
    }

    #[test]
    fn json_formats() {
        let column = Column::new("tags", ColumnType::Json);
        let list = default_value_formatter(&Value::from("[1,2]"), "array", &column).unwrap();
        assert_eq!(list.to_json(), serde_json::json!([1, 2]));
        let object = default_value_formatter(&Value::from("{\"a\":1}"), "object", &column).unwrap();
        assert_eq!(object.as_row().unwrap().get("a"), Some(&Value::Int(1)));
        assert!(default_value_formatter(&Value::from("[1]"), "object", &column).is_err());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let column = Column::new("day", ColumnType::Date);
        let err = default_value_formatter(&Value::from("2024-03-01"), "time", &column).unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
    }
}
