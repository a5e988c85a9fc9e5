use crate::column::validation::{
    parse_bool, parse_date, parse_json, parse_time, parse_timestamp, parse_timestamp_tz_or_utc, parse_timezone_offset,
};
use crate::column::{Column, ColumnType};
use crate::value::Value;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub fn format_timezone_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// Brings a valid value into its canonical stored form.
/// Values that cannot be interpreted are returned untouched; validation rejects them first.
pub fn default_value_normalizer(value: Value, _is_from_db: bool, column: &Column) -> Value {
    if value.is_null() || value.is_expr() {
        return value;
    }
    let normalized = match column.kind() {
        ColumnType::Int => value.as_i64().map(Value::Int),
        ColumnType::Float => value.as_f64().map(Value::Float),
        ColumnType::Bool => parse_bool(&value).map(Value::Bool),
        ColumnType::Json | ColumnType::Jsonb => parse_json(&value).map(|json| Value::Text(json.to_string())),
        ColumnType::Timestamp => parse_timestamp(&value).map(|dt| Value::Text(dt.format(TIMESTAMP_FORMAT).to_string())),
        ColumnType::TimestampWithTz => parse_timestamp_tz_or_utc(&value).map(|dt| Value::Text(dt.format(TIMESTAMP_TZ_FORMAT).to_string())),
        ColumnType::UnixTimestamp => value
            .as_i64()
            .or_else(|| parse_timestamp(&value).map(|dt| dt.and_utc().timestamp()))
            .map(Value::Int),
        ColumnType::Date => parse_date(&value).map(|d| Value::Text(d.format(DATE_FORMAT).to_string())),
        ColumnType::Time => parse_time(&value).map(|t| Value::Text(t.format(TIME_FORMAT).to_string())),
        ColumnType::TimezoneOffset => parse_timezone_offset(&value).map(|s| Value::Text(format_timezone_offset(s))),
        ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Email | ColumnType::Enum | ColumnType::Ipv4Address | ColumnType::Blob => {
            match &value {
                Value::Int(_) | Value::Float(_) => Some(Value::Text(value.key_string())),
                _ => None,
            }
        }
        ColumnType::File | ColumnType::Image => None,
    };
    normalized.unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    fn normalize(kind: ColumnType, value: Value) -> Value {
        let column = Column::new("c", kind);
        default_value_normalizer(value, false, &column)
    }

    #[test]
    fn temporal_values_are_canonical() {
        assert_eq!(normalize(ColumnType::Timestamp, Value::from("2024-03-01T10:20:30.5")), Value::from("2024-03-01 10:20:30"));
        assert_eq!(normalize(ColumnType::Timestamp, Value::Int(0)), Value::from("1970-01-01 00:00:00"));
        assert_eq!(normalize(ColumnType::TimestampWithTz, Value::from("2024-03-01 10:20:30")), Value::from("2024-03-01 10:20:30+00:00"));
        assert_eq!(normalize(ColumnType::Date, Value::from("2024-03-01 23:59:59")), Value::from("2024-03-01"));
        assert_eq!(normalize(ColumnType::Time, Value::from("07:05")), Value::from("07:05:00"));
        assert_eq!(normalize(ColumnType::UnixTimestamp, Value::from("1970-01-02 00:00:00")), Value::Int(86_400));
        assert_eq!(normalize(ColumnType::TimezoneOffset, Value::from("-0530")), Value::from("-05:30"));
    }

    #[test]
    fn scalars_and_json() {
        assert_eq!(normalize(ColumnType::Int, Value::from("15")), Value::Int(15));
        assert_eq!(normalize(ColumnType::Bool, Value::from("true")), Value::Bool(true));
        assert_eq!(normalize(ColumnType::String, Value::Int(15)), Value::from("15"));
        assert_eq!(normalize(ColumnType::Json, Value::from("{ \"a\" : [1, 2] }")), Value::from("{\"a\":[1,2]}"));
    }

    #[test]
    fn expressions_pass_through() {
        let expr = Value::Expr(crate::value::DbExpr::new("NOW()"));
        assert_eq!(normalize(ColumnType::Timestamp, expr.clone()), expr);
    }
}
