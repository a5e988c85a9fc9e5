use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    String,
    Text,
    Json,
    Jsonb,
    Password,
    Email,
    Timestamp,
    TimestampWithTz,
    UnixTimestamp,
    Date,
    Time,
    TimezoneOffset,
    Enum,
    Ipv4Address,
    File,
    Image,
    Blob,
}

impl ColumnType {
    pub fn is_file(&self) -> bool {
        matches!(self, ColumnType::File | ColumnType::Image)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ColumnType::Image)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ColumnType::Json | ColumnType::Jsonb)
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Email | ColumnType::Enum | ColumnType::Ipv4Address | ColumnType::Blob
        )
    }

    /// Named formats the default formatter can produce for this type.
    pub fn value_formats(&self) -> &'static [&'static str] {
        match self {
            ColumnType::Timestamp | ColumnType::TimestampWithTz => &["date", "time", "unix_ts"],
            ColumnType::UnixTimestamp => &["date", "time", "date_time"],
            ColumnType::Date => &["unix_ts"],
            ColumnType::Json | ColumnType::Jsonb => &["array", "object"],
            _ => &[],
        }
    }

    /// Maps a storage type name reported by schema introspection.
    pub fn from_db_type(db_type: &str) -> ColumnType {
        let normalized = db_type.trim().to_lowercase();
        let base = normalized.split('(').next().unwrap_or("").trim();
        match base {
            "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "serial" | "bigserial" | "tinyint" | "mediumint" => ColumnType::Int,
            "float" | "float4" | "float8" | "real" | "double" | "double precision" | "numeric" | "decimal" | "money" => ColumnType::Float,
            "bool" | "boolean" => ColumnType::Bool,
            "json" => ColumnType::Json,
            "jsonb" => ColumnType::Jsonb,
            "text" | "mediumtext" | "longtext" => ColumnType::Text,
            "timestamp" | "datetime" | "timestamp without time zone" => ColumnType::Timestamp,
            "timestamptz" | "timestamp with time zone" => ColumnType::TimestampWithTz,
            "date" => ColumnType::Date,
            "time" | "timetz" | "time without time zone" | "time with time zone" => ColumnType::Time,
            "inet" | "cidr" => ColumnType::Ipv4Address,
            "bytea" | "blob" | "binary" | "varbinary" => ColumnType::Blob,
            "enum" => ColumnType::Enum,
            _ => ColumnType::String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Json => "json",
            ColumnType::Jsonb => "jsonb",
            ColumnType::Password => "password",
            ColumnType::Email => "email",
            ColumnType::Timestamp => "timestamp",
            ColumnType::TimestampWithTz => "timestamp_tz",
            ColumnType::UnixTimestamp => "unix_timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::TimezoneOffset => "timezone_offset",
            ColumnType::Enum => "enum",
            ColumnType::Ipv4Address => "ipv4",
            ColumnType::File => "file",
            ColumnType::Image => "image",
            ColumnType::Blob => "blob",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_introspected_types() {
        assert_eq!(ColumnType::from_db_type("BIGINT"), ColumnType::Int);
        assert_eq!(ColumnType::from_db_type("character varying(255)"), ColumnType::String);
        assert_eq!(ColumnType::from_db_type("numeric(10,2)"), ColumnType::Float);
        assert_eq!(ColumnType::from_db_type("timestamp with time zone"), ColumnType::TimestampWithTz);
        assert_eq!(ColumnType::from_db_type("jsonb"), ColumnType::Jsonb);
    }

    #[test]
    fn file_flags_follow_type() {
        assert!(ColumnType::Image.is_file());
        assert!(ColumnType::File.is_file());
        assert!(!ColumnType::Blob.is_file());
    }
}
