use crate::error::{OrmError, OrmResult};
use crate::info;
use config::{Config, ConfigError, Environment, File};
use dotenv::dotenv;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::Once;

static DOTENV_ONCE: Once = Once::new();
static SETTINGS: OnceCell<OrmSettings> = OnceCell::new();
static DEFAULT_SETTINGS: once_cell::sync::Lazy<OrmSettings> = once_cell::sync::Lazy::new(OrmSettings::default);

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OrmSettings {
    /// Table and column aliases longer than this are replaced by a hashed short form.
    pub alias_max_length: usize,
    /// `RecordsSet::total_count` drops LEFT/RIGHT joins that no filter references.
    pub count_ignores_outer_joins: bool,
    /// Records hydrated from storage skip validation of their values.
    pub trust_db_data: bool,
    pub default_connection: String,
}

impl Default for OrmSettings {
    fn default() -> Self {
        OrmSettings {
            alias_max_length: 48,
            count_ignores_outer_joins: true,
            trust_db_data: false,
            default_connection: "default".to_string(),
        }
    }
}

fn ensure_dotenv_loaded() {
    DOTENV_ONCE.call_once(|| {
        match dotenv() {
            Ok(_) => info!("Settings loaded including .env file."),
            Err(_) => info!("Settings loaded without .env file."),
        }
    });
}

/// Reads settings from `path` overlaid with `{prefix}__*` environment variables.
pub fn load_settings(path: &str, prefix: &str) -> Result<OrmSettings, ConfigError> {
    ensure_dotenv_loaded();

    let builder = Config::builder()
        .add_source(File::with_name(path).required(true))
        .add_source(
            Environment::with_prefix(prefix)
                .try_parsing(true)
                .separator("__"),
        );

    let settings = builder.build()?.try_deserialize::<OrmSettings>()?;
    info!("{:?}", settings);
    Ok(settings)
}

/// Installs process-wide settings. Only the first call wins.
pub fn install_settings(settings: OrmSettings) -> OrmResult<()> {
    if settings.alias_max_length < 24 {
        return Err(OrmError::InvalidArgument(format!("alias_max_length must be at least 24, got {}", settings.alias_max_length)));
    }
    SETTINGS
        .set(settings)
        .map_err(|_| OrmError::BadMethodCall("settings are already installed".to_string()))
}

pub fn settings() -> &'static OrmSettings {
    SETTINGS.get().unwrap_or(&DEFAULT_SETTINGS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_used_without_installation() {
        let defaults = OrmSettings::default();
        assert_eq!(defaults.alias_max_length, 48);
        assert!(defaults.count_ignores_outer_joins);
        assert_eq!(defaults.default_connection, "default");
    }

    #[test]
    fn settings_load_from_file_with_partial_keys() {
        let path = std::env::temp_dir().join(format!("ormbit_settings_{}.toml", rand::random::<u64>()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "alias_max_length = 30").unwrap();
        writeln!(file, "trust_db_data = true").unwrap();
        let loaded = load_settings(path.to_str().unwrap(), "ORMBIT_TEST_UNUSED").unwrap();
        assert_eq!(loaded.alias_max_length, 30);
        assert!(loaded.trust_db_data);
        assert!(loaded.count_ignores_outer_joins);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn too_short_alias_limit_is_rejected() {
        let settings = OrmSettings { alias_max_length: 10, ..OrmSettings::default() };
        assert!(matches!(install_settings(settings), Err(OrmError::InvalidArgument(_))));
    }
}
