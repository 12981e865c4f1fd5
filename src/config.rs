use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub session: SessionSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub path: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MediaSettings {
    pub static_dir: PathBuf,
    pub media_dir: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SessionSettings {
    pub cookie_name: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_age_seconds: i64,
    pub secure: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "sessionid".to_owned(),
            // two weeks
            max_age_seconds: 1_209_600,
            secure: false,
        }
    }
}

/// Loads settings from `configuration/base.yaml` (optional) and `RANGO_*`
/// environment variables, e.g. `RANGO_APPLICATION__PORT=9000`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    dotenv::dotenv().ok();
    let base_path = std::env::current_dir().map_err(|e| config::ConfigError::Foreign(e.into()))?;
    load_from(&base_path.join("configuration"))
}

pub fn load_from(configuration_dir: &Path) -> Result<Settings, config::ConfigError> {
    let defaults = SessionSettings::default();
    config::Config::builder()
        .set_default("application.host", "0.0.0.0")?
        .set_default("application.port", 8080)?
        .set_default("database.path", "rango.db")?
        .set_default("media.static_dir", "static")?
        .set_default("media.media_dir", "media")?
        .set_default("session.cookie_name", defaults.cookie_name)?
        .set_default("session.max_age_seconds", defaults.max_age_seconds)?
        .set_default("session.secure", defaults.secure)?
        .add_source(config::File::from(configuration_dir.join("base.yaml")).required(false))
        .add_source(
            config::Environment::with_prefix("RANGO")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(dir.path()).unwrap();
        assert_eq!(settings.session.cookie_name, "sessionid");
        assert_eq!(settings.session.max_age_seconds, 1_209_600);
        assert_eq!(settings.media.media_dir, PathBuf::from("media"));
    }

    #[test]
    fn yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("base.yaml"),
            "application:\n  host: 127.0.0.1\n  port: 9001\ndatabase:\n  path: /tmp/test.db\n",
        )
        .unwrap();
        let settings = load_from(dir.path()).unwrap();
        assert_eq!(settings.application.address(), "127.0.0.1:9001");
        assert_eq!(settings.database.path, "/tmp/test.db");
    }
}
