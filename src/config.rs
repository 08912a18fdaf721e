use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::domain::OrderingPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub influxdb: InfluxSettings,
    pub query: QuerySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database_name: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub port: u16,
    /// Empty disables basic auth
    pub username: String,
    pub password: String,
    pub database_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    /// Length of each time-series query window
    pub window_hours: u32,
    /// Handling of buffer samples that arrive out of time order
    pub ordering: OrderingPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

impl Settings {
    /// Load settings from a YAML file, with `SCHEME_REPORT__...` environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("postgres.host", "localhost")?
            .set_default("postgres.port", 5432)?
            .set_default("postgres.username", "puffer")?
            .set_default("postgres.password", "")?
            .set_default("postgres.database_name", "puffer")?
            .set_default("postgres.max_connections", 1)?
            .set_default("influxdb.host", "localhost")?
            .set_default("influxdb.port", 8086)?
            .set_default("influxdb.username", "")?
            .set_default("influxdb.password", "")?
            .set_default("influxdb.database_name", "puffer")?
            .set_default("query.window_hours", 24)?
            .set_default("query.ordering", "reorder")?
            .set_default("logging.level", "info")?
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("SCHEME_REPORT").separator("__"))
            .build()?;

        let settings: Self = config.try_deserialize()?;
        if settings.query.window_hours == 0 {
            return Err(ConfigError::Message(
                "query.window_hours must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres.username,
            urlencoding::encode(&self.postgres.password),
            self.postgres.host,
            self.postgres.port,
            self.postgres.database_name
        )
    }

    pub fn influx_base_url(&self) -> String {
        format!("http://{}:{}", self.influxdb.host, self.influxdb.port)
    }

    pub fn query_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.query.window_hours))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings_file(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_settings_can_be_loaded() {
        let file = settings_file(
            "postgres:\n  host: db.example\n  password: s3cret\ninfluxdb:\n  port: 9086\n",
        );
        let settings = Settings::load(file.path()).unwrap();

        assert_eq!(settings.postgres.host, "db.example");
        assert_eq!(settings.influxdb.port, 9086);
        assert_eq!(settings.query.window_hours, 24);
        assert_eq!(settings.query.ordering, OrderingPolicy::Reorder);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_ordering_policy_from_yaml() {
        let file = settings_file("query:\n  ordering: discard\n  window_hours: 6\n");
        let settings = Settings::load(file.path()).unwrap();

        assert_eq!(settings.query.ordering, OrderingPolicy::Discard);
        assert_eq!(settings.query_window(), chrono::Duration::hours(6));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let file = settings_file("query:\n  window_hours: 0\n");
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_database_url_format() {
        let file = settings_file("postgres:\n  password: 'p@ss'\n");
        let settings = Settings::load(file.path()).unwrap();
        let url = settings.database_url();
        assert!(url.starts_with("postgres://"));
        assert!(url.contains("p%40ss"));
        assert!(url.ends_with("/puffer"));
        assert_eq!(settings.influx_base_url(), "http://localhost:8086");
    }
}
