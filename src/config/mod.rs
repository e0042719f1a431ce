// config/mod.rs
use crate::{devices::Credentials, error::AppError, models::DeviceConfig};
use ::config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct Settings {
    pub server: ServerSettings,
    pub metrics: MetricsSettings,
    #[validate(nested)]
    pub fleet: FleetSettings,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub address: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FleetSettings {
    pub credential: Credentials,
    #[validate(length(min = 1, message = "at least one device is required"), nested)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pjlink_port")]
    pub pjlink_port: u16,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_pjlink_port() -> u16 {
    crate::devices::DEFAULT_PORT
}

impl FleetSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Settings {
    pub fn new() -> Result<Self, AppError> {
        Self::build(
            Config::builder()
                .add_source(File::with_name("config/config"))
                .add_source(Environment::with_prefix("APP").separator("__")),
        )
    }

    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        Self::build(Config::builder().add_source(File::from_str(source, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), AppError> {
        self.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut seen = HashSet::new();
        for device in &self.fleet.devices {
            if !seen.insert(device.name.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate device name {:?}",
                    device.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        address = "0.0.0.0:3000"

        [metrics]
        enabled = false
        port = 9000

        [fleet]
        credential = "admin"

        [[fleet.devices]]
        name = "StageLeft"
        address = "proj1.local"

        [[fleet.devices]]
        name = "Center"
        address = "10.0.0.12:4352"
    "#;

    #[test]
    fn parses_devices_in_order_with_defaults() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        let names: Vec<_> = settings
            .fleet
            .devices
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["StageLeft", "Center"]);
        assert_eq!(settings.fleet.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.fleet.connect_timeout(), Duration::from_secs(3));
        assert_eq!(settings.fleet.pjlink_port, 4352);
        assert_eq!(settings.fleet.credential.expose(), "admin");
    }

    #[test]
    fn rejects_duplicate_device_names() {
        let source = SAMPLE.replace("name = \"Center\"", "name = \"StageLeft\"");
        let err = Settings::from_toml(&source).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_blank_device_address() {
        let source = SAMPLE.replace("\"proj1.local\"", "\"\"");
        assert!(matches!(
            Settings::from_toml(&source),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let source = SAMPLE.replace("credential = \"admin\"", "");
        assert!(matches!(
            Settings::from_toml(&source),
            Err(AppError::Config(_))
        ));
    }
}
