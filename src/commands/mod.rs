// commands/mod.rs
use crate::{devices::DeviceLink, error::LinkError};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// An operator intent queued for one projector and applied at most once.
///
/// `ShutterOn` shows the picture (shutter open); `ShutterOff` blanks it
/// (shutter closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    PowerOn,
    PowerOff,
    ShutterOn,
    ShutterOff,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::PowerOn => "power_on",
            Command::PowerOff => "power_off",
            Command::ShutterOn => "shutter_on",
            Command::ShutterOff => "shutter_off",
        }
    }

    pub async fn apply(self, link: &mut dyn DeviceLink) -> Result<(), LinkError> {
        match self {
            Command::PowerOn => link.set_power(true).await,
            Command::PowerOff => link.set_power(false).await,
            Command::ShutterOn => link.set_shutter(false).await,
            Command::ShutterOff => link.set_shutter(true).await,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
