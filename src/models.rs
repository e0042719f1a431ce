use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{commands::Command, fleet::Fleet};

/// One configured projector. Immutable once the fleet is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeviceConfig {
    #[validate(length(min = 1, message = "device name must not be empty"))]
    pub name: String,
    #[validate(length(min = 1, message = "device address must not be empty"))]
    pub address: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Warming,
    Cooling,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShutterState {
    Open,
    Closed,
    #[default]
    Unknown,
}

/// Last known state of one projector. Power and shutter always come from
/// the same poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatus {
    pub power: PowerState,
    pub shutter: ShutterState,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceSnapshot {
    pub config: DeviceConfig,
    pub status: DeviceStatus,
}

/// Published on the fleet event bus after every successful poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusChanged {
    pub device: String,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CommandRequest {
    pub command: Command,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BroadcastResponse {
    pub enqueued: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Snapshot { devices: Vec<DeviceSnapshot> },
    StatusUpdate { device: String, status: DeviceStatus },
    /// `device: None` fans the command out to every projector.
    Command {
        #[serde(default)]
        device: Option<String>,
        command: Command,
    },
    Error { message: String, code: u16 },
}

impl From<StatusChanged> for WsMessage {
    fn from(changed: StatusChanged) -> Self {
        WsMessage::StatusUpdate {
            device: changed.device,
            status: changed.status,
        }
    }
}

pub struct AppState {
    pub fleet: Arc<Fleet>,
    pub clients: DashMap<Uuid, DateTime<Utc>>,
}

impl AppState {
    pub fn new(fleet: Arc<Fleet>) -> Self {
        Self {
            fleet,
            clients: DashMap::new(),
        }
    }
}
