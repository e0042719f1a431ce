// devices/mod.rs
#[cfg(test)]
pub mod mock;
mod pjlink;

pub use pjlink::{DEFAULT_PORT, PjLinkConnector};

use crate::{
    error::LinkError,
    models::{PowerState, ShutterState},
};
use serde::Deserialize;
use std::fmt;

/// Shared projector credential. Opaque to the fleet; only links read it.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Opens sessions to projectors.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, LinkError>;
}

/// An open session to one projector, owned by exactly one worker.
/// Any error leaves the session unusable; callers drop it and reconnect.
#[async_trait::async_trait]
pub trait DeviceLink: Send + Sync {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), LinkError>;
    async fn power(&mut self) -> Result<PowerState, LinkError>;
    async fn shutter(&mut self) -> Result<ShutterState, LinkError>;
    async fn set_power(&mut self, on: bool) -> Result<(), LinkError>;
    async fn set_shutter(&mut self, closed: bool) -> Result<(), LinkError>;
}
