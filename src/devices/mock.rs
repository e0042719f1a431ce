// devices/mock.rs
//! Scripted in-memory projector used by the worker and fleet tests.

use super::{Connector, Credentials, DeviceLink};
use crate::{
    error::LinkError,
    models::{PowerState, ShutterState},
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    SetPower(bool),
    SetShutter(bool),
}

#[derive(Debug)]
pub struct MockState {
    pub power: PowerState,
    pub shutter: ShutterState,
    pub refuse_connect: bool,
    pub reject_auth: bool,
    pub fail_polls: bool,
    /// Time each power query takes to answer.
    pub poll_delay: Duration,
    /// Number of upcoming set operations that fail with an I/O error.
    pub fail_sets: usize,
    pub connects: usize,
    pub polls: usize,
    pub attempted: Vec<Op>,
    pub applied: Vec<Op>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            shutter: ShutterState::Open,
            refuse_connect: false,
            reject_auth: false,
            fail_polls: false,
            poll_delay: Duration::ZERO,
            fail_sets: 0,
            connects: 0,
            polls: 0,
            attempted: Vec::new(),
            applied: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn applied(&self) -> Vec<Op> {
        self.state().applied.clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceLink>, LinkError> {
        let mut state = self.state();
        state.connects += 1;
        if state.refuse_connect {
            return Err(LinkError::Connect(address.to_string()));
        }
        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
            authenticated: false,
        }))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
    authenticated: bool,
}

impl MockLink {
    fn session(&self) -> Result<MutexGuard<'_, MockState>, LinkError> {
        if !self.authenticated {
            return Err(LinkError::Protocol("not authenticated".into()));
        }
        Ok(self.state.lock().unwrap())
    }

    fn set(&mut self, op: Op) -> Result<(), LinkError> {
        let mut state = self.session()?;
        state.attempted.push(op);
        if state.fail_sets > 0 {
            state.fail_sets -= 1;
            return Err(std::io::Error::other("connection reset").into());
        }
        match op {
            Op::SetPower(on) => {
                state.power = if on { PowerState::On } else { PowerState::Off };
            }
            Op::SetShutter(closed) => {
                state.shutter = if closed {
                    ShutterState::Closed
                } else {
                    ShutterState::Open
                };
            }
        }
        state.applied.push(op);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceLink for MockLink {
    async fn authenticate(&mut self, _credentials: &Credentials) -> Result<(), LinkError> {
        if self.state.lock().unwrap().reject_auth {
            return Err(LinkError::Auth);
        }
        self.authenticated = true;
        Ok(())
    }

    async fn power(&mut self) -> Result<PowerState, LinkError> {
        let delay = self.session()?.poll_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.session()?;
        if state.fail_polls {
            return Err(std::io::Error::other("timed out").into());
        }
        state.polls += 1;
        Ok(state.power)
    }

    async fn shutter(&mut self) -> Result<ShutterState, LinkError> {
        let state = self.session()?;
        if state.fail_polls {
            return Err(std::io::Error::other("timed out").into());
        }
        Ok(state.shutter)
    }

    async fn set_power(&mut self, on: bool) -> Result<(), LinkError> {
        self.set(Op::SetPower(on))
    }

    async fn set_shutter(&mut self, closed: bool) -> Result<(), LinkError> {
        self.set(Op::SetShutter(closed))
    }
}
