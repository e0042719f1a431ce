//! Owns one worker per configured projector.

use crate::{
    commands::Command,
    devices::{Connector, Credentials},
    error::AppError,
    events::EventBus,
    models::{DeviceConfig, DeviceSnapshot, StatusChanged},
    worker::{DeviceWorker, Shutdown, WorkerHandle},
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

pub struct Fleet {
    handles: Vec<WorkerHandle>,
    pending: Mutex<Option<Vec<DeviceWorker>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: Arc<EventBus>,
    shutdown: Shutdown,
}

impl Fleet {
    /// Builds the workers without starting them.
    pub fn new(
        devices: Vec<DeviceConfig>,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        poll_interval: Duration,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let shutdown = Shutdown::new();

        let (workers, handles): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .map(|config| {
                DeviceWorker::new(
                    config,
                    Arc::clone(&connector),
                    credentials.clone(),
                    poll_interval,
                    Arc::clone(&events),
                    shutdown.clone(),
                )
            })
            .unzip();

        Self {
            handles,
            pending: Mutex::new(Some(workers)),
            tasks: Mutex::new(Vec::new()),
            events,
            shutdown,
        }
    }

    /// Spawns every worker loop. Later calls do nothing.
    pub fn start(&self) {
        let Some(workers) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            warn!("Fleet already started");
            return;
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for worker in workers {
            tasks.push(tokio::spawn(worker.run()));
        }
        info!(devices = tasks.len(), "Fleet started");
    }

    /// Enqueues `command` on every worker, healthy or not, and returns the
    /// number of enqueues issued. Does not wait for the commands to apply.
    pub fn broadcast(&self, command: Command) -> usize {
        for handle in &self.handles {
            handle.enqueue(command);
        }
        info!(%command, devices = self.handles.len(), "Broadcast command");
        self.handles.len()
    }

    pub fn enqueue(&self, device: &str, command: Command) -> Result<(), AppError> {
        let handle = self
            .get(device)
            .ok_or_else(|| AppError::DeviceNotFound(device.to_string()))?;
        handle.enqueue(command);
        Ok(())
    }

    pub fn get(&self, device: &str) -> Option<&WorkerHandle> {
        self.handles.iter().find(|h| h.config().name == device)
    }

    /// Current status of every device, in configuration order.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.handles
            .iter()
            .map(|handle| DeviceSnapshot {
                config: handle.config().clone(),
                status: handle.current_status(),
            })
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChanged> {
        self.events.subscribe()
    }

    /// Signals every worker and waits for their loops to exit.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Fleet stopped");
    }
}
