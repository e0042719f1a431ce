//! Per-projector polling and command loop.

use crate::{
    commands::Command,
    devices::{Connector, Credentials, DeviceLink},
    error::LinkError,
    events::EventBus,
    models::{DeviceConfig, DeviceStatus, StatusChanged},
    telemetry,
};
use chrono::Utc;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::{
    sync::{Notify, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Cooperative stop signal shared by every worker of a fleet.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` or until shutdown is triggered.
    async fn sleep(&self, duration: Duration) {
        let notified = self.notify.notified();
        if self.is_triggered() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
    }
}

/// Caller side of a worker: command submission and status reads.
/// Neither operation touches the network.
#[derive(Clone)]
pub struct WorkerHandle {
    config: DeviceConfig,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<DeviceStatus>,
}

impl WorkerHandle {
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn enqueue(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(device = %self.config.name, %command, "Worker stopped, command dropped");
        }
    }

    pub fn current_status(&self) -> DeviceStatus {
        self.status.borrow().clone()
    }

    /// Receiver that wakes on every status publication of this device.
    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status.clone()
    }
}

pub struct DeviceWorker {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    poll_interval: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<DeviceStatus>,
    events: Arc<EventBus>,
    shutdown: Shutdown,
    link: Option<Box<dyn DeviceLink>>,
}

impl DeviceWorker {
    pub fn new(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        poll_interval: Duration,
        events: Arc<EventBus>,
        shutdown: Shutdown,
    ) -> (Self, WorkerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(DeviceStatus::default());

        let handle = WorkerHandle {
            config: config.clone(),
            commands: command_tx,
            status: status_rx,
        };
        let worker = Self {
            config,
            connector,
            credentials,
            poll_interval,
            commands: command_rx,
            status: status_tx,
            events,
            shutdown,
            link: None,
        };
        (worker, handle)
    }

    /// Runs until shutdown is triggered. Link failures are absorbed here:
    /// the link is dropped and reopened on a later pass.
    pub async fn run(mut self) {
        info!(device = %self.config.name, address = %self.config.address, "Worker started");
        let mut mark = Instant::now();

        while !self.shutdown.is_triggered() {
            if self.link.is_none() {
                match self.open_link().await {
                    Ok(link) => {
                        info!(device = %self.config.name, "Link ready");
                        self.link = Some(link);
                    }
                    Err((stage, e)) => {
                        warn!(device = %self.config.name, stage, error = %e, "Link setup failed");
                        telemetry::record_link_failure(&self.config.name, stage);
                        // Retry one interval after the previous attempt started, not after it failed.
                        self.pace(&mut mark).await;
                        continue;
                    }
                }
            }

            // Commands go first, one per pass, without pacing.
            if let Ok(command) = self.commands.try_recv() {
                self.apply(command).await;
                continue;
            }

            self.poll().await;
            self.pace(&mut mark).await;
        }

        info!(device = %self.config.name, "Worker stopped");
    }

    async fn open_link(&self) -> Result<Box<dyn DeviceLink>, (&'static str, LinkError)> {
        debug!(device = %self.config.name, "Connecting");
        let mut link = self
            .connector
            .connect(&self.config.address)
            .await
            .map_err(|e| ("connect", e))?;
        link.authenticate(&self.credentials)
            .await
            .map_err(|e| ("authenticate", e))?;
        Ok(link)
    }

    /// At-most-once: a command that fails is not requeued.
    async fn apply(&mut self, command: Command) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = command.apply(link.as_mut()).await;
        match result {
            Ok(()) => {
                info!(device = %self.config.name, %command, "Command applied");
                telemetry::record_command(&self.config.name, command, "applied");
            }
            Err(e) => {
                warn!(device = %self.config.name, %command, error = %e, "Command lost, dropping link");
                telemetry::record_command(&self.config.name, command, "lost");
                telemetry::record_link_failure(&self.config.name, "command");
                self.drop_link();
            }
        }
    }

    async fn poll(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let result = async {
            let power = link.power().await?;
            let shutter = link.shutter().await?;
            Ok::<_, LinkError>((power, shutter))
        }
        .await;

        match result {
            Ok((power, shutter)) => {
                let status = DeviceStatus {
                    power,
                    shutter,
                    last_updated: Some(Utc::now()),
                };
                debug!(device = %self.config.name, ?power, ?shutter, "Polled");
                telemetry::record_poll(&self.config.name);
                self.status.send_replace(status.clone());
                self.events.publish(StatusChanged {
                    device: self.config.name.clone(),
                    status,
                });
            }
            Err(e) => {
                warn!(device = %self.config.name, error = %e, "Poll failed, dropping link");
                telemetry::record_link_failure(&self.config.name, "poll");
                self.drop_link();
            }
        }
    }

    fn drop_link(&mut self) {
        if self.link.take().is_some() {
            info!(device = %self.config.name, "Link closed");
        }
    }

    /// Sleeps out the remainder of the poll interval since the last pass
    /// reached this point, so cadence does not drift with work time.
    async fn pace(&self, mark: &mut Instant) {
        if let Some(remaining) = self.poll_interval.checked_sub(mark.elapsed()) {
            self.shutdown.sleep(remaining).await;
        }
        *mark = Instant::now();
    }
}
