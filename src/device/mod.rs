//! # Device actor
//!
//! One task per configured panel. The actor owns the panel's [`Session`], a
//! [`Supervisor`] for the serial link, and the receiving ends of the Data Bus
//! subscription, write completions and the control channel. Everything that touches a
//! session happens inside this task, serialized by a single `tokio::select!` loop.
//!
//! ```text
//! Disconnected -> Connecting -> Open -> (Error | Closed) -> Reconnecting -> Connecting
//! ```
//!
//! Settle and page timers live inside the connection scope and die with it.

#[cfg(feature = "serial")]
pub mod serial;

use crate::bus::{BusError, DataBus, Delta};
use crate::logutil::{command_preview, hex_snippet};
use crate::metrics::DeviceMetrics;
use crate::nextion::{classify, encode_command, FrameDecoder};
use crate::session::Session;
use chrono::Utc;
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};

/// Something the link reader observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Data(Vec<u8>),
    Closed,
    Error(String),
}

/// Write half of an open link.
pub trait LinkWriter: Send {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// An open link: inbound events plus the write half.
pub struct Link {
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
    pub writer: Box<dyn LinkWriter>,
}

/// Opens links to one panel. Implemented by the serial connector and by test doubles.
pub trait Connector: Send + Sync {
    fn open(&self) -> Result<Link, LinkError>;
    /// Port name or similar, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is not open")]
    NotOpen,
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

/// Owns the write half of the link and tracks the connection state.
pub struct Supervisor {
    state: ConnectionState,
    writer: Option<Box<dyn LinkWriter>>,
    metrics: Arc<DeviceMetrics>,
}

impl Supervisor {
    pub fn new(metrics: Arc<DeviceMetrics>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            writer: None,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn attach(&mut self, writer: Box<dyn LinkWriter>) {
        self.writer = Some(writer);
        self.state = ConnectionState::Open;
    }

    /// Drop the write half. The state is left to the caller.
    pub fn detach(&mut self) {
        self.writer = None;
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.state != ConnectionState::Open {
            return Err(LinkError::NotOpen);
        }
        let writer = self.writer.as_mut().ok_or(LinkError::NotOpen)?;
        writer.write_all(bytes)?;
        Ok(())
    }

    /// Encode and write commands in order. Unencodable commands are skipped; an I/O
    /// failure aborts the batch.
    pub fn send_commands(&mut self, label: &str, commands: Vec<String>) -> Result<(), LinkError> {
        for command in commands {
            let bytes = match encode_command(&command) {
                Ok(b) => b,
                Err(e) => {
                    warn!("[{}] dropping command {}: {}", label, command_preview(&command), e);
                    self.metrics.inc_commands_rejected();
                    continue;
                }
            };
            trace!("[{}] TX {}", label, hex_snippet(&bytes, 48));
            self.write(&bytes)?;
            self.metrics.inc_commands_out();
        }
        Ok(())
    }
}

/// Human-readable device state published on the status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    Connecting,
    Waiting,
    OnPage(u8),
    Disconnected { retry: Duration },
    Error(String),
    NotConfigured(String),
    Stopped,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Connecting => write!(f, "connecting"),
            DeviceStatus::Waiting => write!(f, "connected, waiting for data"),
            DeviceStatus::OnPage(page) => write!(f, "connected, page {}", page),
            DeviceStatus::Disconnected { retry } => {
                write!(f, "disconnected, retry in {}s", retry.as_secs_f64())
            }
            DeviceStatus::Error(e) => write!(f, "error: {}", e),
            DeviceStatus::NotConfigured(why) => write!(f, "not configured: {}", why),
            DeviceStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceControl {
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceTiming {
    pub reconnect_delay: Duration,
    /// Delay before device settings, and again before the initial mode.
    pub settle_delay: Duration,
}

impl Default for DeviceTiming {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Caller's side of a running device actor.
pub struct DeviceHandle {
    pub label: String,
    control_tx: mpsc::UnboundedSender<DeviceControl>,
    status_rx: watch::Receiver<DeviceStatus>,
    metrics: Arc<DeviceMetrics>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DeviceHandle {
    pub fn status(&self) -> DeviceStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel for status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<DeviceStatus> {
        self.status_rx.clone()
    }

    pub fn metrics(&self) -> Arc<DeviceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Ask the actor to stop and wait for it.
    pub async fn shutdown(mut self) {
        let _ = self.control_tx.send(DeviceControl::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("[{}] device task ended abnormally: {}", self.label, e);
            }
        }
    }

    /// Handle for a device that never got an actor.
    pub fn not_configured(label: impl Into<String>, reason: impl Into<String>) -> Self {
        let (control_tx, _) = mpsc::unbounded_channel();
        let (_, status_rx) = watch::channel(DeviceStatus::NotConfigured(reason.into()));
        Self {
            label: label.into(),
            control_tx,
            status_rx,
            metrics: Arc::new(DeviceMetrics::default()),
            task: None,
        }
    }
}

enum Outcome {
    Closed,
    Failed(String),
    Shutdown,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Settle {
    DeviceSettings,
    InitialMode,
    Done,
}

type Completion = (String, Result<(), BusError>);

pub struct DeviceActor {
    session: Session,
    connector: Arc<dyn Connector>,
    bus: Arc<dyn DataBus>,
    timing: DeviceTiming,
    supervisor: Supervisor,
    deltas: mpsc::UnboundedReceiver<Delta>,
    control_rx: mpsc::UnboundedReceiver<DeviceControl>,
    status_tx: watch::Sender<DeviceStatus>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    metrics: Arc<DeviceMetrics>,
}

impl DeviceActor {
    /// Spawn the actor. `deltas` is this device's Data Bus subscription.
    pub fn spawn(
        session: Session,
        connector: Arc<dyn Connector>,
        bus: Arc<dyn DataBus>,
        deltas: mpsc::UnboundedReceiver<Delta>,
        timing: DeviceTiming,
    ) -> DeviceHandle {
        let label = session.label().to_string();
        let metrics = Arc::new(DeviceMetrics::default());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(DeviceStatus::Connecting);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let actor = DeviceActor {
            session,
            connector,
            bus,
            timing,
            supervisor: Supervisor::new(Arc::clone(&metrics)),
            deltas,
            control_rx,
            status_tx,
            completions_tx,
            completions_rx,
            metrics: Arc::clone(&metrics),
        };
        let task = tokio::spawn(actor.run());
        DeviceHandle {
            label,
            control_tx,
            status_rx,
            metrics,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        let label = self.session.label().to_string();
        info!("[{}] device actor started for {}", label, self.connector.describe());
        loop {
            self.supervisor.set_state(ConnectionState::Connecting);
            self.publish(DeviceStatus::Connecting);
            let outcome = match self.connector.open() {
                Ok(link) => {
                    info!("[{}] connected to {}", label, self.connector.describe());
                    self.serve(link).await
                }
                Err(e) => Outcome::Failed(e.to_string()),
            };

            self.supervisor.detach();
            self.session.on_disconnected();
            let status = match outcome {
                Outcome::Shutdown => break,
                Outcome::Closed => {
                    info!("[{}] link closed", label);
                    DeviceStatus::Disconnected {
                        retry: self.timing.reconnect_delay,
                    }
                }
                Outcome::Failed(e) => {
                    warn!("[{}] link error: {}", label, e);
                    DeviceStatus::Error(e)
                }
            };

            self.supervisor.set_state(ConnectionState::Reconnecting);
            self.publish(status);
            self.metrics.inc_reconnects();
            if !self.wait_reconnect().await {
                break;
            }
        }
        self.supervisor.set_state(ConnectionState::Disconnected);
        self.publish(DeviceStatus::Stopped);
        info!("[{}] device actor stopped", label);
    }

    async fn serve(&mut self, link: Link) -> Outcome {
        let Link { mut events, writer } = link;
        self.supervisor.attach(writer);
        self.session.on_connected();
        self.publish(DeviceStatus::Waiting);
        if let Err(e) = self.flush() {
            return Outcome::Failed(e.to_string());
        }

        let mut decoder = FrameDecoder::new();
        let mut stage = Settle::DeviceSettings;
        let settle = sleep(self.timing.settle_delay);
        tokio::pin!(settle);
        let mut pager = self.pager_interval();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(LinkEvent::Data(bytes)) => self.on_bytes(&mut decoder, &bytes),
                    Some(LinkEvent::Closed) | None => return Outcome::Closed,
                    Some(LinkEvent::Error(e)) => return Outcome::Failed(e),
                },
                Some(delta) = self.deltas.recv() => {
                    self.session.on_delta(&delta, Utc::now());
                }
                Some((path, result)) = self.completions_rx.recv() => {
                    self.complete(&path, result);
                }
                _ = &mut settle, if stage != Settle::Done => {
                    stage = match stage {
                        Settle::DeviceSettings => {
                            self.session.apply_device_settings();
                            settle.as_mut().reset(Instant::now() + self.timing.settle_delay);
                            Settle::InitialMode
                        }
                        _ => {
                            self.session.apply_initial_mode(Utc::now());
                            Settle::Done
                        }
                    };
                }
                _ = next_tick(&mut pager) => {
                    self.session.page_tick(Instant::now());
                }
                control = self.control_rx.recv() => match control {
                    Some(DeviceControl::Shutdown) | None => return Outcome::Shutdown,
                },
            }

            self.dispatch_writes();
            if let Err(e) = self.flush() {
                return Outcome::Failed(e.to_string());
            }
            let status = match self.session.state().current_page {
                Some(page) => DeviceStatus::OnPage(page),
                None => DeviceStatus::Waiting,
            };
            self.publish(status);
        }
    }

    /// Sleep out the reconnect delay. Deltas are discarded, completions still land.
    /// Returns false on shutdown.
    async fn wait_reconnect(&mut self) -> bool {
        let delay = sleep(self.timing.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => return true,
                Some(delta) = self.deltas.recv() => {
                    trace!("[{}] dropping delta for {} while disconnected", self.session.label(), delta.path);
                }
                Some((path, result)) = self.completions_rx.recv() => {
                    self.complete(&path, result);
                }
                control = self.control_rx.recv() => match control {
                    Some(DeviceControl::Shutdown) | None => return false,
                },
            }
        }
    }

    fn on_bytes(&mut self, decoder: &mut FrameDecoder, bytes: &[u8]) {
        trace!("[{}] RX {}", self.session.label(), hex_snippet(bytes, 48));
        let overflows = decoder.overflows();
        let frames = decoder.push(bytes);
        for _ in overflows..decoder.overflows() {
            self.metrics.inc_frames_dropped();
        }
        for frame in frames {
            self.metrics.inc_frames_in();
            match classify(&frame) {
                Some(event) => self.session.handle_event(event, Instant::now()),
                None => {
                    debug!("[{}] unrecognized frame {}", self.session.label(), hex_snippet(&frame, 16));
                    self.metrics.inc_frames_dropped();
                }
            }
        }
    }

    fn complete(&mut self, path: &str, result: Result<(), BusError>) {
        self.metrics.record_write(result.is_ok());
        self.session.complete_write(path, &result);
    }

    /// Issue button writes; each completion comes back through `completions_rx`.
    fn dispatch_writes(&mut self) {
        for request in self.session.take_writes() {
            let pending = self.bus.write(&request.path, request.value);
            let tx = self.completions_tx.clone();
            let path = request.path;
            tokio::spawn(async move {
                let result = pending.await;
                let _ = tx.send((path, result));
            });
        }
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        let commands = self.session.take_commands();
        if commands.is_empty() {
            return Ok(());
        }
        self.supervisor.send_commands(self.session.label(), commands)
    }

    fn pager_interval(&self) -> Option<Interval> {
        let period = self.session.settings().advance_pages;
        if period.is_zero() {
            return None;
        }
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }

    fn publish(&self, status: DeviceStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            debug!("[{}] status: {}", self.session.label(), status);
            *current = status;
            true
        });
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LinkWriter for VecWriter {
        fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn write_requires_open_link() {
        let mut sup = Supervisor::new(Arc::new(DeviceMetrics::default()));
        assert!(matches!(sup.write(b"x"), Err(LinkError::NotOpen)));
        let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
        sup.attach(Box::new(VecWriter(Arc::clone(&sink))));
        sup.write(b"x").unwrap();
        sup.detach();
        sup.set_state(ConnectionState::Reconnecting);
        assert!(matches!(sup.write(b"y"), Err(LinkError::NotOpen)));
        assert_eq!(sink.lock().unwrap().as_slice(), b"x");
    }

    #[test]
    fn unencodable_commands_are_skipped() {
        let metrics = Arc::new(DeviceMetrics::default());
        let mut sup = Supervisor::new(Arc::clone(&metrics));
        let sink = Arc::new(std::sync::Mutex::new(Vec::new()));
        sup.attach(Box::new(VecWriter(Arc::clone(&sink))));
        sup.send_commands(
            "test",
            vec!["t0.txt=\"\u{2192}\"".to_string(), "sendme".to_string()],
        )
        .unwrap();
        assert_eq!(sink.lock().unwrap().as_slice(), b"sendme\xFF\xFF\xFF");
        let snap = metrics.snapshot();
        assert_eq!(snap.commands_out, 1);
        assert_eq!(snap.commands_rejected, 1);
    }

    #[test]
    fn status_text() {
        assert_eq!(DeviceStatus::OnPage(3).to_string(), "connected, page 3");
        assert_eq!(
            DeviceStatus::Disconnected {
                retry: Duration::from_millis(1000)
            }
            .to_string(),
            "disconnected, retry in 1s"
        );
        assert_eq!(DeviceStatus::Waiting.to_string(), "connected, waiting for data");
    }
}
