//! Bridge server: one device actor per `[[devices]]` entry.
//!
//! Devices are paired with model entries by position. A device without a model entry
//! reports `not configured` while the others run.
use crate::bus::DataBus;
use crate::config::{Config, DeviceConfig};
use crate::device::{Connector, DeviceActor, DeviceHandle, DeviceStatus};
use crate::model::DisplayModel;
use crate::session::{Session, SunTimesProvider};
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

pub struct BridgeServer {
    devices: Vec<DeviceHandle>,
}

impl BridgeServer {
    /// Validate `config` and spawn the device actors. `connect` builds the link
    /// connector for each device (the serial port in production).
    pub fn start<F>(
        config: &Config,
        model: DisplayModel,
        bus: Arc<dyn DataBus>,
        sun: Arc<dyn SunTimesProvider>,
        connect: F,
    ) -> Result<Self>
    where
        F: Fn(&DeviceConfig) -> Arc<dyn Connector>,
    {
        config.validate()?;
        let paths = model.subscribed_paths();
        let theme = Arc::new(model.theme);
        if model.devices.len() > config.devices.len() {
            warn!(
                "Display model describes {} device(s) but only {} are configured",
                model.devices.len(),
                config.devices.len()
            );
        }
        let mut models = model.devices.into_iter().map(Arc::new);

        let mut devices = Vec::with_capacity(config.devices.len());
        for (index, device) in config.devices.iter().enumerate() {
            let label = format!("panel{}", index);
            let Some(device_model) = models.next() else {
                warn!("[{}] no display model for {}", label, device.port);
                devices.push(DeviceHandle::not_configured(
                    label,
                    format!("no display model for device {}", index),
                ));
                continue;
            };
            info!(
                "[{}] {} with {} page(s)",
                label,
                device.port,
                device_model.page_count()
            );
            let session = Session::new(
                label,
                device_model,
                Arc::clone(&theme),
                device.session_settings(config.display.default_mode),
                Arc::clone(&bus),
                Arc::clone(&sun),
            );
            let deltas = bus.subscribe(paths.clone());
            devices.push(DeviceActor::spawn(
                session,
                connect(device),
                Arc::clone(&bus),
                deltas,
                device.timing(),
            ));
        }
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    /// One line per device: label, status and counters.
    pub fn status_lines(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| format!("{}: {} ({})", d.label, d.status(), d.metrics().snapshot()))
            .collect()
    }

    /// Log every status change of every device until the actors stop.
    pub fn log_status_changes(&self) {
        for device in &self.devices {
            let mut rx = device.subscribe_status();
            let label = device.label.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let status = rx.borrow_and_update().clone();
                    info!("[{}] {}", label, status);
                    if status == DeviceStatus::Stopped {
                        break;
                    }
                }
            });
        }
    }

    pub async fn shutdown(self) {
        info!("Stopping {} device(s)", self.devices.len());
        for device in self.devices {
            device.shutdown().await;
        }
    }
}
