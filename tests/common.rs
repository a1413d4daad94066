//! Test utilities & fixtures shared by the integration tests.
#![allow(dead_code)]

use chrono::NaiveTime;
use nextion_bridge::bus::{DataBus, MemoryBus};
use nextion_bridge::device::{Connector, Link, LinkError, LinkEvent, LinkWriter};
use nextion_bridge::model::{DeviceModel, Theme};
use nextion_bridge::session::{FixedSchedule, Session, SessionSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Day from 06:00 to 20:00 UTC with half-hour twilights.
pub fn schedule() -> FixedSchedule {
    FixedSchedule {
        sunrise: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        sunset: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        twilight_minutes: 30,
    }
}

pub fn session(model: DeviceModel, bus: &MemoryBus) -> Session {
    session_with(model, Theme::default(), SessionSettings::default(), bus)
}

pub fn session_with(
    model: DeviceModel,
    theme: Theme,
    settings: SessionSettings,
    bus: &MemoryBus,
) -> Session {
    let bus: Arc<dyn DataBus> = Arc::new(bus.clone());
    Session::new(
        "test",
        Arc::new(model),
        Arc::new(theme),
        settings,
        bus,
        Arc::new(schedule()),
    )
}

/// Split terminated wire bytes back into command strings (Latin-1).
pub fn commands(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0xFF)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.iter().map(|&b| b as char).collect())
        .collect()
}

/// The panel side of one mock link.
pub struct MockPanel {
    pub events: mpsc::UnboundedSender<LinkEvent>,
    pub written: Arc<Mutex<Vec<u8>>>,
}

impl MockPanel {
    pub fn send(&self, bytes: &[u8]) {
        let _ = self.events.send(LinkEvent::Data(bytes.to_vec()));
    }

    pub fn close(&self) {
        let _ = self.events.send(LinkEvent::Closed);
    }

    pub fn commands(&self) -> Vec<String> {
        commands(&self.written.lock().unwrap())
    }

    /// Wait until the panel has received a command satisfying `pred`.
    pub async fn wait_for<F>(&self, pred: F) -> Vec<String>
    where
        F: Fn(&[String]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let cmds = self.commands();
            if pred(&cmds) {
                return cmds;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out; panel saw {:?}",
                cmds
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl LinkWriter for SharedWriter {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

/// Connector handing every opened link's panel side to the test.
pub struct MockConnector {
    panels: mpsc::UnboundedSender<MockPanel>,
    fail_first: usize,
    opens: AtomicUsize,
}

impl MockConnector {
    pub fn new(fail_first: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPanel>) {
        let (panels, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            panels,
            fail_first,
            opens: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn open(&self) -> Result<Link, LinkError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(LinkError::Open {
                port: "mock".into(),
                reason: "no such device".into(),
            });
        }
        let (tx, events) = mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let _ = self.panels.send(MockPanel {
            events: tx,
            written: Arc::clone(&written),
        });
        Ok(Link {
            events,
            writer: Box::new(SharedWriter(written)),
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
