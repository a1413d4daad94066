//! # Data Bus
//!
//! The host data store the panels mirror. The engine needs three things from it:
//! a stream of deltas for the paths it renders, the current value of any path, and
//! an asynchronous write used by buttons.
//!
//! [`MemoryBus`] is an in-process implementation used by the binary (fed from stdin)
//! and by tests. Writes are acknowledged by a pluggable [`WriteHandler`].

use crate::model::Value;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// One value change. `value: None` means the path became unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Delta {
    pub fn new(path: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("write to {path} rejected: {reason}")]
    Rejected { path: String, reason: String },
    #[error("data bus unavailable")]
    Unavailable,
}

pub type WriteFuture = Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>>;

pub trait DataBus: Send + Sync + 'static {
    /// Deltas for the given paths, in arrival order.
    fn subscribe(&self, paths: BTreeSet<String>) -> mpsc::UnboundedReceiver<Delta>;

    fn read_current(&self, path: &str) -> Option<Value>;

    /// Request a write; resolves when the bus acknowledges or rejects it.
    fn write(&self, path: &str, value: Value) -> WriteFuture;
}

/// Decides the outcome of a [`MemoryBus`] write.
pub type WriteHandler = Arc<dyn Fn(&str, &Value) -> WriteFuture + Send + Sync>;

struct Subscriber {
    paths: BTreeSet<String>,
    tx: mpsc::UnboundedSender<Delta>,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Value>,
    subscribers: Vec<Subscriber>,
}

/// In-process Data Bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
    on_write: Option<WriteHandler>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Bus whose writes are acknowledged immediately and applied to the store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            on_write: None,
        }
    }

    /// Bus whose writes are resolved by `handler` (and not applied automatically).
    pub fn with_write_handler(handler: WriteHandler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            on_write: Some(handler),
        }
    }

    /// Set or clear a value and notify subscribers of the path.
    pub fn publish(&self, delta: Delta) {
        let mut inner = self.lock();
        match &delta.value {
            Some(v) => {
                inner.values.insert(delta.path.clone(), v.clone());
            }
            None => {
                inner.values.remove(&delta.path);
            }
        }
        inner.subscribers.retain(|sub| {
            if !sub.paths.contains(&delta.path) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(delta.clone()).is_ok()
        });
        trace!("published {} to {} subscriber(s)", delta.path, inner.subscribers.len());
    }

    pub fn set(&self, path: &str, value: Value) {
        self.publish(Delta::new(path, Some(value)));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned store only means a publisher panicked mid-insert; the map is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DataBus for MemoryBus {
    fn subscribe(&self, paths: BTreeSet<String>) -> mpsc::UnboundedReceiver<Delta> {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("bus subscription for {} path(s)", paths.len());
        self.lock().subscribers.push(Subscriber { paths, tx });
        rx
    }

    fn read_current(&self, path: &str) -> Option<Value> {
        self.lock().values.get(path).cloned()
    }

    fn write(&self, path: &str, value: Value) -> WriteFuture {
        match &self.on_write {
            Some(handler) => handler(path, &value),
            None => {
                let bus = self.clone();
                let path = path.to_string();
                Box::pin(async move {
                    bus.publish(Delta::new(path, Some(value)));
                    Ok(())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_only_their_paths() {
        let bus = MemoryBus::new();
        let mut rx = bus.subscribe(["a".to_string()].into_iter().collect());
        bus.set("b", json!(1));
        bus.set("a", json!(2));
        let delta = rx.recv().await.unwrap();
        assert_eq!(delta.path, "a");
        assert_eq!(delta.value, Some(json!(2)));
        assert_eq!(bus.read_current("b"), Some(json!(1)));
    }

    #[tokio::test]
    async fn default_write_applies_value() {
        let bus = MemoryBus::new();
        bus.write("switch.acr", json!(1)).await.unwrap();
        assert_eq!(bus.read_current("switch.acr"), Some(json!(1)));
    }

    #[tokio::test]
    async fn handler_can_reject() {
        let bus = MemoryBus::with_write_handler(Arc::new(|path: &str, _: &Value| -> WriteFuture {
            let path = path.to_string();
            Box::pin(async move {
                Err(BusError::Rejected {
                    path,
                    reason: "read only".into(),
                })
            })
        }));
        assert!(bus.write("x", json!(1)).await.is_err());
        assert_eq!(bus.read_current("x"), None);
    }

    #[test]
    fn delta_json_defaults() {
        let d: Delta = serde_json::from_str(r#"{"path":"a.b"}"#).unwrap();
        assert_eq!(d.value, None);
    }
}
