//! Per-device traffic counters.
//! Each device actor owns an `Arc<DeviceMetrics>`; handles read snapshots for status output.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DeviceMetrics {
    frames_in: AtomicU64,
    frames_dropped: AtomicU64,
    commands_out: AtomicU64,
    commands_rejected: AtomicU64,
    writes_ok: AtomicU64,
    writes_failed: AtomicU64,
    reconnects: AtomicU64,
}

impl DeviceMetrics {
    pub fn inc_frames_in(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }
    /// Unknown tag, truncated frame or decoder overflow.
    pub fn inc_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_commands_out(&self) {
        self.commands_out.fetch_add(1, Ordering::Relaxed);
    }
    /// Command text that could not be encoded.
    pub fn inc_commands_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_write(&self, ok: bool) {
        let counter = if ok { &self.writes_ok } else { &self.writes_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            commands_out: self.commands_out.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_in: u64,
    pub frames_dropped: u64,
    pub commands_out: u64,
    pub commands_rejected: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub reconnects: u64,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in={} dropped={} out={} rejected={} writes={}/{} reconnects={}",
            self.frames_in,
            self.frames_dropped,
            self.commands_out,
            self.commands_rejected,
            self.writes_ok,
            self.writes_ok + self.writes_failed,
            self.reconnects
        )
    }
}
