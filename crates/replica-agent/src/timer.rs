//! Logical timeouts.
//!
//! Timeouts registered here never fire on their own. The controller decides when
//! a timeout ends and calls back through the `/timeout` route, at which point the
//! pending entry is removed and handed to the node over a bounded channel.
//!
//! At most one timeout per key can be pending. Registering a key that is already
//! pending is a no-op.

use crate::types::ReplicaId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Capacity of the fired-timeout channel.
pub const TIMEOUT_CHANNEL_CAPACITY: usize = 10;

/// A timeout the node wants the controller to schedule.
pub trait TimeoutInfo: Send + Sync + fmt::Debug {
    /// Identifies the class of timeout. Only one timeout per key can be pending.
    fn key(&self) -> String;

    /// Nominal duration. Reported to the controller, never used for scheduling.
    fn duration(&self) -> Duration;
}

/// Plain [`TimeoutInfo`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout {
    pub key: String,
    pub duration: Duration,
    pub replica: ReplicaId,
}

impl Timeout {
    pub fn new(key: impl Into<String>, duration: Duration) -> Self {
        Self {
            key: key.into(),
            duration,
            replica: ReplicaId::default(),
        }
    }

    pub fn with_replica(mut self, replica: impl Into<ReplicaId>) -> Self {
        self.replica = replica.into();
        self
    }
}

impl TimeoutInfo for Timeout {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}

/// Shared handle to a fired or pending timeout.
pub type TimeoutHandle = Arc<dyn TimeoutInfo>;

/// Registry of pending logical timeouts and the channel fired ones come out of.
pub struct TimerRegistry {
    pending: Mutex<HashMap<String, TimeoutHandle>>,
    fired_tx: mpsc::Sender<TimeoutHandle>,
    fired_rx: tokio::sync::Mutex<mpsc::Receiver<TimeoutHandle>>,
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("pending", &self.pending.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        let (fired_tx, fired_rx) = mpsc::channel(TIMEOUT_CHANNEL_CAPACITY);
        Self {
            pending: Mutex::new(HashMap::new()),
            fired_tx,
            fired_rx: tokio::sync::Mutex::new(fired_rx),
        }
    }

    /// Registers `info` unless a timeout with the same key is pending.
    /// Returns whether it was added.
    pub fn add_timeout(&self, info: TimeoutHandle) -> bool {
        let key = info.key();
        let mut pending = self.pending.lock();
        if pending.contains_key(&key) {
            return false;
        }
        pending.insert(key, info);
        true
    }

    /// Ends the pending timeout for `key` and queues it for delivery.
    ///
    /// Unknown keys are ignored. Delivery happens on a detached task so the
    /// caller never waits on a full channel. Returns whether a timeout fired.
    pub fn fire_timeout(&self, key: &str) -> bool {
        let Some(info) = self.pending.lock().remove(key) else {
            return false;
        };

        let tx = self.fired_tx.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if tx.send(info).await.is_err() {
                        tracing::debug!("timeout channel closed, dropping fired timeout");
                    }
                });
            }
            Err(_) => {
                // Outside a runtime there is nothing to park on; deliver if there is room.
                if let Err(TrySendError::Full(info)) = tx.try_send(info) {
                    tracing::warn!(key = %info.key(), "timeout channel full, dropping fired timeout");
                }
            }
        }
        true
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Waits for the next fired timeout.
    pub async fn recv(&self) -> Option<TimeoutHandle> {
        self.fired_rx.lock().await.recv().await
    }

    /// Returns a fired timeout if one is ready.
    pub fn try_recv(&self) -> Option<TimeoutHandle> {
        self.fired_rx.try_lock().ok()?.try_recv().ok()
    }
}

/// Renders a duration the way the controller expects it, e.g. `5s`, `1m30s`,
/// `250ms`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", trim_fraction(nanos as f64 / 1e3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", trim_fraction(nanos as f64 / 1e6));
    }

    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = (total % 60) as f64 + f64::from(duration.subsec_nanos()) / 1e9;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", trim_fraction(seconds)));
    out
}

fn trim_fraction(value: f64) -> String {
    let s = format!("{:.9}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
