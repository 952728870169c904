//! Snapshot fan-out to channel subscribers
//!
//! Each channel keeps a set of subscriber queues plus the most recently
//! published snapshot. Publishing never blocks: every subscriber has its own
//! bounded queue, a full queue drops that frame for that subscriber only,
//! and a closed queue removes the subscriber.

use crate::domain::MetricsSnapshot;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Default per-subscriber queue capacity
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Identity of one subscriber, unique per broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiving side handed to the transport on join
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    channel: String,
    rx: mpsc::Receiver<Arc<MetricsSnapshot>>,
}

impl Subscription {
    /// Subscriber identity, used for `leave`
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Channel this subscription belongs to
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next snapshot; `None` once the broadcaster dropped us
    pub async fn recv(&mut self) -> Option<Arc<MetricsSnapshot>> {
        self.rx.recv().await
    }

    /// Take the next snapshot if one is queued
    pub fn try_recv(&mut self) -> Option<Arc<MetricsSnapshot>> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct ChannelState {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<MetricsSnapshot>>>,
    latest: Option<Arc<MetricsSnapshot>>,
}

/// Multi-channel snapshot broadcaster
pub struct Broadcaster {
    channels: RwLock<HashMap<String, Arc<Mutex<ChannelState>>>>,
    next_id: AtomicU64,
    buffer: usize,
    closed: AtomicBool,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber queue capacity
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn channel(&self, name: &str) -> Arc<Mutex<ChannelState>> {
        if let Some(state) = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Arc::clone(state);
        }

        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(channels.entry(name.to_string()).or_default())
    }

    fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
        state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver `snapshot` to every subscriber of `channel` and cache it
    ///
    /// Returns the number of subscribers the snapshot was queued for.
    pub fn publish(&self, channel: &str, snapshot: Arc<MetricsSnapshot>) -> usize {
        let state = self.channel(channel);
        let mut state = Self::lock(&state);

        let mut delivered = 0;
        state.subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&snapshot)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                log::trace!("Subscriber {} on {} is lagging, frame dropped", id, channel);
                true
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("Subscriber {} on {} disconnected", id, channel);
                false
            }
        });
        state.latest = Some(snapshot);

        delivered
    }

    /// Register a new subscriber on `channel`
    ///
    /// The channel's latest snapshot is queued for the new subscriber right
    /// away; before anything was published it receives a "device not
    /// initialized" error snapshot instead. After `close` the subscription
    /// is already ended.
    pub fn join(&self, channel: &str) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);

        let state = self.channel(channel);
        let mut state = Self::lock(&state);

        // Checked under the channel lock so a concurrent close cannot miss us
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("Subscriber {} refused on {}: shutting down", id, channel);
            return Subscription {
                id,
                channel: channel.to_string(),
                rx,
            };
        }

        let first = state
            .latest
            .clone()
            .unwrap_or_else(|| Arc::new(MetricsSnapshot::not_initialized()));
        // Fresh queue with capacity >= 1, cannot be full
        let _ = tx.try_send(first);
        state.subscribers.insert(id, tx);

        log::debug!(
            "Subscriber {} joined {} ({} total)",
            id,
            channel,
            state.subscribers.len()
        );

        Subscription {
            id,
            channel: channel.to_string(),
            rx,
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn leave(&self, channel: &str, id: SubscriberId) {
        let Some(state) = self
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .cloned()
        else {
            return;
        };

        if Self::lock(&state).subscribers.remove(&id).is_some() {
            log::debug!("Subscriber {} left {}", id, channel);
        }
    }

    /// Most recently published snapshot on `channel`
    pub fn latest(&self, channel: &str) -> Option<Arc<MetricsSnapshot>> {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let state = channels.get(channel)?;
        let latest = Self::lock(state).latest.clone();
        latest
    }

    /// Number of subscribers currently joined to `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(channel)
            .map(|state| Self::lock(state).subscribers.len())
            .unwrap_or(0)
    }

    /// Drop every subscriber queue so open sessions end
    ///
    /// Later joins end immediately. Cached snapshots are kept.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        for state in channels.values() {
            Self::lock(state).subscribers.clear();
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}
