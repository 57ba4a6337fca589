//! Operational counters for the hub.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational metrics for monitoring hub activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Conversations created by the resolver.
    pub conversations_created: AtomicU64,
    /// Messages stored (idempotent replays excluded).
    pub messages_appended: AtomicU64,
    /// Message events handed to at least one subscriber.
    pub events_published: AtomicU64,
    /// Message events dropped while the bus was disconnected.
    pub events_dropped: AtomicU64,
    /// Typing signals forwarded.
    pub typing_signals: AtomicU64,
}

impl HubMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            conversations_created: self.conversations_created.load(Ordering::Relaxed),
            messages_appended: self.messages_appended.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            typing_signals: self.typing_signals.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`HubMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct MetricsSnapshot {
    pub conversations_created: u64,
    pub messages_appended: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub typing_signals: u64,
}
