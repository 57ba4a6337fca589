//! Per-conversation publish/subscribe.
//!
//! Every conversation id gets its own bounded [`broadcast`] channel, created
//! on first subscribe and pruned once nobody listens. A single [`watch`]
//! channel carries the transport's [`Liveness`]: while it reads
//! disconnected, published events are dropped, and subscribers learn about
//! the gap from the liveness edge (or the epoch bump) rather than from the
//! stream itself.

use crate::config::BusConfig;
use crate::metrics::HubMetrics;
use chat_types::{ConversationId, Liveness, Message};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Lazily created broadcast channels keyed by conversation.
pub(crate) struct ChannelMap<T> {
    capacity: usize,
    channels: DashMap<ConversationId, broadcast::Sender<T>>,
}

impl<T: Clone> ChannelMap<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: DashMap::new(),
        }
    }

    pub(crate) fn subscribe(&self, conversation: ConversationId) -> broadcast::Receiver<T> {
        // The shard lock is held until the receiver exists, so a concurrent
        // prune cannot remove the sender underneath us.
        self.channels
            .entry(conversation)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send to every receiver of `conversation`; returns how many got it.
    pub(crate) fn send(&self, conversation: ConversationId, item: T) -> usize {
        let delivered = match self.channels.get(&conversation) {
            Some(tx) => tx.send(item).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            self.channels
                .remove_if(&conversation, |_, tx| tx.receiver_count() == 0);
        }
        delivered
    }

    pub(crate) fn receiver_count(&self, conversation: &ConversationId) -> usize {
        self.channels
            .get(conversation)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

/// A live subscription to one conversation.
#[derive(Debug)]
pub struct Subscription {
    conversation: ConversationId,
    /// Messages published after the subscription was taken.
    pub messages: broadcast::Receiver<Message>,
    /// Transport liveness.
    pub liveness: watch::Receiver<Liveness>,
}

impl Subscription {
    /// Conversation this subscription listens to.
    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }
}

struct BusInner {
    messages: ChannelMap<Message>,
    liveness: watch::Sender<Liveness>,
    metrics: Arc<HubMetrics>,
}

/// Real-time message fan-out with a simulated transport link.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.inner.messages.len())
            .field("liveness", &self.liveness())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a connected bus.
    pub fn new(config: &BusConfig, metrics: Arc<HubMetrics>) -> Self {
        let (liveness, _) = watch::channel(Liveness::connected(0));
        Self {
            inner: Arc::new(BusInner {
                messages: ChannelMap::new(config.channel_capacity),
                liveness,
                metrics,
            }),
        }
    }

    /// Subscribe to a conversation's message stream.
    pub fn subscribe(&self, conversation: ConversationId) -> Subscription {
        let messages = self.inner.messages.subscribe(conversation);
        tracing::debug!(
            "Subscribed to conversation={} (subscribers: {})",
            conversation,
            self.subscriber_count(&conversation)
        );
        Subscription {
            conversation,
            messages,
            liveness: self.inner.liveness.subscribe(),
        }
    }

    /// Release a subscription.
    pub fn release(&self, subscription: Subscription) {
        let conversation = subscription.conversation;
        drop(subscription);
        tracing::debug!(
            "Released subscription for conversation={} (remaining: {})",
            conversation,
            self.subscriber_count(&conversation)
        );
    }

    /// Publish a stored message; returns how many subscribers received it.
    ///
    /// While the link is down the event is dropped and counted.
    pub fn publish(&self, message: &Message) -> usize {
        if !self.liveness().is_connected() {
            HubMetrics::incr(&self.inner.metrics.events_dropped);
            tracing::debug!(
                "Dropped event for conversation={} while disconnected",
                message.conversation_id
            );
            return 0;
        }

        let delivered = self
            .inner
            .messages
            .send(message.conversation_id, message.clone());
        if delivered > 0 {
            HubMetrics::incr(&self.inner.metrics.events_published);
        }
        tracing::trace!(
            "Published message={} to {} subscriber(s)",
            message.id,
            delivered
        );
        delivered
    }

    /// Take the transport link down. No-op when already down.
    pub fn disconnect(&self) {
        let changed = self.inner.liveness.send_if_modified(|live| {
            if live.is_connected() {
                *live = Liveness::disconnected(live.epoch);
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!("Event bus disconnected");
        }
    }

    /// Bring the transport link back up under a new epoch. No-op when up.
    pub fn reconnect(&self) {
        let changed = self.inner.liveness.send_if_modified(|live| {
            if live.is_connected() {
                false
            } else {
                *live = Liveness::connected(live.epoch + 1);
                true
            }
        });
        if changed {
            tracing::info!("Event bus reconnected (epoch {})", self.liveness().epoch);
        }
    }

    /// Current liveness.
    pub fn liveness(&self) -> Liveness {
        *self.inner.liveness.borrow()
    }

    /// Watch liveness changes without subscribing to a conversation.
    pub fn watch_liveness(&self) -> watch::Receiver<Liveness> {
        self.inner.liveness.subscribe()
    }

    /// Active subscribers of a conversation.
    pub fn subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.inner.messages.receiver_count(conversation)
    }

    /// Conversations with an open channel.
    pub fn channel_count(&self) -> usize {
        self.inner.messages.len()
    }
}
