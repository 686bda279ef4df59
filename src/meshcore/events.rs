//! Event types delivered by the client and the subscription bus that fans them out.
//!
//! Each [`Subscription`] owns one unbounded queue. A subscription may cover several
//! [`EventKind`]s; events of all those kinds then share the queue in publish order, so a
//! routing trace heard before a message is always handled before it.
//! Unsubscribing (or dropping the bus) closes the queue and `recv` returns `None`.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};
use tokio::sync::mpsc;

use crate::path::RawPayload;

/// Inbound text message on a group channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub channel: u8,
    /// Text as received; MeshCore prefixes it with `"<sender name>: "`.
    pub text: String,
    /// Signal-to-noise ratio in dB, when the radio reports it.
    pub snr: Option<f32>,
    /// Hops the message itself travelled; `None` for direct/unknown.
    pub path_len: Option<u8>,
    /// Sender clock (unix seconds).
    pub sender_timestamp: Option<u32>,
}

impl ChannelMessage {
    pub fn new(channel: u8, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
            snr: None,
            path_len: None,
            sender_timestamp: None,
        }
    }

    /// Label before the first `:` separator, trimmed. Without a colon the whole text is used.
    pub fn sender(&self) -> &str {
        self.text.split(':').next().unwrap_or_default().trim()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// RX log data: a packet the radio heard, including its relay path.
    RoutingTrace,
    ChannelMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    RoutingTrace(RawPayload),
    ChannelMessage(ChannelMessage),
}

impl MeshEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MeshEvent::RoutingTrace(_) => EventKind::RoutingTrace,
            MeshEvent::ChannelMessage(_) => EventKind::ChannelMessage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    rx: mpsc::UnboundedReceiver<MeshEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Next event, or `None` once the subscription has been released.
    pub async fn recv(&mut self) -> Option<MeshEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MeshEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<SubscriptionId, (Vec<EventKind>, mpsc::UnboundedSender<MeshEvent>)>,
}

/// Fan-out of client events to subscribers by [`EventKind`].
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.subscribe_many(&[kind])
    }

    /// One queue for several kinds, delivered in the order they were published.
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.insert(id, (kinds.to_vec(), tx));
        debug!("subscribed {:?} as {:?}", kinds, id);
        Subscription {
            id,
            kinds: kinds.to_vec(),
            rx,
        }
    }

    /// Release a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!("unsubscribed {:?}", id);
        }
        removed
    }

    /// Deliver an event to every subscriber of its kind; returns how many received it.
    /// Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: MeshEvent) -> usize {
        let kind = event.kind();
        let mut inner = self.lock();
        let mut delivered = 0;
        inner.subscribers.retain(|id, (kinds, tx)| {
            if !kinds.contains(&kind) {
                return true;
            }
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                trace!("dropping closed subscriber {:?}", id);
                false
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Release every subscription, ending all pending `recv` calls.
    pub fn close(&self) {
        self.lock().subscribers.clear();
    }
}
