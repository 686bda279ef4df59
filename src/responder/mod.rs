//! # Ping Responder
//!
//! Keeps the route text of the most recently heard packet and answers trigger messages
//! with it.
//!
//! Two handlers, fed by the client's event subscriptions:
//!
//! - **Routing trace** ([`Responder::on_routing_trace`]): decode the relay path, format
//!   it and store it. Payloads that do not decode leave the stored text alone.
//! - **Channel message** ([`Responder::on_channel_message`]): on the trigger channel,
//!   if the text contains the keyword (any case), reply on the same channel with
//!   `@[<sender>] <marker> <route text>`.
//!
//! [`run`] drains one subscription covering both kinds, so events are handled in the
//! order the radio reported them and handlers never overlap. A ping that arrives right
//! after its own RX log therefore already sees the updated route. The stored text is
//! still behind a lock so handlers can be driven from other tasks too.
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # {
//! use std::sync::Arc;
//! use meshpong::config::Config;
//! use meshpong::meshcore::{EventKind, MeshCoreClient};
//! use meshpong::responder::{run, Responder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let client = Arc::new(MeshCoreClient::connect(&config.device).await?);
//!     let mut events =
//!         client.subscribe_many(&[EventKind::RoutingTrace, EventKind::ChannelMessage]);
//!     let responder = Responder::new(config.responder.clone(), client.clone());
//!     run(&responder, &mut events, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! # }
//! ```

mod state;

pub use state::PathInfoState;

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};

use crate::config::ResponderConfig;
use crate::logutil::truncate_for_log;
use crate::meshcore::{ChannelMessage, ChannelSender, MeshEvent, Subscription};
use crate::metrics;
use crate::path::{decode, format_path, RawPayload};

/// Longest slice of message text copied into a log line.
const LOG_TEXT_BYTES: usize = 200;

pub struct Responder<S> {
    settings: ResponderConfig,
    state: PathInfoState,
    sender: S,
}

impl<S: ChannelSender> Responder<S> {
    pub fn new(settings: ResponderConfig, sender: S) -> Self {
        Self::with_state(settings, sender, PathInfoState::new())
    }

    /// Build around an existing state handle (e.g. one shared with a status reporter).
    pub fn with_state(settings: ResponderConfig, sender: S, state: PathInfoState) -> Self {
        Self {
            settings,
            state,
            sender,
        }
    }

    pub fn state(&self) -> &PathInfoState {
        &self.state
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn settings(&self) -> &ResponderConfig {
        &self.settings
    }

    /// Decode and store the route of a heard packet. Returns the new text, or `None`
    /// (state untouched) when the payload carried no readable path.
    pub async fn on_routing_trace(&self, payload: &RawPayload) -> Option<String> {
        let Some(record) = decode(payload) else {
            metrics::inc_traces_rejected();
            trace!("RX log without a readable path");
            return None;
        };
        metrics::inc_traces_decoded();
        if record.is_partial() {
            debug!(
                "Path truncated: {} of {} hops present",
                record.nodes.len(),
                record.hop_count
            );
        }

        let text = format_path(Some(&record), &self.settings.destination_label);
        let previous = self.state.replace(text.clone()).await;
        if previous != text {
            info!("Path info updated: {}", text);
        }
        Some(text)
    }

    pub fn is_trigger(&self, msg: &ChannelMessage) -> bool {
        msg.channel == self.settings.trigger_channel
            && msg
                .text
                .to_lowercase()
                .contains(&self.settings.trigger_keyword.to_lowercase())
    }

    pub async fn compose_reply(&self, msg: &ChannelMessage) -> String {
        format!(
            "@[{}] {} {}",
            msg.sender(),
            self.settings.reply_marker,
            self.state.current().await
        )
    }

    /// Reply to a trigger message. `Ok(true)` when a reply went out, `Ok(false)` when the
    /// message was not a trigger.
    pub async fn on_channel_message(&self, msg: &ChannelMessage) -> Result<bool> {
        metrics::inc_messages_seen();
        info!(
            "[ch={}] {}",
            msg.channel,
            truncate_for_log(&msg.text, LOG_TEXT_BYTES)
        );
        if !self.is_trigger(msg) {
            return Ok(false);
        }

        let reply = self.compose_reply(msg).await;
        let started = Instant::now();
        let sent = self
            .sender
            .send_channel_message(msg.channel, &reply)
            .await
            .with_context(|| format!("reply on channel {} failed", msg.channel));
        match sent {
            Ok(()) => {
                metrics::inc_replies_sent();
                metrics::observe_reply_latency(started);
                info!(
                    "Replied on ch={}: {}",
                    msg.channel,
                    truncate_for_log(&reply, LOG_TEXT_BYTES)
                );
                Ok(true)
            }
            Err(e) => {
                metrics::inc_replies_failed();
                Err(e)
            }
        }
    }

    pub async fn handle_event(&self, event: MeshEvent) -> Result<()> {
        match event {
            MeshEvent::RoutingTrace(payload) => {
                self.on_routing_trace(&payload).await;
            }
            MeshEvent::ChannelMessage(msg) => {
                self.on_channel_message(&msg).await?;
            }
        }
        Ok(())
    }
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    /// The subscription was released (client disconnected).
    StreamsClosed,
}

/// Dispatch events to `responder` one at a time, in delivery order, until `shutdown`
/// resolves or the subscription closes. Handler errors are logged and do not stop the loop.
pub async fn run<S, F>(
    responder: &Responder<S>,
    events: &mut Subscription,
    shutdown: F,
) -> StopReason
where
    S: ChannelSender,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    let kind = event.kind();
                    if let Err(e) = responder.handle_event(event).await {
                        warn!("{:?} handler error: {e:#}", kind);
                    }
                }
                None => {
                    warn!("Event stream closed");
                    return StopReason::StreamsClosed;
                }
            },
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                return StopReason::Shutdown;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshcore::MeshCoreError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(u8, String)>>,
    }

    #[async_trait::async_trait]
    impl ChannelSender for Recorder {
        async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), MeshCoreError> {
            self.sent.lock().unwrap().push((channel, text.to_string()));
            Ok(())
        }
    }

    fn responder() -> Responder<Recorder> {
        Responder::new(ResponderConfig::default(), Recorder::default())
    }

    #[tokio::test]
    async fn trigger_needs_channel_and_keyword() {
        let r = responder();
        assert!(r.is_trigger(&ChannelMessage::new(1, "Alice: PiNg")));
        assert!(r.is_trigger(&ChannelMessage::new(1, "Alice: pinging you")));
        assert!(!r.is_trigger(&ChannelMessage::new(0, "Alice: ping")));
        assert!(!r.is_trigger(&ChannelMessage::new(1, "Alice: pong")));
    }

    #[tokio::test]
    async fn reply_uses_current_state() {
        let r = responder();
        let msg = ChannelMessage::new(1, "Alice: ping now");
        assert_eq!(r.compose_reply(&msg).await, "@[Alice] Pong 🏓 (? hops, ?)");

        r.on_routing_trace(&RawPayload::from("0000")).await;
        assert_eq!(r.compose_reply(&msg).await, "@[Alice] Pong 🏓 (0 hops, direct)");
    }

    #[tokio::test]
    async fn handle_event_routes_by_kind() {
        let r = responder();
        r.handle_event(MeshEvent::RoutingTrace(RawPayload::from("00011f")))
            .await
            .unwrap();
        r.handle_event(MeshEvent::ChannelMessage(ChannelMessage::new(1, "x: ping")))
            .await
            .unwrap();
        let sent = r.sender().sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(1, "@[x] Pong 🏓 (1 hops nach Meisterschwanden, 1f)".to_string())]
        );
    }
}
