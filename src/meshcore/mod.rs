//! # MeshCore Companion Radio Client
//!
//! This module talks to a MeshCore companion radio over its USB serial interface and
//! turns what the radio reports into typed events for the responder.
//!
//! ## Features
//!
//! - **Framing**: `'>'`/`'<'` length-prefixed frames with resync on garbage ([`framer`])
//! - **Protocol**: parser for the responses and pushes the bot cares about ([`packet`])
//! - **Events**: per-kind subscriptions for RX log data and channel messages ([`events`])
//! - **Auto fetch**: drains the radio's message queue whenever it signals waiting mail
//! - **Sending**: channel text with acknowledgement from the radio
//!
//! ## Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "serial")]
//! # {
//! use meshpong::config::DeviceConfig;
//! use meshpong::meshcore::{ChannelSender, EventKind, MeshCoreClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = MeshCoreClient::connect(&DeviceConfig::default()).await?;
//!     client.start_auto_message_fetching()?;
//!     let mut messages = client.subscribe(EventKind::ChannelMessage);
//!     while let Some(event) = messages.recv().await {
//!         println!("{:?}", event);
//!     }
//!     client.send_channel_message(1, "bye").await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! # }
//! ```
//!
//! ## Transport
//!
//! Only the serial transport is implemented. The configured `pin` belongs to BLE
//! pairing and is ignored here. Delivery over the air is best effort: the radio
//! acknowledges that it accepted a command, not that anyone received it.

pub mod events;
pub mod framer;
pub mod link;
pub mod packet;

pub use events::{ChannelMessage, EventBus, EventKind, MeshEvent, Subscription, SubscriptionId};
pub use link::{Link, MemoryLink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, MissedTickBehavior};

use crate::config::DeviceConfig;
use crate::path::RawPayload;
use framer::{FrameDecoder, MAX_FRAME_SIZE};
use packet::Inbound;

const READ_INTERVAL: Duration = Duration::from_millis(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MeshCoreError {
    #[error("failed to connect to {address}: {reason}")]
    Connection { address: String, reason: String },

    #[error("link i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("radio rejected command (error code {0})")]
    Rejected(u8),

    #[error("timed out waiting for radio acknowledgement")]
    Timeout,

    #[error("client is disconnected")]
    Disconnected,

    #[error("message of {len} bytes does not fit in one frame")]
    MessageTooLong { len: usize },
}

/// Capability to post text on a group channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), MeshCoreError>;
}

#[async_trait]
impl<T: ChannelSender + ?Sized> ChannelSender for Arc<T> {
    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), MeshCoreError> {
        (**self).send_channel_message(channel, text).await
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hex_snippet(data: &[u8], max: usize) -> String {
    hex::encode(&data[..data.len().min(max)])
}

/// State shared between the client handle and its reader task.
struct Shared {
    link: Mutex<Box<dyn Link>>,
    bus: EventBus,
    auto_fetch: AtomicBool,
    connected: AtomicBool,
    pending_ack: Mutex<Option<oneshot::Sender<Result<(), u8>>>>,
    pending_self_info: Mutex<Option<oneshot::Sender<String>>>,
    device_name: Mutex<Option<String>>,
}

impl Shared {
    fn write(&self, payload: &[u8]) -> Result<(), MeshCoreError> {
        trace!("TX {} bytes: {}", payload.len(), hex_snippet(payload, 32));
        lock(&self.link).write_frame(&framer::encode_frame(payload))?;
        Ok(())
    }

    fn fetch_next(&self) {
        if !self.auto_fetch.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.write(&packet::sync_next_message()) {
            warn!("Failed to request next queued message: {}", e);
        }
    }

    fn complete_ack(&self, result: Result<(), u8>) {
        match lock(&self.pending_ack).take() {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => trace!("Unsolicited command result {:?}", result),
        }
    }

    fn handle_frame(&self, frame: &[u8]) {
        match packet::parse(frame) {
            Ok(inbound) => self.dispatch(inbound),
            Err(e) => debug!("Ignoring malformed frame: {} ({})", e, hex_snippet(frame, 32)),
        }
    }

    fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Ok => self.complete_ack(Ok(())),
            Inbound::MsgSent {
                expected_ack,
                suggested_timeout_ms,
            } => {
                debug!(
                    "Radio queued message (ack 0x{:08X}, timeout {}ms)",
                    expected_ack, suggested_timeout_ms
                );
                self.complete_ack(Ok(()));
            }
            Inbound::Error(code) => self.complete_ack(Err(code)),
            Inbound::SelfInfo {
                name,
                public_key_prefix,
            } => {
                info!("Radio identifies as '{}' (key {}…)", name, public_key_prefix);
                *lock(&self.device_name) = Some(name.clone());
                if let Some(tx) = lock(&self.pending_self_info).take() {
                    let _ = tx.send(name);
                }
            }
            Inbound::ChannelMessage(msg) => {
                self.bus.publish(MeshEvent::ChannelMessage(msg));
                self.fetch_next();
            }
            Inbound::ContactMessage => {
                debug!("Skipping direct message");
                self.fetch_next();
            }
            Inbound::MessagesWaiting => self.fetch_next(),
            Inbound::NoMoreMessages => trace!("Radio message queue drained"),
            Inbound::RxLog(data) => {
                trace!(
                    "RX log snr={} rssi={} {}",
                    data.snr,
                    data.rssi,
                    hex_snippet(&data.raw, 16)
                );
                self.bus
                    .publish(MeshEvent::RoutingTrace(RawPayload::Record(data.to_record())));
            }
            Inbound::Unknown(code) => trace!("Unhandled response code 0x{:02X}", code),
        }
    }
}

async fn reader_loop(shared: Arc<Shared>, mut shutdown_rx: oneshot::Receiver<()>) {
    debug!("Starting MeshCore reader task");
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 512];
    let mut interval = tokio::time::interval(READ_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Reader task received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                let read = lock(&shared.link).read_available(&mut buf);
                match read {
                    Ok(0) => {}
                    Ok(n) => {
                        trace!("RX {} bytes: {}", n, hex_snippet(&buf[..n], 64));
                        decoder.push(&buf[..n]);
                        while let Some(frame) = decoder.next_frame() {
                            shared.handle_frame(&frame);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                        debug!("Reader interrupted, shutting down");
                        break;
                    }
                    Err(e) => {
                        warn!("Link read error (continuing): {}", e);
                        sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }
    }

    shared.connected.store(false, Ordering::Relaxed);
    debug!("MeshCore reader task stopped");
}

/// Connected companion radio.
pub struct MeshCoreClient {
    address: String,
    shared: Arc<Shared>,
    send_lock: tokio::sync::Mutex<()>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl MeshCoreClient {
    /// Open the serial port named by `config.address` and perform the app-start handshake.
    #[cfg(feature = "serial")]
    pub async fn connect(config: &DeviceConfig) -> Result<Self, MeshCoreError> {
        if config.pin.is_some() {
            warn!("A pairing pin is configured but the serial link does not use one; ignoring it");
        }
        let port = open_serial(&config.address, config.baud_rate).await?;
        Self::with_link(Box::new(port), &config.address, &config.client_name).await
    }

    #[cfg(not(feature = "serial"))]
    pub async fn connect(config: &DeviceConfig) -> Result<Self, MeshCoreError> {
        Err(MeshCoreError::Connection {
            address: config.address.clone(),
            reason: "built without the `serial` feature".to_string(),
        })
    }

    /// Run the client over an already open link.
    pub async fn with_link(
        link: Box<dyn Link>,
        address: &str,
        client_name: &str,
    ) -> Result<Self, MeshCoreError> {
        let (info_tx, info_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            link: Mutex::new(link),
            bus: EventBus::new(),
            auto_fetch: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            pending_ack: Mutex::new(None),
            pending_self_info: Mutex::new(Some(info_tx)),
            device_name: Mutex::new(None),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader = tokio::spawn(reader_loop(shared.clone(), shutdown_rx));

        let client = MeshCoreClient {
            address: address.to_string(),
            shared,
            send_lock: tokio::sync::Mutex::new(()),
            reader: Mutex::new(Some(reader)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        };

        client.shared.write(&packet::app_start(client_name))?;
        match timeout(HANDSHAKE_TIMEOUT, info_rx).await {
            Ok(Ok(name)) => {
                info!("Connected to MeshCore radio '{}' on {}", name, address);
                Ok(client)
            }
            _ => Err(MeshCoreError::Connection {
                address: address.to_string(),
                reason: "radio did not answer the app start handshake".to_string(),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Name the radio reported during the handshake.
    pub fn device_name(&self) -> Option<String> {
        lock(&self.shared.device_name).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.shared.bus.subscribe(kind)
    }

    /// Single queue for several event kinds in the order the radio reported them.
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> Subscription {
        self.shared.bus.subscribe_many(kinds)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    /// Drain the radio's message queue now and whenever it signals waiting messages.
    pub fn start_auto_message_fetching(&self) -> Result<(), MeshCoreError> {
        self.shared.auto_fetch.store(true, Ordering::Relaxed);
        debug!("Auto message fetching enabled");
        self.shared.write(&packet::sync_next_message())
    }

    pub fn stop_auto_message_fetching(&self) {
        self.shared.auto_fetch.store(false, Ordering::Relaxed);
        debug!("Auto message fetching disabled");
    }

    /// Stop the reader, release every subscription and drop the link.
    pub async fn disconnect(&self) {
        self.stop_auto_message_fetching();
        if let Some(tx) = lock(&self.shutdown_tx).take() {
            let _ = tx.send(());
        }
        let reader = lock(&self.reader).take();
        if let Some(handle) = reader {
            if let Err(e) = handle.await {
                warn!("Reader task ended abnormally: {}", e);
            }
        }
        self.shared.bus.close();
        self.shared.connected.store(false, Ordering::Relaxed);
        info!("Disconnected from {}", self.address);
    }
}

impl Drop for MeshCoreClient {
    fn drop(&mut self) {
        let reader = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader {
            handle.abort();
        }
    }
}

#[async_trait]
impl ChannelSender for MeshCoreClient {
    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), MeshCoreError> {
        if !self.is_connected() {
            return Err(MeshCoreError::Disconnected);
        }
        let timestamp = chrono::Utc::now().timestamp() as u32;
        let payload = packet::send_channel_text(channel, timestamp, text);
        if payload.len() > MAX_FRAME_SIZE {
            return Err(MeshCoreError::MessageTooLong { len: text.len() });
        }

        // one command in flight at a time so the OK/ERROR is ours
        let _guard = self.send_lock.lock().await;
        let (tx, rx) = oneshot::channel();
        *lock(&self.shared.pending_ack) = Some(tx);
        self.shared.write(&payload)?;

        match timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(code))) => Err(MeshCoreError::Rejected(code)),
            Ok(Err(_)) => Err(MeshCoreError::Disconnected),
            Err(_) => {
                lock(&self.shared.pending_ack).take();
                Err(MeshCoreError::Timeout)
            }
        }
    }
}

#[cfg(feature = "serial")]
async fn open_serial(
    address: &str,
    baud_rate: u32,
) -> Result<Box<dyn serialport::SerialPort>, MeshCoreError> {
    debug!("Opening serial port {} at {} baud", address, baud_rate);

    let mut builder = serialport::new(address, baud_rate).timeout(Duration::from_millis(100));
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let mut port = builder.open().map_err(|e| MeshCoreError::Connection {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    let _ = port.write_data_terminal_ready(true);
    sleep(Duration::from_millis(150)).await;

    // Drop boot banner text still sitting in the buffer
    let mut purge_buf = [0u8; 512];
    if let Ok(available) = port.bytes_to_read() {
        if available > 0 {
            let _ = std::io::Read::read(&mut port, &mut purge_buf);
        }
    }

    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_info(name: &str) -> Vec<u8> {
        let mut frame = vec![0u8; 58];
        frame[0] = packet::resp::SELF_INFO;
        frame.extend_from_slice(name.as_bytes());
        frame
    }

    async fn connected(link: &MemoryLink) -> MeshCoreClient {
        link.inject(&self_info("T114"));
        MeshCoreClient::with_link(Box::new(link.clone()), "mem", "meshpong")
            .await
            .expect("handshake")
    }

    async fn wait_written(link: &MemoryLink, count: usize) -> Vec<Vec<u8>> {
        for _ in 0..200 {
            let written = link.written();
            if written.len() >= count {
                return written;
            }
            sleep(Duration::from_millis(5)).await;
        }
        link.written()
    }

    #[tokio::test]
    async fn handshake_sends_app_start_and_records_name() {
        let link = MemoryLink::new();
        let client = connected(&link).await;
        assert_eq!(client.device_name().as_deref(), Some("T114"));
        assert_eq!(link.written()[0], packet::app_start("meshpong"));
        assert!(client.is_connected());
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn silent_radio_fails_to_connect() {
        tokio::time::pause();
        let link = MemoryLink::new();
        let err = MeshCoreClient::with_link(Box::new(link), "mem", "meshpong")
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, MeshCoreError::Connection { .. }));
    }

    #[tokio::test]
    async fn rx_log_is_published_as_routing_trace() {
        let link = MemoryLink::new();
        let client = connected(&link).await;
        let mut traces = client.subscribe(EventKind::RoutingTrace);
        link.inject(&[packet::resp::LOG_RX_DATA, 20, 0xb0, 0x00, 0x01, 0x7e]);
        let Some(MeshEvent::RoutingTrace(RawPayload::Record(record))) = traces.recv().await else {
            panic!("expected routing trace");
        };
        assert_eq!(record["payload"], "00017e");
        client.disconnect().await;
    }

    #[tokio::test]
    async fn waiting_messages_are_fetched_until_drained() {
        let link = MemoryLink::new();
        let client = connected(&link).await;
        let mut msgs = client.subscribe(EventKind::ChannelMessage);
        client.start_auto_message_fetching().expect("write");

        let mut frame = vec![packet::resp::CHANNEL_MSG_RECV, 1, 0, 0, 0, 0, 0, 0];
        frame.extend_from_slice(b"Alice: ping");
        link.inject(&frame);
        link.inject(&[packet::resp::NO_MORE_MESSAGES]);

        let Some(MeshEvent::ChannelMessage(msg)) = msgs.recv().await else {
            panic!("expected channel message");
        };
        assert_eq!(msg.text, "Alice: ping");
        // app start, initial sync, sync after the message
        let written = wait_written(&link, 3).await;
        assert_eq!(written[1], packet::sync_next_message());
        assert_eq!(written[2], packet::sync_next_message());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn send_waits_for_radio_ack() {
        let link = MemoryLink::new();
        let client = Arc::new(connected(&link).await);

        let sender = client.clone();
        let send = tokio::spawn(async move { sender.send_channel_message(1, "pong").await });
        let written = wait_written(&link, 2).await;
        assert_eq!(&written[1][..3], &[packet::cmd::SEND_CHANNEL_TXT_MSG, 0, 1]);
        assert_eq!(&written[1][7..], b"pong");
        link.inject(&[packet::resp::OK]);
        send.await.expect("join").expect("acked");

        let sender = client.clone();
        let send = tokio::spawn(async move { sender.send_channel_message(1, "again").await });
        wait_written(&link, 3).await;
        link.inject(&[packet::resp::ERROR, 3]);
        let err = send.await.expect("join").err().expect("rejected");
        assert!(matches!(err, MeshCoreError::Rejected(3)));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn oversized_text_is_refused() {
        let link = MemoryLink::new();
        let client = connected(&link).await;
        let text = "x".repeat(MAX_FRAME_SIZE);
        let err = client.send_channel_message(0, &text).await.err().expect("too long");
        assert!(matches!(err, MeshCoreError::MessageTooLong { .. }));
        client.disconnect().await;
        let err = client.send_channel_message(0, "hi").await.err().expect("closed");
        assert!(matches!(err, MeshCoreError::Disconnected));
    }

    #[tokio::test]
    async fn disconnect_closes_subscriptions() {
        let link = MemoryLink::new();
        let client = connected(&link).await;
        let mut msgs = client.subscribe(EventKind::ChannelMessage);
        client.disconnect().await;
        assert_eq!(msgs.recv().await, None);
        assert_eq!(client.events().subscriber_count(), 0);
    }
}
