//! # Meshpong - Ping Responder for MeshCore Networks
//!
//! Meshpong sits on a MeshCore companion radio, watches a group channel and answers
//! every message containing the trigger keyword with the relay path of the most
//! recently heard packet:
//!
//! ```text
//! Alice: ping
//! @[Alice] Pong 🏓 (3 hops nach Meisterschwanden, a1:02:ff)
//! ```
//!
//! ## Features
//!
//! - **Path decoding**: total decoder for the hop count + node id list of RX log packets.
//! - **Route text**: compact `(<n> hops nach <place>, aa:bb:cc)` rendering for 1-line replies.
//! - **MeshCore client**: serial framing, protocol parsing, event subscriptions and
//!   automatic fetching of queued channel messages.
//! - **Async design**: built on Tokio; handlers run one at a time from a single loop.
//!
//! ## Quick Start
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
//!     let config = Config::load("config.toml").await?;
//!     let client = Arc::new(MeshCoreClient::connect(&config.device).await?);
//!     client.start_auto_message_fetching()?;
//!
//!     let mut events =
//!         client.subscribe_many(&[EventKind::RoutingTrace, EventKind::ChannelMessage]);
//!     let responder = Responder::new(config.responder, client.clone());
//!     run(&responder, &mut events, std::future::pending()).await;
//!     Ok(())
//! }
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`path`] - Relay path decoder and formatter
//! - [`responder`] - Stored route text and the trigger/reply handlers
//! - [`meshcore`] - Companion radio client (framing, packets, events)
//! - [`config`] - Configuration loading and validation
//! - [`logutil`] - Log sanitizing for over-the-air text
//! - [`metrics`] - Process-wide counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Responder     │ ← trigger detection, reply composition, route state
//! └─────────────────┘
//!     ▲         │
//!  events     replies
//!     │         ▼
//! ┌─────────────────┐
//! │ MeshCore Client │ ← serial link, frames, subscriptions
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod meshcore;
pub mod metrics;
pub mod path;
pub mod responder;
