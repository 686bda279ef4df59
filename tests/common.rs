//! Test utilities & fixtures.
//! A recording channel sender and frame builders that play the part of a companion radio.
#![allow(dead_code)] // not every test binary uses every helper

use std::sync::Mutex;

use meshpong::meshcore::packet::resp;
use meshpong::meshcore::{ChannelSender, MeshCoreError};

/// `ChannelSender` that remembers every send instead of touching a radio.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(u8, String)>>,
    fail_with: Option<u8>,
}

impl RecordingSender {
    /// Sender whose every send is rejected with the given radio error code.
    pub fn failing(code: u8) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(code),
        }
    }

    pub fn sent(&self) -> Vec<(u8, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChannelSender for RecordingSender {
    async fn send_channel_message(&self, channel: u8, text: &str) -> Result<(), MeshCoreError> {
        self.sent.lock().unwrap().push((channel, text.to_string()));
        match self.fail_with {
            Some(code) => Err(MeshCoreError::Rejected(code)),
            None => Ok(()),
        }
    }
}

/// SELF_INFO reply announcing `name`, enough to complete the handshake.
pub fn self_info_frame(name: &str) -> Vec<u8> {
    let mut frame = vec![0u8; 58];
    frame[0] = resp::SELF_INFO;
    frame.extend_from_slice(name.as_bytes());
    frame
}

/// Legacy channel message push as queued by the radio.
pub fn channel_msg_frame(channel: u8, text: &str) -> Vec<u8> {
    let mut frame = vec![resp::CHANNEL_MSG_RECV, channel, 0xFF, 0, 0x10, 0x20, 0x30, 0x40];
    frame.extend_from_slice(text.as_bytes());
    frame
}

/// RX log push carrying `raw` as the heard packet.
pub fn rx_log_frame(raw: &[u8]) -> Vec<u8> {
    let mut frame = vec![resp::LOG_RX_DATA, 24, 0xA6];
    frame.extend_from_slice(raw);
    frame
}
