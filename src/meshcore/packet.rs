//! MeshCore companion protocol payloads: parsing radio responses/pushes and building
//! the few commands the responder needs.
//!
//! Only the subset used by the ping responder is modelled. Unknown codes are reported
//! as [`Inbound::Unknown`] so the reader can log and move on.
use serde_json::json;
use thiserror::Error;

use super::events::ChannelMessage;

/// Command codes (host → radio).
pub mod cmd {
    pub const APP_START: u8 = 0x01;
    pub const SEND_CHANNEL_TXT_MSG: u8 = 0x03;
    pub const SYNC_NEXT_MESSAGE: u8 = 0x0A;
}

/// Response and push codes (radio → host).
pub mod resp {
    pub const OK: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const SELF_INFO: u8 = 0x05;
    pub const MSG_SENT: u8 = 0x06;
    pub const CONTACT_MSG_RECV: u8 = 0x07;
    pub const CHANNEL_MSG_RECV: u8 = 0x08;
    pub const NO_MORE_MESSAGES: u8 = 0x0A;
    pub const CONTACT_MSG_RECV_V3: u8 = 0x10;
    pub const CHANNEL_MSG_RECV_V3: u8 = 0x11;
    pub const MESSAGES_WAITING: u8 = 0x83;
    pub const LOG_RX_DATA: u8 = 0x88;
}

const APP_PROTOCOL_VERSION: u8 = 0x03;
const TXT_TYPE_PLAIN: u8 = 0x00;
/// Path length value the firmware uses for "no path known".
const PATH_LEN_NONE: u8 = 0xFF;
const SELF_INFO_NAME_OFFSET: usize = 58;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,
    #[error("frame 0x{code:02X} truncated ({len} bytes)")]
    Truncated { code: u8, len: usize },
}

/// One RX log record: the raw over-the-air packet plus link quality.
#[derive(Debug, Clone, PartialEq)]
pub struct RxLogData {
    pub snr: f32,
    pub rssi: i8,
    pub raw: Vec<u8>,
}

impl RxLogData {
    /// JSON record handed to routing-trace subscribers; the path decoder reads `payload`.
    pub fn to_record(&self) -> serde_json::Value {
        json!({
            "snr": self.snr,
            "rssi": self.rssi,
            "payload": hex::encode(&self.raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ok,
    Error(u8),
    SelfInfo {
        name: String,
        public_key_prefix: String,
    },
    MsgSent {
        expected_ack: u32,
        suggested_timeout_ms: u32,
    },
    ChannelMessage(ChannelMessage),
    /// Direct message to us; not used by the responder but must be drained.
    ContactMessage,
    NoMoreMessages,
    MessagesWaiting,
    RxLog(RxLogData),
    Unknown(u8),
}

fn need(frame: &[u8], len: usize) -> Result<(), PacketError> {
    if frame.len() < len {
        Err(PacketError::Truncated {
            code: frame[0],
            len: frame.len(),
        })
    } else {
        Ok(())
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn text_field(b: &[u8]) -> String {
    String::from_utf8_lossy(b).trim_end_matches('\0').to_string()
}

/// Parse one de-framed payload from the radio.
pub fn parse(frame: &[u8]) -> Result<Inbound, PacketError> {
    let code = *frame.first().ok_or(PacketError::Empty)?;
    let inbound = match code {
        resp::OK => Inbound::Ok,
        resp::ERROR => Inbound::Error(frame.get(1).copied().unwrap_or(0)),
        resp::SELF_INFO => {
            need(frame, 10)?;
            let name = frame
                .get(SELF_INFO_NAME_OFFSET..)
                .map(text_field)
                .unwrap_or_default();
            Inbound::SelfInfo {
                name,
                public_key_prefix: hex::encode(&frame[4..10]),
            }
        }
        resp::MSG_SENT => {
            need(frame, 10)?;
            Inbound::MsgSent {
                expected_ack: le_u32(&frame[2..6]),
                suggested_timeout_ms: le_u32(&frame[6..10]),
            }
        }
        resp::CHANNEL_MSG_RECV => {
            need(frame, 8)?;
            Inbound::ChannelMessage(ChannelMessage {
                channel: frame[1],
                path_len: path_len(frame[2]),
                sender_timestamp: Some(le_u32(&frame[4..8])),
                text: text_field(&frame[8..]),
                snr: None,
            })
        }
        resp::CHANNEL_MSG_RECV_V3 => {
            need(frame, 11)?;
            Inbound::ChannelMessage(ChannelMessage {
                snr: Some(f32::from(frame[1] as i8) / 4.0),
                channel: frame[4],
                path_len: path_len(frame[5]),
                sender_timestamp: Some(le_u32(&frame[7..11])),
                text: text_field(&frame[11..]),
            })
        }
        resp::CONTACT_MSG_RECV | resp::CONTACT_MSG_RECV_V3 => Inbound::ContactMessage,
        resp::NO_MORE_MESSAGES => Inbound::NoMoreMessages,
        resp::MESSAGES_WAITING => Inbound::MessagesWaiting,
        resp::LOG_RX_DATA => {
            need(frame, 3)?;
            Inbound::RxLog(RxLogData {
                snr: f32::from(frame[1] as i8) / 4.0,
                rssi: frame[2] as i8,
                raw: frame[3..].to_vec(),
            })
        }
        other => Inbound::Unknown(other),
    };
    Ok(inbound)
}

fn path_len(b: u8) -> Option<u8> {
    (b != PATH_LEN_NONE).then_some(b)
}

/// Handshake announcing this client to the radio; answered with SELF_INFO.
pub fn app_start(client_name: &str) -> Vec<u8> {
    let mut out = vec![cmd::APP_START, APP_PROTOCOL_VERSION];
    out.extend_from_slice(&[b' '; 6]);
    out.extend_from_slice(client_name.as_bytes());
    out
}

/// Ask for the next queued message; answered with a message or NO_MORE_MESSAGES.
pub fn sync_next_message() -> Vec<u8> {
    vec![cmd::SYNC_NEXT_MESSAGE]
}

/// Plain text to a group channel, stamped with `timestamp` (unix seconds).
pub fn send_channel_text(channel: u8, timestamp: u32, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(7 + text.len());
    out.push(cmd::SEND_CHANNEL_TXT_MSG);
    out.push(TXT_TYPE_PLAIN);
    out.push(channel);
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rx_log_into_record() {
        // snr = 29/4, rssi = -92
        let frame = [resp::LOG_RX_DATA, 29, 0xa4, 0x11, 0x02, 0x3f, 0x01];
        let Inbound::RxLog(data) = parse(&frame).expect("parses") else {
            panic!("expected rx log");
        };
        assert_eq!(data.snr, 7.25);
        assert_eq!(data.rssi, -92);
        assert_eq!(data.raw, vec![0x11, 0x02, 0x3f, 0x01]);
        let record = data.to_record();
        assert_eq!(record["payload"], "11023f01");
        assert_eq!(record["rssi"], -92);
    }

    #[test]
    fn parses_channel_message_v1() {
        let mut frame = vec![resp::CHANNEL_MSG_RECV, 1, 2, 0];
        frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        frame.extend_from_slice(b"Alice: ping now");
        let Inbound::ChannelMessage(msg) = parse(&frame).expect("parses") else {
            panic!("expected channel message");
        };
        assert_eq!(msg.channel, 1);
        assert_eq!(msg.path_len, Some(2));
        assert_eq!(msg.sender_timestamp, Some(1_700_000_000));
        assert_eq!(msg.text, "Alice: ping now");
        assert_eq!(msg.snr, None);
    }

    #[test]
    fn parses_channel_message_v3() {
        let mut frame = vec![resp::CHANNEL_MSG_RECV_V3, (-8i8) as u8, 0, 0, 3, 0xff, 0];
        frame.extend_from_slice(&42u32.to_le_bytes());
        frame.extend_from_slice(b"Bob: PING\0");
        let Inbound::ChannelMessage(msg) = parse(&frame).expect("parses") else {
            panic!("expected channel message");
        };
        assert_eq!(msg.channel, 3);
        assert_eq!(msg.snr, Some(-2.0));
        assert_eq!(msg.path_len, None);
        assert_eq!(msg.text, "Bob: PING");
    }

    #[test]
    fn parses_simple_codes() {
        assert_eq!(parse(&[resp::OK]), Ok(Inbound::Ok));
        assert_eq!(parse(&[resp::ERROR, 2]), Ok(Inbound::Error(2)));
        assert_eq!(parse(&[resp::ERROR]), Ok(Inbound::Error(0)));
        assert_eq!(parse(&[resp::NO_MORE_MESSAGES]), Ok(Inbound::NoMoreMessages));
        assert_eq!(parse(&[resp::MESSAGES_WAITING]), Ok(Inbound::MessagesWaiting));
        assert_eq!(parse(&[resp::CONTACT_MSG_RECV_V3, 0]), Ok(Inbound::ContactMessage));
        assert_eq!(parse(&[0x42, 1, 2]), Ok(Inbound::Unknown(0x42)));
    }

    #[test]
    fn parses_self_info_name() {
        let mut frame = vec![0u8; SELF_INFO_NAME_OFFSET];
        frame[0] = resp::SELF_INFO;
        frame[4..10].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        frame.extend_from_slice(b"T114 Base");
        assert_eq!(
            parse(&frame),
            Ok(Inbound::SelfInfo {
                name: "T114 Base".to_string(),
                public_key_prefix: "deadbeef0001".to_string(),
            })
        );
    }

    #[test]
    fn parses_msg_sent() {
        let mut frame = vec![resp::MSG_SENT, 1];
        frame.extend_from_slice(&0xAABBCCDDu32.to_le_bytes());
        frame.extend_from_slice(&3000u32.to_le_bytes());
        assert_eq!(
            parse(&frame),
            Ok(Inbound::MsgSent {
                expected_ack: 0xAABBCCDD,
                suggested_timeout_ms: 3000,
            })
        );
    }

    #[test]
    fn rejects_truncated_frames() {
        assert_eq!(parse(&[]), Err(PacketError::Empty));
        assert_eq!(
            parse(&[resp::LOG_RX_DATA, 1]),
            Err(PacketError::Truncated { code: resp::LOG_RX_DATA, len: 2 })
        );
        assert!(parse(&[resp::CHANNEL_MSG_RECV, 1, 2, 0, 0]).is_err());
        assert!(parse(&[resp::CHANNEL_MSG_RECV_V3, 1, 2]).is_err());
    }

    #[test]
    fn builds_commands() {
        assert_eq!(app_start("bot"), b"\x01\x03      bot".to_vec());
        assert_eq!(sync_next_message(), vec![0x0a]);
        let out = send_channel_text(1, 0x01020304, "hi");
        assert_eq!(out, vec![0x03, 0x00, 0x01, 0x04, 0x03, 0x02, 0x01, b'h', b'i']);
    }
}
