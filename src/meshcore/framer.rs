//! Length‑prefixed framer for the MeshCore companion serial link.
//!
//! Frames on the wire look like:
//!
//!   radio → host: `'>' <u16 little-endian length> <payload>`
//!   host → radio: `'<' <u16 little-endian length> <payload>`
//!
//! [`FrameDecoder`] is fed arbitrary chunks and yields whole payloads. Bytes before a
//! start marker (boot banners, console noise) are skipped, and an impossible length
//! causes a one-byte resync so a corrupted header cannot wedge the stream.
use bytes::{Buf, BytesMut};
use log::trace;

/// Start marker of frames sent by the radio.
pub const FROM_RADIO: u8 = b'>';
/// Start marker of frames sent to the radio.
pub const TO_RADIO: u8 = b'<';
/// Largest payload the companion firmware exchanges in one frame.
pub const MAX_FRAME_SIZE: usize = 172;

const HEADER_LEN: usize = 3;

pub struct FrameDecoder {
    buf: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes currently held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.buf.iter().position(|&b| b == FROM_RADIO) {
                None => {
                    if !self.buf.is_empty() {
                        trace!("framer: discarding {} bytes without start marker", self.buf.len());
                        self.buf.clear();
                    }
                    return None;
                }
                Some(0) => {}
                Some(skip) => {
                    trace!("framer: skipping {} bytes of noise", skip);
                    self.buf.advance(skip);
                }
            }

            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let len = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;
            if len == 0 || len > MAX_FRAME_SIZE {
                // not a real header; drop the marker and look for the next one
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < HEADER_LEN + len {
                return None;
            }
            self.buf.advance(HEADER_LEN);
            return Some(self.buf.split_to(len).to_vec());
        }
    }
}

/// Wrap a command payload for transmission to the radio.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + HEADER_LEN);
    out.push(TO_RADIO);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
