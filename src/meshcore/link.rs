//! Byte links the client can run over: the radio's USB serial port, or an in-process
//! buffer pair used by tests and offline runs.
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use super::framer::{self, FROM_RADIO};

/// Non-blocking byte pipe to a companion radio.
pub trait Link: Send + 'static {
    /// Read whatever is ready; `Ok(0)` when nothing is waiting.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Write one already-framed command.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

#[cfg(feature = "serial")]
impl Link for Box<dyn serialport::SerialPort> {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let ready = self.bytes_to_read().map_err(io::Error::from)? as usize;
        if ready == 0 {
            return Ok(0);
        }
        let take = ready.min(buf.len());
        match io::Read::read(self, &mut buf[..take]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, frame)?;
        io::Write::flush(self)
    }
}

#[derive(Debug, Default)]
struct MemoryLinkState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
}

/// In-process link. Clones share the same buffers, so a test keeps one handle to
/// play the radio while the client owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryLinkState>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a radio → host payload, framed as the radio would send it.
    pub fn inject(&self, payload: &[u8]) {
        let mut state = self.lock();
        state.inbound.push_back(FROM_RADIO);
        state.inbound.extend((payload.len() as u16).to_le_bytes());
        state.inbound.extend(payload.iter().copied());
    }

    /// Queue raw bytes exactly as given (noise, partial frames).
    pub fn inject_raw(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    /// Command payloads written so far, with the frame header stripped.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock()
            .written
            .iter()
            .map(|f| f.get(3..).unwrap_or_default().to_vec())
            .collect()
    }
}

impl Link for MemoryLink {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let n = state.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if frame.first() != Some(&framer::TO_RADIO) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame missing to-radio marker",
            ));
        }
        self.lock().written.push(frame.to_vec());
        Ok(())
    }
}
