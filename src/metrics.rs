//! Process-wide counters for the responder, logged on shutdown.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static TRACES_DECODED: AtomicU64 = AtomicU64::new(0);
static TRACES_REJECTED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_SEEN: AtomicU64 = AtomicU64::new(0);
static REPLIES_SENT: AtomicU64 = AtomicU64::new(0);
static REPLIES_FAILED: AtomicU64 = AtomicU64::new(0);
static REPLY_LATENCY_SUM_MS: AtomicU64 = AtomicU64::new(0);
static REPLY_LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn inc_traces_decoded() {
    TRACES_DECODED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_traces_rejected() {
    TRACES_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_messages_seen() {
    MESSAGES_SEEN.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_replies_sent() {
    REPLIES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_replies_failed() {
    REPLIES_FAILED.fetch_add(1, Ordering::Relaxed);
}

/// Time from trigger message to radio acknowledgement of the reply.
pub fn observe_reply_latency(started: Instant) {
    let ms = started.elapsed().as_millis() as u64;
    REPLY_LATENCY_SUM_MS.fetch_add(ms, Ordering::Relaxed);
    REPLY_LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub traces_decoded: u64,
    pub traces_rejected: u64,
    pub messages_seen: u64,
    pub replies_sent: u64,
    pub replies_failed: u64,
    pub reply_latency_avg_ms: Option<u64>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "traces decoded={} rejected={} messages={} replies sent={} failed={}",
            self.traces_decoded,
            self.traces_rejected,
            self.messages_seen,
            self.replies_sent,
            self.replies_failed
        )?;
        if let Some(avg) = self.reply_latency_avg_ms {
            write!(f, " avg_reply_ms={}", avg)?;
        }
        Ok(())
    }
}

pub fn snapshot() -> Snapshot {
    let sum = REPLY_LATENCY_SUM_MS.load(Ordering::Relaxed);
    let count = REPLY_LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        traces_decoded: TRACES_DECODED.load(Ordering::Relaxed),
        traces_rejected: TRACES_REJECTED.load(Ordering::Relaxed),
        messages_seen: MESSAGES_SEEN.load(Ordering::Relaxed),
        replies_sent: REPLIES_SENT.load(Ordering::Relaxed),
        replies_failed: REPLIES_FAILED.load(Ordering::Relaxed),
        reply_latency_avg_ms: if count > 0 { Some(sum / count) } else { None },
    }
}
