//! Transceiver capability and exchange statistics

use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Card channel failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransceiverError {
    /// Card removed from the field or the channel was closed
    #[error("Connection to the card lost")]
    ConnectionLost,

    #[error("Communication error: {0}")]
    Io(String),

    /// Response shorter than the two status bytes
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),
}

/// Timing of a single command/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatItem {
    pub command_len: usize,
    pub response_len: usize,
    pub took: Duration,
}

/// Synchronous command/response channel to a contactless card
///
/// `close` may be called from another thread while an exchange is in
/// flight; that exchange and every later one fail with
/// [`TransceiverError::ConnectionLost`].
pub trait Transceiver: Send + Sync {
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, TransceiverError>;

    fn close(&self);

    /// Per-exchange statistics since the channel was opened
    fn stats(&self) -> Vec<StatItem>;
}

/// Sum of the time spent waiting for card responses
pub fn total_took(stats: &[StatItem]) -> Duration {
    stats.iter().map(|s| s.took).sum()
}

/// Thread-safe accumulator for [`StatItem`]s
#[derive(Debug, Default)]
pub struct StatsRecorder {
    items: Mutex<Vec<StatItem>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command_len: usize, response_len: usize, took: Duration) {
        self.items.lock().push(StatItem {
            command_len,
            response_len,
            took,
        });
    }

    pub fn snapshot(&self) -> Vec<StatItem> {
        self.items.lock().clone()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
