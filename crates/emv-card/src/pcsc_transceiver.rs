//! Transceiver backed by a PC/SC card connection

use crate::transceiver::{StatItem, StatsRecorder, Transceiver, TransceiverError};
use parking_lot::Mutex;
use pcsc::{Card, MAX_BUFFER_SIZE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// [`Transceiver`] over a connected PC/SC card
///
/// PC/SC offers no way to abort a pending `SCardTransmit`, so `close`
/// marks the channel closed and the in-flight exchange reports
/// [`TransceiverError::ConnectionLost`] once the reader returns.
pub struct PcscTransceiver {
    card: Mutex<Card>,
    closed: AtomicBool,
    stats: StatsRecorder,
}

impl PcscTransceiver {
    pub fn new(card: Card) -> Self {
        Self {
            card: Mutex::new(card),
            closed: AtomicBool::new(false),
            stats: StatsRecorder::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transceiver for PcscTransceiver {
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, TransceiverError> {
        if self.is_closed() {
            return Err(TransceiverError::ConnectionLost);
        }

        let mut rapdu_buf = [0; MAX_BUFFER_SIZE];
        let start = Instant::now();
        let response = {
            let card = self.card.lock();
            card.transmit(command, &mut rapdu_buf)
                .map(<[u8]>::to_vec)
                .map_err(TransceiverError::from)?
        };
        self.stats.record(command.len(), response.len(), start.elapsed());

        trace!(
            command = %hex::encode_upper(command),
            response = %hex::encode_upper(&response),
            "APDU exchange"
        );

        if self.is_closed() {
            return Err(TransceiverError::ConnectionLost);
        }
        Ok(response)
    }

    fn close(&self) {
        debug!("Closing card channel");
        self.closed.store(true, Ordering::Release);
    }

    fn stats(&self) -> Vec<StatItem> {
        self.stats.snapshot()
    }
}

impl From<pcsc::Error> for TransceiverError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::RemovedCard
            | pcsc::Error::ResetCard
            | pcsc::Error::NoSmartcard
            | pcsc::Error::UnpoweredCard => TransceiverError::ConnectionLost,
            other => TransceiverError::Io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_card_is_connection_lost() {
        assert_eq!(
            TransceiverError::from(pcsc::Error::RemovedCard),
            TransceiverError::ConnectionLost
        );
        assert!(matches!(
            TransceiverError::from(pcsc::Error::Timeout),
            TransceiverError::Io(_)
        ));
    }
}
