//! Background PC/SC polling for the entry point
//!
//! The worker thread watches the first reader and hands every newly
//! presented card to the registered [`TagListener`]. The entry point
//! processes the card synchronously on this thread.

use emv_card::CardReader;
use emv_entry_point::{NfcManager, TagListener};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const READER_RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Shared {
    listener: Mutex<Option<Weak<dyn TagListener>>>,
    polling: AtomicBool,
    exit: AtomicBool,
}

/// [`NfcManager`] over the first PC/SC reader
#[derive(Default)]
pub struct PcscPoller {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PcscPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the worker thread has stopped
    pub fn join(&self) {
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("Card worker panicked");
            }
        }
    }
}

impl NfcManager for PcscPoller {
    fn init(&self, listener: Weak<dyn TagListener>) {
        *self.shared.listener.lock() = Some(listener);
        self.shared.exit.store(false, Ordering::SeqCst);
    }

    fn start_polling(&self) {
        self.shared.polling.store(true, Ordering::SeqCst);

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *worker = Some(thread::spawn(move || run(shared)));
    }

    fn stop_polling(&self) {
        debug!("Polling stopped");
        self.shared.polling.store(false, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.shared.polling.store(false, Ordering::SeqCst);
        self.shared.exit.store(true, Ordering::SeqCst);
    }
}

fn run(shared: Arc<Shared>) {
    info!("Card worker thread started");

    let mut reader: Option<CardReader> = None;
    let mut card_present = false;
    let mut last_reader_check: Option<Instant> = None;

    while !shared.exit.load(Ordering::SeqCst) {
        if !shared.polling.load(Ordering::SeqCst) {
            card_present = false;
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        if reader.is_none() && last_reader_check.map_or(true, |t| t.elapsed() > READER_RETRY_INTERVAL) {
            match CardReader::new() {
                Ok(r) => {
                    info!("Card reader initialized");
                    reader = Some(r);
                }
                Err(e) => debug!("Card reader unavailable: {}", e),
            }
            last_reader_check = Some(Instant::now());
        }

        if let Some(ref r) = reader {
            match r.connect_first() {
                Ok((transceiver, reader_name)) => {
                    if !card_present {
                        info!(reader = %reader_name, "Card detected");
                        card_present = true;
                        let listener = shared.listener.lock().as_ref().and_then(Weak::upgrade);
                        match listener {
                            Some(l) => {
                                if let Err(e) = l.on_nfc_tag(Arc::new(transceiver)) {
                                    error!(error = %e, "Card processing failed");
                                }
                            }
                            None => debug!("No tag listener registered"),
                        }
                    }
                }
                Err(_) => {
                    if card_present {
                        info!("Card removed");
                        card_present = false;
                    }
                }
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    info!("Card worker thread stopped");
}
