//! Torn transaction log coordination
//!
//! The log is loaded from the terminal's persister before a kernel that
//! keeps one is activated, handed to the kernel through a shared
//! [`TornTransactionLog`] handle, and saved again on every exit path.

use emv_common::{tags, Tlv, TlvMap};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One interrupted transaction, stored as the kernel's torn record TLVs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TornTransactionLogRecord {
    data: TlvMap,
}

impl TornTransactionLogRecord {
    pub fn new(data: TlvMap) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &TlvMap {
        &self.data
    }

    pub fn pan(&self) -> Option<&[u8]> {
        self.data.value(tags::APPLICATION_PAN)
    }

    pub fn pan_sequence_number(&self) -> Option<&[u8]> {
        self.data.value(tags::APPLICATION_PAN_SEQUENCE_NUMBER)
    }

    /// Torn Record (FF8101) wrapping the stored objects
    pub fn as_tlv(&self) -> Tlv {
        Tlv::new(tags::TORN_RECORD, self.data.encode())
    }
}

/// Storage for the torn transaction log, implemented by the terminal
pub trait TornTransactionLogPersister: Send + Sync {
    fn load(&self) -> Vec<TornTransactionLogRecord>;

    fn save(&self, records: &[TornTransactionLogRecord]);

    fn clear(&self);
}

/// Persister that keeps the log for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryTornTransactionLogPersister {
    records: Mutex<Vec<TornTransactionLogRecord>>,
}

impl InMemoryTornTransactionLogPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TornTransactionLogPersister for InMemoryTornTransactionLogPersister {
    fn load(&self) -> Vec<TornTransactionLogRecord> {
        self.records.lock().clone()
    }

    fn save(&self, records: &[TornTransactionLogRecord]) {
        *self.records.lock() = records.to_vec();
    }

    fn clear(&self) {
        self.records.lock().clear();
    }
}

/// In-memory log shared between the entry point and the kernel
#[derive(Debug, Clone, Default)]
pub struct TornTransactionLog {
    records: Arc<Mutex<Vec<TornTransactionLogRecord>>>,
}

impl TornTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_log(&self, records: Vec<TornTransactionLogRecord>) {
        *self.records.lock() = records;
    }

    pub fn get_log(&self) -> Vec<TornTransactionLogRecord> {
        self.records.lock().clone()
    }

    pub fn push(&self, record: TornTransactionLogRecord) {
        self.records.lock().push(record);
    }

    /// Remove and return the first record matching `pred`
    pub fn take_first(&self, pred: impl Fn(&TornTransactionLogRecord) -> bool) -> Option<TornTransactionLogRecord> {
        let mut records = self.records.lock();
        let pos = records.iter().position(pred)?;
        Some(records.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Loads the log on open and saves it when dropped
pub struct TornLogSession<'a> {
    persister: &'a dyn TornTransactionLogPersister,
    log: &'a TornTransactionLog,
}

impl<'a> TornLogSession<'a> {
    pub fn open(persister: &'a dyn TornTransactionLogPersister, log: &'a TornTransactionLog) -> Self {
        let records = persister.load();
        debug!(size = records.len(), "Torn transaction log loaded");
        log.set_log(records);
        Self { persister, log }
    }
}

impl Drop for TornLogSession<'_> {
    fn drop(&mut self) {
        let records = self.log.get_log();
        debug!(size = records.len(), "Torn transaction log size after kernel");
        self.persister.save(&records);
    }
}
