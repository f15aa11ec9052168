//! Scripted collaborators for driving the entry point in tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use emv_card::{StatItem, StatsRecorder, Transceiver, TransceiverError};
use emv_common::{tags, Tlv, TlvMap};
use emv_entry_point::{
    ApplicationSelector, Candidate, CardAppConfiguration, CardApplication, CertificateData, CountryCode, Currency,
    EncDec, EntryPoint, EntryPointComponents, EntryPointError, EntryPointListener, EntryPointOptions, Kernel,
    KernelRegistry, KernelType, MessageStore, NfcManager, Outcome, OutcomeType, PreProcessingIndicators,
    PreprocessedApplication, ProcessingError, SelectedApplication, TagListener, TerminalConfig, TerminalType,
    TimeProvider, TornTransactionLog, TornTransactionLogPersister, TornTransactionLogRecord, TransactionData,
    TransactionTimestamp, TransactionType, UiRequester, UserInterfaceRequest,
};
use emv_entry_point::kernel::CaPublicKey;
use emv_entry_point::stores::IntermediateOutcomeStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub const MC_AID: &str = "A0000000041010";
pub const VISA_AID: &str = "A0000000031010";

pub type Hook = Box<dyn FnOnce() + Send>;

pub struct FakeTransceiver {
    closed: AtomicBool,
    stats: StatsRecorder,
}

impl FakeTransceiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            stats: StatsRecorder::new(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transceiver for FakeTransceiver {
    fn transceive(&self, command: &[u8]) -> Result<Vec<u8>, TransceiverError> {
        if self.is_closed() {
            return Err(TransceiverError::ConnectionLost);
        }
        self.stats.record(command.len(), 2, Duration::from_millis(5));
        Ok(vec![0x90, 0x00])
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn stats(&self) -> Vec<StatItem> {
        self.stats.snapshot()
    }
}

#[derive(Default)]
pub struct FakeNfc {
    listener: Mutex<Option<Weak<dyn TagListener>>>,
    pub inits: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub exits: AtomicUsize,
}

impl FakeNfc {
    /// Present a card as the polling thread would
    pub fn tap(&self, transceiver: Arc<FakeTransceiver>) -> Result<(), EntryPointError> {
        let listener = self.listener.lock().as_ref().and_then(Weak::upgrade);
        match listener {
            Some(l) => l.on_nfc_tag(transceiver),
            None => panic!("no tag listener registered"),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

impl NfcManager for FakeNfc {
    fn init(&self, listener: Weak<dyn TagListener>) {
        self.inits.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock() = Some(listener);
    }

    fn start_polling(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_polling(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    StartedPolling,
    StartedReadingCard,
    EndedReadingCard,
    PreProcessingEnded,
    Outcome {
        outcome: Outcome,
        intermediate: Vec<Outcome>,
        messages: usize,
        selected_aid: Option<String>,
    },
}

#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Outcome { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_outcome_event(&self) -> Option<Event> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|e| matches!(e, Event::Outcome { .. }))
            .cloned()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(*e)).count()
    }
}

impl EntryPointListener for RecordingListener {
    fn on_started_polling(&self) {
        self.events.lock().push(Event::StartedPolling);
    }

    fn on_started_reading_card(&self) {
        self.events.lock().push(Event::StartedReadingCard);
    }

    fn on_ended_reading_card(&self) {
        self.events.lock().push(Event::EndedReadingCard);
    }

    fn on_pre_processing_ended(&self) {
        self.events.lock().push(Event::PreProcessingEnded);
    }

    fn on_outcome(
        &self,
        outcome: &Outcome,
        intermediate_outcomes: &[Outcome],
        messages: &[UserInterfaceRequest],
        selected: Option<&SelectedApplication>,
    ) {
        self.events.lock().push(Event::Outcome {
            outcome: outcome.clone(),
            intermediate: intermediate_outcomes.to_vec(),
            messages: messages.len(),
            selected_aid: selected.map(|s| s.application_id().to_string()),
        });
    }
}

#[derive(Default)]
pub struct RecordingUi {
    pub requests: Mutex<Vec<UserInterfaceRequest>>,
}

impl UiRequester for RecordingUi {
    fn ui_request(&self, request: &UserInterfaceRequest) {
        self.requests.lock().push(request.clone());
    }
}

pub struct NoCertificates;

impl CertificateData for NoCertificates {
    fn ca_public_key(&self, _rid: &[u8], _index: u8) -> Option<CaPublicKey> {
        None
    }

    fn is_revoked(&self, _rid: &[u8], _index: u8, _serial: &[u8]) -> bool {
        false
    }
}

pub struct PlainEncDec;

impl EncDec for PlainEncDec {
    fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }
}

pub struct FixedTime;

impl TimeProvider for FixedTime {
    fn wall_clock(&self) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Default)]
pub struct CountingPersister {
    pub records: Mutex<Vec<TornTransactionLogRecord>>,
    pub loads: AtomicUsize,
    pub saves: AtomicUsize,
}

impl CountingPersister {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TornTransactionLogPersister for CountingPersister {
    fn load(&self) -> Vec<TornTransactionLogRecord> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.records.lock().clone()
    }

    fn save(&self, records: &[TornTransactionLogRecord]) {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.records.lock() = records.to_vec();
    }

    fn clear(&self) {
        self.records.lock().clear();
    }
}

/// One selector call: an optional side effect, then the result
pub struct SelectStep {
    pub before: Option<Hook>,
    pub result: Result<Option<SelectedApplication>, ProcessingError>,
}

impl SelectStep {
    pub fn candidate(aid: &str, kernel_type: KernelType) -> Self {
        Self {
            before: None,
            result: Ok(Some(selected(aid, kernel_type))),
        }
    }

    pub fn nothing() -> Self {
        Self { before: None, result: Ok(None) }
    }

    pub fn fail(err: ProcessingError) -> Self {
        Self {
            before: None,
            result: Err(err),
        }
    }

    pub fn before(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.before = Some(Box::new(hook));
        self
    }
}

#[derive(Default)]
pub struct SelectorScript {
    pub init_results: Mutex<VecDeque<Result<Option<Outcome>, ProcessingError>>>,
    pub steps: Mutex<VecDeque<SelectStep>>,
    pub created: AtomicUsize,
}

impl SelectorScript {
    pub fn push(&self, step: SelectStep) {
        self.steps.lock().push_back(step);
    }

    pub fn push_init(&self, result: Result<Option<Outcome>, ProcessingError>) {
        self.init_results.lock().push_back(result);
    }
}

pub struct ScriptedSelector {
    script: Arc<SelectorScript>,
}

impl ApplicationSelector for ScriptedSelector {
    fn init(
        &mut self,
        _apps: &[PreprocessedApplication],
        _transceiver: &dyn Transceiver,
    ) -> Result<Option<Outcome>, ProcessingError> {
        self.script.init_results.lock().pop_front().unwrap_or(Ok(None))
    }

    fn select(&mut self, _transceiver: &dyn Transceiver) -> Result<Option<SelectedApplication>, ProcessingError> {
        let step = self.script.steps.lock().pop_front();
        match step {
            Some(step) => {
                if let Some(hook) = step.before {
                    hook();
                }
                step.result
            }
            None => Ok(None),
        }
    }
}

/// One kernel run: an optional side effect, then the result
pub struct KernelRun {
    pub before: Option<Hook>,
    pub result: Result<Outcome, ProcessingError>,
    pub tear: bool,
}

impl KernelRun {
    pub fn outcome(kind: OutcomeType) -> Self {
        Self::returning(Outcome::builder(kind).build())
    }

    pub fn returning(outcome: Outcome) -> Self {
        Self {
            before: None,
            result: Ok(outcome),
            tear: false,
        }
    }

    pub fn fail(err: ProcessingError) -> Self {
        Self {
            before: None,
            result: Err(err),
            tear: false,
        }
    }

    pub fn before(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    /// Append a torn record to the shared log during the run
    pub fn tearing(mut self) -> Self {
        self.tear = true;
        self
    }
}

pub struct KernelScript {
    pub runs: Mutex<VecDeque<KernelRun>>,
    pub accept_stop: AtomicBool,
    pub stop_calls: AtomicUsize,
    pub inits: AtomicUsize,
    pub processed: AtomicUsize,
    pub terminal_data: Mutex<Vec<TlvMap>>,
    pub emv_mode: AtomicBool,
    pub tlv_db: Mutex<TlvMap>,
    pub torn_log: TornTransactionLog,
    pub torn_len_seen: Mutex<Vec<usize>>,
}

impl KernelScript {
    pub fn new(torn_log: TornTransactionLog) -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            accept_stop: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            terminal_data: Mutex::new(Vec::new()),
            emv_mode: AtomicBool::new(true),
            tlv_db: Mutex::new(TlvMap::new()),
            torn_log,
            torn_len_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, run: KernelRun) {
        self.runs.lock().push_back(run);
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

pub struct FakeKernel {
    script: Arc<KernelScript>,
}

impl Kernel for FakeKernel {
    fn init(&self, _certificates: Arc<dyn CertificateData>, _enc_dec: Arc<dyn EncDec>) {
        self.script.inits.fetch_add(1, Ordering::SeqCst);
    }

    fn process(
        &self,
        transceiver: &dyn Transceiver,
        terminal_data: &TlvMap,
        _country_code: CountryCode,
        _transaction: &TransactionData,
        _selected: &SelectedApplication,
        _timestamp: &TransactionTimestamp,
    ) -> Result<Outcome, ProcessingError> {
        self.script.processed.fetch_add(1, Ordering::SeqCst);
        self.script.terminal_data.lock().push(terminal_data.clone());
        self.script.torn_len_seen.lock().push(self.script.torn_log.len());

        // GET PROCESSING OPTIONS
        let _ = transceiver.transceive(&[0x80, 0xA8, 0x00, 0x00, 0x02, 0x83, 0x00, 0x00]);

        let run = self.script.runs.lock().pop_front();
        let run = match run {
            Some(run) => run,
            None => return Ok(Outcome::builder(OutcomeType::Approved).build()),
        };
        if let Some(hook) = run.before {
            hook();
        }
        if run.tear {
            let mut data = TlvMap::new();
            data.update_or_add(Tlv::new(tags::APPLICATION_PAN, vec![0x54, 0x13, 0x33, 0x00, 0x89, 0x60, 0x10, 0x75]));
            self.script.torn_log.push(TornTransactionLogRecord::new(data));
        }
        run.result
    }

    fn stop_signal(&self) -> bool {
        self.script.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.script.accept_stop.load(Ordering::SeqCst)
    }

    fn is_emv_mode(&self) -> bool {
        self.script.emv_mode.load(Ordering::SeqCst)
    }

    fn tlv_database(&self) -> TlvMap {
        self.script.tlv_db.lock().clone()
    }
}

pub fn selected(aid: &str, kernel_type: KernelType) -> SelectedApplication {
    let preprocessed = PreprocessedApplication {
        app_config: CardAppConfiguration::new(aid, TransactionType::Purchase, app_tlvs()),
        indicators: PreProcessingIndicators::default(),
        kernel_type,
    };
    SelectedApplication {
        candidate: Candidate {
            preprocessed,
            aid: hex::decode(aid).unwrap_or_default(),
            final_kernel_type: kernel_type,
            priority: Some(1),
        },
        fci: TlvMap::new(),
    }
}

/// Application configuration overriding one terminal default
pub fn app_tlvs() -> Vec<Tlv> {
    vec![Tlv::bcd(tags::TERMINAL_FLOOR_LIMIT, 5000, 4).unwrap()]
}

pub fn terminal_config() -> TerminalConfig {
    let mut defaults = TlvMap::new();
    defaults.update_or_add(Tlv::bcd(tags::TERMINAL_FLOOR_LIMIT, 0, 4).unwrap());
    defaults.update_or_add(Tlv::new(tags::TERMINAL_TRANSACTION_QUALIFIERS, vec![0x36, 0x00, 0x40, 0x00]));
    TerminalConfig {
        country_code: CountryCode(100),
        terminal_type: TerminalType(0x22),
        default_config: defaults,
    }
}

pub struct Harness {
    pub ep: Arc<EntryPoint>,
    pub nfc: Arc<FakeNfc>,
    pub listener: Arc<RecordingListener>,
    pub ui: Arc<RecordingUi>,
    pub selector: Arc<SelectorScript>,
    pub mastercard: Arc<KernelScript>,
    pub visa: Arc<KernelScript>,
    pub torn: Arc<CountingPersister>,
    pub torn_log: TornTransactionLog,
    pub intermediate: IntermediateOutcomeStore,
    pub messages: MessageStore,
}

impl Harness {
    pub fn new(options: EntryPointOptions) -> Self {
        let torn_log = TornTransactionLog::new();
        let selector = Arc::new(SelectorScript::default());
        let mastercard = Arc::new(KernelScript::new(torn_log.clone()));
        let visa = Arc::new(KernelScript::new(torn_log.clone()));
        let torn = Arc::new(CountingPersister::default());
        let intermediate = IntermediateOutcomeStore::new();
        let messages = MessageStore::new();

        let selector_script = Arc::clone(&selector);
        let mc_script = Arc::clone(&mastercard);
        let visa_script = Arc::clone(&visa);

        let ep = EntryPoint::new(EntryPointComponents {
            selector_factory: Box::new(move || {
                selector_script.created.fetch_add(1, Ordering::SeqCst);
                Box::new(ScriptedSelector {
                    script: Arc::clone(&selector_script),
                }) as Box<dyn ApplicationSelector>
            }),
            kernels: KernelRegistry::new()
                .with_mastercard(Box::new(move || {
                    Arc::new(FakeKernel {
                        script: Arc::clone(&mc_script),
                    }) as Arc<dyn Kernel>
                }))
                .with_visa(Box::new(move || {
                    Arc::new(FakeKernel {
                        script: Arc::clone(&visa_script),
                    }) as Arc<dyn Kernel>
                })),
            torn_persister: torn.clone(),
            torn_log: torn_log.clone(),
            intermediate_outcomes: intermediate.clone(),
            messages: messages.clone(),
            time: Arc::new(FixedTime),
            options,
        });

        Self {
            ep,
            nfc: Arc::new(FakeNfc::default()),
            listener: Arc::new(RecordingListener::default()),
            ui: Arc::new(RecordingUi::default()),
            selector,
            mastercard,
            visa,
            torn,
            torn_log,
            intermediate,
            messages,
        }
    }

    pub fn manual() -> Self {
        Self::new(EntryPointOptions::default())
    }

    pub fn init(&self) -> Result<(), EntryPointError> {
        self.ep.init(
            self.listener.clone(),
            self.ui.clone(),
            self.nfc.clone(),
            terminal_config(),
            Arc::new(NoCertificates),
            Arc::new(PlainEncDec),
        )
    }

    pub fn apps() -> Vec<CardApplication> {
        vec![
            CardApplication::new(MC_AID, KernelType::Mastercard),
            CardApplication::new(VISA_AID, KernelType::Visa),
        ]
    }

    pub fn configs() -> Vec<CardAppConfiguration> {
        vec![
            CardAppConfiguration::new(MC_AID, TransactionType::Purchase, app_tlvs()),
            CardAppConfiguration::new(VISA_AID, TransactionType::Purchase, app_tlvs()),
        ]
    }

    pub fn start(&self, amount: i64) -> Result<Option<Outcome>, EntryPointError> {
        self.ep.start_a(
            &Self::apps(),
            &Self::configs(),
            amount,
            0,
            Currency::EUR,
            TransactionType::Purchase,
        )
    }

    /// Initialized and polling for a card
    pub fn polling() -> Self {
        let h = Self::manual();
        h.init().unwrap();
        assert!(h.start(1500).unwrap().is_none());
        h
    }

    pub fn tap(&self) -> (Arc<FakeTransceiver>, Result<(), EntryPointError>) {
        let transceiver = FakeTransceiver::new();
        let result = self.nfc.tap(Arc::clone(&transceiver));
        (transceiver, result)
    }
}
