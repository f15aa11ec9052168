use clap::Args;
use emv_card::{total_took, Transceiver};
use emv_common::{Tlv, TlvMap};
use emv_entry_point::kernel::CaPublicKey;
use emv_entry_point::mastercard;
use emv_entry_point::{
    ApplicationSelector, CertificateData, CountryCode, EncDec, EntryPoint, EntryPointComponents, EntryPointListener,
    EntryPointOptions, InMemoryTornTransactionLogPersister, Kernel, KernelRegistry, MessageStore, Outcome,
    OutcomeType, ProcessingError, SelectedApplication, State, SystemTimeProvider, TerminalConfig, TerminalType,
    TornTransactionLog, TransactionData, TransactionTimestamp, UiRequester, UserInterfaceRequest,
};
use emv_entry_point::stores::IntermediateOutcomeStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::card_worker::PcscPoller;
use crate::formatters::{format_value, FormatMode};
use crate::ppse::PpseSelector;

use super::TransactionArgs;

#[derive(Args)]
pub struct PollArgs {
    #[command(flatten)]
    pub transaction: TransactionArgs,

    /// ISO 3166 numeric terminal country code
    #[arg(long, default_value_t = 56)]
    pub country: u16,

    /// Terminal type (tag 9F35) as hex
    #[arg(long, default_value = "22", value_parser = parse_hex_u8)]
    pub terminal_type: u8,

    /// Seconds to wait for a final outcome
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Keep polling after final outcomes
    #[arg(long)]
    pub autorun: bool,
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    u8::from_str_radix(s, 16).map_err(|e| e.to_string())
}

struct OutcomeEvent {
    outcome: Outcome,
    intermediate: Vec<Outcome>,
    messages: Vec<UserInterfaceRequest>,
    aid: Option<String>,
}

struct CliListener {
    outcomes: Mutex<Sender<OutcomeEvent>>,
}

impl EntryPointListener for CliListener {
    fn on_started_polling(&self) {
        println!("Present a card...");
    }

    fn on_started_reading_card(&self) {
        info!("Reading card");
    }

    fn on_ended_reading_card(&self) {
        info!("Card reading ended");
    }

    fn on_pre_processing_ended(&self) {
        debug!("Pre-processing ended");
    }

    fn on_outcome(
        &self,
        outcome: &Outcome,
        intermediate_outcomes: &[Outcome],
        messages: &[UserInterfaceRequest],
        selected: Option<&SelectedApplication>,
    ) {
        let event = OutcomeEvent {
            outcome: outcome.clone(),
            intermediate: intermediate_outcomes.to_vec(),
            messages: messages.to_vec(),
            aid: selected.map(|s| hex::encode_upper(&s.candidate.aid)),
        };
        if self.outcomes.lock().send(event).is_err() {
            debug!("Outcome receiver gone");
        }
    }
}

struct ConsoleUi;

impl UiRequester for ConsoleUi {
    fn ui_request(&self, request: &UserInterfaceRequest) {
        println!("[UI] {:?} ({:?})", request.message, request.status);
    }
}

struct NoCertificates;

impl CertificateData for NoCertificates {
    fn ca_public_key(&self, _rid: &[u8], _index: u8) -> Option<CaPublicKey> {
        None
    }

    fn is_revoked(&self, _rid: &[u8], _index: u8, _serial: &[u8]) -> bool {
        false
    }
}

struct PlainText;

impl EncDec for PlainText {
    fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }
}

/// Stand-in kernel that ends the transaction after final selection
///
/// Reports the FCI of the selected application as the data record.
#[derive(Default)]
struct FciReportKernel {
    stopped: AtomicBool,
}

impl Kernel for FciReportKernel {
    fn init(&self, _certificates: Arc<dyn CertificateData>, _enc_dec: Arc<dyn EncDec>) {}

    fn process(
        &self,
        _transceiver: &dyn Transceiver,
        terminal_data: &TlvMap,
        _country_code: CountryCode,
        _transaction: &TransactionData,
        selected: &SelectedApplication,
        _timestamp: &TransactionTimestamp,
    ) -> Result<Outcome, ProcessingError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(mastercard::stop_outcome());
        }
        debug!(objects = terminal_data.len(), "Terminal data received");

        Ok(Outcome::builder(OutcomeType::EndApplication)
            .data_record(selected.fci.as_list().to_vec())
            .build())
    }

    fn stop_signal(&self) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        true
    }

    fn is_emv_mode(&self) -> bool {
        true
    }

    fn tlv_database(&self) -> TlvMap {
        TlvMap::new()
    }
}

fn fci_report_kernel() -> Arc<dyn Kernel> {
    Arc::new(FciReportKernel::default())
}

pub fn cmd_poll(args: &PollArgs, format_mode: FormatMode) {
    let tx = &args.transaction;
    let (apps, configs) = tx.applications();

    let ep = EntryPoint::new(EntryPointComponents {
        selector_factory: Box::new(|| Box::new(PpseSelector::new()) as Box<dyn ApplicationSelector>),
        kernels: KernelRegistry::new()
            .with_mastercard(Box::new(fci_report_kernel))
            .with_visa(Box::new(fci_report_kernel)),
        torn_persister: Arc::new(InMemoryTornTransactionLogPersister::new()),
        torn_log: TornTransactionLog::new(),
        intermediate_outcomes: IntermediateOutcomeStore::new(),
        messages: MessageStore::new(),
        time: Arc::new(SystemTimeProvider),
        options: EntryPointOptions {
            autorun: args.autorun,
            light_logging: false,
        },
    });

    let (outcome_tx, outcome_rx) = mpsc::channel();
    let poller = Arc::new(PcscPoller::new());
    let terminal_config = TerminalConfig {
        country_code: CountryCode(args.country),
        terminal_type: TerminalType(args.terminal_type),
        default_config: TlvMap::new(),
    };

    if let Err(err) = ep.init(
        Arc::new(CliListener {
            outcomes: Mutex::new(outcome_tx),
        }),
        Arc::new(ConsoleUi),
        poller.clone(),
        terminal_config,
        Arc::new(NoCertificates),
        Arc::new(PlainText),
    ) {
        eprintln!("Failed to initialize entry point: {}", err);
        return;
    }

    match ep.start_a(
        &apps,
        &configs,
        tx.amount,
        tx.other,
        tx.currency(),
        tx.transaction_type(),
    ) {
        Ok(Some(outcome)) => {
            println!("Outcome: {:?}", outcome.kind());
            return;
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("Failed to start transaction: {}", err);
            return;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while ep.state() != State::Ended {
        if Instant::now() >= deadline {
            println!("Timed out waiting for an outcome");
            ep.stop_signal();
            break;
        }
        match outcome_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => print_outcome(&event, format_mode),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    while let Ok(event) = outcome_rx.try_recv() {
        print_outcome(&event, format_mode);
    }

    let stats = ep.transceiver_stats();
    if !stats.is_empty() {
        println!("\n=== Card exchanges ===\n");
        for (i, s) in stats.iter().enumerate() {
            println!(
                "  {:>2}: C-APDU {:>3} bytes, R-APDU {:>3} bytes, {} ms",
                i + 1,
                s.command_len,
                s.response_len,
                s.took.as_millis()
            );
        }
        println!("  Total card time: {} ms", total_took(&stats).as_millis());
    }

    poller.exit();
    poller.join();
}

fn print_outcome(event: &OutcomeEvent, format_mode: FormatMode) {
    let outcome = &event.outcome;
    println!("\n=== Outcome: {:?} ===\n", outcome.kind());
    if let Some(aid) = &event.aid {
        println!("  Application: {}", aid);
    }
    if let Some(start) = outcome.start() {
        println!("  Restart at: {:?}", start);
    }
    if let Some(ui) = outcome.ui_request_on_outcome() {
        println!("  UI on outcome: {:?} ({:?}, hold {})", ui.message, ui.status, ui.hold_time);
    }
    if let Some(ui) = outcome.ui_request_on_restart() {
        println!("  UI on restart: {:?} ({:?})", ui.message, ui.status);
    }
    print_tlvs("Data record", outcome.data_record(), format_mode);
    print_tlvs("Discretionary data", outcome.discretionary_data(), format_mode);

    for imo in &event.intermediate {
        println!("  Intermediate outcome: {:?}", imo.kind());
    }
    for msg in &event.messages {
        println!("  Message: {:?} ({:?})", msg.message, msg.status);
    }
}

fn print_tlvs(title: &str, tlvs: Option<&[Tlv]>, format_mode: FormatMode) {
    let Some(tlvs) = tlvs else {
        return;
    };
    println!("  {}:", title);
    for tlv in tlvs {
        println!(
            "    [{}] {}: {}",
            tlv.tag(),
            tlv.tag().name(),
            format_value(tlv, format_mode)
        );
    }
}
