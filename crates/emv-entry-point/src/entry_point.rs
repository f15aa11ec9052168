//! Entry point state machine (EMV Book A/B, Start A to D)
//!
//! [`EntryPoint::start_a`] runs pre-processing on the caller's thread and
//! activates the field. Cards then arrive through [`TagListener`] on the
//! polling thread, which runs selection and the kernel synchronously.
//! [`EntryPoint::stop_signal`] may be called from any thread.
//!
//! A card detected while the machine is still busy with the previous one
//! is postponed in a single-slot channel and replayed as soon as the
//! machine is back in WAITING_FOR_TAG.

use crate::config::{CardAppConfiguration, CardApplication, EntryPointOptions, KernelType, TerminalConfig};
use crate::dol::prepare_terminal_data;
use crate::error::{EntryPointError, ProcessingError};
use crate::kernel::{CertificateData, EncDec, Kernel, KernelRegistry, SupportedKernel};
use crate::mastercard::{self, ErrorIndication, L1Error, L2Error};
use crate::outcome::{log_outcome, Outcome, OutcomeType, Start};
use crate::platform::{EntryPointListener, NfcManager, TagListener, TimeProvider, UiRequester};
use crate::preprocessing::{pre_process, PreprocessedApplication};
use crate::selection::{ApplicationSelector, SelectedApplication, SelectorFactory};
use crate::state::{State, Transition};
use crate::stores::{IntermediateOutcomeStore, MessageStore};
use crate::torn::{TornLogSession, TornTransactionLog, TornTransactionLogPersister};
use crate::transaction::{Currency, TransactionData, TransactionTimestamp, TransactionType};
use crate::ui::{ContactlessTransactionStatus, StandardMessage, UserInterfaceRequest};
use emv_card::{total_took, StatItem, Transceiver};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Hold time of the "try another card" message, in units of 100 ms
const TRY_ANOTHER_CARD_HOLD_TIME: u16 = 13;

/// Process-scoped parts of the entry point
pub struct EntryPointComponents {
    pub selector_factory: SelectorFactory,
    pub kernels: KernelRegistry,
    pub torn_persister: Arc<dyn TornTransactionLogPersister>,
    /// Handle shared with the kernels that keep a torn log
    pub torn_log: TornTransactionLog,
    /// Shared with kernels, cleared at `init`
    pub intermediate_outcomes: IntermediateOutcomeStore,
    /// Shared with kernels, cleared at `init`
    pub messages: MessageStore,
    pub time: Arc<dyn TimeProvider>,
    pub options: EntryPointOptions,
}

struct Collaborators {
    listener: Arc<dyn EntryPointListener>,
    ui: Arc<dyn UiRequester>,
    nfc: Arc<dyn NfcManager>,
    terminal_config: TerminalConfig,
    certificates: Arc<dyn CertificateData>,
    enc_dec: Arc<dyn EncDec>,
}

struct TransactionSession {
    data: TransactionData,
    applications: Vec<PreprocessedApplication>,
}

enum KernelStep {
    SelectNext,
    Done,
}

pub struct EntryPoint {
    selector_factory: SelectorFactory,
    kernels: KernelRegistry,
    torn_persister: Arc<dyn TornTransactionLogPersister>,
    torn_log: TornTransactionLog,
    intermediate_outcomes: IntermediateOutcomeStore,
    messages: MessageStore,
    time: Arc<dyn TimeProvider>,
    options: EntryPointOptions,

    state: Mutex<State>,
    stop_requested: AtomicBool,
    collaborators: RwLock<Option<Arc<Collaborators>>>,
    session: Mutex<Option<Arc<TransactionSession>>>,
    active_transceiver: Mutex<Option<Arc<dyn Transceiver>>>,
    active_kernel: Mutex<Option<Arc<dyn Kernel>>>,
    postponed_tx: SyncSender<Arc<dyn Transceiver>>,
    postponed_rx: Mutex<Receiver<Arc<dyn Transceiver>>>,
}

impl EntryPoint {
    pub fn new(components: EntryPointComponents) -> Arc<Self> {
        let (postponed_tx, postponed_rx) = mpsc::sync_channel(1);

        Arc::new(Self {
            selector_factory: components.selector_factory,
            kernels: components.kernels,
            torn_persister: components.torn_persister,
            torn_log: components.torn_log,
            intermediate_outcomes: components.intermediate_outcomes,
            messages: components.messages,
            time: components.time,
            options: components.options,
            state: Mutex::new(State::Idle),
            stop_requested: AtomicBool::new(false),
            collaborators: RwLock::new(None),
            session: Mutex::new(None),
            active_transceiver: Mutex::new(None),
            active_kernel: Mutex::new(None),
            postponed_tx,
            postponed_rx: Mutex::new(postponed_rx),
        })
    }

    /// Reset the entry point and register it with the NFC manager
    ///
    /// Clears the intermediate outcome and message histories. Allowed
    /// before the first transaction and whenever no card is being
    /// processed; polling is stopped first if it is running.
    pub fn init(
        self: &Arc<Self>,
        listener: Arc<dyn EntryPointListener>,
        ui: Arc<dyn UiRequester>,
        nfc: Arc<dyn NfcManager>,
        terminal_config: TerminalConfig,
        certificates: Arc<dyn CertificateData>,
        enc_dec: Arc<dyn EncDec>,
    ) -> Result<(), EntryPointError> {
        {
            let mut state = self.state.lock();
            let previous = self.collaborators.read().clone();
            if let Some(previous) = previous {
                let next = state.next(Transition::Reset)?;
                if *state == State::WaitingForTag {
                    previous.nfc.stop_polling();
                }
                *state = next;
            } else {
                *state = State::Idle;
            }
            *self.session.lock() = None;
        }

        self.intermediate_outcomes.clear();
        self.messages.clear();
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.active_transceiver.lock() = None;
        *self.active_kernel.lock() = None;
        while self.postponed_rx.lock().try_recv().is_ok() {}

        *self.collaborators.write() = Some(Arc::new(Collaborators {
            listener,
            ui,
            nfc: Arc::clone(&nfc),
            terminal_config,
            certificates,
            enc_dec,
        }));

        let weak: Weak<Self> = Arc::downgrade(self);
        let tag_listener: Weak<dyn TagListener> = weak;
        nfc.init(tag_listener);
        info!("Entry point initialized");
        Ok(())
    }

    /// Start A: pre-process the configured applications and activate the field
    ///
    /// Returns TRY ANOTHER INTERFACE when no application may be used
    /// contactless; otherwise `None` and the outcome is delivered to the
    /// listener once a card has been processed.
    pub fn start_a(
        &self,
        apps: &[CardApplication],
        app_configs: &[CardAppConfiguration],
        amount_authorized: i64,
        amount_other: i64,
        currency: Currency,
        transaction_type: TransactionType,
    ) -> Result<Option<Outcome>, EntryPointError> {
        let collab = self.collaborators()?;
        self.state.lock().next(Transition::StartPreProcessing)?;

        debug!("Start A - Pre-processing");
        let data = TransactionData::new(amount_authorized, amount_other, currency, transaction_type)?;
        let applications = pre_process(
            apps,
            app_configs,
            data.amount_authorized(),
            amount_other,
            currency,
            transaction_type,
        )?;

        self.transition(Transition::StartPreProcessing)?;
        self.stop_requested.store(false, Ordering::SeqCst);

        let all_not_allowed = applications
            .iter()
            .all(|a| a.indicators.is_contactless_application_not_allowed());
        *self.session.lock() = Some(Arc::new(TransactionSession { data, applications }));

        collab.listener.on_pre_processing_ended();

        if all_not_allowed {
            info!("Contactless not allowed for any application");
            self.transition(Transition::End)?;
            return Ok(Some(Outcome::try_another_interface(None)));
        }

        self.start_b(&collab)?;
        Ok(None)
    }

    /// Forward a STOP request to whatever is processing the card
    pub fn stop_signal(&self) {
        // held so the request cannot land after the card has been released
        let guard = self.state.lock();
        let state = *guard;
        debug!(?state, "STOP signal");

        match state {
            State::Selection => {
                self.stop_requested.store(true, Ordering::SeqCst);
                let transceiver = self.active_transceiver.lock().clone();
                if let Some(t) = transceiver {
                    t.close();
                }
            }
            State::KernelProcessing => {
                let kernel = self.active_kernel.lock().clone();
                match kernel {
                    Some(k) => {
                        if k.stop_signal() {
                            self.stop_requested.store(true, Ordering::SeqCst);
                        } else {
                            warn!("STOP signal ignored by the kernel");
                        }
                    }
                    // forwarded once the kernel is created
                    None => self.stop_requested.store(true, Ordering::SeqCst),
                }
            }
            _ => debug!(?state, "STOP signal not applicable"),
        }
    }

    /// Exchange statistics of the last card channel
    pub fn transceiver_stats(&self) -> Vec<StatItem> {
        self.active_transceiver
            .lock()
            .as_ref()
            .map(|t| t.stats())
            .unwrap_or_default()
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    fn collaborators(&self) -> Result<Arc<Collaborators>, EntryPointError> {
        self.collaborators.read().clone().ok_or(EntryPointError::NotInitialized)
    }

    fn transition(&self, transition: Transition) -> Result<State, EntryPointError> {
        let mut state = self.state.lock();
        let next = state.next(transition)?;
        debug!(from = ?*state, to = ?next, "State change");
        *state = next;
        Ok(next)
    }

    /// Start B: protocol activation
    fn start_b(&self, collab: &Collaborators) -> Result<(), EntryPointError> {
        self.transition(Transition::ActivateProtocol)?;
        debug!("Start B - protocol activation/waiting for tag");

        collab.ui.ui_request(&UserInterfaceRequest::new(
            StandardMessage::PresentCard,
            ContactlessTransactionStatus::ReadyToRead,
        ));
        collab.nfc.start_polling();
        collab.listener.on_started_polling();

        self.process_tags(None)
    }

    /// Run Start C for `first`, then for postponed tags while any is waiting
    fn process_tags(&self, first: Option<Arc<dyn Transceiver>>) -> Result<(), EntryPointError> {
        let mut next = first.or_else(|| self.take_postponed());
        while let Some(transceiver) = next {
            self.start_c(transceiver)?;
            next = self.take_postponed();
        }
        Ok(())
    }

    fn postpone(&self, transceiver: Arc<dyn Transceiver>) {
        let rx = self.postponed_rx.lock();
        // replace any earlier postponed tag
        while rx.try_recv().is_ok() {}
        if self.postponed_tx.try_send(transceiver).is_err() {
            error!("Cannot postpone tag");
        }
    }

    fn take_postponed(&self) -> Option<Arc<dyn Transceiver>> {
        let state = self.state.lock();
        if *state != State::WaitingForTag {
            return None;
        }
        match self.postponed_rx.lock().try_recv() {
            Ok(t) => {
                debug!("Replaying postponed tag");
                Some(t)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Start C: combination selection for a newly detected card
    fn start_c(&self, transceiver: Arc<dyn Transceiver>) -> Result<(), EntryPointError> {
        {
            let mut state = self.state.lock();
            match state.next(Transition::TagDetected) {
                Ok(next) => *state = next,
                Err(_) => {
                    warn!(state = ?*state, "Tag detected outside WAITING_FOR_TAG, postponed");
                    self.postpone(transceiver);
                    return Ok(());
                }
            }
        }
        debug!("Start C - Selection");

        let collab = self.collaborators()?;
        let session = self.session.lock().clone().ok_or(EntryPointError::NotInitialized)?;

        *self.active_transceiver.lock() = Some(Arc::clone(&transceiver));
        collab.listener.on_started_reading_card();

        let started = self.time.monotonic();
        let mut selector = (self.selector_factory)();
        match selector.init(&session.applications, transceiver.as_ref()) {
            Ok(None) => self.run_selection(&collab, &session, selector, transceiver.as_ref(), started),
            Ok(Some(outcome)) => {
                self.transition(Transition::End)?;
                collab.nfc.stop_polling();
                self.log(&outcome);
                self.notify_outcome(&collab, &outcome, None);
                Ok(())
            }
            Err(e) => self.on_selection_error(&collab, e),
        }
    }

    fn run_selection(
        &self,
        collab: &Collaborators,
        session: &TransactionSession,
        mut selector: Box<dyn ApplicationSelector>,
        transceiver: &dyn Transceiver,
        started: Instant,
    ) -> Result<(), EntryPointError> {
        loop {
            let selected = match selector.select(transceiver) {
                Ok(Some(selected)) => selected,
                Ok(None) => {
                    let ei = ErrorIndication::l2(L2Error::EmptyCandidateList, Some(StandardMessage::TryAnotherCard));
                    let outcome = try_another_card(ei);
                    self.transition(Transition::AwaitTag)?;
                    self.log(&outcome);
                    self.notify_outcome(collab, &outcome, None);
                    collab.listener.on_ended_reading_card();
                    return Ok(());
                }
                Err(e) => return self.on_selection_error(collab, e),
            };

            if self.stop_requested.load(Ordering::SeqCst) && selected.kernel_type() == KernelType::Mastercard {
                debug!("Stop signal processing");
                let outcome = mastercard::stop_outcome();
                self.transition(Transition::End)?;
                self.log(&outcome);
                self.notify_outcome(collab, &outcome, None);
                collab.listener.on_ended_reading_card();
                return Ok(());
            }

            match self.start_d(collab, session, transceiver, &selected, started)? {
                KernelStep::SelectNext => continue,
                KernelStep::Done => return Ok(()),
            }
        }
    }

    fn on_selection_error(&self, collab: &Collaborators, err: ProcessingError) -> Result<(), EntryPointError> {
        warn!(error = %err, "Error while selecting app");

        match err {
            ProcessingError::ConnectionLost if self.stop_requested.load(Ordering::SeqCst) => {
                debug!("Stop signal processing");
                collab.nfc.exit();
                self.transition(Transition::End)?;
                let outcome = mastercard::stop_outcome();
                self.log(&outcome);
                self.notify_outcome(collab, &outcome, None);
            }
            ProcessingError::ConnectionLost => {
                debug!("Switching back to waiting for tag");
                self.transition(Transition::AwaitTag)?;
                let ei = ErrorIndication::l1(L1Error::TimeOut, None);
                let outcome = Outcome::try_again(Some(vec![ei.as_tlv()]));
                self.log(&outcome);
                self.intermediate_outcomes.add(outcome);
                collab.listener.on_ended_reading_card();
            }
            ProcessingError::Io(_) => {
                debug!("Switching back to waiting for tag");
                self.transition(Transition::AwaitTag)?;
                collab.listener.on_ended_reading_card();
            }
            ProcessingError::MalformedData(_) => {
                let ei = ErrorIndication::l2(L2Error::ParsingError, Some(StandardMessage::TryAnotherCard));
                let outcome = try_another_card(ei);
                debug!("Switching back to waiting for tag");
                self.transition(Transition::AwaitTag)?;
                self.log(&outcome);
                self.notify_outcome(collab, &outcome, None);
                collab.listener.on_ended_reading_card();
            }
        }
        Ok(())
    }

    /// Start D: kernel activation
    fn start_d(
        &self,
        collab: &Collaborators,
        session: &TransactionSession,
        transceiver: &dyn Transceiver,
        selected: &SelectedApplication,
        started: Instant,
    ) -> Result<KernelStep, EntryPointError> {
        self.transition(Transition::ActivateKernel)?;
        debug!(aid = %selected.application_id(), kernel = ?selected.kernel_type(), "Start D - kernel activation");

        let (kind, kernel) = match self.kernels.create(selected.kernel_type()) {
            Ok(k) => k,
            Err(e) => {
                error!(error = %e, "Cannot activate kernel");
                collab.nfc.stop_polling();
                self.transition(Transition::End)?;
                return Err(e);
            }
        };

        let timestamp = TransactionTimestamp::new(self.time.wall_clock());
        let terminal_data = prepare_terminal_data(
            collab.terminal_config.country_code,
            collab.terminal_config.terminal_type,
            &session.data,
            &timestamp,
            &collab.terminal_config.default_config,
            &selected.candidate.preprocessed.app_config.tlv_config_data,
        );

        debug!(?kind, "++++++++ Will activate kernel ++++++++");
        let outcome = match terminal_data {
            Ok(terminal_data) => {
                self.process_with_kernel(collab, session, kind, &kernel, transceiver, &terminal_data, selected, &timestamp)
            }
            Err(e) => self.kernel_error_outcome(collab, kernel.as_ref(), e.into()),
        };
        *self.active_kernel.lock() = None;

        debug!(
            total_ms = self.time.monotonic().saturating_duration_since(started).as_millis() as u64,
            card_ms = total_took(&transceiver.stats()).as_millis() as u64,
            "Selection + kernel timing"
        );
        debug!("-------- Ended kernel processing --------");

        if !self.options.light_logging {
            for imo in self.intermediate_outcomes.get() {
                log_outcome(&imo);
            }
            for msg in self.messages.get() {
                debug!(message = ?msg.message, status = ?msg.status, hold_time = msg.hold_time, "(outc) Message");
            }
            log_outcome(&outcome);
        }

        if let Some(ei) = mastercard::error_indication(&outcome).filter(ErrorIndication::has_error) {
            debug!(?ei, "Error indication");
        }

        let autorun = self.options.autorun;
        match outcome.kind() {
            OutcomeType::SelectNext => {
                self.transition(Transition::SelectNext)?;
                return Ok(KernelStep::SelectNext);
            }
            OutcomeType::TryAgain => self.await_tag(collab)?,
            OutcomeType::Approved | OutcomeType::Declined | OutcomeType::OnlineRequest => {
                if autorun {
                    self.await_tag(collab)?;
                } else {
                    self.end(collab)?;
                }
            }
            OutcomeType::TryAnotherInterface => {
                // TODO: end here for Mastercard as well once its L2
                // certification scripts expect it
                if autorun || kind == SupportedKernel::Mastercard {
                    self.await_tag(collab)?;
                } else {
                    self.end(collab)?;
                }
            }
            OutcomeType::EndApplication => {
                if autorun {
                    self.await_tag(collab)?;
                    collab.nfc.start_polling();
                } else if outcome.start() == Some(Start::B) {
                    self.await_tag(collab)?;
                } else {
                    self.end(collab)?;
                }
            }
        }

        self.notify_outcome(collab, &outcome, Some(selected));
        Ok(KernelStep::Done)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_with_kernel(
        &self,
        collab: &Collaborators,
        session: &TransactionSession,
        kind: SupportedKernel,
        kernel: &Arc<dyn Kernel>,
        transceiver: &dyn Transceiver,
        terminal_data: &emv_common::TlvMap,
        selected: &SelectedApplication,
        timestamp: &TransactionTimestamp,
    ) -> Outcome {
        *self.active_kernel.lock() = Some(Arc::clone(kernel));

        // a stop that raced kernel creation is delivered late
        if self.stop_requested.load(Ordering::SeqCst) {
            kernel.stop_signal();
        }

        let _torn_log = kind
            .keeps_torn_log()
            .then(|| TornLogSession::open(self.torn_persister.as_ref(), &self.torn_log));

        kernel.init(Arc::clone(&collab.certificates), Arc::clone(&collab.enc_dec));

        match kernel.process(
            transceiver,
            terminal_data,
            collab.terminal_config.country_code,
            &session.data,
            selected,
            timestamp,
        ) {
            Ok(outcome) => {
                if let Some(dd) = outcome.discretionary_data() {
                    debug!(size = dd.len(), "Discretionary data");
                }
                outcome
            }
            Err(e) => self.kernel_error_outcome(collab, kernel.as_ref(), e),
        }
    }

    fn kernel_error_outcome(&self, collab: &Collaborators, kernel: &dyn Kernel, err: ProcessingError) -> Outcome {
        warn!(error = %err, "Kernel processing failed");

        match err {
            ProcessingError::ConnectionLost if self.stop_requested.load(Ordering::SeqCst) => {
                debug!("Stop signal processing");
                collab.nfc.exit();
                mastercard::stop_outcome()
            }
            ProcessingError::ConnectionLost => {
                debug!("Tag lost during kernel processing");
                let ei = ErrorIndication::l1(L1Error::TimeOut, Some(StandardMessage::PresentCardAgain));
                Outcome::builder(OutcomeType::EndApplication)
                    .start(Start::B)
                    .ui_request_on_restart(UserInterfaceRequest::new(
                        StandardMessage::PresentCardAgain,
                        ContactlessTransactionStatus::ReadyToRead,
                    ))
                    .removal_timeout(0)
                    .discretionary_data(mastercard::build_discretionary_data(
                        kernel.is_emv_mode(),
                        &kernel.tlv_database(),
                        &ei,
                    ))
                    .build()
            }
            ProcessingError::Io(_) => Outcome::try_again(None),
            ProcessingError::MalformedData(_) => {
                try_another_card(ErrorIndication::l2(L2Error::ParsingError, Some(StandardMessage::TryAnotherCard)))
            }
        }
    }

    fn await_tag(&self, collab: &Collaborators) -> Result<(), EntryPointError> {
        {
            let mut state = self.state.lock();
            let next = state.next(Transition::AwaitTag)?;
            debug!(from = ?*state, to = ?next, "State change");
            *state = next;
            // a STOP only applies to the card that was just processed
            self.stop_requested.store(false, Ordering::SeqCst);
        }
        collab.listener.on_ended_reading_card();
        Ok(())
    }

    fn end(&self, collab: &Collaborators) -> Result<(), EntryPointError> {
        collab.nfc.stop_polling();
        self.transition(Transition::End)?;
        Ok(())
    }

    fn log(&self, outcome: &Outcome) {
        if !self.options.light_logging {
            log_outcome(outcome);
        }
    }

    fn notify_outcome(&self, collab: &Collaborators, outcome: &Outcome, selected: Option<&SelectedApplication>) {
        collab.listener.on_outcome(
            outcome,
            &self.intermediate_outcomes.get(),
            &self.messages.get(),
            selected,
        );
    }
}

impl TagListener for EntryPoint {
    fn on_nfc_tag(&self, transceiver: Arc<dyn Transceiver>) -> Result<(), EntryPointError> {
        self.collaborators()?;
        self.process_tags(Some(transceiver))
    }
}

/// END APPLICATION asking for another card, with `ei` as discretionary data
fn try_another_card(ei: ErrorIndication) -> Outcome {
    Outcome::builder(OutcomeType::EndApplication)
        .ui_request_on_outcome(
            UserInterfaceRequest::new(StandardMessage::TryAnotherCard, ContactlessTransactionStatus::NotReady)
                .hold_time(TRY_ANOTHER_CARD_HOLD_TIME),
        )
        .discretionary_data(vec![ei.as_tlv()])
        .build()
}
