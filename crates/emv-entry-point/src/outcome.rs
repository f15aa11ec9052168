//! Outcome model (EMV Book A, 6.2)
//!
//! An [`Outcome`] tells the terminal what to do next. It is produced by
//! the entry point itself or by a kernel and never changes once built;
//! use [`OutcomeBuilder`] to assemble one incrementally.

use crate::ui::UserInterfaceRequest;
use emv_common::{EmvTag, Tlv};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeType {
    Approved,
    Declined,
    OnlineRequest,
    EndApplication,
    SelectNext,
    TryAnotherInterface,
    TryAgain,
}

/// Entry point stage at which a restarted transaction resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Start {
    A,
    /// Protocol activation
    B,
    C,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cvm {
    NoCvm,
    ObtainSignature,
    OnlinePin,
    ConfirmationCodeVerified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    kind: OutcomeType,
    start: Option<Start>,
    online_response_data: bool,
    cvm: Option<Cvm>,
    ui_request_on_outcome: Option<UserInterfaceRequest>,
    ui_request_on_restart: Option<UserInterfaceRequest>,
    data_record: Option<Vec<Tlv>>,
    discretionary_data: Option<Vec<Tlv>>,
    receipt: bool,
    field_off_request: Option<u16>,
    removal_timeout: u16,
}

impl Outcome {
    pub fn builder(kind: OutcomeType) -> OutcomeBuilder {
        OutcomeBuilder::new(kind)
    }

    pub fn try_another_interface(discretionary_data: Option<Vec<Tlv>>) -> Self {
        let mut b = OutcomeBuilder::new(OutcomeType::TryAnotherInterface);
        if let Some(dd) = discretionary_data {
            b = b.discretionary_data(dd);
        }
        b.build()
    }

    pub fn try_again(discretionary_data: Option<Vec<Tlv>>) -> Self {
        let mut b = OutcomeBuilder::new(OutcomeType::TryAgain).start(Start::B);
        if let Some(dd) = discretionary_data {
            b = b.discretionary_data(dd);
        }
        b.build()
    }

    pub fn kind(&self) -> OutcomeType {
        self.kind
    }

    pub fn start(&self) -> Option<Start> {
        self.start
    }

    pub fn is_online_response_data(&self) -> bool {
        self.online_response_data
    }

    pub fn cvm(&self) -> Option<Cvm> {
        self.cvm
    }

    pub fn ui_request_on_outcome(&self) -> Option<&UserInterfaceRequest> {
        self.ui_request_on_outcome.as_ref()
    }

    pub fn ui_request_on_restart(&self) -> Option<&UserInterfaceRequest> {
        self.ui_request_on_restart.as_ref()
    }

    pub fn data_record(&self) -> Option<&[Tlv]> {
        self.data_record.as_deref()
    }

    pub fn discretionary_data(&self) -> Option<&[Tlv]> {
        self.discretionary_data.as_deref()
    }

    pub fn is_discretionary_data_present(&self) -> bool {
        self.discretionary_data.is_some()
    }

    /// Value of one discretionary data object
    pub fn discretionary_value(&self, tag: EmvTag) -> Option<&[u8]> {
        self.discretionary_data()?
            .iter()
            .find(|t| t.tag() == tag)
            .map(Tlv::value)
    }

    pub fn is_receipt(&self) -> bool {
        self.receipt
    }

    /// Field off hold time in units of 100 ms
    pub fn field_off_request(&self) -> Option<u16> {
        self.field_off_request
    }

    pub fn removal_timeout(&self) -> u16 {
        self.removal_timeout
    }
}

/// Incremental construction of an [`Outcome`]
#[derive(Debug, Clone)]
pub struct OutcomeBuilder {
    outcome: Outcome,
}

impl OutcomeBuilder {
    pub fn new(kind: OutcomeType) -> Self {
        Self {
            outcome: Outcome {
                kind,
                start: None,
                online_response_data: false,
                cvm: None,
                ui_request_on_outcome: None,
                ui_request_on_restart: None,
                data_record: None,
                discretionary_data: None,
                receipt: false,
                field_off_request: None,
                removal_timeout: 0,
            },
        }
    }

    pub fn start(mut self, start: Start) -> Self {
        self.outcome.start = Some(start);
        self
    }

    pub fn online_response_data(mut self, present: bool) -> Self {
        self.outcome.online_response_data = present;
        self
    }

    pub fn cvm(mut self, cvm: Cvm) -> Self {
        self.outcome.cvm = Some(cvm);
        self
    }

    pub fn ui_request_on_outcome(mut self, request: UserInterfaceRequest) -> Self {
        self.outcome.ui_request_on_outcome = Some(request);
        self
    }

    pub fn ui_request_on_restart(mut self, request: UserInterfaceRequest) -> Self {
        self.outcome.ui_request_on_restart = Some(request);
        self
    }

    pub fn data_record(mut self, data_record: Vec<Tlv>) -> Self {
        self.outcome.data_record = Some(data_record);
        self
    }

    pub fn discretionary_data(mut self, discretionary_data: Vec<Tlv>) -> Self {
        self.outcome.discretionary_data = Some(discretionary_data);
        self
    }

    pub fn receipt(mut self, receipt: bool) -> Self {
        self.outcome.receipt = receipt;
        self
    }

    pub fn field_off_request(mut self, hold_time: u16) -> Self {
        self.outcome.field_off_request = Some(hold_time);
        self
    }

    pub fn removal_timeout(mut self, removal_timeout: u16) -> Self {
        self.outcome.removal_timeout = removal_timeout;
        self
    }

    pub fn build(self) -> Outcome {
        self.outcome
    }
}

/// Dump an outcome parameter set at debug level
pub fn log_outcome(outcome: &Outcome) {
    debug!(
        kind = ?outcome.kind,
        start = ?outcome.start,
        cvm = ?outcome.cvm,
        online_response_data = outcome.online_response_data,
        receipt = outcome.receipt,
        field_off_request = ?outcome.field_off_request,
        removal_timeout = outcome.removal_timeout,
        "(outc) Outcome"
    );
    if let Some(ui) = &outcome.ui_request_on_outcome {
        debug!(message = ?ui.message, status = ?ui.status, hold_time = ui.hold_time, "(outc) UI request on outcome");
    }
    if let Some(ui) = &outcome.ui_request_on_restart {
        debug!(message = ?ui.message, status = ?ui.status, hold_time = ui.hold_time, "(outc) UI request on restart");
    }
    for tlv in outcome.discretionary_data.iter().flatten() {
        debug!(tag = %tlv.tag(), value = %hex::encode_upper(tlv.value()), "(outc) Discretionary data");
    }
    if let Some(record) = &outcome.data_record {
        debug!(objects = record.len(), "(outc) Data record present");
    }
}
