//! Collaborators supplied by the terminal

use crate::error::EntryPointError;
use crate::outcome::Outcome;
use crate::selection::SelectedApplication;
use crate::ui::UserInterfaceRequest;
use chrono::{DateTime, Utc};
use emv_card::Transceiver;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Receives cards detected by the polling loop
pub trait TagListener: Send + Sync {
    fn on_nfc_tag(&self, transceiver: Arc<dyn Transceiver>) -> Result<(), EntryPointError>;
}

/// Contactless field control
///
/// Tags are delivered to the registered listener on the polling thread.
pub trait NfcManager: Send + Sync {
    fn init(&self, listener: Weak<dyn TagListener>);

    fn start_polling(&self);

    fn stop_polling(&self);

    /// Power the field down and leave polling for good
    fn exit(&self);
}

/// Terminal events
pub trait EntryPointListener: Send + Sync {
    fn on_started_polling(&self);

    fn on_started_reading_card(&self);

    fn on_ended_reading_card(&self);

    fn on_pre_processing_ended(&self);

    fn on_outcome(
        &self,
        outcome: &Outcome,
        intermediate_outcomes: &[Outcome],
        messages: &[UserInterfaceRequest],
        selected: Option<&SelectedApplication>,
    );
}

/// Displays entry point UI requests
pub trait UiRequester: Send + Sync {
    fn ui_request(&self, request: &UserInterfaceRequest);
}

pub trait TimeProvider: Send + Sync {
    fn wall_clock(&self) -> DateTime<Utc>;

    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}
