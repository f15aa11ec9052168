//! Error types for the entry point

use crate::config::KernelType;
use crate::state::{State, Transition};
use crate::transaction::TransactionType;
use emv_card::TransceiverError;
use emv_common::TlvError;
use thiserror::Error;

/// Errors returned to the terminal application
///
/// None of these are recovered by the entry point: they signal misuse by
/// the caller or a scheme the terminal cannot process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryPointError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entry point not initialized, call init() first")]
    NotInitialized,

    #[error("{transition:?} not allowed in state {state:?}")]
    IllegalState { state: State, transition: Transition },

    #[error("Kernel not supported: {0:?}")]
    UnsupportedKernel(KernelType),
}

/// Failures raised by selection and kernels while talking to the card
///
/// The entry point recovers from all of them locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// Card removed or channel closed
    #[error("Connection to the card lost")]
    ConnectionLost,

    #[error("Transport error: {0}")]
    Io(String),

    /// TLV or EMV parsing failure
    #[error("Malformed card data: {0}")]
    MalformedData(String),
}

impl From<TransceiverError> for ProcessingError {
    fn from(err: TransceiverError) -> Self {
        match err {
            TransceiverError::ConnectionLost => ProcessingError::ConnectionLost,
            TransceiverError::Io(msg) => ProcessingError::Io(msg),
            TransceiverError::ResponseTooShort(_) => ProcessingError::MalformedData(err.to_string()),
        }
    }
}

impl From<TlvError> for ProcessingError {
    fn from(err: TlvError) -> Self {
        ProcessingError::MalformedData(err.to_string())
    }
}

/// Terminal configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Duplicate card application: {0}")]
    DuplicateApplication(String),

    #[error("Configuration references unknown card application: {0}")]
    UnknownApplication(String),

    #[error("Transaction type not supported: {0:?}")]
    UnsupportedTransactionType(TransactionType),

    #[error("Malformed configuration value: {0}")]
    MalformedValue(#[from] TlvError),

    #[error("Malformed TTQ configuration: {0}")]
    MalformedTtqConfiguration(#[from] serde_json::Error),
}
