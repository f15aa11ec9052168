//! EMV Entry Point - Contactless transaction orchestration
//!
//! This crate drives a contactless transaction through pre-processing
//! (Start A), protocol activation (Start B), combination selection
//! (Start C) and kernel activation (Start D), and turns kernel outcomes
//! into the terminal's next action.
//!
//! Selection, kernels, the NFC field and persistence are supplied by the
//! terminal through the traits in [`selection`], [`kernel`], [`platform`]
//! and [`torn`].

pub mod config;
pub mod dol;
pub mod entry_point;
pub mod error;
pub mod kernel;
pub mod mastercard;
pub mod outcome;
pub mod platform;
pub mod preprocessing;
pub mod selection;
pub mod state;
pub mod stores;
pub mod torn;
pub mod transaction;
pub mod ttq;
pub mod ui;

pub use config::{
    CardAppConfiguration, CardApplication, EntryPointOptions, KernelType, PosConfiguration, TerminalConfig,
};
pub use entry_point::{EntryPoint, EntryPointComponents};
pub use error::{ConfigError, EntryPointError, ProcessingError};
pub use kernel::{CertificateData, EncDec, Kernel, KernelFactory, KernelRegistry, SupportedKernel};
pub use outcome::{Cvm, Outcome, OutcomeBuilder, OutcomeType, Start};
pub use platform::{EntryPointListener, NfcManager, SystemTimeProvider, TagListener, TimeProvider, UiRequester};
pub use preprocessing::{pre_process, PreProcessingIndicators, PreprocessedApplication};
pub use selection::{ApplicationSelector, Candidate, SelectedApplication, SelectorFactory};
pub use state::{State, Transition};
pub use stores::{IntermediateOutcomeStore, MessageStore};
pub use torn::{
    InMemoryTornTransactionLogPersister, TornTransactionLog, TornTransactionLogPersister, TornTransactionLogRecord,
};
pub use transaction::{Currency, CountryCode, TerminalType, TransactionData, TransactionTimestamp, TransactionType};
pub use ttq::{Ttq, TtqBuilder, TtqConfiguration};
pub use ui::{ContactlessTransactionStatus, StandardMessage, UserInterfaceRequest};
