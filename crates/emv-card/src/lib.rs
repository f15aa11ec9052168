//! EMV Card - Card channel used by the contactless entry point
//!
//! This crate provides the [`Transceiver`] capability through which
//! selection and kernels exchange APDUs with a card, the APDU model, and
//! (with the `pcsc` feature) a transceiver backed by a PC/SC reader.

pub mod apdu;
pub mod transceiver;

#[cfg(feature = "pcsc")]
pub mod pcsc_transceiver;
#[cfg(feature = "pcsc")]
pub mod reader;

pub use apdu::{ApduCommand, ApduResponse, StatusWord};
pub use transceiver::{total_took, StatItem, StatsRecorder, Transceiver, TransceiverError};

#[cfg(feature = "pcsc")]
pub use pcsc_transceiver::PcscTransceiver;
#[cfg(feature = "pcsc")]
pub use reader::CardReader;
