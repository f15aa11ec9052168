//! Kernel capability set (Start D)

use crate::config::KernelType;
use crate::error::{EntryPointError, ProcessingError};
use crate::outcome::Outcome;
use crate::selection::SelectedApplication;
use crate::transaction::{CountryCode, TransactionData, TransactionTimestamp};
use emv_card::Transceiver;
use emv_common::TlvMap;
use std::sync::Arc;

/// Certification authority public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPublicKey {
    pub rid: [u8; 5],
    pub index: u8,
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// Trust data: CA keys and the certificate revocation list
pub trait CertificateData: Send + Sync {
    fn ca_public_key(&self, rid: &[u8], index: u8) -> Option<CaPublicKey>;

    fn is_revoked(&self, rid: &[u8], index: u8, serial: &[u8]) -> bool;
}

/// Encryption context for sensitive data leaving the kernel
pub trait EncDec: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Vec<u8>;

    fn decrypt(&self, data: &[u8]) -> Vec<u8>;
}

/// A per-scheme contactless kernel
///
/// `stop_signal` is called from another thread while `process` runs.
pub trait Kernel: Send + Sync {
    fn init(&self, certificates: Arc<dyn CertificateData>, enc_dec: Arc<dyn EncDec>);

    fn process(
        &self,
        transceiver: &dyn Transceiver,
        terminal_data: &TlvMap,
        country_code: CountryCode,
        transaction: &TransactionData,
        selected: &SelectedApplication,
        timestamp: &TransactionTimestamp,
    ) -> Result<Outcome, ProcessingError>;

    /// Ask the kernel to stop; `false` when it refuses
    fn stop_signal(&self) -> bool;

    fn is_emv_mode(&self) -> bool;

    /// Snapshot of the kernel's TLV database
    fn tlv_database(&self) -> TlvMap;
}

/// Kernels the entry point can activate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedKernel {
    Mastercard,
    Visa,
}

impl SupportedKernel {
    /// Only the Mastercard kernel keeps a torn transaction log
    pub fn keeps_torn_log(&self) -> bool {
        matches!(self, SupportedKernel::Mastercard)
    }
}

impl TryFrom<KernelType> for SupportedKernel {
    type Error = EntryPointError;

    fn try_from(kernel_type: KernelType) -> Result<Self, Self::Error> {
        match kernel_type {
            KernelType::Mastercard => Ok(SupportedKernel::Mastercard),
            KernelType::Visa => Ok(SupportedKernel::Visa),
            other => Err(EntryPointError::UnsupportedKernel(other)),
        }
    }
}

/// Produces a fresh kernel for every activation
pub type KernelFactory = Box<dyn Fn() -> Arc<dyn Kernel> + Send + Sync>;

/// Kernel factories by scheme
#[derive(Default)]
pub struct KernelRegistry {
    mastercard: Option<KernelFactory>,
    visa: Option<KernelFactory>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mastercard(mut self, factory: KernelFactory) -> Self {
        self.mastercard = Some(factory);
        self
    }

    pub fn with_visa(mut self, factory: KernelFactory) -> Self {
        self.visa = Some(factory);
        self
    }

    /// Resolve the kernel for a candidate's kernel type
    pub fn create(&self, kernel_type: KernelType) -> Result<(SupportedKernel, Arc<dyn Kernel>), EntryPointError> {
        let supported = SupportedKernel::try_from(kernel_type)?;
        let factory = match supported {
            SupportedKernel::Mastercard => self.mastercard.as_ref(),
            SupportedKernel::Visa => self.visa.as_ref(),
        };
        factory
            .map(|f| (supported, f()))
            .ok_or(EntryPointError::UnsupportedKernel(kernel_type))
    }
}
