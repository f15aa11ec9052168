//! Combination selection capability (Start C)
//!
//! Reading the PPSE and building the candidate list happen in an
//! [`ApplicationSelector`] supplied by the terminal.

use crate::config::KernelType;
use crate::error::ProcessingError;
use crate::outcome::Outcome;
use crate::preprocessing::PreprocessedApplication;
use emv_card::Transceiver;
use emv_common::TlvMap;

/// An application offered by the card, paired with the kernel that runs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub preprocessed: PreprocessedApplication,
    /// ADF name as returned by the card
    pub aid: Vec<u8>,
    pub final_kernel_type: KernelType,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedApplication {
    pub candidate: Candidate,
    /// FCI returned by the final SELECT
    pub fci: TlvMap,
}

impl SelectedApplication {
    pub fn kernel_type(&self) -> KernelType {
        self.candidate.final_kernel_type
    }

    pub fn application_id(&self) -> &str {
        self.candidate.preprocessed.application_id()
    }
}

/// Selection protocol for one transaction
pub trait ApplicationSelector: Send {
    /// Build the candidate list
    ///
    /// Returns an outcome when the protocol already decided the
    /// transaction is over.
    fn init(
        &mut self,
        apps: &[PreprocessedApplication],
        transceiver: &dyn Transceiver,
    ) -> Result<Option<Outcome>, ProcessingError>;

    /// Select the next candidate, `None` once the list is exhausted
    fn select(&mut self, transceiver: &dyn Transceiver) -> Result<Option<SelectedApplication>, ProcessingError>;
}

/// Produces a fresh selector for every card presented
pub type SelectorFactory = Box<dyn Fn() -> Box<dyn ApplicationSelector> + Send + Sync>;
