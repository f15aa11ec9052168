//! Terminal configuration value objects

use crate::error::ConfigError;
use crate::transaction::{CountryCode, TerminalType, TransactionType};
use emv_common::{Tlv, TlvMap};
use std::collections::HashSet;

/// Kernel identifiers from EMV Book B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelType {
    /// Kernel 1, shared by some JCB and Visa cards
    JcbVisa,
    Mastercard,
    Visa,
    AmericanExpress,
    Jcb,
    Discover,
    UnionPay,
}

impl KernelType {
    pub fn id(&self) -> u8 {
        match self {
            KernelType::JcbVisa => 1,
            KernelType::Mastercard => 2,
            KernelType::Visa => 3,
            KernelType::AmericanExpress => 4,
            KernelType::Jcb => 5,
            KernelType::Discover => 6,
            KernelType::UnionPay => 7,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(KernelType::JcbVisa),
            2 => Some(KernelType::Mastercard),
            3 => Some(KernelType::Visa),
            4 => Some(KernelType::AmericanExpress),
            5 => Some(KernelType::Jcb),
            6 => Some(KernelType::Discover),
            7 => Some(KernelType::UnionPay),
            _ => None,
        }
    }
}

/// A terminal-configured application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardApplication {
    /// AID as upper-case hex
    pub application_id: String,
    pub kernel_type: KernelType,
}

impl CardApplication {
    pub fn new(application_id: impl Into<String>, kernel_type: KernelType) -> Self {
        Self {
            application_id: application_id.into(),
            kernel_type,
        }
    }
}

/// Terminal parameters of one application for one transaction type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardAppConfiguration {
    pub application_id: String,
    pub transaction_type: TransactionType,
    pub tlv_config_data: Vec<Tlv>,
}

impl CardAppConfiguration {
    pub fn new(
        application_id: impl Into<String>,
        transaction_type: TransactionType,
        tlv_config_data: Vec<Tlv>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            transaction_type,
            tlv_config_data,
        }
    }
}

/// Terminal-wide parameters handed to every kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    pub country_code: CountryCode,
    pub terminal_type: TerminalType,
    /// Defaults that application configuration data overrides
    pub default_config: TlvMap,
}

/// Applications and their configurations, validated for consistency
#[derive(Debug, Clone)]
pub struct PosConfiguration {
    supported_transaction_types: Vec<TransactionType>,
    card_applications: Vec<CardApplication>,
    card_app_configurations: Vec<CardAppConfiguration>,
}

impl PosConfiguration {
    pub fn new(
        supported_transaction_types: Vec<TransactionType>,
        card_applications: Vec<CardApplication>,
        card_app_configurations: Vec<CardAppConfiguration>,
    ) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        for app in &card_applications {
            if !ids.insert(app.application_id.as_str()) {
                return Err(ConfigError::DuplicateApplication(app.application_id.clone()));
            }
        }

        for cac in &card_app_configurations {
            if !supported_transaction_types.contains(&cac.transaction_type) {
                return Err(ConfigError::UnsupportedTransactionType(cac.transaction_type));
            }
            if !ids.contains(cac.application_id.as_str()) {
                return Err(ConfigError::UnknownApplication(cac.application_id.clone()));
            }
        }

        Ok(Self {
            supported_transaction_types,
            card_applications,
            card_app_configurations,
        })
    }

    pub fn supported_transaction_types(&self) -> &[TransactionType] {
        &self.supported_transaction_types
    }

    pub fn card_applications(&self) -> &[CardApplication] {
        &self.card_applications
    }

    pub fn card_app_configurations(&self) -> &[CardAppConfiguration] {
        &self.card_app_configurations
    }

    /// Configurations to pre-process for one transaction type
    pub fn app_configurations(
        &self,
        transaction_type: TransactionType,
    ) -> Result<Vec<CardAppConfiguration>, ConfigError> {
        if !self.supported_transaction_types.contains(&transaction_type) {
            return Err(ConfigError::UnsupportedTransactionType(transaction_type));
        }
        Ok(self
            .card_app_configurations
            .iter()
            .filter(|c| c.transaction_type == transaction_type)
            .cloned()
            .collect())
    }
}

/// Behaviour switches of the entry point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPointOptions {
    /// Keep polling after final outcomes (unattended test benches)
    pub autorun: bool,
    /// Skip outcome, message and intermediate-outcome dumps
    pub light_logging: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MC: &str = "A0000000041010";
    const VISA: &str = "A0000000031010";

    fn apps() -> Vec<CardApplication> {
        vec![
            CardApplication::new(MC, KernelType::Mastercard),
            CardApplication::new(VISA, KernelType::Visa),
        ]
    }

    #[test]
    fn test_valid_configuration() {
        let pos = PosConfiguration::new(
            vec![TransactionType::Purchase, TransactionType::Refund],
            apps(),
            vec![
                CardAppConfiguration::new(MC, TransactionType::Purchase, vec![]),
                CardAppConfiguration::new(VISA, TransactionType::Purchase, vec![]),
                CardAppConfiguration::new(MC, TransactionType::Refund, vec![]),
            ],
        )
        .unwrap();

        assert_eq!(pos.app_configurations(TransactionType::Purchase).unwrap().len(), 2);
        assert_eq!(pos.app_configurations(TransactionType::Refund).unwrap().len(), 1);
        assert!(matches!(
            pos.app_configurations(TransactionType::Cash),
            Err(ConfigError::UnsupportedTransactionType(TransactionType::Cash))
        ));
    }

    #[test]
    fn test_duplicate_application_rejected() {
        let mut list = apps();
        list.push(CardApplication::new(MC, KernelType::Mastercard));
        let result = PosConfiguration::new(vec![TransactionType::Purchase], list, vec![]);
        assert!(matches!(result, Err(ConfigError::DuplicateApplication(id)) if id == MC));
    }

    #[test]
    fn test_unknown_application_rejected() {
        let result = PosConfiguration::new(
            vec![TransactionType::Purchase],
            apps(),
            vec![CardAppConfiguration::new("A0000000251010", TransactionType::Purchase, vec![])],
        );
        assert!(matches!(result, Err(ConfigError::UnknownApplication(_))));
    }

    #[test]
    fn test_kernel_ids() {
        assert_eq!(KernelType::Mastercard.id(), 2);
        assert_eq!(KernelType::from_id(3), Some(KernelType::Visa));
        assert_eq!(KernelType::from_id(9), None);
    }
}
