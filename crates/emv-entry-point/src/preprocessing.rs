//! Pre-processing (EMV Book B, 3.1.1)
//!
//! Computes, for every configured application, the indicators that gate
//! the rest of the transaction and the TTQ sent to the card. Pure: no
//! state and no I/O.

use crate::config::{CardAppConfiguration, CardApplication, KernelType};
use crate::error::{ConfigError, EntryPointError};
use crate::mastercard::is_mastercard_aid;
use crate::transaction::{check_amounts, Currency, TransactionType};
use crate::ttq::{Ttq, TtqBuilder, TtqConfiguration};
use emv_common::{tags, EmvTag, Tlv, TlvMap};
use std::collections::HashMap;
use tracing::{debug, error};

/// Per-application eligibility flags
///
/// Flags are only ever raised while one application is pre-processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreProcessingIndicators {
    contactless_application_not_allowed: bool,
    zero_amount: bool,
    status_check_requested: bool,
    reader_cvm_limit_exceeded: bool,
    reader_contactless_floor_limit_exceeded: bool,
    ttq: Option<Ttq>,
}

impl PreProcessingIndicators {
    pub fn is_contactless_application_not_allowed(&self) -> bool {
        self.contactless_application_not_allowed
    }

    pub fn is_zero_amount(&self) -> bool {
        self.zero_amount
    }

    pub fn is_status_check_requested(&self) -> bool {
        self.status_check_requested
    }

    pub fn is_reader_cvm_limit_exceeded(&self) -> bool {
        self.reader_cvm_limit_exceeded
    }

    pub fn is_reader_contactless_floor_limit_exceeded(&self) -> bool {
        self.reader_contactless_floor_limit_exceeded
    }

    pub fn ttq(&self) -> Option<Ttq> {
        self.ttq
    }

    fn raise_contactless_application_not_allowed(&mut self) {
        self.contactless_application_not_allowed = true;
    }

    fn raise_zero_amount(&mut self) {
        self.zero_amount = true;
    }

    fn raise_status_check_requested(&mut self) {
        self.status_check_requested = true;
    }

    fn raise_reader_cvm_limit_exceeded(&mut self) {
        self.reader_cvm_limit_exceeded = true;
    }

    fn raise_reader_contactless_floor_limit_exceeded(&mut self) {
        self.reader_contactless_floor_limit_exceeded = true;
    }
}

/// Entry point parameters carried in an application's TLV configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointConfiguration {
    pub status_check_enabled: bool,
    pub zero_amount_allowed: bool,
    /// Larger of the limits with and without on-device CVM
    pub reader_contactless_transaction_limit: Option<u64>,
    pub reader_contactless_floor_limit: Option<u64>,
    pub terminal_floor_limit: Option<u64>,
    pub reader_cvm_required_limit: Option<u64>,
    pub extended_selection_supported: bool,
    pub ttq: Option<TtqConfiguration>,
}

impl EntryPointConfiguration {
    pub fn extract(tlv_config_data: &[Tlv]) -> Result<Self, ConfigError> {
        let map: TlvMap = tlv_config_data.iter().cloned().collect();

        let flag = |tag: EmvTag| map.get_non_empty(tag).is_some_and(Tlv::value_as_flag);
        let limit = |tag: EmvTag| -> Result<Option<u64>, ConfigError> {
            match map.get_non_empty(tag) {
                Some(tlv) => Ok(Some(tlv.value_as_bcd()?)),
                None => Ok(None),
            }
        };

        let limit_no_od_cvm = limit(tags::READER_CONTACTLESS_TRANSACTION_LIMIT_NO_OD_CVM)?;
        let limit_od_cvm = limit(tags::READER_CONTACTLESS_TRANSACTION_LIMIT_OD_CVM)?;
        let reader_contactless_transaction_limit = match (limit_no_od_cvm, limit_od_cvm) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let ttq = match map.get_non_empty(tags::TTQ_CONFIGURATION) {
            Some(tlv) => {
                let json = tlv.value_as_string()?;
                Some(TtqConfiguration::from_json(&json).inspect_err(|_| error!(json = %json, "TTQ configuration"))?)
            }
            None => None,
        };

        Ok(Self {
            status_check_enabled: flag(tags::STATUS_CHECK_ENABLED),
            zero_amount_allowed: flag(tags::ZERO_AMOUNT_ALLOWED),
            reader_contactless_transaction_limit,
            reader_contactless_floor_limit: limit(tags::READER_CONTACTLESS_FLOOR_LIMIT)?,
            terminal_floor_limit: limit(tags::TERMINAL_FLOOR_LIMIT)?,
            reader_cvm_required_limit: limit(tags::READER_CVM_REQUIRED_LIMIT)?,
            extended_selection_supported: flag(tags::EXTENDED_SELECTION_SUPPORTED),
            ttq,
        })
    }
}

/// Pre-processing result for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessedApplication {
    pub app_config: CardAppConfiguration,
    pub indicators: PreProcessingIndicators,
    pub kernel_type: KernelType,
}

impl PreprocessedApplication {
    pub fn ttq(&self) -> Option<Ttq> {
        self.indicators.ttq()
    }

    pub fn application_id(&self) -> &str {
        &self.app_config.application_id
    }
}

/// Run pre-processing over every application configuration
///
/// Argument errors reject the whole call. An application whose
/// configuration cannot be extracted is left out of the result.
pub fn pre_process(
    apps: &[CardApplication],
    app_configs: &[CardAppConfiguration],
    amount_authorized: i64,
    amount_other: i64,
    currency: Currency,
    transaction_type: TransactionType,
) -> Result<Vec<PreprocessedApplication>, EntryPointError> {
    check_amounts(amount_authorized, amount_other, transaction_type)?;

    let kernels: HashMap<&str, KernelType> = apps
        .iter()
        .map(|a| (a.application_id.as_str(), a.kernel_type))
        .collect();

    for cac in app_configs {
        if cac.transaction_type != transaction_type {
            return Err(EntryPointError::InvalidArgument(format!(
                "CardAppConfiguration transactionType is {} requested pre-processing is for {}",
                cac.transaction_type, transaction_type
            )));
        }
        if !kernels.contains_key(cac.application_id.as_str()) {
            return Err(EntryPointError::InvalidArgument(format!(
                "No card application for configuration {}",
                cac.application_id
            )));
        }
    }

    let mut ret = Vec::with_capacity(app_configs.len());
    for cac in app_configs {
        let epc = match EntryPointConfiguration::extract(&cac.tlv_config_data) {
            Ok(epc) => epc,
            Err(e) => {
                error!(aid = %cac.application_id, "Cannot extract entry point configuration: {}", e);
                continue;
            }
        };

        let indicators = derive_indicators(
            &epc,
            is_mastercard_aid(&cac.application_id),
            amount_authorized,
            currency,
        );
        debug!(aid = %cac.application_id, ?indicators, "Pre-processed");

        ret.push(PreprocessedApplication {
            app_config: cac.clone(),
            indicators,
            kernel_type: kernels[cac.application_id.as_str()],
        });
    }

    Ok(ret)
}

fn derive_indicators(
    epc: &EntryPointConfiguration,
    is_mastercard: bool,
    amount_authorized: i64,
    currency: Currency,
) -> PreProcessingIndicators {
    let mut ind = PreProcessingIndicators::default();
    let mut ttq = epc.ttq.as_ref().map(TtqBuilder::from_config);
    // amount_authorized has been checked non-negative
    let amount = amount_authorized as u64;

    if epc.status_check_enabled && amount_authorized == currency.single_unit() {
        ind.raise_status_check_requested();
    }

    if amount == 0 {
        if epc.zero_amount_allowed {
            ind.raise_zero_amount();
        } else {
            ind.raise_contactless_application_not_allowed();
        }
    }

    // Mastercard applies its own limits inside the kernel
    if !is_mastercard {
        if epc.reader_contactless_transaction_limit.is_some_and(|l| amount >= l) {
            ind.raise_contactless_application_not_allowed();
        }

        match epc.reader_contactless_floor_limit {
            Some(l) if amount > l => ind.raise_reader_contactless_floor_limit_exceeded(),
            Some(_) => {}
            None => {
                if epc.terminal_floor_limit.is_some_and(|l| amount > l) {
                    ind.raise_reader_contactless_floor_limit_exceeded();
                }
            }
        }
    }

    if epc.reader_cvm_required_limit.is_some_and(|l| amount >= l) {
        ind.raise_reader_cvm_limit_exceeded();
    }

    if let Some(builder) = ttq.as_mut() {
        if ind.is_reader_contactless_floor_limit_exceeded() || ind.is_status_check_requested() {
            builder.raise_online_cryptogram_required();
        }

        if ind.is_zero_amount() {
            if builder.is_offline_only_reader() {
                ind.raise_contactless_application_not_allowed();
            } else {
                builder.raise_online_cryptogram_required();
            }
        }

        if ind.is_reader_cvm_limit_exceeded() {
            builder.raise_cvm_required();
        }
    }
    ind.ttq = ttq.map(TtqBuilder::finalize);

    ind
}
