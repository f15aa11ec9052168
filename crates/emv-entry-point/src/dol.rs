//! Terminal data handed to kernels at activation

use crate::transaction::{CountryCode, TerminalType, TransactionData, TransactionTimestamp};
use emv_common::{tags, Tlv, TlvError, TlvMap};

/// Assemble the terminal data for one kernel activation
///
/// Transaction-derived objects come first, then the terminal defaults,
/// then the application configuration. A later source replaces the
/// value of a tag an earlier one already set.
pub fn prepare_terminal_data(
    country_code: CountryCode,
    terminal_type: TerminalType,
    transaction: &TransactionData,
    timestamp: &TransactionTimestamp,
    defaults: &TlvMap,
    app_config: &[Tlv],
) -> Result<TlvMap, TlvError> {
    let currency = transaction.currency();
    let mut ret = TlvMap::new();

    ret.add(Tlv::bcd(tags::TERMINAL_COUNTRY_CODE, country_code.0 as u64, 2)?)?;
    ret.add(Tlv::new(tags::TERMINAL_TYPE, vec![terminal_type.0]))?;
    ret.add(Tlv::bcd(tags::AMOUNT_AUTHORISED, transaction.amount_authorized() as u64, 6)?)?;
    ret.add(Tlv::bcd(tags::AMOUNT_OTHER, transaction.amount_other() as u64, 6)?)?;
    ret.add(Tlv::bcd(tags::TRANSACTION_CURRENCY_CODE, currency.numeric_code() as u64, 2)?)?;
    ret.add(Tlv::bcd(tags::TRANSACTION_CURRENCY_EXPONENT, currency.exponent() as u64, 1)?)?;
    ret.add(Tlv::new(tags::TRANSACTION_TYPE, vec![transaction.transaction_type().code()]))?;
    ret.add(Tlv::new(tags::TRANSACTION_DATE, timestamp.date_bcd()))?;
    ret.add(Tlv::new(tags::TRANSACTION_TIME, timestamp.time_bcd()))?;

    ret.merge(defaults.iter().cloned());
    ret.merge(app_config.iter().cloned());

    Ok(ret)
}
