//! EMV Common - TLV model and tag catalogue shared by the EMV crates
//!
//! Terminal data sent to kernels, per-application configuration and the
//! discretionary data carried back on outcomes are all TLV encoded. This
//! crate owns the tag type, the BER-TLV codec and the ordered [`TlvMap`].

pub mod tlv;
pub mod tlv_map;

pub use tlv::{decode_bcd, encode_bcd, parse_tlvs, read_length, read_tag, Tlv, TlvError};
pub use tlv_map::TlvMap;

use std::fmt;

/// TLV (Tag-Length-Value) search over raw EMV data
///
/// Searches for a specific tag in EMV-encoded data and returns its value.
/// Handles multi-byte tags as well as extended length encoding.
///
/// # Arguments
/// * `data` - The EMV-encoded data to search
/// * `tag` - The tag bytes to search for
///
/// # Returns
/// * `Some(&[u8])` - The value bytes if tag is found
/// * `None` - If tag is not found or data is malformed
pub fn find_tag<'a>(data: &'a [u8], tag: &[u8]) -> Option<&'a [u8]> {
    let mut i = 0;
    while i < data.len() {
        let (current_tag, tag_len) = read_tag(&data[i..]).ok()?;
        i += tag_len;

        let (actual_len, len_len) = read_length(&data[i..]).ok()?;
        i += len_len;

        if current_tag.to_bytes() == tag {
            if i + actual_len <= data.len() {
                return Some(&data[i..i + actual_len]);
            }
            return None;
        }

        // Skip value and continue to next tag
        i += actual_len;
    }
    None
}

/// EMV Tag identifier
///
/// Stored as the big-endian integer of the tag bytes, so `9F02` is
/// `EmvTag::new(0x9F02)` and `DF8115` is `EmvTag::new(0xDF8115)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmvTag(u32);

impl EmvTag {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Build a tag from its encoded bytes (1 to 4 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TlvError> {
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(TlvError::InvalidTag(hex::encode_upper(bytes)));
        }
        let value = bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Encoded tag bytes, without leading zero bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let bytes = self.0.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(3);
        bytes[first..].to_vec()
    }

    /// Human-readable name from the tag catalogue
    pub fn name(&self) -> &'static str {
        get_tag_name(&self.to_bytes())
    }
}

impl fmt::Display for EmvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.to_bytes()))
    }
}

/// Common EMV tags used in contactless transaction processing
pub mod tags {
    use super::EmvTag;

    // Application metadata
    pub const APPLICATION_IDENTIFIER: EmvTag = EmvTag::new(0x4F);
    pub const APPLICATION_LABEL: EmvTag = EmvTag::new(0x50);
    pub const APPLICATION_PAN: EmvTag = EmvTag::new(0x5A);
    pub const APPLICATION_PAN_SEQUENCE_NUMBER: EmvTag = EmvTag::new(0x5F34);
    pub const APPLICATION_CAPABILITIES_INFORMATION: EmvTag = EmvTag::new(0x9F5D);
    pub const DEDICATED_FILE_NAME: EmvTag = EmvTag::new(0x84);

    // Transaction data
    pub const AMOUNT_AUTHORISED: EmvTag = EmvTag::new(0x9F02);
    pub const AMOUNT_OTHER: EmvTag = EmvTag::new(0x9F03);
    pub const TRANSACTION_CURRENCY_CODE: EmvTag = EmvTag::new(0x5F2A);
    pub const TRANSACTION_CURRENCY_EXPONENT: EmvTag = EmvTag::new(0x5F36);
    pub const TRANSACTION_TYPE: EmvTag = EmvTag::new(0x9C);
    pub const TRANSACTION_DATE: EmvTag = EmvTag::new(0x9A);
    pub const TRANSACTION_TIME: EmvTag = EmvTag::new(0x9F21);

    // Terminal data
    pub const TERMINAL_COUNTRY_CODE: EmvTag = EmvTag::new(0x9F1A);
    pub const TERMINAL_TYPE: EmvTag = EmvTag::new(0x9F35);
    pub const TERMINAL_FLOOR_LIMIT: EmvTag = EmvTag::new(0x9F1B);
    pub const TERMINAL_TRANSACTION_QUALIFIERS: EmvTag = EmvTag::new(0x9F66);

    // Reader limits (EMV Book C-2)
    pub const READER_CONTACTLESS_FLOOR_LIMIT: EmvTag = EmvTag::new(0xDF8123);
    pub const READER_CONTACTLESS_TRANSACTION_LIMIT_NO_OD_CVM: EmvTag = EmvTag::new(0xDF8124);
    pub const READER_CONTACTLESS_TRANSACTION_LIMIT_OD_CVM: EmvTag = EmvTag::new(0xDF8125);
    pub const READER_CVM_REQUIRED_LIMIT: EmvTag = EmvTag::new(0xDF8126);

    // Outcome data
    pub const ERROR_INDICATION: EmvTag = EmvTag::new(0xDF8115);
    pub const DATA_RECORD: EmvTag = EmvTag::new(0xFF8105);
    pub const DISCRETIONARY_DATA: EmvTag = EmvTag::new(0xFF8106);
    pub const TORN_RECORD: EmvTag = EmvTag::new(0xFF8101);
    pub const BALANCE_READ_BEFORE_GEN_AC: EmvTag = EmvTag::new(0xDF8104);
    pub const BALANCE_READ_AFTER_GEN_AC: EmvTag = EmvTag::new(0xDF8105);
    pub const DS_SUMMARY_3: EmvTag = EmvTag::new(0xDF8102);
    pub const DS_SUMMARY_STATUS: EmvTag = EmvTag::new(0xDF810B);
    pub const POST_GEN_AC_PUT_DATA_STATUS: EmvTag = EmvTag::new(0xDF810E);
    pub const PRE_GEN_AC_PUT_DATA_STATUS: EmvTag = EmvTag::new(0xDF810F);
    pub const THIRD_PARTY_DATA: EmvTag = EmvTag::new(0x9F6E);
    pub const DD_CARD_TRACK1: EmvTag = EmvTag::new(0xDF812A);
    pub const DD_CARD_TRACK2: EmvTag = EmvTag::new(0xDF812B);

    // Proprietary entry point configuration
    pub const STATUS_CHECK_ENABLED: EmvTag = EmvTag::new(0xDF8F51);
    pub const ZERO_AMOUNT_ALLOWED: EmvTag = EmvTag::new(0xDF8F52);
    pub const EXTENDED_SELECTION_SUPPORTED: EmvTag = EmvTag::new(0xDF8F53);
    pub const TTQ_CONFIGURATION: EmvTag = EmvTag::new(0xDF8F54);

    // Response templates
    pub const FCI_TEMPLATE: EmvTag = EmvTag::new(0x6F);
    pub const FCI_PROPRIETARY_TEMPLATE: EmvTag = EmvTag::new(0xA5);
    pub const FCI_ISSUER_DISCRETIONARY_DATA: EmvTag = EmvTag::new(0xBF0C);
    pub const DIRECTORY_ENTRY: EmvTag = EmvTag::new(0x61);
    pub const APPLICATION_PRIORITY_INDICATOR: EmvTag = EmvTag::new(0x87);
    pub const KERNEL_IDENTIFIER: EmvTag = EmvTag::new(0x9F2A);
}

/// Get a human-readable name for an EMV tag
pub fn get_tag_name(tag: &[u8]) -> &'static str {
    match tag {
        [0x4F] => "Application Identifier (AID)",
        [0x50] => "Application Label",
        [0x5A] => "Application PAN",
        [0x5F, 0x2A] => "Transaction Currency Code",
        [0x5F, 0x34] => "Application PAN Sequence Number",
        [0x5F, 0x36] => "Transaction Currency Exponent",
        [0x61] => "Directory Entry",
        [0x6F] => "File Control Information (FCI) Template",
        [0x84] => "Dedicated File (DF) Name",
        [0x87] => "Application Priority Indicator",
        [0x9A] => "Transaction Date",
        [0x9C] => "Transaction Type",
        [0xA5] => "FCI Proprietary Template",
        [0xBF, 0x0C] => "FCI Issuer Discretionary Data",
        [0x9F, 0x02] => "Amount, Authorised (Numeric)",
        [0x9F, 0x03] => "Amount, Other (Numeric)",
        [0x9F, 0x1A] => "Terminal Country Code",
        [0x9F, 0x1B] => "Terminal Floor Limit",
        [0x9F, 0x21] => "Transaction Time",
        [0x9F, 0x2A] => "Kernel Identifier",
        [0x9F, 0x35] => "Terminal Type",
        [0x9F, 0x5D] => "Application Capabilities Information",
        [0x9F, 0x66] => "Terminal Transaction Qualifiers (TTQ)",
        [0x9F, 0x6E] => "Third Party Data",
        [0xDF, 0x81, 0x02] => "DS Summary 3",
        [0xDF, 0x81, 0x04] => "Balance Read Before Gen AC",
        [0xDF, 0x81, 0x05] => "Balance Read After Gen AC",
        [0xDF, 0x81, 0x0B] => "DS Summary Status",
        [0xDF, 0x81, 0x0E] => "Post-Gen AC Put Data Status",
        [0xDF, 0x81, 0x0F] => "Pre-Gen AC Put Data Status",
        [0xDF, 0x81, 0x15] => "Error Indication",
        [0xDF, 0x81, 0x23] => "Reader Contactless Floor Limit",
        [0xDF, 0x81, 0x24] => "Reader Contactless Transaction Limit (No On-device CVM)",
        [0xDF, 0x81, 0x25] => "Reader Contactless Transaction Limit (On-device CVM)",
        [0xDF, 0x81, 0x26] => "Reader CVM Required Limit",
        [0xDF, 0x81, 0x2A] => "DD Card (Track1)",
        [0xDF, 0x81, 0x2B] => "DD Card (Track2)",
        [0xDF, 0x8F, 0x51] => "Status Check Enabled",
        [0xDF, 0x8F, 0x52] => "Zero Amount Allowed",
        [0xDF, 0x8F, 0x53] => "Extended Selection Supported",
        [0xDF, 0x8F, 0x54] => "TTQ Configuration",
        [0xFF, 0x81, 0x01] => "Torn Record",
        [0xFF, 0x81, 0x05] => "Data Record",
        [0xFF, 0x81, 0x06] => "Discretionary Data",
        _ => "Unknown Tag",
    }
}
