//! Field formatters for human-readable output

use clap::ValueEnum;
use emv_common::{tags, Tlv};
use emv_entry_point::mastercard::ErrorIndication;
use emv_entry_point::Ttq;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatMode {
    /// Raw hex output
    Raw,
    /// Human-readable formatted output
    Human,
}

/// Format a TLV value based on its tag
pub fn format_value(tlv: &Tlv, mode: FormatMode) -> String {
    let value = tlv.value();
    if mode == FormatMode::Raw {
        return hex::encode_upper(value);
    }

    match tlv.tag() {
        tags::APPLICATION_LABEL => String::from_utf8(value.to_vec()).unwrap_or_else(|_| hex::encode_upper(value)),

        // PAN, keep first 6 and last 4 digits
        tags::APPLICATION_PAN => {
            let digits = hex::encode_upper(value);
            let digits = digits.trim_end_matches('F');
            if digits.len() > 10 {
                format!(
                    "{}{}{}",
                    &digits[..6],
                    "*".repeat(digits.len() - 10),
                    &digits[digits.len() - 4..]
                )
            } else {
                digits.to_string()
            }
        }

        tags::TERMINAL_TRANSACTION_QUALIFIERS => match <[u8; 4]>::try_from(value) {
            Ok(bytes) => describe_ttq(Ttq::from_bytes(bytes)),
            Err(_) => hex::encode_upper(value),
        },

        tags::ERROR_INDICATION => match ErrorIndication::from_bytes(value) {
            Ok(ei) => format!(
                "L1={:?} L2={:?} L3={:?} SW={:02X}{:02X} msg={}",
                ei.l1,
                ei.l2,
                ei.l3,
                ei.sw1,
                ei.sw2,
                ei.msg_on_error.map_or_else(|| "N/A".to_string(), |m| format!("{:?}", m))
            ),
            Err(_) => hex::encode_upper(value),
        },

        _ => hex::encode_upper(value),
    }
}

fn describe_ttq(ttq: Ttq) -> String {
    let flags = [
        (ttq.is_mag_stripe_mode_supported(), "magstripe"),
        (ttq.is_emv_mode_supported(), "emv"),
        (ttq.is_emv_contact_chip_supported(), "contact"),
        (ttq.is_offline_only_reader(), "offline-only"),
        (ttq.is_online_pin_supported(), "online-pin"),
        (ttq.is_signature_supported(), "signature"),
        (ttq.is_oda_for_online_authorization_supported(), "oda-online"),
        (ttq.is_online_cryptogram_required(), "online-cryptogram"),
        (ttq.is_cvm_required(), "cvm-required"),
        (ttq.is_contact_chip_offline_pin_supported(), "offline-pin"),
        (ttq.is_issuer_update_processing_supported(), "issuer-update"),
        (ttq.is_consumer_device_cvm_supported(), "cdcvm"),
    ];
    let set: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, name)| *name).collect();
    format!("{} [{}]", ttq, set.join(", "))
}
