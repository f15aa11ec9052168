//! Terminal Transaction Qualifiers (tag 9F66)
//!
//! The base value comes from a JSON document stored in the application
//! configuration. Pre-processing raises requirement bits on a
//! [`TtqBuilder`] and freezes the result into an immutable [`Ttq`].

use emv_common::{tags, Tlv};
use serde::{Deserialize, Serialize};
use std::fmt;

// Byte 1
const MAG_STRIPE_MODE_SUPPORTED: u8 = 0x80;
const EMV_MODE_SUPPORTED: u8 = 0x20;
const EMV_CONTACT_CHIP_SUPPORTED: u8 = 0x10;
const OFFLINE_ONLY_READER: u8 = 0x08;
const ONLINE_PIN_SUPPORTED: u8 = 0x04;
const SIGNATURE_SUPPORTED: u8 = 0x02;
const ODA_FOR_ONLINE_AUTHORIZATION_SUPPORTED: u8 = 0x01;

// Byte 2
const ONLINE_CRYPTOGRAM_REQUIRED: u8 = 0x80;
const CVM_REQUIRED: u8 = 0x40;
const CONTACT_CHIP_OFFLINE_PIN_SUPPORTED: u8 = 0x20;

// Byte 3
const ISSUER_UPDATE_PROCESSING_SUPPORTED: u8 = 0x80;
const CONSUMER_DEVICE_CVM_SUPPORTED: u8 = 0x40;

/// Terminal capabilities encoded into the TTQ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtqConfiguration {
    pub mag_stripe_mode_supported: bool,
    pub emv_mode_supported: bool,
    pub emv_contact_chip_supported: bool,
    pub offline_only_reader: bool,
    pub online_pin_supported: bool,
    pub signature_supported: bool,
    pub oda_for_online_authorization_supported: bool,
    pub contact_chip_offline_pin_supported: bool,
    pub issuer_update_processing_supported: bool,
    pub consumer_device_cvm_supported: bool,
}

impl TtqConfiguration {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Finalized 4-byte TTQ value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ttq([u8; 4]);

impl Ttq {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn is_mag_stripe_mode_supported(&self) -> bool {
        self.0[0] & MAG_STRIPE_MODE_SUPPORTED != 0
    }

    pub fn is_emv_mode_supported(&self) -> bool {
        self.0[0] & EMV_MODE_SUPPORTED != 0
    }

    pub fn is_emv_contact_chip_supported(&self) -> bool {
        self.0[0] & EMV_CONTACT_CHIP_SUPPORTED != 0
    }

    pub fn is_offline_only_reader(&self) -> bool {
        self.0[0] & OFFLINE_ONLY_READER != 0
    }

    pub fn is_online_pin_supported(&self) -> bool {
        self.0[0] & ONLINE_PIN_SUPPORTED != 0
    }

    pub fn is_signature_supported(&self) -> bool {
        self.0[0] & SIGNATURE_SUPPORTED != 0
    }

    pub fn is_oda_for_online_authorization_supported(&self) -> bool {
        self.0[0] & ODA_FOR_ONLINE_AUTHORIZATION_SUPPORTED != 0
    }

    pub fn is_online_cryptogram_required(&self) -> bool {
        self.0[1] & ONLINE_CRYPTOGRAM_REQUIRED != 0
    }

    pub fn is_cvm_required(&self) -> bool {
        self.0[1] & CVM_REQUIRED != 0
    }

    pub fn is_contact_chip_offline_pin_supported(&self) -> bool {
        self.0[1] & CONTACT_CHIP_OFFLINE_PIN_SUPPORTED != 0
    }

    pub fn is_issuer_update_processing_supported(&self) -> bool {
        self.0[2] & ISSUER_UPDATE_PROCESSING_SUPPORTED != 0
    }

    pub fn is_consumer_device_cvm_supported(&self) -> bool {
        self.0[2] & CONSUMER_DEVICE_CVM_SUPPORTED != 0
    }

    pub fn as_tlv(&self) -> Tlv {
        Tlv::new(tags::TERMINAL_TRANSACTION_QUALIFIERS, self.0.to_vec())
    }
}

impl fmt::Display for Ttq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// TTQ under construction during pre-processing
///
/// Requirement flags can only be raised. [`TtqBuilder::finalize`]
/// consumes the builder.
#[derive(Debug, Clone)]
pub struct TtqBuilder {
    base: [u8; 4],
    online_cryptogram_required: bool,
    cvm_required: bool,
    offline_only_reader: bool,
}

impl TtqBuilder {
    pub fn from_config(config: &TtqConfiguration) -> Self {
        let mut base = [0u8; 4];

        let byte1 = [
            (config.mag_stripe_mode_supported, MAG_STRIPE_MODE_SUPPORTED),
            (config.emv_mode_supported, EMV_MODE_SUPPORTED),
            (config.emv_contact_chip_supported, EMV_CONTACT_CHIP_SUPPORTED),
            (config.offline_only_reader, OFFLINE_ONLY_READER),
            (config.online_pin_supported, ONLINE_PIN_SUPPORTED),
            (config.signature_supported, SIGNATURE_SUPPORTED),
            (
                config.oda_for_online_authorization_supported,
                ODA_FOR_ONLINE_AUTHORIZATION_SUPPORTED,
            ),
        ];
        for (set, bit) in byte1 {
            if set {
                base[0] |= bit;
            }
        }

        if config.contact_chip_offline_pin_supported {
            base[1] |= CONTACT_CHIP_OFFLINE_PIN_SUPPORTED;
        }
        if config.issuer_update_processing_supported {
            base[2] |= ISSUER_UPDATE_PROCESSING_SUPPORTED;
        }
        if config.consumer_device_cvm_supported {
            base[2] |= CONSUMER_DEVICE_CVM_SUPPORTED;
        }

        Self {
            base,
            online_cryptogram_required: false,
            cvm_required: false,
            offline_only_reader: config.offline_only_reader,
        }
    }

    pub fn raise_online_cryptogram_required(&mut self) {
        self.online_cryptogram_required = true;
    }

    pub fn raise_cvm_required(&mut self) {
        self.cvm_required = true;
    }

    pub fn is_offline_only_reader(&self) -> bool {
        self.offline_only_reader
    }

    pub fn finalize(self) -> Ttq {
        let mut bytes = self.base;
        if self.online_cryptogram_required {
            bytes[1] |= ONLINE_CRYPTOGRAM_REQUIRED;
        }
        if self.cvm_required {
            bytes[1] |= CVM_REQUIRED;
        }
        Ttq(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config = TtqConfiguration::from_json(
            r#"{"emv_mode_supported": true, "online_pin_supported": true, "signature_supported": true}"#,
        )
        .unwrap();
        assert!(config.emv_mode_supported);
        assert!(!config.offline_only_reader);

        assert!(TtqConfiguration::from_json("{not json").is_err());
    }

    #[test]
    fn test_base_bits() {
        let config = TtqConfiguration {
            emv_mode_supported: true,
            online_pin_supported: true,
            signature_supported: true,
            consumer_device_cvm_supported: true,
            ..Default::default()
        };
        let ttq = TtqBuilder::from_config(&config).finalize();
        assert_eq!(ttq.bytes(), [0x26, 0x00, 0x40, 0x00]);
        assert!(ttq.is_emv_mode_supported());
        assert!(!ttq.is_online_cryptogram_required());
        assert_eq!(ttq.to_string(), "26004000");
    }

    #[test]
    fn test_raised_flags() {
        let config = TtqConfiguration {
            emv_mode_supported: true,
            offline_only_reader: true,
            ..Default::default()
        };
        let mut builder = TtqBuilder::from_config(&config);
        assert!(builder.is_offline_only_reader());
        builder.raise_online_cryptogram_required();
        builder.raise_cvm_required();
        let ttq = builder.finalize();

        assert!(ttq.is_online_cryptogram_required());
        assert!(ttq.is_cvm_required());
        assert!(ttq.is_offline_only_reader());
        assert_eq!(ttq.as_tlv().value(), &[0x28, 0xC0, 0x00, 0x00]);
    }
}
