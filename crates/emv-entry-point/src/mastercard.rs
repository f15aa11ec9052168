//! Mastercard discretionary data layout
//!
//! Entry point outcomes that end a Mastercard-bound transaction, and the
//! ones raised while selecting, carry the Error Indication data object
//! (DF8115) defined by the Mastercard contactless kernel.

use crate::outcome::{Outcome, OutcomeType};
use crate::ui::StandardMessage;
use emv_common::{tags, EmvTag, Tlv, TlvError, TlvMap};

/// AID prefixes handled by the Mastercard kernel (production and test RIDs)
const MASTERCARD_AID_PREFIXES: [&str; 2] = ["A000000004", "B012345678"];

/// Byte value of "message on error" when no message applies
const MESSAGE_NOT_AVAILABLE: u8 = 0xFF;

pub fn is_mastercard_aid(application_id: &str) -> bool {
    let aid = application_id.to_ascii_uppercase();
    MASTERCARD_AID_PREFIXES.iter().any(|p| aid.starts_with(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L1Error {
    Ok,
    TimeOut,
    Transmission,
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Error {
    Ok,
    CardDataMissing,
    CamFailed,
    StatusBytes,
    ParsingError,
    MaxLimitExceeded,
    CardDataError,
    MagstripeNotSupported,
    NoPpse,
    PpseFault,
    EmptyCandidateList,
    IdsReadError,
    IdsWriteError,
    IdsDataError,
    IdsNoMatchingAc,
    TerminalDataError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L3Error {
    Ok,
    TimeOut,
    Stop,
    AmountNotPresent,
}

impl L1Error {
    const ALL: [L1Error; 4] = [L1Error::Ok, L1Error::TimeOut, L1Error::Transmission, L1Error::Protocol];

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl L2Error {
    const ALL: [L2Error; 16] = [
        L2Error::Ok,
        L2Error::CardDataMissing,
        L2Error::CamFailed,
        L2Error::StatusBytes,
        L2Error::ParsingError,
        L2Error::MaxLimitExceeded,
        L2Error::CardDataError,
        L2Error::MagstripeNotSupported,
        L2Error::NoPpse,
        L2Error::PpseFault,
        L2Error::EmptyCandidateList,
        L2Error::IdsReadError,
        L2Error::IdsWriteError,
        L2Error::IdsDataError,
        L2Error::IdsNoMatchingAc,
        L2Error::TerminalDataError,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl L3Error {
    const ALL: [L3Error; 4] = [L3Error::Ok, L3Error::TimeOut, L3Error::Stop, L3Error::AmountNotPresent];

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Error Indication (DF8115): L1, L2, L3, SW12, message on error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorIndication {
    pub l1: L1Error,
    pub l2: L2Error,
    pub l3: L3Error,
    pub sw1: u8,
    pub sw2: u8,
    pub msg_on_error: Option<StandardMessage>,
}

impl ErrorIndication {
    fn new(msg_on_error: Option<StandardMessage>) -> Self {
        Self {
            l1: L1Error::Ok,
            l2: L2Error::Ok,
            l3: L3Error::Ok,
            sw1: 0,
            sw2: 0,
            msg_on_error,
        }
    }

    pub fn l1(error: L1Error, msg_on_error: Option<StandardMessage>) -> Self {
        Self {
            l1: error,
            ..Self::new(msg_on_error)
        }
    }

    pub fn l2(error: L2Error, msg_on_error: Option<StandardMessage>) -> Self {
        Self {
            l2: error,
            ..Self::new(msg_on_error)
        }
    }

    pub fn l3(error: L3Error, msg_on_error: Option<StandardMessage>) -> Self {
        Self {
            l3: error,
            ..Self::new(msg_on_error)
        }
    }

    pub fn has_error(&self) -> bool {
        self.l1 != L1Error::Ok || self.l2 != L2Error::Ok || self.l3 != L3Error::Ok
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        [
            self.l1.code(),
            self.l2.code(),
            self.l3.code(),
            self.sw1,
            self.sw2,
            self.msg_on_error.map_or(MESSAGE_NOT_AVAILABLE, |m| m.id()),
        ]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TlvError> {
        let invalid = || TlvError::InvalidLength(bytes.len() as u8);
        if bytes.len() != 6 {
            return Err(invalid());
        }

        let l1 = L1Error::ALL.into_iter().find(|e| e.code() == bytes[0]).ok_or_else(invalid)?;
        let l2 = L2Error::ALL.into_iter().find(|e| e.code() == bytes[1]).ok_or_else(invalid)?;
        let l3 = L3Error::ALL.into_iter().find(|e| e.code() == bytes[2]).ok_or_else(invalid)?;

        Ok(Self {
            l1,
            l2,
            l3,
            sw1: bytes[3],
            sw2: bytes[4],
            msg_on_error: StandardMessage::from_id(bytes[5]),
        })
    }

    pub fn as_tlv(&self) -> Tlv {
        Tlv::new(tags::ERROR_INDICATION, self.to_bytes().to_vec())
    }
}

/// Outcome reported when a STOP signal ended a Mastercard transaction
pub fn stop_outcome() -> Outcome {
    let ei = ErrorIndication::l3(L3Error::Stop, None);
    Outcome::builder(OutcomeType::EndApplication)
        .discretionary_data(vec![ei.as_tlv()])
        .build()
}

const EMV_DISCRETIONARY_TAGS: [EmvTag; 10] = [
    tags::APPLICATION_CAPABILITIES_INFORMATION,
    tags::APPLICATION_PAN,
    tags::APPLICATION_PAN_SEQUENCE_NUMBER,
    tags::BALANCE_READ_BEFORE_GEN_AC,
    tags::BALANCE_READ_AFTER_GEN_AC,
    tags::DS_SUMMARY_3,
    tags::DS_SUMMARY_STATUS,
    tags::POST_GEN_AC_PUT_DATA_STATUS,
    tags::PRE_GEN_AC_PUT_DATA_STATUS,
    tags::THIRD_PARTY_DATA,
];

const MAGSTRIPE_DISCRETIONARY_TAGS: [EmvTag; 4] = [
    tags::APPLICATION_CAPABILITIES_INFORMATION,
    tags::DD_CARD_TRACK1,
    tags::DD_CARD_TRACK2,
    tags::THIRD_PARTY_DATA,
];

/// Discretionary data for an outcome built outside the kernel
///
/// Copies the objects of the EMV-mode or mag-stripe-mode set that the
/// kernel database holds, then appends the error indication.
pub fn build_discretionary_data(emv_mode: bool, tlv_db: &TlvMap, ei: &ErrorIndication) -> Vec<Tlv> {
    let wanted: &[EmvTag] = if emv_mode {
        &EMV_DISCRETIONARY_TAGS
    } else {
        &MAGSTRIPE_DISCRETIONARY_TAGS
    };

    let mut ret: Vec<Tlv> = wanted
        .iter()
        .filter_map(|tag| tlv_db.get_non_empty(*tag))
        .cloned()
        .collect();
    ret.push(ei.as_tlv());
    ret
}

/// The error indication carried by an outcome, if any
pub fn error_indication(outcome: &Outcome) -> Option<ErrorIndication> {
    outcome
        .discretionary_value(tags::ERROR_INDICATION)
        .and_then(|v| ErrorIndication::from_bytes(v).ok())
}
