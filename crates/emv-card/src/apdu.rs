//! APDU (Application Protocol Data Unit) command handling

use crate::transceiver::{Transceiver, TransceiverError};

/// ISO 7816-4 status word trailing every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord(0x9000);

    pub fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn sw2(self) -> u8 {
        self.0 as u8
    }
}

impl std::fmt::Display for StatusWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Response data with its status word split off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw: StatusWord,
}

impl ApduResponse {
    pub fn from_bytes(rapdu: &[u8]) -> Result<Self, TransceiverError> {
        match rapdu {
            [data @ .., sw1, sw2] => Ok(Self {
                data: data.to_vec(),
                sw: StatusWord(u16::from_be_bytes([*sw1, *sw2])),
            }),
            _ => Err(TransceiverError::ResponseTooShort(rapdu.len())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.sw == StatusWord::SUCCESS
    }
}

/// APDU command builder
#[derive(Debug, Clone)]
pub struct ApduCommand {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl ApduCommand {
    /// Create a new APDU command
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set expected response length
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Build the APDU command bytes
    pub fn build(&self) -> Vec<u8> {
        let mut apdu = vec![self.cla, self.ins, self.p1, self.p2];

        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            apdu.push(le);
        }

        apdu
    }

    /// Exchange this command over `transceiver`
    pub fn send(&self, transceiver: &dyn Transceiver) -> Result<ApduResponse, TransceiverError> {
        ApduResponse::from_bytes(&transceiver.transceive(&self.build())?)
    }
}

/// Commands issued outside of the kernels
pub mod commands {
    use super::ApduCommand;

    /// Proximity Payment System Environment name
    pub const PPSE: &[u8] = b"2PAY.SYS.DDF01";

    /// SELECT command (by name/AID)
    pub fn select(aid: &[u8]) -> ApduCommand {
        ApduCommand::new(0x00, 0xA4, 0x04, 0x00)
            .data(aid.to_vec())
            .le(0x00)
    }

    /// SELECT of the PPSE directory, the first command of combination selection
    pub fn select_ppse() -> ApduCommand {
        select(PPSE)
    }
}
