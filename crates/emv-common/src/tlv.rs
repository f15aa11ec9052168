//! BER-TLV codec and numeric (BCD) helpers

use crate::EmvTag;
use thiserror::Error;

/// Malformed TLV or EMV data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("Data truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid length encoding: {0:#04X}")]
    InvalidLength(u8),

    #[error("Invalid BCD digit in {0}")]
    InvalidBcd(String),

    #[error("Value does not fit in {digits} digits: {value}")]
    BcdOverflow { value: u64, digits: usize },

    #[error("Duplicate tag: {0}")]
    DuplicateTag(EmvTag),

    #[error("Value of tag {0} is not valid UTF-8")]
    InvalidUtf8(EmvTag),
}

/// Read one tag from the start of `data`
///
/// Returns the tag and the number of bytes it occupies. Subsequent tag
/// bytes follow the first one while bit 8 is set.
pub fn read_tag(data: &[u8]) -> Result<(EmvTag, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::Truncated { offset: 0 })?;
    let mut len = 1;

    if first & 0x1F == 0x1F {
        loop {
            let b = *data.get(len).ok_or(TlvError::Truncated { offset: len })?;
            len += 1;
            if b & 0x80 == 0 {
                break;
            }
            if len == 4 {
                return Err(TlvError::InvalidTag(hex::encode_upper(&data[..len])));
            }
        }
    }

    Ok((EmvTag::from_bytes(&data[..len])?, len))
}

/// Read one length field from the start of `data`
///
/// Returns the value length and the number of bytes the field occupies.
pub fn read_length(data: &[u8]) -> Result<(usize, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::Truncated { offset: 0 })?;

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let num_len_bytes = (first & 0x7F) as usize;
    if num_len_bytes == 0 || num_len_bytes > 3 {
        return Err(TlvError::InvalidLength(first));
    }
    if data.len() < 1 + num_len_bytes {
        return Err(TlvError::Truncated { offset: data.len() });
    }

    let actual = data[1..=num_len_bytes]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((actual, 1 + num_len_bytes))
}

/// Parse a flat sequence of TLV objects
///
/// Constructed values are kept as raw bytes; use [`parse_tlvs`] again on
/// the value to descend into a template.
pub fn parse_tlvs(data: &[u8]) -> Result<Vec<Tlv>, TlvError> {
    let mut ret = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let (tag, tag_len) = read_tag(&data[i..]).map_err(|e| offset_error(e, i))?;
        i += tag_len;

        let (len, len_len) = read_length(&data[i..]).map_err(|e| offset_error(e, i))?;
        i += len_len;

        if i + len > data.len() {
            return Err(TlvError::Truncated { offset: data.len() });
        }
        ret.push(Tlv::new(tag, data[i..i + len].to_vec()));
        i += len;
    }

    Ok(ret)
}

fn offset_error(err: TlvError, base: usize) -> TlvError {
    match err {
        TlvError::Truncated { offset } => TlvError::Truncated { offset: base + offset },
        other => other,
    }
}

/// Decode packed BCD digits into an integer
pub fn decode_bcd(bytes: &[u8]) -> Result<u64, TlvError> {
    let mut ret: u64 = 0;
    for b in bytes {
        for nibble in [b >> 4, b & 0x0F] {
            if nibble > 9 {
                return Err(TlvError::InvalidBcd(hex::encode_upper(bytes)));
            }
            ret = ret
                .checked_mul(10)
                .and_then(|v| v.checked_add(nibble as u64))
                .ok_or_else(|| TlvError::InvalidBcd(hex::encode_upper(bytes)))?;
        }
    }
    Ok(ret)
}

/// Encode an integer as packed BCD, left padded with zeros to `len` bytes
pub fn encode_bcd(value: u64, len: usize) -> Result<Vec<u8>, TlvError> {
    let mut ret = vec![0u8; len];
    let mut rest = value;

    for byte in ret.iter_mut().rev() {
        let low = (rest % 10) as u8;
        rest /= 10;
        let high = (rest % 10) as u8;
        rest /= 10;
        *byte = (high << 4) | low;
    }

    if rest != 0 {
        return Err(TlvError::BcdOverflow { value, digits: len * 2 });
    }
    Ok(ret)
}

/// A single tag/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tlv {
    tag: EmvTag,
    value: Vec<u8>,
}

impl Tlv {
    pub fn new(tag: EmvTag, value: Vec<u8>) -> Self {
        Self { tag, value }
    }

    /// Numeric (format n) value encoded as BCD over `len` bytes
    pub fn bcd(tag: EmvTag, value: u64, len: usize) -> Result<Self, TlvError> {
        Ok(Self::new(tag, encode_bcd(value, len)?))
    }

    pub fn tag(&self) -> EmvTag {
        self.tag
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value_as_bcd(&self) -> Result<u64, TlvError> {
        decode_bcd(&self.value)
    }

    pub fn value_as_string(&self) -> Result<String, TlvError> {
        String::from_utf8(self.value.clone()).map_err(|_| TlvError::InvalidUtf8(self.tag))
    }

    /// True when the first value byte is non-zero
    pub fn value_as_flag(&self) -> bool {
        self.value.first().is_some_and(|b| *b != 0)
    }

    /// BER-TLV encoding of this object
    pub fn encode(&self) -> Vec<u8> {
        let mut ret = self.tag.to_bytes();
        let len = self.value.len();

        if len < 0x80 {
            ret.push(len as u8);
        } else if len <= 0xFF {
            ret.extend_from_slice(&[0x81, len as u8]);
        } else if len <= 0xFFFF {
            ret.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
        } else {
            ret.extend_from_slice(&[0x83, (len >> 16) as u8, (len >> 8) as u8, len as u8]);
        }

        ret.extend_from_slice(&self.value);
        ret
    }
}
