//! Ordered, tag-keyed TLV store

use crate::{parse_tlvs, EmvTag, Tlv, TlvError};

/// Ordered collection of TLV objects with unique tags
///
/// Insertion order is preserved. [`TlvMap::update_or_add`] replaces the
/// value of an existing tag in place and appends new tags at the end, so
/// merging one map over another keeps the base map's ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvMap {
    entries: Vec<Tlv>,
}

impl TlvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from a list, rejecting duplicate tags
    pub fn from_tlvs(tlvs: Vec<Tlv>) -> Result<Self, TlvError> {
        let mut ret = Self::new();
        for tlv in tlvs {
            ret.add(tlv)?;
        }
        Ok(ret)
    }

    /// Parse a flat TLV encoding into a map
    pub fn parse(data: &[u8]) -> Result<Self, TlvError> {
        Self::from_tlvs(parse_tlvs(data)?)
    }

    /// Add a TLV whose tag must not be present yet
    pub fn add(&mut self, tlv: Tlv) -> Result<(), TlvError> {
        if self.contains(tlv.tag()) {
            return Err(TlvError::DuplicateTag(tlv.tag()));
        }
        self.entries.push(tlv);
        Ok(())
    }

    pub fn add_all(&mut self, tlvs: impl IntoIterator<Item = Tlv>) -> Result<(), TlvError> {
        for tlv in tlvs {
            self.add(tlv)?;
        }
        Ok(())
    }

    /// Replace the value of an existing tag, or append a new one
    pub fn update_or_add(&mut self, tlv: Tlv) {
        match self.entries.iter_mut().find(|t| t.tag() == tlv.tag()) {
            Some(existing) => *existing = tlv,
            None => self.entries.push(tlv),
        }
    }

    /// Merge `other` over this map; values from `other` win on matching tags
    pub fn merge(&mut self, other: impl IntoIterator<Item = Tlv>) {
        for tlv in other {
            self.update_or_add(tlv);
        }
    }

    pub fn get(&self, tag: EmvTag) -> Option<&Tlv> {
        self.entries.iter().find(|t| t.tag() == tag)
    }

    pub fn value(&self, tag: EmvTag) -> Option<&[u8]> {
        self.get(tag).map(Tlv::value)
    }

    pub fn contains(&self, tag: EmvTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn is_tag_present_and_non_empty(&self, tag: EmvTag) -> bool {
        self.get(tag).is_some_and(|t| !t.is_empty())
    }

    /// The TLV for `tag` if it is present with a non-empty value
    pub fn get_non_empty(&self, tag: EmvTag) -> Option<&Tlv> {
        self.get(tag).filter(|t| !t.is_empty())
    }

    pub fn remove(&mut self, tag: EmvTag) -> Option<Tlv> {
        let idx = self.entries.iter().position(|t| t.tag() == tag)?;
        Some(self.entries.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.entries.iter()
    }

    pub fn as_list(&self) -> &[Tlv] {
        &self.entries
    }

    pub fn into_list(self) -> Vec<Tlv> {
        self.entries
    }

    /// Concatenated BER-TLV encoding of every entry, in order
    pub fn encode(&self) -> Vec<u8> {
        self.entries.iter().flat_map(Tlv::encode).collect()
    }
}

impl FromIterator<Tlv> for TlvMap {
    /// Collects with update-or-add semantics: the last value for a tag wins
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        let mut ret = Self::new();
        ret.merge(iter);
        ret
    }
}

impl IntoIterator for TlvMap {
    type Item = Tlv;
    type IntoIter = std::vec::IntoIter<Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a TlvMap {
    type Item = &'a Tlv;
    type IntoIter = std::slice::Iter<'a, Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
