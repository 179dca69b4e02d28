//! Descriptor and descriptor-list model.
//!
//! A standalone tag-length-value container plus a PDS-scoped list and an
//! extended-descriptor-id dispatch key for disambiguating private and
//! table-specific descriptor tags.

use crate::error::{Error, Result};
use smallvec::SmallVec;

/// Private Data Specifier: a 32-bit namespace selector for tags >= 0x80.
pub type Pds = u32;

/// Tag carried by the `private_data_specifier_descriptor`.
pub const TAG_PRIVATE_DATA_SPECIFIER: u8 = 0x0F;
/// Tag of the ISO 639 language descriptor.
pub const TAG_ISO_639_LANGUAGE: u8 = 0x0A;
/// Threshold at and above which a descriptor tag is "private".
pub const PRIVATE_TAG_THRESHOLD: u8 = 0x80;

/// A byte container of length 2..257: tag, length, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    bytes: SmallVec<[u8; 16]>,
}

impl Descriptor {
    /// Builds a descriptor from its tag and payload, validating total size.
    pub fn new(tag: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > 255 {
            return Err(Error::InvalidField("descriptor payload > 255 bytes"));
        }
        let mut bytes = SmallVec::new();
        bytes.push(tag);
        bytes.push(payload.len() as u8);
        bytes.extend_from_slice(payload);
        Ok(Self { bytes })
    }

    /// Parses a descriptor from its wire bytes, validating `size == 2 + buf[1]`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::TruncatedSection);
        }
        let declared = 2 + data[1] as usize;
        if declared != data.len() {
            return Err(Error::BadSectionLength);
        }
        Ok(Self {
            bytes: SmallVec::from_slice(data),
        })
    }

    /// Consumes a descriptor from the front of `data`, returning it and the
    /// remaining slice. Used by table deserializers walking a descriptor loop.
    pub fn take_from(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < 2 {
            return Err(Error::TruncatedSection);
        }
        let total = 2 + data[1] as usize;
        if total > data.len() {
            return Err(Error::TruncatedSection);
        }
        Ok((Self::from_bytes(&data[..total])?, &data[total..]))
    }

    pub fn tag(&self) -> u8 {
        self.bytes[0]
    }
    pub fn payload_size(&self) -> usize {
        self.bytes[1] as usize
    }
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..]
    }
    pub fn content(&self) -> &[u8] {
        &self.bytes
    }
    pub fn is_private(&self) -> bool {
        self.tag() >= PRIVATE_TAG_THRESHOLD
    }
}

/// Extended descriptor id: the unique identity used for descriptor
/// dispatch. A standard-tag descriptor can still resolve to a table-specific
/// handler when one is registered for the enclosing table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edid {
    /// Tag < 0x80: globally meaningful regardless of PDS.
    Standard(u8),
    /// Tag >= 0x80, scoped to a private data specifier.
    Private(u8, Pds),
    /// Same tag reused with different meaning inside a specific table.
    TableSpecific(u8, u8),
    /// DVB extension descriptor (tag 0x7F, disambiguated by extension byte).
    ExtensionDvb(u8),
    /// MPEG extension descriptor (tag 0x63, disambiguated by extension byte).
    ExtensionMpeg(u8),
}

impl Edid {
    /// Derives the EDID for a parsed descriptor given its effective PDS and
    /// (if known) the enclosing table id.
    pub fn of(descriptor: &Descriptor, pds: Pds, table_id: Option<u8>) -> Edid {
        const TAG_DVB_EXTENSION: u8 = 0x7F;
        const TAG_MPEG_EXTENSION: u8 = 0x63;
        let tag = descriptor.tag();
        if tag == TAG_DVB_EXTENSION && !descriptor.payload().is_empty() {
            return Edid::ExtensionDvb(descriptor.payload()[0]);
        }
        if tag == TAG_MPEG_EXTENSION && !descriptor.payload().is_empty() {
            return Edid::ExtensionMpeg(descriptor.payload()[0]);
        }
        if tag >= PRIVATE_TAG_THRESHOLD {
            return Edid::Private(tag, pds);
        }
        match table_id {
            Some(tid) => Edid::TableSpecific(tag, tid),
            None => Edid::Standard(tag),
        }
    }
}

/// Result of a subtitle-capability search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleSearchResult {
    Found,
    FoundWrongLanguage,
    NotFound,
}

const TAG_ISO_639_LANGUAGE_DESC: u8 = TAG_ISO_639_LANGUAGE;
const TAG_SUBTITLING_DESCRIPTOR: u8 = 0x59;
const TAG_TELETEXT_DESCRIPTOR: u8 = 0x56;

/// Ordered sequence of `(descriptor, effective_private_data_specifier)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorList {
    entries: Vec<(Descriptor, Pds)>,
}

impl DescriptorList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Parses a flat descriptor loop of `length` bytes from the front of `data`.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        let mut list = Self::new();
        while !data.is_empty() {
            let (d, rest) = Descriptor::take_from(data)?;
            list.add(d);
            data = rest;
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a descriptor, deriving its effective PDS: the
    /// descriptor's own payload if it *is* a PDS descriptor, else the
    /// previous entry's PDS, else 0.
    pub fn add(&mut self, descriptor: Descriptor) {
        let pds = if descriptor.tag() == TAG_PRIVATE_DATA_SPECIFIER && descriptor.payload_size() >= 4
        {
            u32::from_be_bytes(descriptor.payload()[0..4].try_into().unwrap())
        } else {
            self.entries.last().map(|(_, pds)| *pds).unwrap_or(0)
        };
        self.entries.push((descriptor, pds));
    }

    pub fn get(&self, index: usize) -> Option<(&Descriptor, Pds)> {
        self.entries.get(index).map(|(d, p)| (d, *p))
    }

    /// Iterates `(descriptor, effective_pds)` pairs; the recommended way to
    /// consume PDS-scoped context without relying on stored mirror state.
    pub fn iter(&self) -> impl Iterator<Item = (&Descriptor, Pds)> {
        self.entries.iter().map(|(d, p)| (d, *p))
    }

    /// Legality check for removing a PDS descriptor at `index`: no descriptor
    /// after it, up to the next PDS descriptor, may have `tag >= 0x80`.
    fn pds_removal_is_legal(&self, index: usize) -> bool {
        for (d, _) in self.entries.iter().skip(index + 1) {
            if d.tag() == TAG_PRIVATE_DATA_SPECIFIER {
                break;
            }
            if d.is_private() {
                return false;
            }
        }
        true
    }

    /// Removes the entry at `index`. If it is a PDS descriptor, first runs
    /// the legality check, then rewrites the PDS on all following entries up
    /// to the next PDS descriptor or the end.
    pub fn remove_by_index(&mut self, index: usize) -> Result<()> {
        if index >= self.entries.len() {
            return Err(Error::InvalidField("descriptor index out of range"));
        }
        let is_pds = self.entries[index].0.tag() == TAG_PRIVATE_DATA_SPECIFIER;
        if is_pds && !self.pds_removal_is_legal(index) {
            return Err(Error::InvalidField(
                "removing this PDS descriptor would orphan a private descriptor",
            ));
        }
        let new_pds = if index == 0 {
            0
        } else {
            self.entries[index - 1].1
        };
        self.entries.remove(index);
        if is_pds {
            for (d, pds) in self.entries.iter_mut().skip(index) {
                if d.tag() == TAG_PRIVATE_DATA_SPECIFIER {
                    break;
                }
                *pds = new_pds;
            }
        }
        Ok(())
    }

    /// Finds the first descriptor with `tag` (and, if given, matching PDS)
    /// starting from `from`.
    pub fn search_by_tag(&self, tag: u8, pds: Option<Pds>, from: usize) -> Option<usize> {
        self.entries.iter().enumerate().skip(from).find_map(|(i, (d, p))| {
            let pds_ok = pds.map(|want| want == *p).unwrap_or(true);
            (d.tag() == tag && pds_ok).then_some(i)
        })
    }

    /// Finds a descriptor by EDID. Table-specific EDIDs only match within
    /// their declared table context.
    pub fn search_by_edid(&self, edid: Edid, table_id: Option<u8>) -> Option<usize> {
        self.entries.iter().enumerate().find_map(|(i, (d, p))| {
            let candidate = Edid::of(d, *p, table_id);
            (candidate == edid).then_some(i)
        })
    }

    /// Returns the 3-letter ISO 639 language code of the first
    /// `ISO_639_language_descriptor` entry, if any.
    pub fn language(&self) -> Option<[u8; 3]> {
        self.entries.iter().find_map(|(d, _)| {
            if d.tag() == TAG_ISO_639_LANGUAGE_DESC && d.payload_size() >= 3 {
                let mut code = [0u8; 3];
                code.copy_from_slice(&d.payload()[0..3]);
                Some(code)
            } else {
                None
            }
        })
    }

    /// Three-valued subtitle-capability search: inspects DVB
    /// subtitling descriptors and teletext descriptors with teletext-type
    /// 0x02 (subtitle) or 0x05 (hard-of-hearing subtitle).
    pub fn find_subtitle(&self, wanted_language: Option<&[u8; 3]>) -> SubtitleSearchResult {
        let mut wrong_language = false;
        for (d, _) in &self.entries {
            if d.tag() == TAG_SUBTITLING_DESCRIPTOR {
                for chunk in d.payload().chunks(8) {
                    if chunk.len() < 3 {
                        continue;
                    }
                    let lang: [u8; 3] = chunk[0..3].try_into().unwrap();
                    match wanted_language {
                        Some(want) if *want == lang => return SubtitleSearchResult::Found,
                        Some(_) => wrong_language = true,
                        None => return SubtitleSearchResult::Found,
                    }
                }
            } else if d.tag() == TAG_TELETEXT_DESCRIPTOR {
                for chunk in d.payload().chunks(5) {
                    if chunk.len() < 5 {
                        continue;
                    }
                    let teletext_type = chunk[3] >> 3;
                    if teletext_type == 0x02 || teletext_type == 0x05 {
                        let lang: [u8; 3] = chunk[0..3].try_into().unwrap();
                        match wanted_language {
                            Some(want) if *want == lang => return SubtitleSearchResult::Found,
                            Some(_) => wrong_language = true,
                            None => return SubtitleSearchResult::Found,
                        }
                    }
                }
            }
        }
        if wrong_language {
            SubtitleSearchResult::FoundWrongLanguage
        } else {
            SubtitleSearchResult::NotFound
        }
    }

    /// Writes as many whole descriptors as fit into `buffer` starting at
    /// `start`, returning how many bytes were written.
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        for (d, _) in &self.entries {
            buffer.extend_from_slice(d.content());
        }
    }

    /// Total serialized byte length of this list.
    pub fn binary_size(&self) -> usize {
        self.entries.iter().map(|(d, _)| d.size()).sum()
    }

    /// Serializes with a 16-bit length prefix: the N least-significant bits
    /// carry the length, the top `16 - n` bits carry caller-supplied reserved
    /// bits.
    pub fn length_serialize(&self, buffer: &mut Vec<u8>, length_bits: u32, reserved_bits: u16) {
        let mut body = Vec::new();
        self.serialize(&mut body);
        let mask = (1u16 << length_bits) - 1;
        let field = (reserved_bits & !mask) | (body.len() as u16 & mask);
        buffer.extend_from_slice(&field.to_be_bytes());
        buffer.extend_from_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pds_descriptor(value: u32) -> Descriptor {
        Descriptor::new(TAG_PRIVATE_DATA_SPECIFIER, &value.to_be_bytes()).unwrap()
    }

    #[test]
    fn descriptor_size_invariant() {
        let d = Descriptor::new(0x48, &[1, 2, 3]).unwrap();
        assert_eq!(d.size(), 2 + d.payload_size());
    }

    #[test]
    fn pds_projection_follows_last_pds_descriptor() {
        let mut list = DescriptorList::new();
        list.add(Descriptor::new(0x09, &[1, 2]).unwrap()); // CA descriptor, pds=0
        list.add(pds_descriptor(0xAAAA_BBBB));
        list.add(Descriptor::new(0x90, &[1]).unwrap()); // private tag, scoped pds

        assert_eq!(list.get(0).unwrap().1, 0);
        assert_eq!(list.get(1).unwrap().1, 0xAAAA_BBBB);
        assert_eq!(list.get(2).unwrap().1, 0xAAAA_BBBB);
    }

    #[test]
    fn removing_pds_descriptor_rejected_when_private_descriptor_follows() {
        let mut list = DescriptorList::new();
        list.add(pds_descriptor(1));
        list.add(Descriptor::new(0x90, &[1]).unwrap());
        assert!(list.remove_by_index(0).is_err());
    }

    #[test]
    fn removing_pds_descriptor_allowed_when_no_private_descriptor_follows() {
        let mut list = DescriptorList::new();
        list.add(pds_descriptor(1));
        list.add(Descriptor::new(0x48, &[1]).unwrap());
        assert!(list.remove_by_index(0).is_ok());
        assert_eq!(list.get(0).unwrap().1, 0);
    }

    #[test]
    fn private_descriptor_with_zero_pds_is_generic() {
        let d = Descriptor::new(0x90, &[]).unwrap();
        let edid = Edid::of(&d, 0, None);
        assert_eq!(edid, Edid::Private(0x90, 0));
    }

    #[test]
    fn subtitle_search_distinguishes_wrong_language() {
        let mut list = DescriptorList::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(b"fre");
        payload.push(0x10); // subtitling_type
        payload.extend_from_slice(&[0, 1]); // composition_page_id
        payload.extend_from_slice(&[0, 1]); // ancillary_page_id
        list.add(Descriptor::new(TAG_SUBTITLING_DESCRIPTOR, &payload).unwrap());
        assert_eq!(
            list.find_subtitle(Some(b"eng")),
            SubtitleSearchResult::FoundWrongLanguage
        );
        assert_eq!(list.find_subtitle(Some(b"fre")), SubtitleSearchResult::Found);
    }

    #[test]
    fn length_serialize_packs_reserved_bits() {
        let mut list = DescriptorList::new();
        list.add(Descriptor::new(0x48, &[1, 2, 3]).unwrap());
        let mut out = Vec::new();
        list.length_serialize(&mut out, 12, 0xF000);
        let field = u16::from_be_bytes([out[0], out[1]]);
        assert_eq!(field & 0x0FFF, list.binary_size() as u16);
        assert_eq!(field & 0xF000, 0xF000);
    }
}
