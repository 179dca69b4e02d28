//! PSI/SI section model.
//!
//! A `Section` is an immutable-once-built byte-exact representation of one
//! PSI/SI section, short or long, backed by a value type that can be
//! validated, mutated in place, and re-serialized.

use crate::crc32::{Crc32, CrcValidation};
use crate::error::{Error, Result};
use crate::slice_reader::{read_bitfield, SliceReader};
use modular_bitfield_msb::prelude::*;
use std::rc::Rc;

/// Table id reserved by DVB for the stuffing table; uses short-form framing
/// regardless of the `section_syntax_indicator` bit.
pub const TID_STUFFING: u8 = 0x72;

/// Maximum section size for a "standard" (non-private) section.
pub const MAX_SECTION_SIZE: usize = 1021;
/// Maximum section size for a private section.
pub const MAX_PRIVATE_SECTION_SIZE: usize = 4093;

/// Splits `payload` into chunks of at most `max_chunk` bytes, at arbitrary
/// byte boundaries. Used by tables whose `deserialize` concatenates all
/// section payloads before parsing, so a table that doesn't fit in one
/// section can be serialized by simply cutting its payload wherever it
/// reaches the cap. Always yields at least one (possibly empty) chunk.
pub(crate) fn split_payload(payload: &[u8], max_chunk: usize) -> Vec<&[u8]> {
    if payload.is_empty() {
        return vec![&[]];
    }
    payload.chunks(max_chunk.max(1)).collect()
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectionHeader {
    pub table_id: B8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub reserved: B2,
    pub section_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
pub(crate) struct LongSectionSyntax {
    pub table_id_extension: B16,
    pub reserved: B2,
    pub version_number: B5,
    pub current_next_indicator: bool,
    pub section_number: B8,
    pub last_section_number: B8,
}

/// One complete PSI/SI section, long or short.
///
/// Offsets into `bytes` used by mutators below are fixed by the section
/// header layout: `[0]`=tid, `[1..3]` carries syntax/private bits + length,
/// `[3..5]`=tid_extension (long only), `[5]`=version/current-next,
/// `[6]`=section_number, `[7]`=last_section_number, last 4 bytes = CRC32.
#[derive(Debug, Clone)]
pub struct Section {
    bytes: Rc<Vec<u8>>,
    is_long: bool,
    is_valid: bool,
}

impl Section {
    fn header(&self) -> SectionHeader {
        let mut b = [0u8; 3];
        b.copy_from_slice(&self.bytes[0..3]);
        SectionHeader::from_bytes(b)
    }

    fn syntax(&self) -> Option<LongSectionSyntax> {
        if !self.is_long {
            return None;
        }
        let mut b = [0u8; 5];
        b.copy_from_slice(&self.bytes[3..8]);
        Some(LongSectionSyntax::from_bytes(b))
    }

    /// Probes a 3-byte section prefix to determine if it starts a long section.
    ///
    /// True iff `section_syntax_indicator` is set *and* the table id is not
    /// the DVB Stuffing Table, which uses short-form framing unconditionally.
    pub fn start_long_section(prefix: &[u8; 3]) -> bool {
        let header = SectionHeader::from_bytes(*prefix);
        header.section_syntax_indicator() && header.table_id() != TID_STUFFING
    }

    /// Constructs a `Section` from a complete byte slice.
    ///
    /// Fails when: total size too small, `3 + section_length`
    /// disagreeing with the slice length, long-section fields inconsistent,
    /// or (when requested) a failing CRC check.
    pub fn from_bytes(data: &[u8], crc_mode: CrcValidation) -> Result<Self> {
        if data.len() < 5 {
            return Err(Error::TruncatedSection);
        }
        let mut header_bytes = [0u8; 3];
        header_bytes.copy_from_slice(&data[0..3]);
        let header = SectionHeader::from_bytes(header_bytes);
        let total_size = 3 + header.section_length() as usize;
        if total_size != data.len() {
            return Err(Error::BadSectionLength);
        }
        let cap = if header.private_indicator() {
            MAX_PRIVATE_SECTION_SIZE
        } else {
            MAX_SECTION_SIZE
        };
        if total_size > cap {
            return Err(Error::SectionTooLarge);
        }

        let is_long = Self::start_long_section(&header_bytes);
        if is_long {
            if total_size < 8 + 4 {
                return Err(Error::TruncatedSection);
            }
            let mut syntax_bytes = [0u8; 5];
            syntax_bytes.copy_from_slice(&data[3..8]);
            let syntax = LongSectionSyntax::from_bytes(syntax_bytes);
            if syntax.section_number() > syntax.last_section_number() {
                return Err(Error::InvalidField("section_number > last_section_number"));
            }
        }

        let mut section = Section {
            bytes: Rc::new(data.to_vec()),
            is_long,
            is_valid: true,
        };

        if is_long {
            match crc_mode {
                CrcValidation::Ignore => {}
                CrcValidation::Check => {
                    if !section.crc_is_valid() {
                        section.is_valid = false;
                        return Err(Error::BadCrc);
                    }
                }
                CrcValidation::Compute => section.recompute_crc(),
            }
        }

        Ok(section)
    }

    fn crc_is_valid(&self) -> bool {
        let n = self.bytes.len();
        let expected = Crc32::of(&self.bytes[..n - 4]);
        let actual = u32::from_be_bytes([
            self.bytes[n - 4],
            self.bytes[n - 3],
            self.bytes[n - 2],
            self.bytes[n - 1],
        ]);
        expected == actual
    }

    fn recompute_crc(&mut self) {
        let n = self.bytes.len();
        let crc = Crc32::of(&self.bytes[..n - 4]);
        let bytes = Rc::make_mut(&mut self.bytes);
        bytes[n - 4..].copy_from_slice(&crc.to_be_bytes());
    }

    /// Builds a short section (no version/CRC) from its table id and payload.
    pub fn new_short(table_id: u8, is_private: bool, payload: &[u8]) -> Result<Self> {
        let total_size = 3 + payload.len();
        let cap = if is_private {
            MAX_PRIVATE_SECTION_SIZE
        } else {
            MAX_SECTION_SIZE
        };
        if total_size > cap {
            return Err(Error::SectionTooLarge);
        }
        let mut header = SectionHeader::new();
        header.set_table_id(table_id);
        header.set_section_syntax_indicator(false);
        header.set_private_indicator(is_private);
        header.set_section_length(payload.len() as u16);
        let mut bytes = header.into_bytes().to_vec();
        bytes.extend_from_slice(payload);
        Ok(Section {
            bytes: Rc::new(bytes),
            is_long: false,
            is_valid: true,
        })
    }

    /// Builds a long section (version, current/next, section numbering, CRC)
    /// from its semantic parts. The CRC32 is computed automatically.
    #[allow(clippy::too_many_arguments)]
    pub fn new_long(
        table_id: u8,
        is_private: bool,
        table_id_extension: u16,
        version: u8,
        is_current: bool,
        section_number: u8,
        last_section_number: u8,
        payload: &[u8],
    ) -> Result<Self> {
        if version > 31 {
            return Err(Error::InvalidField("version > 31"));
        }
        if section_number > last_section_number {
            return Err(Error::InvalidField("section_number > last_section_number"));
        }
        let total_size = 3 + 5 + payload.len() + 4;
        let cap = if is_private {
            MAX_PRIVATE_SECTION_SIZE
        } else {
            MAX_SECTION_SIZE
        };
        if total_size > cap {
            return Err(Error::SectionTooLarge);
        }

        let mut header = SectionHeader::new();
        header.set_table_id(table_id);
        header.set_section_syntax_indicator(table_id != TID_STUFFING);
        header.set_private_indicator(is_private);
        header.set_section_length((total_size - 3) as u16);

        let mut syntax = LongSectionSyntax::new();
        syntax.set_table_id_extension(table_id_extension);
        syntax.set_version_number(version);
        syntax.set_current_next_indicator(is_current);
        syntax.set_section_number(section_number);
        syntax.set_last_section_number(last_section_number);

        let mut bytes = header.into_bytes().to_vec();
        bytes.extend_from_slice(&syntax.into_bytes());
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0u8; 4]);

        let mut section = Section {
            bytes: Rc::new(bytes),
            is_long: true,
            is_valid: true,
        };
        section.recompute_crc();
        Ok(section)
    }

    /// Reads one section from a seekable byte stream reader, starting at the
    /// 3-byte short header and consuming the remaining declared bytes.
    pub fn from_reader(reader: &mut SliceReader) -> Result<Self> {
        let header_bytes = reader.read_array_ref::<3>()?;
        let header = SectionHeader::from_bytes(header_bytes);
        let remaining = header.section_length() as usize;
        let rest = reader.read(remaining)?;
        let mut full = header_bytes.to_vec();
        full.extend_from_slice(rest);
        Self::from_bytes(&full, CrcValidation::Check)
    }

    /// Raw section bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total size in bytes: `3 + section_length`.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Table id.
    pub fn table_id(&self) -> u8 {
        self.bytes[0]
    }

    /// Whether the private-section bit is set.
    pub fn is_private(&self) -> bool {
        self.header().private_indicator()
    }

    /// True if this section carries long-form syntax (version/CRC/etc).
    pub fn is_long_section(&self) -> bool {
        self.is_long
    }

    /// Whether the section passed its most recent CRC validation (always
    /// `true` for short sections, which carry no CRC).
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Table id extension (long sections only).
    pub fn table_id_extension(&self) -> Option<u16> {
        self.syntax().map(|s| s.table_id_extension())
    }

    /// Version number 0..=31 (long sections only).
    pub fn version(&self) -> Option<u8> {
        self.syntax().map(|s| s.version_number())
    }

    /// Current/next indicator (long sections only).
    pub fn is_current(&self) -> Option<bool> {
        self.syntax().map(|s| s.current_next_indicator())
    }

    /// Section number within its table (long sections only).
    pub fn section_number(&self) -> Option<u8> {
        self.syntax().map(|s| s.section_number())
    }

    /// Last section number within its table (long sections only).
    pub fn last_section_number(&self) -> Option<u8> {
        self.syntax().map(|s| s.last_section_number())
    }

    /// Payload bytes: after the header(s), before the trailing CRC if any.
    pub fn payload(&self) -> &[u8] {
        let start = if self.is_long { 8 } else { 3 };
        let end = if self.is_long {
            self.bytes.len() - 4
        } else {
            self.bytes.len()
        };
        &self.bytes[start..end]
    }

    /// True iff the payload is not a single repeated byte value (used to
    /// skip stuffing sections).
    pub fn has_diversified_payload(&self) -> bool {
        let payload = self.payload();
        match payload.first() {
            None => false,
            Some(&first) => payload.iter().any(|&b| b != first),
        }
    }

    fn bytes_mut(&mut self) -> &mut Vec<u8> {
        Rc::make_mut(&mut self.bytes)
    }

    /// Sets the version number (long sections only) and recomputes the CRC.
    pub fn set_version(&mut self, version: u8) -> Result<()> {
        if !self.is_long {
            return Err(Error::InvalidField("set_version on short section"));
        }
        if version > 31 {
            return Err(Error::InvalidField("version > 31"));
        }
        let mut syntax = self.syntax().unwrap();
        syntax.set_version_number(version);
        self.bytes_mut()[3..8].copy_from_slice(&syntax.into_bytes());
        self.recompute_crc();
        Ok(())
    }

    /// Sets the current/next indicator (long sections only) and recomputes the CRC.
    pub fn set_is_current(&mut self, is_current: bool) -> Result<()> {
        if !self.is_long {
            return Err(Error::InvalidField("set_is_current on short section"));
        }
        let mut syntax = self.syntax().unwrap();
        syntax.set_current_next_indicator(is_current);
        self.bytes_mut()[3..8].copy_from_slice(&syntax.into_bytes());
        self.recompute_crc();
        Ok(())
    }

    /// Sets the section number (long sections only) and recomputes the CRC.
    pub fn set_section_number(&mut self, section_number: u8) -> Result<()> {
        if !self.is_long {
            return Err(Error::InvalidField("set_section_number on short section"));
        }
        let mut syntax = self.syntax().unwrap();
        if section_number > syntax.last_section_number() {
            return Err(Error::InvalidField("section_number > last_section_number"));
        }
        syntax.set_section_number(section_number);
        self.bytes_mut()[3..8].copy_from_slice(&syntax.into_bytes());
        self.recompute_crc();
        Ok(())
    }

    /// Sets the last section number (long sections only) and recomputes the CRC.
    pub fn set_last_section_number(&mut self, last_section_number: u8) -> Result<()> {
        if !self.is_long {
            return Err(Error::InvalidField(
                "set_last_section_number on short section",
            ));
        }
        let mut syntax = self.syntax().unwrap();
        syntax.set_last_section_number(last_section_number);
        self.bytes_mut()[3..8].copy_from_slice(&syntax.into_bytes());
        self.recompute_crc();
        Ok(())
    }

    fn payload_offset(&self) -> usize {
        if self.is_long {
            8
        } else {
            3
        }
    }

    /// Patches one payload byte in place at `offset` (relative to payload start).
    pub fn set_uint8(&mut self, offset: usize, value: u8) -> Result<()> {
        let abs = self.payload_offset() + offset;
        if abs >= self.bytes.len() {
            return Err(Error::PacketOverrun(1));
        }
        self.bytes_mut()[abs] = value;
        if self.is_long {
            self.recompute_crc();
        }
        Ok(())
    }

    /// Patches a big-endian 16-bit payload field in place at `offset`.
    pub fn set_uint16(&mut self, offset: usize, value: u16) -> Result<()> {
        let abs = self.payload_offset() + offset;
        if abs + 2 > self.bytes.len() {
            return Err(Error::PacketOverrun(2));
        }
        self.bytes_mut()[abs..abs + 2].copy_from_slice(&value.to_be_bytes());
        if self.is_long {
            self.recompute_crc();
        }
        Ok(())
    }

    /// Appends bytes to the payload, updating `section_length` (and, for long
    /// sections, the trailing CRC) to match.
    pub fn append_payload(&mut self, data: &[u8]) -> Result<()> {
        let cap = if self.is_private() {
            MAX_PRIVATE_SECTION_SIZE
        } else {
            MAX_SECTION_SIZE
        };
        if self.bytes.len() + data.len() > cap {
            return Err(Error::SectionTooLarge);
        }
        let insert_at = if self.is_long {
            self.bytes.len() - 4
        } else {
            self.bytes.len()
        };
        {
            let bytes = self.bytes_mut();
            for (i, &b) in data.iter().enumerate() {
                bytes.insert(insert_at + i, b);
            }
        }
        let new_len = self.bytes.len();
        let mut header = self.header();
        header.set_section_length((new_len - 3) as u16);
        self.bytes_mut()[0..3].copy_from_slice(&header.into_bytes());
        if self.is_long {
            self.recompute_crc();
        }
        Ok(())
    }
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}
impl Eq for Section {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_section_round_trip() {
        let s = Section::new_short(0x72, false, &[0xFF, 0xFF]).unwrap();
        assert_eq!(s.size(), 5);
        assert!(!s.is_long_section());
        assert!(s.is_valid());
    }

    #[test]
    fn long_section_crc_round_trip() {
        let s = Section::new_long(0x00, false, 0x1234, 5, true, 0, 0, &[0xAA, 0xBB]).unwrap();
        let n = s.size();
        let crc = u32::from_be_bytes([
            s.bytes()[n - 4],
            s.bytes()[n - 3],
            s.bytes()[n - 2],
            s.bytes()[n - 1],
        ]);
        assert_eq!(crc, Crc32::of(&s.bytes()[..n - 4]));
        assert_eq!(s.size(), 3 + s.bytes()[2] as usize);
    }

    #[test]
    fn round_trip_through_from_bytes() {
        let s = Section::new_long(0x00, false, 0x1234, 5, true, 0, 0, &[0xAA, 0xBB]).unwrap();
        let reparsed = Section::from_bytes(s.bytes(), CrcValidation::Check).unwrap();
        assert_eq!(s, reparsed);
    }

    #[test]
    fn bad_crc_is_rejected() {
        let s = Section::new_long(0x00, false, 0x1234, 5, true, 0, 0, &[0xAA, 0xBB]).unwrap();
        let mut bytes = s.bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = Section::from_bytes(&bytes, CrcValidation::Check).unwrap_err();
        assert_eq!(err, Error::BadCrc);
    }

    #[test]
    fn rejects_section_number_over_last() {
        let err = Section::new_long(0x00, false, 0, 0, true, 2, 1, &[]).unwrap_err();
        assert_eq!(err, Error::InvalidField("section_number > last_section_number"));
    }

    #[test]
    fn stuffing_table_is_always_short_form() {
        let mut prefix = [0u8; 3];
        let mut header = SectionHeader::new();
        header.set_table_id(TID_STUFFING);
        header.set_section_syntax_indicator(true);
        header.set_section_length(0);
        prefix.copy_from_slice(&header.into_bytes());
        assert!(!Section::start_long_section(&prefix));
    }

    #[test]
    fn mutator_recomputes_crc() {
        let mut s = Section::new_long(0x00, false, 0x1234, 5, true, 0, 0, &[0xAA, 0xBB]).unwrap();
        s.set_version(7).unwrap();
        assert_eq!(s.version(), Some(7));
        assert!(s.crc_is_valid());
    }

    #[test]
    fn has_diversified_payload_detects_stuffing() {
        let stuffing = Section::new_short(TID_STUFFING, false, &[0xFF, 0xFF, 0xFF]).unwrap();
        assert!(!stuffing.has_diversified_payload());
        let pat = Section::new_long(0x00, false, 1, 0, true, 0, 0, &[0x00, 0x01]).unwrap();
        assert!(pat.has_diversified_payload());
    }
}
