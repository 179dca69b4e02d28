//! Tag-length-value syntax description and autolocation.
//!
//! A [`TlvSyntax`] describes how a TLV-structured private data area is laid
//! out: tag/length field widths, byte order, and where in a larger buffer
//! the area starts. When the start offset is not known in advance, autolocation
//! scans for the longest run of back-to-back well-formed TLV records and
//! treats that as the area.

use crate::error::{Error, Result};

/// Width, in bytes, of a TLV tag or length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSize {
    One,
    Two,
    Four,
}

impl FieldSize {
    fn bytes(self) -> usize {
        match self {
            FieldSize::One => 1,
            FieldSize::Two => 2,
            FieldSize::Four => 4,
        }
    }
}

/// Describes one TLV record's tag/length layout and, optionally, a fixed
/// location within a larger buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvSyntax {
    /// Fixed start offset, or `None` to autolocate.
    pub start: Option<usize>,
    /// Fixed area size, or `None` to take as much as parses cleanly.
    pub size: Option<usize>,
    pub tag_size: FieldSize,
    pub length_size: FieldSize,
    pub msb_first: bool,
}

impl TlvSyntax {
    pub fn new(tag_size: FieldSize, length_size: FieldSize, msb_first: bool) -> Self {
        Self {
            start: None,
            size: None,
            tag_size,
            length_size,
            msb_first,
        }
    }

    fn get_int(&self, data: &[u8], size: FieldSize) -> u32 {
        match (size, self.msb_first) {
            (FieldSize::One, _) => data[0] as u32,
            (FieldSize::Two, true) => u16::from_be_bytes([data[0], data[1]]) as u32,
            (FieldSize::Two, false) => u16::from_le_bytes([data[0], data[1]]) as u32,
            (FieldSize::Four, true) => u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            (FieldSize::Four, false) => u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        }
    }

    /// Reads one `(tag, length)` pair at the front of `data`, returning the
    /// header size consumed, or `0` if the header or its declared value
    /// field does not fit.
    fn tag_and_length(&self, data: &[u8]) -> (u32, usize, usize) {
        let header_size = self.tag_size.bytes() + self.length_size.bytes();
        if data.len() < header_size {
            return (0, 0, 0);
        }
        let tag = self.get_int(data, self.tag_size);
        let length = self.get_int(&data[self.tag_size.bytes()..], self.length_size) as usize;
        if data.len() - header_size < length {
            (tag, length, 0)
        } else {
            (tag, length, header_size)
        }
    }

    /// Length of the longest run of back-to-back well-formed TLV records
    /// starting exactly at `data[start..]`.
    fn longest_tlv(&self, data: &[u8], start: usize) -> usize {
        let header_size = self.tag_size.bytes() + self.length_size.bytes();
        let mut index = start;
        while index + header_size <= data.len() {
            let (_tag, length, consumed) = self.tag_and_length(&data[index..]);
            if consumed == 0 {
                break;
            }
            let next = index + header_size + length;
            if next > data.len() {
                break;
            }
            index = next;
        }
        index - start
    }

    /// Locates the TLV area inside `data`, returning `(start, size)`.
    ///
    /// With both `start` and `size` fixed, just validates they fit. With
    /// only `start` fixed, extends as far as TLV records parse cleanly. With
    /// neither fixed, scans every offset and keeps the longest match.
    pub fn locate(&self, data: &[u8]) -> Result<(usize, usize)> {
        match (self.start, self.size) {
            (Some(start), Some(size)) => {
                if start + size > data.len() {
                    Err(Error::TruncatedSection)
                } else {
                    Ok((start, size))
                }
            }
            (Some(start), None) => {
                if start > data.len() {
                    return Err(Error::TruncatedSection);
                }
                let size = self.longest_tlv(data, start);
                if size == 0 {
                    Err(Error::InvalidField("no TLV records at fixed start"))
                } else {
                    Ok((start, size))
                }
            }
            (None, _) => {
                let mut best_start = 0;
                let mut best_size = 0;
                for index in 0..data.len() {
                    let size = self.longest_tlv(data, index);
                    if size > best_size {
                        best_start = index;
                        best_size = size;
                    }
                }
                if best_size == 0 {
                    Err(Error::InvalidField("no TLV area found"))
                } else {
                    Ok((best_start, best_size))
                }
            }
        }
    }

    /// Iterates `(tag, value)` pairs over the located TLV area of `data`.
    pub fn records<'a>(&self, data: &'a [u8]) -> Result<Vec<(u32, &'a [u8])>> {
        let (start, size) = self.locate(data)?;
        let header_size = self.tag_size.bytes() + self.length_size.bytes();
        let mut out = Vec::new();
        let mut index = start;
        let end = start + size;
        while index + header_size <= end {
            let (tag, length, consumed) = self.tag_and_length(&data[index..end]);
            if consumed == 0 {
                break;
            }
            let value_start = index + header_size;
            out.push((tag, &data[value_start..value_start + length]));
            index = value_start + length;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autolocates_the_longest_consistent_run() {
        // Junk byte, then two clean 1+1 TLV records, then a third truncated.
        let mut data = vec![0xAA];
        data.extend_from_slice(&[0x01, 0x02, 0xDE, 0xAD]);
        data.extend_from_slice(&[0x02, 0x01, 0xFF]);
        let syntax = TlvSyntax::new(FieldSize::One, FieldSize::One, true);
        let (start, size) = syntax.locate(&data).unwrap();
        assert_eq!(start, 1);
        assert_eq!(size, 7);
    }

    #[test]
    fn fixed_start_reads_records_msb() {
        let data = [0x00, 0x10, 0x00, 0x02, 0xBE, 0xEF];
        let syntax = TlvSyntax {
            start: Some(0),
            size: None,
            tag_size: FieldSize::Two,
            length_size: FieldSize::Two,
            msb_first: true,
        };
        let records = syntax.records(&data).unwrap();
        assert_eq!(records, vec![(0x0010, &[0xBE, 0xEF][..])]);
    }

    #[test]
    fn fixed_area_too_small_is_an_error() {
        let syntax = TlvSyntax {
            start: Some(0),
            size: Some(100),
            tag_size: FieldSize::One,
            length_size: FieldSize::One,
            msb_first: true,
        };
        assert!(syntax.locate(&[0x01, 0x02]).is_err());
    }
}
