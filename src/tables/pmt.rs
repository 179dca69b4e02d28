//! Program Map Table (ISO/IEC 13818-1 §2.4.4.8).

use super::TID_PMT;
use crate::descriptor::DescriptorList;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{split_payload, Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::{descriptors_from_xml, descriptors_to_xml, Element};
use modular_bitfield_msb::prelude::*;

/// PID value meaning "this program has no PCR of its own".
pub const PCR_PID_NONE: u16 = 0x1FFF;

/// Payload budget per section once the long-section header/CRC overhead is
/// subtracted; the program header, descriptors, and stream loop are all
/// concatenated before parsing, so the payload can be cut at any byte
/// boundary when it doesn't fit in one section.
const PAYLOAD_BUDGET: usize = MAX_SECTION_SIZE - 3 - 5 - 4;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PmtHeader {
    reserved1: B3,
    pcr_pid: B13,
    reserved2: B4,
    program_info_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct StreamHeader {
    stream_type: B8,
    reserved1: B3,
    elementary_pid: B13,
    reserved2: B4,
    es_info_length: B12,
}

/// One elementary stream entry in a PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: DescriptorList,
}

/// Typed Program Map Table.
#[derive(Debug, Clone, PartialEq)]
pub struct Pmt {
    pub program_number: u16,
    pub version: u8,
    pub is_current: bool,
    pub pcr_pid: u16,
    pub program_descriptors: DescriptorList,
    pub streams: Vec<ElementaryStream>,
}

impl Pmt {
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        if table.table_id() != TID_PMT {
            return Err(Error::InvalidField("not a PMT"));
        }
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete PMT table"));
        }
        let mut payload = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("PMT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            payload.extend_from_slice(section.payload());
        }
        if payload.len() < 4 {
            return Err(Error::TruncatedSection);
        }
        let mut header_bytes = [0u8; 4];
        header_bytes.copy_from_slice(&payload[0..4]);
        let header = PmtHeader::from_bytes(header_bytes);
        let program_info_length = header.program_info_length() as usize;
        let mut rest = &payload[4..];
        if rest.len() < program_info_length {
            return Err(Error::TruncatedSection);
        }
        let program_descriptors = DescriptorList::from_bytes(&rest[..program_info_length])?;
        rest = &rest[program_info_length..];

        let mut streams = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 5 {
                return Err(Error::TruncatedSection);
            }
            let mut stream_header_bytes = [0u8; 5];
            stream_header_bytes.copy_from_slice(&rest[0..5]);
            let stream_header = StreamHeader::from_bytes(stream_header_bytes);
            let es_info_length = stream_header.es_info_length() as usize;
            rest = &rest[5..];
            if rest.len() < es_info_length {
                return Err(Error::TruncatedSection);
            }
            let descriptors = DescriptorList::from_bytes(&rest[..es_info_length])?;
            rest = &rest[es_info_length..];
            streams.push(ElementaryStream {
                stream_type: stream_header.stream_type(),
                elementary_pid: stream_header.elementary_pid(),
                descriptors,
            });
        }

        Ok(Pmt {
            program_number: table.table_id_extension(),
            version,
            is_current,
            pcr_pid: header.pcr_pid(),
            program_descriptors,
            streams,
        })
    }

    /// Serializes this PMT, splitting across sections so each stays within
    /// the standard 1024-byte section cap.
    pub fn serialize(&self) -> Result<BinaryTable> {
        let mut payload = Vec::new();
        let mut header = PmtHeader::new();
        header.set_pcr_pid(self.pcr_pid);
        header.set_program_info_length(self.program_descriptors.binary_size() as u16);
        payload.extend_from_slice(&header.into_bytes());
        self.program_descriptors.serialize(&mut payload);
        for stream in &self.streams {
            let mut stream_header = StreamHeader::new();
            stream_header.set_stream_type(stream.stream_type);
            stream_header.set_elementary_pid(stream.elementary_pid);
            stream_header.set_es_info_length(stream.descriptors.binary_size() as u16);
            payload.extend_from_slice(&stream_header.into_bytes());
            stream.descriptors.serialize(&mut payload);
        }
        let chunks = split_payload(&payload, PAYLOAD_BUDGET);
        let last = (chunks.len() - 1) as u8;
        let mut table = BinaryTable::new(TID_PMT, self.program_number, self.version, 0);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let section = Section::new_long(
                TID_PMT,
                false,
                self.program_number,
                self.version,
                self.is_current,
                i as u8,
                last,
                chunk,
            )?;
            table.add_section(section, true)?;
        }
        Ok(table)
    }

    /// Finds the elementary stream carrying `pid`, if any.
    pub fn stream_for_pid(&self, pid: u16) -> Option<&ElementaryStream> {
        self.streams.iter().find(|s| s.elementary_pid == pid)
    }

    pub fn display(&self) -> String {
        let name = super::xml_name(TID_PMT, self.pcr_pid, Standards::ALL);
        let mut out = format!(
            "{name}: program={:#06x} version={} pcr_pid={:#06x}\n",
            self.program_number, self.version, self.pcr_pid
        );
        for s in &self.streams {
            out += &format!(
                "  stream_type={:#04x} pid={:#06x} descriptors={}\n",
                s.stream_type,
                s.elementary_pid,
                s.descriptors.len()
            );
        }
        out
    }

    /// Renders this PMT as XML, using the registered XML name for `PMT`.
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(TID_PMT, self.pcr_pid, Standards::ALL);
        let mut element = Element::new(name)
            .with_hex_attr("program_number", self.program_number as u32, 4)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current)
            .with_hex_attr("PCR_PID", self.pcr_pid as u32, 4)
            .with_children(descriptors_to_xml(&self.program_descriptors));
        for stream in &self.streams {
            element = element.with_child(
                Element::new("component")
                    .with_hex_attr("stream_type", stream.stream_type as u32, 2)
                    .with_hex_attr("elementary_PID", stream.elementary_pid as u32, 4)
                    .with_children(descriptors_to_xml(&stream.descriptors)),
            );
        }
        element.to_xml_string()
    }

    /// Parses a PMT from the XML produced by [`Pmt::to_xml`].
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        let program_descriptors = descriptors_from_xml(&element)?;
        let mut streams = Vec::new();
        for child in element.children_named("component") {
            streams.push(ElementaryStream {
                stream_type: child.attr_u8("stream_type")?,
                elementary_pid: child.attr_u16("elementary_PID")?,
                descriptors: descriptors_from_xml(child)?,
            });
        }
        Ok(Pmt {
            program_number: element.attr_u16("program_number")?,
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            pcr_pid: element.attr_u16("PCR_PID")?,
            program_descriptors,
            streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn sample() -> Pmt {
        let mut program_descriptors = DescriptorList::new();
        program_descriptors.add(Descriptor::new(0x09, &[0x00, 0x01]).unwrap());
        let mut video_descriptors = DescriptorList::new();
        video_descriptors.add(Descriptor::new(0x52, &[0x01]).unwrap());
        Pmt {
            program_number: 0x0001,
            version: 2,
            is_current: true,
            pcr_pid: 0x0100,
            program_descriptors,
            streams: vec![
                ElementaryStream {
                    stream_type: 0x02,
                    elementary_pid: 0x0100,
                    descriptors: video_descriptors,
                },
                ElementaryStream {
                    stream_type: 0x04,
                    elementary_pid: 0x0101,
                    descriptors: DescriptorList::new(),
                },
            ],
        }
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let pmt = sample();
        let table = pmt.serialize().unwrap();
        let reparsed = Pmt::deserialize(&table).unwrap();
        assert_eq!(pmt, reparsed);
    }

    #[test]
    fn stream_for_pid_finds_elementary_stream() {
        let pmt = sample();
        assert_eq!(pmt.stream_for_pid(0x0101).unwrap().stream_type, 0x04);
        assert!(pmt.stream_for_pid(0x9999).is_none());
    }

    #[test]
    fn no_pcr_sentinel_round_trips() {
        let mut pmt = sample();
        pmt.pcr_pid = PCR_PID_NONE;
        let table = pmt.serialize().unwrap();
        let reparsed = Pmt::deserialize(&table).unwrap();
        assert_eq!(reparsed.pcr_pid, PCR_PID_NONE);
    }

    #[test]
    fn xml_round_trips() {
        let pmt = sample();
        let xml = pmt.to_xml();
        assert!(xml.starts_with("<PMT"));
        let reparsed = Pmt::from_xml(&xml).unwrap();
        assert_eq!(pmt, reparsed);
    }

    #[test]
    fn splits_oversized_stream_loop_across_sections() {
        let mut streams = Vec::new();
        for i in 0..150u16 {
            let mut descriptors = DescriptorList::new();
            descriptors
                .add(Descriptor::new(0x52, &[(i >> 8) as u8, i as u8]).unwrap());
            streams.push(ElementaryStream {
                stream_type: 0x02,
                elementary_pid: 0x0100 + i,
                descriptors,
            });
        }
        let pmt = Pmt {
            program_number: 0x0001,
            version: 1,
            is_current: true,
            pcr_pid: 0x0100,
            program_descriptors: DescriptorList::new(),
            streams,
        };
        let table = pmt.serialize().unwrap();
        assert!(table.section_count() > 1);
        assert!(table.is_complete());
        let reparsed = Pmt::deserialize(&table).unwrap();
        assert_eq!(pmt, reparsed);
    }
}
