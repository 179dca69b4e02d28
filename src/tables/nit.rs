//! Network Information Table (DVB EN 300 468 §5.2.1).

use super::{PID_NIT, TID_NIT_ACTUAL, TID_NIT_OTHER};
use crate::descriptor::DescriptorList;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{split_payload, Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::{descriptors_from_xml, descriptors_to_xml, Element};
use modular_bitfield_msb::prelude::*;

/// Payload budget per section once the long-section header/CRC overhead is
/// subtracted; the network-descriptor and transport-stream loops are
/// concatenated before parsing, so the payload can be cut at any byte
/// boundary when it doesn't fit in one section.
const PAYLOAD_BUDGET: usize = MAX_SECTION_SIZE - 3 - 5 - 4;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct NetworkDescriptorsHeader {
    reserved_future_use: B4,
    network_descriptors_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct TsLoopHeader {
    reserved_future_use: B4,
    transport_stream_loop_length: B12,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct TsEntryHeader {
    transport_stream_id: B16,
    original_network_id: B16,
    reserved_future_use: B4,
    transport_descriptors_length: B12,
}

/// One transport stream entry in a NIT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamEntry {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: DescriptorList,
}

/// Typed Network Information Table. `is_actual` distinguishes the network
/// this transport stream belongs to from a neighboring `NIT other`.
#[derive(Debug, Clone, PartialEq)]
pub struct Nit {
    pub is_actual: bool,
    pub network_id: u16,
    pub version: u8,
    pub is_current: bool,
    pub network_descriptors: DescriptorList,
    pub transport_streams: Vec<TransportStreamEntry>,
}

impl Nit {
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        let is_actual = match table.table_id() {
            TID_NIT_ACTUAL => true,
            TID_NIT_OTHER => false,
            _ => return Err(Error::InvalidField("not a NIT")),
        };
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete NIT table"));
        }
        let mut payload = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("NIT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            payload.extend_from_slice(section.payload());
        }

        if payload.len() < 2 {
            return Err(Error::TruncatedSection);
        }
        let mut nd_header_bytes = [0u8; 2];
        nd_header_bytes.copy_from_slice(&payload[0..2]);
        let nd_header = NetworkDescriptorsHeader::from_bytes(nd_header_bytes);
        let nd_len = nd_header.network_descriptors_length() as usize;
        let mut rest = &payload[2..];
        if rest.len() < nd_len {
            return Err(Error::TruncatedSection);
        }
        let network_descriptors = DescriptorList::from_bytes(&rest[..nd_len])?;
        rest = &rest[nd_len..];

        if rest.len() < 2 {
            return Err(Error::TruncatedSection);
        }
        let mut ts_loop_header_bytes = [0u8; 2];
        ts_loop_header_bytes.copy_from_slice(&rest[0..2]);
        let ts_loop_len = TsLoopHeader::from_bytes(ts_loop_header_bytes).transport_stream_loop_length() as usize;
        rest = &rest[2..];
        if rest.len() < ts_loop_len {
            return Err(Error::TruncatedSection);
        }
        let mut loop_bytes = &rest[..ts_loop_len];

        let mut transport_streams = Vec::new();
        while !loop_bytes.is_empty() {
            if loop_bytes.len() < 6 {
                return Err(Error::TruncatedSection);
            }
            let mut header_bytes = [0u8; 6];
            header_bytes.copy_from_slice(&loop_bytes[0..6]);
            let header = TsEntryHeader::from_bytes(header_bytes);
            let desc_len = header.transport_descriptors_length() as usize;
            loop_bytes = &loop_bytes[6..];
            if loop_bytes.len() < desc_len {
                return Err(Error::TruncatedSection);
            }
            let descriptors = DescriptorList::from_bytes(&loop_bytes[..desc_len])?;
            loop_bytes = &loop_bytes[desc_len..];
            transport_streams.push(TransportStreamEntry {
                transport_stream_id: header.transport_stream_id(),
                original_network_id: header.original_network_id(),
                descriptors,
            });
        }

        Ok(Nit {
            is_actual,
            network_id: table.table_id_extension(),
            version,
            is_current,
            network_descriptors,
            transport_streams,
        })
    }

    pub fn serialize(&self) -> Result<BinaryTable> {
        let table_id = if self.is_actual {
            TID_NIT_ACTUAL
        } else {
            TID_NIT_OTHER
        };

        let mut nd_header = NetworkDescriptorsHeader::new();
        nd_header.set_reserved_future_use(0xF);
        nd_header.set_network_descriptors_length(self.network_descriptors.binary_size() as u16);
        let mut payload = nd_header.into_bytes().to_vec();
        self.network_descriptors.serialize(&mut payload);

        let mut ts_loop_body = Vec::new();
        for ts in &self.transport_streams {
            let mut header = TsEntryHeader::new();
            header.set_transport_stream_id(ts.transport_stream_id);
            header.set_original_network_id(ts.original_network_id);
            header.set_reserved_future_use(0xF);
            header.set_transport_descriptors_length(ts.descriptors.binary_size() as u16);
            ts_loop_body.extend_from_slice(&header.into_bytes());
            ts.descriptors.serialize(&mut ts_loop_body);
        }
        let mut ts_loop_header = TsLoopHeader::new();
        ts_loop_header.set_reserved_future_use(0xF);
        ts_loop_header.set_transport_stream_loop_length(ts_loop_body.len() as u16);
        payload.extend_from_slice(&ts_loop_header.into_bytes());
        payload.extend_from_slice(&ts_loop_body);

        let chunks = split_payload(&payload, PAYLOAD_BUDGET);
        let last = (chunks.len() - 1) as u8;
        let mut table = BinaryTable::new(table_id, self.network_id, self.version, PID_NIT);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let section = Section::new_long(
                table_id,
                false,
                self.network_id,
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

    pub fn transport_stream(&self, transport_stream_id: u16) -> Option<&TransportStreamEntry> {
        self.transport_streams
            .iter()
            .find(|t| t.transport_stream_id == transport_stream_id)
    }

    fn table_id(&self) -> u8 {
        if self.is_actual {
            TID_NIT_ACTUAL
        } else {
            TID_NIT_OTHER
        }
    }

    pub fn display(&self) -> String {
        let name = super::xml_name(self.table_id(), PID_NIT, Standards::DVB);
        let mut out = format!(
            "{name}: network_id={:#06x} version={}\n",
            self.network_id, self.version
        );
        for ts in &self.transport_streams {
            out += &format!(
                "  ts_id={:#06x} onid={:#06x} descriptors={}\n",
                ts.transport_stream_id,
                ts.original_network_id,
                ts.descriptors.len()
            );
        }
        out
    }

    /// Renders this NIT as XML, using the registered XML name (`NIT` or
    /// `NIT-other`, matching `is_actual`).
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(self.table_id(), PID_NIT, Standards::DVB);
        let mut element = Element::new(name)
            .with_hex_attr("network_id", self.network_id as u32, 4)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current)
            .with_children(descriptors_to_xml(&self.network_descriptors));
        for ts in &self.transport_streams {
            element = element.with_child(
                Element::new("transport_stream")
                    .with_hex_attr("transport_stream_id", ts.transport_stream_id as u32, 4)
                    .with_hex_attr("original_network_id", ts.original_network_id as u32, 4)
                    .with_children(descriptors_to_xml(&ts.descriptors)),
            );
        }
        element.to_xml_string()
    }

    /// Parses a NIT from the XML produced by [`Nit::to_xml`]. `is_actual` is
    /// recovered from the root element name (`NIT` vs `NIT-other`).
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        let is_actual = element.name != super::XML_NIT_OTHER;
        let network_descriptors = descriptors_from_xml(&element)?;
        let mut transport_streams = Vec::new();
        for child in element.children_named("transport_stream") {
            transport_streams.push(TransportStreamEntry {
                transport_stream_id: child.attr_u16("transport_stream_id")?,
                original_network_id: child.attr_u16("original_network_id")?,
                descriptors: descriptors_from_xml(child)?,
            });
        }
        Ok(Nit {
            is_actual,
            network_id: element.attr_u16("network_id")?,
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            network_descriptors,
            transport_streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn sample() -> Nit {
        let mut network_descriptors = DescriptorList::new();
        network_descriptors.add(Descriptor::new(0x40, b"My Network").unwrap());
        let mut ts_descriptors = DescriptorList::new();
        ts_descriptors.add(Descriptor::new(0x41, &[0x00, 0x01]).unwrap());
        Nit {
            is_actual: true,
            network_id: 0x0001,
            version: 4,
            is_current: true,
            network_descriptors,
            transport_streams: vec![TransportStreamEntry {
                transport_stream_id: 0x1234,
                original_network_id: 0x0001,
                descriptors: ts_descriptors,
            }],
        }
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let nit = sample();
        let table = nit.serialize().unwrap();
        let reparsed = Nit::deserialize(&table).unwrap();
        assert_eq!(nit, reparsed);
    }

    #[test]
    fn transport_stream_lookup_and_actual_other_distinction() {
        let mut nit = sample();
        assert!(nit.transport_stream(0x1234).is_some());
        nit.is_actual = false;
        let table = nit.serialize().unwrap();
        assert_eq!(table.table_id(), TID_NIT_OTHER);
    }

    #[test]
    fn xml_round_trips_actual_and_other() {
        let nit = sample();
        let xml = nit.to_xml();
        assert!(xml.starts_with("<NIT "));
        let reparsed = Nit::from_xml(&xml).unwrap();
        assert_eq!(nit, reparsed);

        let mut other = sample();
        other.is_actual = false;
        let xml = other.to_xml();
        assert!(xml.starts_with("<NIT-other"));
        let reparsed = Nit::from_xml(&xml).unwrap();
        assert_eq!(other, reparsed);
    }

    #[test]
    fn splits_oversized_transport_stream_loop_across_sections() {
        let mut transport_streams = Vec::new();
        for i in 0..150u16 {
            let mut descriptors = DescriptorList::new();
            descriptors
                .add(Descriptor::new(0x41, &[(i >> 8) as u8, i as u8]).unwrap());
            transport_streams.push(TransportStreamEntry {
                transport_stream_id: i,
                original_network_id: 0x0001,
                descriptors,
            });
        }
        let nit = Nit {
            is_actual: true,
            network_id: 0x0001,
            version: 4,
            is_current: true,
            network_descriptors: DescriptorList::new(),
            transport_streams,
        };
        let table = nit.serialize().unwrap();
        assert!(table.section_count() > 1);
        assert!(table.is_complete());
        let reparsed = Nit::deserialize(&table).unwrap();
        assert_eq!(nit, reparsed);
    }
}
