//! Bouquet Association Table (DVB EN 300 468 §5.2.2).
//!
//! Wire-compatible with the NIT's descriptor-loop-then-transport-stream-loop
//! shape, but the transport stream entries carry no `original_network_id`
//! and the table is always keyed by `bouquet_id` rather than `network_id`.

use super::{PID_SDT_BAT, TID_BAT};
use crate::descriptor::DescriptorList;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{split_payload, Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::{descriptors_from_xml, descriptors_to_xml, Element};
use modular_bitfield_msb::prelude::*;

/// Payload budget per section once the long-section header/CRC overhead is
/// subtracted; the bouquet-descriptor and transport-stream loops are
/// concatenated before parsing, so the payload can be cut at any byte
/// boundary when it doesn't fit in one section.
const PAYLOAD_BUDGET: usize = MAX_SECTION_SIZE - 3 - 5 - 4;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct BouquetDescriptorsHeader {
    reserved_future_use: B4,
    bouquet_descriptors_length: B12,
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

/// One transport stream entry in a BAT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamEntry {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: DescriptorList,
}

/// Typed Bouquet Association Table.
#[derive(Debug, Clone, PartialEq)]
pub struct Bat {
    pub bouquet_id: u16,
    pub version: u8,
    pub is_current: bool,
    pub bouquet_descriptors: DescriptorList,
    pub transport_streams: Vec<TransportStreamEntry>,
}

impl Bat {
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        if table.table_id() != TID_BAT {
            return Err(Error::InvalidField("not a BAT"));
        }
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete BAT table"));
        }
        let mut payload = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("BAT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            payload.extend_from_slice(section.payload());
        }

        if payload.len() < 2 {
            return Err(Error::TruncatedSection);
        }
        let mut bd_header_bytes = [0u8; 2];
        bd_header_bytes.copy_from_slice(&payload[0..2]);
        let bd_len =
            BouquetDescriptorsHeader::from_bytes(bd_header_bytes).bouquet_descriptors_length() as usize;
        let mut rest = &payload[2..];
        if rest.len() < bd_len {
            return Err(Error::TruncatedSection);
        }
        let bouquet_descriptors = DescriptorList::from_bytes(&rest[..bd_len])?;
        rest = &rest[bd_len..];

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

        Ok(Bat {
            bouquet_id: table.table_id_extension(),
            version,
            is_current,
            bouquet_descriptors,
            transport_streams,
        })
    }

    pub fn serialize(&self) -> Result<BinaryTable> {
        let mut bd_header = BouquetDescriptorsHeader::new();
        bd_header.set_reserved_future_use(0xF);
        bd_header.set_bouquet_descriptors_length(self.bouquet_descriptors.binary_size() as u16);
        let mut payload = bd_header.into_bytes().to_vec();
        self.bouquet_descriptors.serialize(&mut payload);

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
        let mut table = BinaryTable::new(TID_BAT, self.bouquet_id, self.version, PID_SDT_BAT);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let section = Section::new_long(
                TID_BAT,
                false,
                self.bouquet_id,
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

    pub fn display(&self) -> String {
        let name = super::xml_name(TID_BAT, PID_SDT_BAT, Standards::DVB);
        let mut out = format!(
            "{name}: bouquet_id={:#06x} version={}\n",
            self.bouquet_id, self.version
        );
        for ts in &self.transport_streams {
            out += &format!("  ts_id={:#06x}\n", ts.transport_stream_id);
        }
        out
    }

    /// Renders this BAT as XML, using the registered XML name for `BAT`.
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(TID_BAT, PID_SDT_BAT, Standards::DVB);
        let mut element = Element::new(name)
            .with_hex_attr("bouquet_id", self.bouquet_id as u32, 4)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current)
            .with_children(descriptors_to_xml(&self.bouquet_descriptors));
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

    /// Parses a BAT from the XML produced by [`Bat::to_xml`].
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        let bouquet_descriptors = descriptors_from_xml(&element)?;
        let mut transport_streams = Vec::new();
        for child in element.children_named("transport_stream") {
            transport_streams.push(TransportStreamEntry {
                transport_stream_id: child.attr_u16("transport_stream_id")?,
                original_network_id: child.attr_u16("original_network_id")?,
                descriptors: descriptors_from_xml(child)?,
            });
        }
        Ok(Bat {
            bouquet_id: element.attr_u16("bouquet_id")?,
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            bouquet_descriptors,
            transport_streams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let mut bouquet_descriptors = DescriptorList::new();
        bouquet_descriptors.add(Descriptor::new(0x47, b"My Bouquet").unwrap());
        let bat = Bat {
            bouquet_id: 0x0001,
            version: 1,
            is_current: true,
            bouquet_descriptors,
            transport_streams: vec![TransportStreamEntry {
                transport_stream_id: 0x1234,
                original_network_id: 0x0001,
                descriptors: DescriptorList::new(),
            }],
        };
        let table = bat.serialize().unwrap();
        let reparsed = Bat::deserialize(&table).unwrap();
        assert_eq!(bat, reparsed);
    }

    fn sample() -> Bat {
        let mut bouquet_descriptors = DescriptorList::new();
        bouquet_descriptors.add(Descriptor::new(0x47, b"My Bouquet").unwrap());
        Bat {
            bouquet_id: 0x0001,
            version: 1,
            is_current: true,
            bouquet_descriptors,
            transport_streams: vec![TransportStreamEntry {
                transport_stream_id: 0x1234,
                original_network_id: 0x0001,
                descriptors: DescriptorList::new(),
            }],
        }
    }

    #[test]
    fn xml_round_trips() {
        let bat = sample();
        let xml = bat.to_xml();
        assert!(xml.starts_with("<BAT"));
        let reparsed = Bat::from_xml(&xml).unwrap();
        assert_eq!(bat, reparsed);
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
        let bat = Bat {
            bouquet_id: 0x0001,
            version: 1,
            is_current: true,
            bouquet_descriptors: DescriptorList::new(),
            transport_streams,
        };
        let table = bat.serialize().unwrap();
        assert!(table.section_count() > 1);
        assert!(table.is_complete());
        let reparsed = Bat::deserialize(&table).unwrap();
        assert_eq!(bat, reparsed);
    }
}
