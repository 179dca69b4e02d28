//! Service Description Table (DVB EN 300 468 §5.2.3).

use super::{PID_SDT_BAT, TID_SDT_ACTUAL, TID_SDT_OTHER};
use crate::descriptor::DescriptorList;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{split_payload, Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::{descriptors_from_xml, descriptors_to_xml, Element};
use modular_bitfield_msb::prelude::*;

/// Payload budget per section, minus the 3-byte SDT header that this
/// table's `deserialize` strips from every section (not just the first), so
/// `serialize` must re-prepend it to every chunk rather than only the first.
const PAYLOAD_BUDGET: usize = MAX_SECTION_SIZE - 3 - 5 - 4 - 3;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct SdtHeader {
    original_network_id: B16,
    reserved_future_use: B8,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct ServiceHeader {
    service_id: B16,
    reserved_future_use: B6,
    eit_schedule_flag: bool,
    eit_present_following_flag: bool,
    running_status: B3,
    free_ca_mode: bool,
    descriptors_loop_length: B12,
}

/// Running status of a service, as broadcast in the SDT (DVB EN 300 468 table 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningStatus {
    Undefined,
    NotRunning,
    StartsInFewSeconds,
    Pausing,
    Running,
    OffAir,
    Reserved(u8),
}

impl RunningStatus {
    fn from_bits(v: u8) -> Self {
        match v {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsInFewSeconds,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            5 => RunningStatus::OffAir,
            other => RunningStatus::Reserved(other),
        }
    }
    fn to_bits(self) -> u8 {
        match self {
            RunningStatus::Undefined => 0,
            RunningStatus::NotRunning => 1,
            RunningStatus::StartsInFewSeconds => 2,
            RunningStatus::Pausing => 3,
            RunningStatus::Running => 4,
            RunningStatus::OffAir => 5,
            RunningStatus::Reserved(v) => v,
        }
    }
}

/// One service entry in an SDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service_id: u16,
    pub eit_schedule_flag: bool,
    pub eit_present_following_flag: bool,
    pub running_status: RunningStatus,
    pub free_ca_mode: bool,
    pub descriptors: DescriptorList,
}

/// Typed Service Description Table. `is_actual` distinguishes `SDT actual`
/// (this transport stream) from `SDT other` (a different one within the
/// same network), which share wire format but differ in table id.
#[derive(Debug, Clone, PartialEq)]
pub struct Sdt {
    pub is_actual: bool,
    pub transport_stream_id: u16,
    pub version: u8,
    pub is_current: bool,
    pub original_network_id: u16,
    pub services: Vec<ServiceEntry>,
}

impl Sdt {
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        let is_actual = match table.table_id() {
            TID_SDT_ACTUAL => true,
            TID_SDT_OTHER => false,
            _ => return Err(Error::InvalidField("not an SDT")),
        };
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete SDT table"));
        }
        let mut payload = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        let mut original_network_id = 0;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("SDT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            let p = section.payload();
            if i == 0 {
                if p.len() < 3 {
                    return Err(Error::TruncatedSection);
                }
                let mut header_bytes = [0u8; 3];
                header_bytes.copy_from_slice(&p[0..3]);
                original_network_id = SdtHeader::from_bytes(header_bytes).original_network_id();
            }
            payload.extend_from_slice(&p[3..]);
        }

        let mut services = Vec::new();
        let mut rest = &payload[..];
        while !rest.is_empty() {
            if rest.len() < 5 {
                return Err(Error::TruncatedSection);
            }
            let mut header_bytes = [0u8; 5];
            header_bytes.copy_from_slice(&rest[0..5]);
            let header = ServiceHeader::from_bytes(header_bytes);
            let loop_len = header.descriptors_loop_length() as usize;
            rest = &rest[5..];
            if rest.len() < loop_len {
                return Err(Error::TruncatedSection);
            }
            let descriptors = DescriptorList::from_bytes(&rest[..loop_len])?;
            rest = &rest[loop_len..];
            services.push(ServiceEntry {
                service_id: header.service_id(),
                eit_schedule_flag: header.eit_schedule_flag(),
                eit_present_following_flag: header.eit_present_following_flag(),
                running_status: RunningStatus::from_bits(header.running_status()),
                free_ca_mode: header.free_ca_mode(),
                descriptors,
            });
        }

        Ok(Sdt {
            is_actual,
            transport_stream_id: table.table_id_extension(),
            version,
            is_current,
            original_network_id,
            services,
        })
    }

    /// Serializes this SDT, splitting across sections so each stays within
    /// the standard 1024-byte section cap. The 3-byte `original_network_id`
    /// header is repeated on every section, matching how `deserialize`
    /// strips it from each one.
    pub fn serialize(&self) -> Result<BinaryTable> {
        let table_id = if self.is_actual {
            TID_SDT_ACTUAL
        } else {
            TID_SDT_OTHER
        };
        let mut sdt_header = SdtHeader::new();
        sdt_header.set_original_network_id(self.original_network_id);
        sdt_header.set_reserved_future_use(0xFF);
        let header_bytes = sdt_header.into_bytes();

        let mut body = Vec::new();
        for s in &self.services {
            let mut header = ServiceHeader::new();
            header.set_service_id(s.service_id);
            header.set_eit_schedule_flag(s.eit_schedule_flag);
            header.set_eit_present_following_flag(s.eit_present_following_flag);
            header.set_running_status(s.running_status.to_bits());
            header.set_free_ca_mode(s.free_ca_mode);
            header.set_descriptors_loop_length(s.descriptors.binary_size() as u16);
            body.extend_from_slice(&header.into_bytes());
            s.descriptors.serialize(&mut body);
        }

        let chunks = split_payload(&body, PAYLOAD_BUDGET);
        let last = (chunks.len() - 1) as u8;
        let mut table = BinaryTable::new(
            table_id,
            self.transport_stream_id,
            self.version,
            PID_SDT_BAT,
        );
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut payload = header_bytes.to_vec();
            payload.extend_from_slice(chunk);
            let section = Section::new_long(
                table_id,
                false,
                self.transport_stream_id,
                self.version,
                self.is_current,
                i as u8,
                last,
                &payload,
            )?;
            table.add_section(section, true)?;
        }
        Ok(table)
    }

    pub fn service(&self, service_id: u16) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.service_id == service_id)
    }

    fn table_id(&self) -> u8 {
        if self.is_actual {
            TID_SDT_ACTUAL
        } else {
            TID_SDT_OTHER
        }
    }

    pub fn display(&self) -> String {
        let name = super::xml_name(self.table_id(), PID_SDT_BAT, Standards::DVB);
        let mut out = format!(
            "{name}: ts_id={:#06x} onid={:#06x}\n",
            self.transport_stream_id, self.original_network_id
        );
        for s in &self.services {
            out += &format!(
                "  service {:#06x} running={:?} free_ca={}\n",
                s.service_id, s.running_status, s.free_ca_mode
            );
        }
        out
    }

    /// Renders this SDT as XML, using the registered XML name (`SDT` or
    /// `SDT-other`, matching `is_actual`).
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(self.table_id(), PID_SDT_BAT, Standards::DVB);
        let mut element = Element::new(name)
            .with_hex_attr("transport_stream_id", self.transport_stream_id as u32, 4)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current)
            .with_hex_attr("original_network_id", self.original_network_id as u32, 4);
        for s in &self.services {
            element = element.with_child(
                Element::new("service")
                    .with_hex_attr("service_id", s.service_id as u32, 4)
                    .with_bool_attr("EIT_schedule", s.eit_schedule_flag)
                    .with_bool_attr("EIT_present_following", s.eit_present_following_flag)
                    .with_attr("running_status", s.running_status.to_bits().to_string())
                    .with_bool_attr("CA_mode", s.free_ca_mode)
                    .with_children(descriptors_to_xml(&s.descriptors)),
            );
        }
        element.to_xml_string()
    }

    /// Parses an SDT from the XML produced by [`Sdt::to_xml`]. `is_actual`
    /// is recovered from the root element name (`SDT` vs `SDT-other`).
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        let is_actual = element.name != super::XML_SDT_OTHER;
        let mut services = Vec::new();
        for child in element.children_named("service") {
            services.push(ServiceEntry {
                service_id: child.attr_u16("service_id")?,
                eit_schedule_flag: child.attr_bool("EIT_schedule", false),
                eit_present_following_flag: child.attr_bool("EIT_present_following", false),
                running_status: RunningStatus::from_bits(child.attr_u8("running_status")?),
                free_ca_mode: child.attr_bool("CA_mode", false),
                descriptors: descriptors_from_xml(child)?,
            });
        }
        Ok(Sdt {
            is_actual,
            transport_stream_id: element.attr_u16("transport_stream_id")?,
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            original_network_id: element.attr_u16("original_network_id")?,
            services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn sample() -> Sdt {
        let mut descriptors = DescriptorList::new();
        descriptors
            .add(Descriptor::new(0x48, b"\x01\x03abc\x05Hello\x05World").unwrap());
        Sdt {
            is_actual: true,
            transport_stream_id: 0x1234,
            version: 1,
            is_current: true,
            original_network_id: 0x5678,
            services: vec![ServiceEntry {
                service_id: 0x0001,
                eit_schedule_flag: false,
                eit_present_following_flag: true,
                running_status: RunningStatus::Running,
                free_ca_mode: false,
                descriptors,
            }],
        }
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let sdt = sample();
        let table = sdt.serialize().unwrap();
        let reparsed = Sdt::deserialize(&table).unwrap();
        assert_eq!(sdt, reparsed);
    }

    #[test]
    fn service_lookup_and_actual_other_distinction() {
        let mut sdt = sample();
        assert_eq!(
            sdt.service(0x0001).unwrap().running_status,
            RunningStatus::Running
        );
        sdt.is_actual = false;
        let table = sdt.serialize().unwrap();
        assert_eq!(table.table_id(), TID_SDT_OTHER);
    }

    #[test]
    fn xml_round_trips_actual_and_other() {
        let sdt = sample();
        let xml = sdt.to_xml();
        assert!(xml.starts_with("<SDT "));
        let reparsed = Sdt::from_xml(&xml).unwrap();
        assert_eq!(sdt, reparsed);

        let mut other = sample();
        other.is_actual = false;
        let xml = other.to_xml();
        assert!(xml.starts_with("<SDT-other"));
        let reparsed = Sdt::from_xml(&xml).unwrap();
        assert_eq!(other, reparsed);
    }

    #[test]
    fn splits_oversized_service_loop_across_sections() {
        let mut services = Vec::new();
        for i in 0..150u16 {
            let mut descriptors = DescriptorList::new();
            descriptors
                .add(Descriptor::new(0x48, &[(i >> 8) as u8, i as u8]).unwrap());
            services.push(ServiceEntry {
                service_id: i,
                eit_schedule_flag: false,
                eit_present_following_flag: true,
                running_status: RunningStatus::Running,
                free_ca_mode: false,
                descriptors,
            });
        }
        let sdt = Sdt {
            is_actual: true,
            transport_stream_id: 0x1234,
            version: 1,
            is_current: true,
            original_network_id: 0x5678,
            services,
        };
        let table = sdt.serialize().unwrap();
        assert!(table.section_count() > 1);
        assert!(table.is_complete());
        let reparsed = Sdt::deserialize(&table).unwrap();
        assert_eq!(sdt, reparsed);
    }
}
