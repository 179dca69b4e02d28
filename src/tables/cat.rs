//! Conditional Access Table (ISO/IEC 13818-1 §2.4.4.6).
//!
//! A CAT carries nothing but a descriptor loop, almost always CA descriptors
//! pointing at the EMM PIDs for one or more conditional access systems.

use super::{PID_CAT, TID_CAT};
use crate::descriptor::DescriptorList;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{split_payload, Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::{descriptors_from_xml, descriptors_to_xml, Element};

/// Payload budget per section once the long-section header/CRC overhead is
/// subtracted; descriptors are concatenated before parsing, so the payload
/// can be cut at any byte boundary when it doesn't fit in one section.
const PAYLOAD_BUDGET: usize = MAX_SECTION_SIZE - 3 - 5 - 4;

/// Typed Conditional Access Table.
#[derive(Debug, Clone, PartialEq)]
pub struct Cat {
    pub version: u8,
    pub is_current: bool,
    pub descriptors: DescriptorList,
}

impl Cat {
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        if table.table_id() != TID_CAT {
            return Err(Error::InvalidField("not a CAT"));
        }
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete CAT table"));
        }
        let mut payload = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("CAT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            payload.extend_from_slice(section.payload());
        }
        Ok(Cat {
            version,
            is_current,
            descriptors: DescriptorList::from_bytes(&payload)?,
        })
    }

    /// Serializes this CAT, splitting across sections so each stays within
    /// the standard 1024-byte section cap.
    pub fn serialize(&self) -> Result<BinaryTable> {
        let mut payload = Vec::new();
        self.descriptors.serialize(&mut payload);
        let chunks = split_payload(&payload, PAYLOAD_BUDGET);
        let last = (chunks.len() - 1) as u8;
        let mut table = BinaryTable::new(TID_CAT, 0xFFFF, self.version, PID_CAT);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let section = Section::new_long(
                TID_CAT,
                false,
                0xFFFF,
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
        let name = super::xml_name(TID_CAT, PID_CAT, Standards::ALL);
        format!(
            "{name}: version={} current={} descriptors={}\n",
            self.version,
            self.is_current,
            self.descriptors.len()
        )
    }

    /// Renders this CAT as XML, using the registered XML name for `CAT`.
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(TID_CAT, PID_CAT, Standards::ALL);
        Element::new(name)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current)
            .with_children(descriptors_to_xml(&self.descriptors))
            .to_xml_string()
    }

    /// Parses a CAT from the XML produced by [`Cat::to_xml`].
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        Ok(Cat {
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            descriptors: descriptors_from_xml(&element)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    #[test]
    fn round_trips_with_ca_descriptors() {
        let mut descriptors = DescriptorList::new();
        descriptors.add(Descriptor::new(0x09, &[0x00, 0x01, 0x1F, 0xFF]).unwrap());
        let cat = Cat {
            version: 3,
            is_current: true,
            descriptors,
        };
        let table = cat.serialize().unwrap();
        let reparsed = Cat::deserialize(&table).unwrap();
        assert_eq!(cat, reparsed);
        assert_eq!(reparsed.descriptors.len(), 1);
    }

    #[test]
    fn empty_cat_round_trips() {
        let cat = Cat {
            version: 0,
            is_current: true,
            descriptors: DescriptorList::new(),
        };
        let table = cat.serialize().unwrap();
        let reparsed = Cat::deserialize(&table).unwrap();
        assert!(reparsed.descriptors.is_empty());
    }

    #[test]
    fn xml_round_trips() {
        let mut descriptors = DescriptorList::new();
        descriptors.add(Descriptor::new(0x09, &[0x00, 0x01]).unwrap());
        let cat = Cat {
            version: 3,
            is_current: true,
            descriptors,
        };
        let xml = cat.to_xml();
        assert!(xml.starts_with("<CAT"));
        let reparsed = Cat::from_xml(&xml).unwrap();
        assert_eq!(cat, reparsed);
    }

    #[test]
    fn splits_oversized_descriptor_loop_across_sections() {
        let mut descriptors = DescriptorList::new();
        for i in 0..200u16 {
            let payload = [(i >> 8) as u8, i as u8, 0x00, 0x00];
            descriptors.add(Descriptor::new(0x09, &payload).unwrap());
        }
        let cat = Cat {
            version: 1,
            is_current: true,
            descriptors,
        };
        let table = cat.serialize().unwrap();
        assert!(table.section_count() > 1);
        assert!(table.is_complete());
        let reparsed = Cat::deserialize(&table).unwrap();
        assert_eq!(cat, reparsed);
    }
}
