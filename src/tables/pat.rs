//! Program Association Table (ISO/IEC 13818-1 §2.4.4.3).
//!
//! Maps program (service) numbers to their PMT PIDs, plus the special
//! `program_number == 0` entry naming the NIT PID. Supports the full
//! long-table lifecycle: version tracking, multi-section splitting, and an
//! XML/display pair.

use super::{PID_PAT, TID_PAT};
use crate::crc32::CrcValidation;
use crate::error::{Error, Result};
use crate::registry::Standards;
use crate::section::{Section, MAX_SECTION_SIZE};
use crate::table::BinaryTable;
use crate::xml::Element;
use modular_bitfield_msb::prelude::*;

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PatEntry {
    program_number: B16,
    reserved: B3,
    pid: B13,
}

/// One program's `(program_number, pid)` association. `program_number == 0`
/// denotes the special NIT-PID entry rather than a real service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAssociation {
    pub program_number: u16,
    pub pid: u16,
}

/// Typed Program Association Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version: u8,
    pub is_current: bool,
    pub programs: Vec<ProgramAssociation>,
}

impl Pat {
    /// The NIT PID declared by `program_number == 0`, if present.
    pub fn nit_pid(&self) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.program_number == 0)
            .map(|p| p.pid)
    }

    /// All entries that name an actual service (`program_number != 0`), as
    /// `(service_id, pmt_pid)` pairs.
    pub fn pmts(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.programs
            .iter()
            .filter(|p| p.program_number != 0)
            .map(|p| (p.program_number, p.pid))
    }

    /// Deserializes a PAT from its reassembled binary table.
    pub fn deserialize(table: &BinaryTable) -> Result<Self> {
        if table.table_id() != TID_PAT {
            return Err(Error::InvalidField("not a PAT"));
        }
        if !table.is_complete() {
            return Err(Error::InvalidField("incomplete PAT table"));
        }
        let mut programs = Vec::new();
        let mut version = 0;
        let mut is_current = true;
        for (i, section) in table.sections().enumerate() {
            if i == 0 {
                version = section.version().ok_or(Error::InvalidField("PAT must be long"))?;
                is_current = section.is_current().unwrap_or(true);
            }
            let payload = section.payload();
            if payload.len() % 4 != 0 {
                return Err(Error::BadSectionLength);
            }
            for chunk in payload.chunks_exact(4) {
                let entry = PatEntry::from_bytes(chunk.try_into().unwrap());
                programs.push(ProgramAssociation {
                    program_number: entry.program_number(),
                    pid: entry.pid(),
                });
            }
        }
        Ok(Pat {
            transport_stream_id: table.table_id_extension(),
            version,
            is_current,
            programs,
        })
    }

    /// Serializes this PAT, splitting across sections so each stays within
    /// the standard 1024-byte section cap.
    pub fn serialize(&self) -> Result<BinaryTable> {
        const ENTRIES_PER_SECTION: usize = (MAX_SECTION_SIZE - 3 - 5 - 4) / 4;
        let chunks: Vec<&[ProgramAssociation]> = if self.programs.is_empty() {
            vec![&[]]
        } else {
            self.programs.chunks(ENTRIES_PER_SECTION).collect()
        };
        let last = (chunks.len() - 1) as u8;
        let mut table = BinaryTable::new(TID_PAT, self.transport_stream_id, self.version, PID_PAT);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut payload = Vec::with_capacity(chunk.len() * 4);
            for p in chunk {
                let mut entry = PatEntry::new();
                entry.set_program_number(p.program_number);
                entry.set_pid(p.pid);
                payload.extend_from_slice(&entry.into_bytes());
            }
            let section = Section::new_long(
                TID_PAT,
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

    /// Re-parses `section` with CRC checking, for callers that only have a
    /// single section in hand (the common single-packet PAT case).
    pub fn from_single_section(bytes: &[u8]) -> Result<Self> {
        let section = Section::from_bytes(bytes, CrcValidation::Check)?;
        let last = section.last_section_number().unwrap_or(0);
        let mut table = BinaryTable::new(
            section.table_id(),
            section.table_id_extension().unwrap_or(0),
            section.version().unwrap_or(0),
            PID_PAT,
        );
        let _ = last;
        table.add_section(section, true)?;
        Self::deserialize(&table)
    }

    /// Human-readable multi-line dump.
    pub fn display(&self) -> String {
        let name = super::xml_name(TID_PAT, PID_PAT, Standards::ALL);
        let mut out = format!(
            "{name}: ts_id={:#06x} version={} current={}\n",
            self.transport_stream_id, self.version, self.is_current
        );
        if let Some(nit) = self.nit_pid() {
            out += &format!("  NIT PID: {nit:#06x}\n");
        }
        for (service_id, pid) in self.pmts() {
            out += &format!("  service {service_id:#06x} -> PMT PID {pid:#06x}\n");
        }
        out
    }

    /// Renders this PAT as XML, using the registered XML name for `PAT`.
    pub fn to_xml(&self) -> String {
        let name = super::xml_name(TID_PAT, PID_PAT, Standards::ALL);
        let mut element = Element::new(name)
            .with_hex_attr("transport_stream_id", self.transport_stream_id as u32, 4)
            .with_attr("version", self.version.to_string())
            .with_bool_attr("current", self.is_current);
        for p in &self.programs {
            element = element.with_child(
                Element::new("service")
                    .with_hex_attr("id", p.program_number as u32, 4)
                    .with_hex_attr("program_map_PID", p.pid as u32, 4),
            );
        }
        element.to_xml_string()
    }

    /// Parses a PAT from the XML produced by [`Pat::to_xml`].
    pub fn from_xml(xml: &str) -> Result<Self> {
        let element = Element::parse(xml)?;
        let mut programs = Vec::new();
        for child in element.children_named("service") {
            programs.push(ProgramAssociation {
                program_number: child.attr_u16("id")?,
                pid: child.attr_u16("program_map_PID")?,
            });
        }
        Ok(Pat {
            transport_stream_id: element.attr_u16("transport_stream_id")?,
            version: element.attr_u8("version")?,
            is_current: element.attr_bool("current", true),
            programs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Pat {
        Pat {
            transport_stream_id: 0x1234,
            version: 5,
            is_current: true,
            programs: vec![
                ProgramAssociation {
                    program_number: 0,
                    pid: 0x0010,
                },
                ProgramAssociation {
                    program_number: 0x0001,
                    pid: 0x1001,
                },
                ProgramAssociation {
                    program_number: 0x0002,
                    pid: 0x1002,
                },
            ],
        }
    }

    #[test]
    fn round_trips_through_serialize_deserialize() {
        let pat = sample();
        let table = pat.serialize().unwrap();
        let reparsed = Pat::deserialize(&table).unwrap();
        assert_eq!(pat, reparsed);
    }

    #[test]
    fn nit_pid_and_pmts_extracted() {
        let pat = sample();
        assert_eq!(pat.nit_pid(), Some(0x0010));
        let pmts: Vec<_> = pat.pmts().collect();
        assert_eq!(pmts, vec![(0x0001, 0x1001), (0x0002, 0x1002)]);
    }

    #[test]
    fn pat_alone_end_to_end() {
        let pat = Pat {
            transport_stream_id: 0x1234,
            version: 5,
            is_current: true,
            programs: vec![
                ProgramAssociation {
                    program_number: 0x0001,
                    pid: 0x1001,
                },
                ProgramAssociation {
                    program_number: 0x0002,
                    pid: 0x1002,
                },
            ],
        };
        let table = pat.serialize().unwrap();
        assert!(table.is_complete());
        assert_eq!(table.table_id(), TID_PAT);
        assert_eq!(table.table_id_extension(), 0x1234);
        let reparsed = Pat::deserialize(&table).unwrap();
        assert_eq!(reparsed, pat);
        assert_eq!(reparsed.pmts().count(), 2);
    }

    #[test]
    fn xml_round_trips() {
        let pat = sample();
        let xml = pat.to_xml();
        assert!(xml.starts_with("<PAT"));
        let reparsed = Pat::from_xml(&xml).unwrap();
        assert_eq!(pat, reparsed);
    }
}
