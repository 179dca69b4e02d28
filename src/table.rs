//! Binary table model: an ordered, de-duplicated collection of sections
//! sharing `(tid, tidext, version)`, reassembled from a stream of sections
//! or built up for serialization.

use crate::error::{Error, Result};
use crate::section::Section;

/// A logically complete (or partial) table: the ordered set of sections
/// sharing `(table_id, table_id_extension, version, source_pid)`.
#[derive(Debug, Clone)]
pub struct BinaryTable {
    table_id: u8,
    table_id_extension: u16,
    version: u8,
    source_pid: u16,
    /// `None` for a slot not yet filled; short-section tables have exactly one slot.
    sections: Vec<Option<Section>>,
}

impl BinaryTable {
    /// Starts a new table keyed by the first section added to it.
    pub fn new(table_id: u8, table_id_extension: u16, version: u8, source_pid: u16) -> Self {
        Self {
            table_id,
            table_id_extension,
            version,
            source_pid,
            sections: Vec::new(),
        }
    }

    /// Builds a single-section table for a short section (PAT/CAT-less tables
    /// without syntax never reach this path in practice; short sections are
    /// instead wrapped one-to-one at the demux boundary).
    pub fn from_short_section(section: Section, source_pid: u16) -> Self {
        let table_id = section.table_id();
        Self {
            table_id,
            table_id_extension: 0,
            version: 0,
            source_pid,
            sections: vec![Some(section)],
        }
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }
    pub fn table_id_extension(&self) -> u16 {
        self.table_id_extension
    }
    pub fn version(&self) -> u8 {
        self.version
    }
    pub fn source_pid(&self) -> u16 {
        self.source_pid
    }

    /// Number of slots this table expects (`last_section_number + 1`), or 1
    /// for an empty/short table.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The section at `index`, if its slot is filled.
    pub fn section_at(&self, index: usize) -> Option<&Section> {
        self.sections.get(index).and_then(|s| s.as_ref())
    }

    /// Adds a section to this table.
    ///
    /// Enforces matching `(tid, tidext, version)` and that
    /// `section_number <= last_section_number`. Re-adding an identical
    /// section at the same slot is a no-op; a conflicting section at an
    /// occupied slot is rejected unless `replace` is set, in which case it
    /// replaces the existing one.
    pub fn add_section(&mut self, section: Section, replace: bool) -> Result<()> {
        if section.table_id() != self.table_id {
            return Err(Error::InvalidField("table_id mismatch"));
        }
        if section.is_long_section() {
            let tidext = section.table_id_extension().unwrap();
            let version = section.version().unwrap();
            if tidext != self.table_id_extension {
                return Err(Error::InvalidField("table_id_extension mismatch"));
            }
            if version != self.version {
                return Err(Error::VersionMismatchInTable);
            }
            let last = section.last_section_number().unwrap() as usize;
            let num = section.section_number().unwrap() as usize;
            if num > last {
                return Err(Error::InvalidField("section_number > last_section_number"));
            }
            if self.sections.len() <= last {
                self.sections.resize(last + 1, None);
            }
            match &self.sections[num] {
                Some(existing) if *existing == section => {} // idempotent no-op
                Some(_) if !replace => return Err(Error::VersionMismatchInTable),
                _ => self.sections[num] = Some(section),
            }
        } else {
            if self.sections.is_empty() {
                self.sections.push(Some(section));
            } else {
                match &self.sections[0] {
                    Some(existing) if *existing == section => {}
                    _ => self.sections[0] = Some(section),
                }
            }
        }
        Ok(())
    }

    /// `true` if every slot `0..section_count()` is filled.
    pub fn is_complete(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(Option::is_some)
    }

    /// `true` if the table has at least one filled slot and no slot
    /// disagrees with the table's own key fields (checked at `add_section`
    /// time, so this is really "has content").
    pub fn is_valid(&self) -> bool {
        self.sections.iter().any(Option::is_some)
    }

    /// Total serialized size of all filled sections.
    pub fn total_size(&self) -> usize {
        self.sections
            .iter()
            .filter_map(|s| s.as_ref())
            .map(Section::size)
            .sum()
    }

    /// Collapses holes and renumbers the remaining sections consecutively,
    /// producing a "packed" table suitable for display or XML of inherently
    /// sparse tables such as EIT.
    pub fn pack_sections(&self) -> Result<BinaryTable> {
        let present: Vec<&Section> = self.sections.iter().filter_map(|s| s.as_ref()).collect();
        let last = present.len().saturating_sub(1) as u8;
        let mut packed = BinaryTable::new(
            self.table_id,
            self.table_id_extension,
            self.version,
            self.source_pid,
        );
        for (i, section) in present.into_iter().enumerate() {
            let mut s = section.clone();
            if s.is_long_section() {
                s.set_section_number(i as u8)?;
                s.set_last_section_number(last)?;
            }
            packed.add_section(s, true)?;
        }
        Ok(packed)
    }

    /// Materializes every missing slot as an empty section (used for EIT
    /// tables, which are inherently sparse and otherwise never complete).
    pub fn fill_missing_with_empty(&mut self) -> Result<()> {
        for i in 0..self.sections.len() {
            if self.sections[i].is_none() {
                let section = Section::new_long(
                    self.table_id,
                    false,
                    self.table_id_extension,
                    self.version,
                    true,
                    i as u8,
                    self.sections.len() as u8 - 1,
                    &[],
                )?;
                self.sections[i] = Some(section);
            }
        }
        Ok(())
    }

    /// All filled sections in slot order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter_map(|s| s.as_ref())
    }
}

impl PartialEq for BinaryTable {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
            && self.table_id_extension == other.table_id_extension
            && self.version == other.version
            && self.sections == other.sections
    }
}
impl Eq for BinaryTable {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::CrcValidation;

    fn section(n: u8, last: u8) -> Section {
        Section::new_long(0x00, false, 0x1234, 5, true, n, last, &[n]).unwrap()
    }

    #[test]
    fn completes_after_all_slots_filled() {
        let mut t = BinaryTable::new(0x00, 0x1234, 5, 0);
        t.add_section(section(0, 2), false).unwrap();
        assert!(!t.is_complete());
        t.add_section(section(1, 2), false).unwrap();
        t.add_section(section(2, 2), false).unwrap();
        assert!(t.is_complete());
        assert_eq!(t.section_count(), 3);
    }

    #[test]
    fn re_adding_identical_section_is_noop() {
        let mut t = BinaryTable::new(0x00, 0x1234, 5, 0);
        t.add_section(section(0, 0), false).unwrap();
        t.add_section(section(0, 0), false).unwrap();
        assert_eq!(t.section_count(), 1);
    }

    #[test]
    fn conflicting_section_rejected_without_replace() {
        let mut t = BinaryTable::new(0x00, 0x1234, 5, 0);
        t.add_section(section(0, 1), false).unwrap();
        let conflicting =
            Section::from_bytes(section(0, 1).bytes(), CrcValidation::Ignore).unwrap();
        // Mutate payload of the re-parsed copy to make it genuinely different.
        let mut different = conflicting;
        different.set_uint8(0, 0xFF).unwrap();
        assert!(t.add_section(different, false).is_err());
    }

    #[test]
    fn pack_sections_is_idempotent() {
        let mut t = BinaryTable::new(0x00, 0x1234, 5, 0);
        t.add_section(section(0, 2), false).unwrap();
        t.add_section(section(2, 2), false).unwrap();
        let packed_once = t.pack_sections().unwrap();
        let packed_twice = packed_once.pack_sections().unwrap();
        assert_eq!(packed_once, packed_twice);
        assert_eq!(packed_once.section_count(), 2);
    }
}
