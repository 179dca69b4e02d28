//! Process-wide table and descriptor registry.
//!
//! Built once at program start as a read-only, process-wide singleton.
//! Rust has no runtime reflection registration story as convenient as
//! static-initializer factories, so registration here is an explicit call
//! list behind a `std::sync::OnceLock`, populated by [`install_defaults`]
//! and extendable by an embedding application that builds its own
//! `Registry` with additional table/descriptor names.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A bitmask of the standards bodies a table/descriptor registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standards(u8);

impl Standards {
    pub const NONE: Standards = Standards(0);
    pub const MPEG: Standards = Standards(1 << 0);
    pub const DVB: Standards = Standards(1 << 1);
    pub const ATSC: Standards = Standards(1 << 2);
    pub const ISDB: Standards = Standards(1 << 3);
    pub const ALL: Standards = Standards(0b1111);

    pub fn intersects(self, other: Standards) -> bool {
        self.0 & other.0 != 0
    }
    pub fn union(self, other: Standards) -> Standards {
        Standards(self.0 | other.0)
    }
}

/// CAS (conditional-access-system) id range a registration is scoped to.
/// `(0, 0)` means "CAS-agnostic": applies regardless of CAS id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CasRange {
    pub min: u16,
    pub max: u16,
}

impl CasRange {
    pub const ANY: CasRange = CasRange { min: 0, max: 0 };

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }
    pub fn contains(self, cas_id: u16) -> bool {
        self.is_any() || (self.min..=self.max).contains(&cas_id)
    }
}

/// Disambiguation key for a registered table factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    table_id: u8,
    /// `Some(pid)` for a "well-known PID" registration that takes precedence.
    pid: Option<u16>,
}

struct TableEntry {
    standards: Standards,
    cas: CasRange,
    xml_name: &'static str,
}

/// A registration for a descriptor's display/XML name.
struct DescriptorEntry {
    xml_name: &'static str,
}

/// Process-wide registry of table and descriptor factories.
#[derive(Default)]
pub struct Registry {
    tables: HashMap<TableKey, Vec<TableEntry>>,
    descriptors: HashMap<crate::descriptor::Edid, DescriptorEntry>,
}

impl Registry {
    fn new() -> Self {
        Self::default()
    }

    /// Registers a table's metadata for `table_id`, optionally pinned to a
    /// well-known PID. Construction itself is done by each concrete table's
    /// own `deserialize`/`serialize` pair; the registry exists to
    /// disambiguate *which* concrete type a `(tid, pid, standards, cas)`
    /// combination names, and to carry its display/XML name.
    pub fn register_table(
        &mut self,
        table_id: u8,
        pid: Option<u16>,
        standards: Standards,
        cas: CasRange,
        xml_name: &'static str,
    ) {
        self.tables
            .entry(TableKey { table_id, pid })
            .or_default()
            .push(TableEntry {
                standards,
                cas,
                xml_name,
            });
    }

    /// Registers a descriptor's display/XML name for an exact EDID.
    pub fn register_descriptor(&mut self, edid: crate::descriptor::Edid, xml_name: &'static str) {
        self.descriptors.insert(edid, DescriptorEntry { xml_name });
    }

    /// Looks up a table factory by disambiguation rule:
    /// exact `(table_id, pid)` match wins; else the first registration whose
    /// standards mask intersects `standards` and whose CAS range contains
    /// `cas_id`; else a CAS-agnostic entry only if exactly one exists.
    pub fn lookup_table(
        &self,
        table_id: u8,
        pid: u16,
        standards: Standards,
        cas_id: u16,
    ) -> Option<&'static str> {
        if let Some(entries) = self.tables.get(&TableKey {
            table_id,
            pid: Some(pid),
        }) {
            if let Some(e) = entries.first() {
                return Some(e.xml_name);
            }
        }
        let entries = self.tables.get(&TableKey {
            table_id,
            pid: None,
        })?;
        if let Some(e) = entries
            .iter()
            .find(|e| e.standards.intersects(standards) && e.cas.contains(cas_id))
        {
            return Some(e.xml_name);
        }
        let agnostic: Vec<_> = entries.iter().filter(|e| e.cas.is_any()).collect();
        if agnostic.len() == 1 {
            return Some(agnostic[0].xml_name);
        }
        None
    }

    /// Looks up a descriptor factory: for a standard tag with a known
    /// enclosing table id, try the table-specific registration first; only
    /// fall back to the plain EDID if no table-specific *name* exists for
    /// this descriptor under any table id (i.e. it was never meant to be
    /// table-specific).
    pub fn lookup_descriptor(
        &self,
        descriptor: &crate::descriptor::Descriptor,
        pds: crate::descriptor::Pds,
        table_id: Option<u8>,
    ) -> Option<&'static str> {
        if let Some(tid) = table_id {
            let scoped = crate::descriptor::Edid::of(descriptor, pds, Some(tid));
            if let Some(e) = self.descriptors.get(&scoped) {
                return Some(e.xml_name);
            }
        }
        let plain = crate::descriptor::Edid::of(descriptor, pds, None);
        self.descriptors.get(&plain).map(|e| e.xml_name)
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Returns the process-wide registry, building it with [`install_defaults`]
/// on first access.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut r = Registry::new();
        install_defaults(&mut r);
        r
    })
}

/// Registers the concrete tables and descriptors shipped with this crate.
/// A host application wanting additional registrations builds its own
/// `Registry` rather than mutating this one post-init: the process-wide
/// registry is read-only once built.
fn install_defaults(r: &mut Registry) {
    crate::tables::register_all(r);
    crate::descriptors::register_all(r);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pid_match_wins_over_standards_match() {
        let mut r = Registry::new();
        r.register_table(0xC7, None, Standards::ATSC, CasRange::ANY, "MGT");
        r.register_table(0xC7, Some(0x1FFB), Standards::ATSC, CasRange::ANY, "MGT-pinned");
        assert_eq!(
            r.lookup_table(0xC7, 0x1FFB, Standards::ATSC, 0),
            Some("MGT-pinned")
        );
        assert_eq!(r.lookup_table(0xC7, 0x50, Standards::ATSC, 0), Some("MGT"));
    }

    #[test]
    fn single_cas_agnostic_entry_is_used_as_fallback() {
        let mut r = Registry::new();
        r.register_table(0x80, None, Standards::DVB, CasRange::ANY, "generic-ca");
        assert_eq!(r.lookup_table(0x80, 0x10, Standards::ATSC, 5), Some("generic-ca"));
    }

    #[test]
    fn ambiguous_cas_agnostic_entries_return_none() {
        let mut r = Registry::new();
        r.register_table(0x80, None, Standards::DVB, CasRange::ANY, "a");
        r.register_table(0x80, None, Standards::DVB, CasRange::ANY, "b");
        assert_eq!(r.lookup_table(0x80, 0x10, Standards::ATSC, 5), None);
    }
}
