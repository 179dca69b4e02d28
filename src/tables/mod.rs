//! Concrete PSI/SI tables.
//!
//! Each submodule implements one table family: a typed struct, bit-exact
//! `deserialize`/`serialize` against [`crate::table::BinaryTable`], and a
//! `display` for human inspection. This crate implements a representative
//! core — PAT, CAT, PMT, SDT, NIT, BAT, TDT, TOT — covering the tables the
//! demux, analyzer, and service-selection processor need.

pub mod bat;
pub mod cat;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod tdt_tot;

use crate::registry::{CasRange, Registry, Standards};

/// Table id assignments used throughout this crate (ISO 13818-1 / EN 300 468).
pub const TID_PAT: u8 = 0x00;
pub const TID_CAT: u8 = 0x01;
pub const TID_PMT: u8 = 0x02;
pub const TID_NIT_ACTUAL: u8 = 0x40;
pub const TID_NIT_OTHER: u8 = 0x41;
pub const TID_SDT_ACTUAL: u8 = 0x42;
pub const TID_SDT_OTHER: u8 = 0x46;
pub const TID_BAT: u8 = 0x4A;
pub const TID_EIT_ACTUAL_PF: u8 = 0x4E;
pub const TID_EIT_OTHER_PF: u8 = 0x4F;
pub const TID_EIT_SCHEDULE_START: u8 = 0x50;
pub const TID_EIT_SCHEDULE_END: u8 = 0x6F;
pub const TID_TDT: u8 = 0x70;
pub const TID_TOT: u8 = 0x73;

/// `true` if `tid` falls in the EIT table-id range.
pub fn is_eit_table_id(tid: u8) -> bool {
    (TID_EIT_ACTUAL_PF..=TID_EIT_SCHEDULE_END).contains(&tid)
}

/// Well-known PIDs these tables are normally carried on.
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT_BAT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;
pub const PID_TDT_TOT: u16 = 0x0014;

/// XML/log names, registered below and consulted by each table's
/// `to_xml`/`from_xml`/`display` via [`xml_name`].
pub(crate) const XML_PAT: &str = "PAT";
pub(crate) const XML_CAT: &str = "CAT";
pub(crate) const XML_PMT: &str = "PMT";
pub(crate) const XML_NIT_ACTUAL: &str = "NIT";
pub(crate) const XML_NIT_OTHER: &str = "NIT-other";
pub(crate) const XML_SDT_ACTUAL: &str = "SDT";
pub(crate) const XML_SDT_OTHER: &str = "SDT-other";
pub(crate) const XML_BAT: &str = "BAT";
pub(crate) const XML_TDT: &str = "TDT";
pub(crate) const XML_TOT: &str = "TOT";

pub(crate) fn register_all(r: &mut Registry) {
    r.register_table(TID_PAT, Some(PID_PAT), Standards::ALL, CasRange::ANY, XML_PAT);
    r.register_table(TID_CAT, Some(PID_CAT), Standards::ALL, CasRange::ANY, XML_CAT);
    r.register_table(TID_PMT, None, Standards::ALL, CasRange::ANY, XML_PMT);
    r.register_table(
        TID_NIT_ACTUAL,
        Some(PID_NIT),
        Standards::DVB,
        CasRange::ANY,
        XML_NIT_ACTUAL,
    );
    r.register_table(
        TID_NIT_OTHER,
        Some(PID_NIT),
        Standards::DVB,
        CasRange::ANY,
        XML_NIT_OTHER,
    );
    r.register_table(
        TID_SDT_ACTUAL,
        Some(PID_SDT_BAT),
        Standards::DVB,
        CasRange::ANY,
        XML_SDT_ACTUAL,
    );
    r.register_table(
        TID_SDT_OTHER,
        Some(PID_SDT_BAT),
        Standards::DVB,
        CasRange::ANY,
        XML_SDT_OTHER,
    );
    r.register_table(
        TID_BAT,
        Some(PID_SDT_BAT),
        Standards::DVB,
        CasRange::ANY,
        XML_BAT,
    );
    r.register_table(
        TID_TDT,
        Some(PID_TDT_TOT),
        Standards::DVB,
        CasRange::ANY,
        XML_TDT,
    );
    r.register_table(
        TID_TOT,
        Some(PID_TDT_TOT),
        Standards::DVB,
        CasRange::ANY,
        XML_TOT,
    );
}

/// Looks up a table's registered XML/log name, falling back to a generic
/// placeholder if somehow unregistered (never the case for the tables
/// shipped with this crate, registered by [`register_all`] above).
pub(crate) fn xml_name(table_id: u8, pid: u16, standards: Standards) -> &'static str {
    crate::registry::registry()
        .lookup_table(table_id, pid, standards, 0)
        .unwrap_or("table")
}
