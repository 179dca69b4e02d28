//! Section demultiplexer: reconstructs sections and tables from a stream of
//! transport-stream packets on a filtered set of PIDs.
//!
//! Per-PID state tracks the continuity counter and an accumulation buffer.
//! `payload_unit_start_indicator` packets carry a leading `pointer_field`
//! that finishes whatever section was in flight before starting the next
//! one; every other packet's payload is pure continuation bytes. A run of
//! `0xFF` stuffing bytes at the head of the remaining buffer always marks
//! "nothing more to extract from this packet".

use crate::error::{Error, Result};
use crate::packet::TSPacket;
use crate::section::{Section, SectionHeader};
use crate::table::BinaryTable;
use crate::tables::is_eit_table_id;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    pid: u16,
    table_id: u8,
    table_id_extension: u16,
}

#[derive(Default)]
struct PidState {
    continuity_counter: Option<u8>,
    buffer: Vec<u8>,
}

/// Callbacks a [`SectionDemux`] invokes as it reconstructs content.
pub trait SectionHandler {
    /// Called for every structurally valid section extracted, whether or
    /// not the table it belongs to is yet complete.
    fn on_section(&mut self, _pid: u16, _section: &Section) {}
    /// Called once a table's sections are all present (or, for a short
    /// section, immediately).
    fn on_table(&mut self, _pid: u16, _table: &BinaryTable) {}
    /// Called when a packet or section failed to parse; the error never
    /// aborts demultiplexing of other sections or other PIDs.
    fn on_invalid_section(&mut self, _pid: u16, _error: Error) {}
}

/// Reconstructs PSI/SI sections and tables from a filtered set of PIDs.
pub struct SectionDemux<H: SectionHandler> {
    handler: H,
    filtered_pids: std::collections::HashSet<u16>,
    state: HashMap<u16, PidState>,
    tables: HashMap<TableKey, BinaryTable>,
}

impl<H: SectionHandler> SectionDemux<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            filtered_pids: std::collections::HashSet::new(),
            state: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    pub fn add_pid(&mut self, pid: u16) {
        self.filtered_pids.insert(pid);
    }

    pub fn remove_pid(&mut self, pid: u16) {
        self.filtered_pids.remove(&pid);
        self.state.remove(&pid);
        self.tables.retain(|k, _| k.pid != pid);
    }

    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Drops all per-PID buffers and in-progress tables, keeping the PID filter.
    pub fn reset(&mut self) {
        self.state.clear();
        self.tables.clear();
    }

    /// Feeds one packet. PIDs outside the filter are ignored entirely;
    /// errors are reported through [`SectionHandler::on_invalid_section`]
    /// rather than returned, since one bad packet must never stop
    /// demultiplexing of the rest of the stream.
    pub fn feed_packet(&mut self, packet: &TSPacket) {
        let pid = packet.pid();
        if !self.filtered_pids.contains(&pid) {
            return;
        }
        if packet.is_scrambled() {
            self.state.remove(&pid);
            return;
        }
        let Some(payload) = packet.payload else {
            return;
        };

        let cc = packet.header.continuity_counter();
        let mut continuity_error = false;
        {
            let state = self.state.entry(pid).or_default();
            if let Some(last_cc) = state.continuity_counter {
                if cc == last_cc {
                    // Repeated packet (allowed for retransmission); nothing new to extract.
                    return;
                }
                let expected = (last_cc + 1) & 0x0F;
                if cc != expected {
                    state.buffer.clear();
                    continuity_error = true;
                }
            }
            state.continuity_counter = Some(cc);
        }
        if continuity_error {
            self.handler.on_invalid_section(pid, Error::ContinuityError);
        }

        if packet.pusi() {
            let Some((&pointer_field, rest)) = payload.split_first() else {
                self.handler.on_invalid_section(pid, Error::TruncatedSection);
                return;
            };
            let pointer_field = pointer_field as usize;
            if pointer_field > rest.len() {
                if let Some(state) = self.state.get_mut(&pid) {
                    state.buffer.clear();
                }
                self.handler
                    .on_invalid_section(pid, Error::PacketOverrun(pointer_field));
                return;
            }
            let (before, after) = rest.split_at(pointer_field);
            if let Some(state) = self.state.get_mut(&pid) {
                state.buffer.extend_from_slice(before);
            }
            // Finishes whatever section was already in flight before this
            // packet's pointer_field, using only the bytes contributed so far.
            Self::drain_sections_mut(self, pid);
            if let Some(state) = self.state.get_mut(&pid) {
                state.buffer.clear();
                state.buffer.extend_from_slice(after);
            }
        } else if let Some(state) = self.state.get_mut(&pid) {
            state.buffer.extend_from_slice(payload);
        }
        Self::drain_sections_mut(self, pid);
    }

    fn drain_sections_mut(demux: &mut Self, pid: u16) {
        loop {
            let state = demux.state.get_mut(&pid).unwrap();
            if state.buffer.is_empty() {
                return;
            }
            if state.buffer[0] == 0xFF {
                state.buffer.clear();
                return;
            }
            if state.buffer.len() < 3 {
                return;
            }
            let mut header_bytes = [0u8; 3];
            header_bytes.copy_from_slice(&state.buffer[0..3]);
            let total = 3 + SectionHeader::from_bytes(header_bytes).section_length() as usize;
            if state.buffer.len() < total {
                return;
            }
            let section_bytes: Vec<u8> = state.buffer.drain(0..total).collect();
            drop(state);

            match Section::from_bytes(&section_bytes, crate::crc32::CrcValidation::Check) {
                Ok(section) => demux.accept_section(pid, section),
                Err(e) => demux.handler.on_invalid_section(pid, e),
            }
        }
    }

    fn accept_section(&mut self, pid: u16, section: Section) {
        self.handler.on_section(pid, &section);

        if !section.is_long_section() {
            let table = BinaryTable::from_short_section(section, pid);
            self.handler.on_table(pid, &table);
            return;
        }

        let table_id = section.table_id();
        let table_id_extension = section.table_id_extension().unwrap();
        let version = section.version().unwrap();
        let key = TableKey {
            pid,
            table_id,
            table_id_extension,
        };

        let needs_fresh = match self.tables.get(&key) {
            Some(existing) => existing.version() != version,
            None => true,
        };
        if needs_fresh {
            self.tables
                .insert(key, BinaryTable::new(table_id, table_id_extension, version, pid));
        }
        let table = self.tables.get_mut(&key).unwrap();
        if table.add_section(section, true).is_err() {
            return;
        }
        if table.is_complete() {
            self.handler.on_table(pid, table);
            if !is_eit_table_id(table_id) {
                self.tables.remove(&key);
            }
        }
    }

    /// Packs and emits every in-progress, incomplete table as-is (holes
    /// collapsed via [`BinaryTable::pack_sections`]), then drops it. Used at
    /// end-of-stream so partially observed tables are not silently lost.
    pub fn pack_and_flush(&mut self) -> Result<()> {
        let keys: Vec<TableKey> = self.tables.keys().copied().collect();
        for key in keys {
            let table = self.tables.remove(&key).unwrap();
            if table.is_complete() {
                continue;
            }
            let packed = table.pack_sections()?;
            self.handler.on_table(key.pid, &packed);
        }
        Ok(())
    }

    /// Fills every missing slot of every in-progress EIT table with an empty
    /// section and emits it, then drops it. EIT schedule tables are
    /// inherently sparse and otherwise never reach [`BinaryTable::is_complete`].
    pub fn fill_and_flush_eits(&mut self) -> Result<()> {
        let keys: Vec<TableKey> = self
            .tables
            .keys()
            .copied()
            .filter(|k| is_eit_table_id(k.table_id))
            .collect();
        for key in keys {
            let mut table = self.tables.remove(&key).unwrap();
            table.fill_missing_with_empty()?;
            self.handler.on_table(key.pid, &table);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::Section;

    #[derive(Default)]
    struct Recorder {
        sections: Vec<(u16, u8)>,
        tables: Vec<(u16, u8, bool)>,
        errors: Vec<Error>,
    }

    impl SectionHandler for Recorder {
        fn on_section(&mut self, pid: u16, section: &Section) {
            self.sections.push((pid, section.table_id()));
        }
        fn on_table(&mut self, pid: u16, table: &BinaryTable) {
            self.tables.push((pid, table.table_id(), table.is_complete()));
        }
        fn on_invalid_section(&mut self, _pid: u16, error: Error) {
            self.errors.push(error);
        }
    }

    fn packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xFFu8; 188];
        buf[0] = 0x47;
        buf[1] = (if pusi { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
        buf[2] = (pid & 0xFF) as u8;
        buf[3] = 0x10 | (cc & 0x0F);
        buf[4..4 + payload.len()].copy_from_slice(payload);
        buf
    }

    #[test]
    fn single_packet_single_section_table_completes_immediately() {
        let mut demux = SectionDemux::new(Recorder::default());
        demux.add_pid(0x0000);
        let section = Section::new_long(0x00, false, 0x1234, 0, true, 0, 0, &[0x00, 0x01, 0xE1, 0x01]).unwrap();
        let mut payload = vec![0x00]; // pointer_field
        payload.extend_from_slice(section.bytes());
        let buf = packet(0x0000, true, 0, &payload);
        let parsed = TSPacket::parse(&buf).unwrap();
        demux.feed_packet(&parsed);
        assert_eq!(demux.handler().tables, vec![(0x0000, 0x00, true)]);
    }

    #[test]
    fn continuity_gap_is_reported_and_buffer_reset() {
        let mut demux = SectionDemux::new(Recorder::default());
        demux.add_pid(0x0020);
        let buf0 = packet(0x0020, true, 0, &[0x00]);
        demux.feed_packet(&TSPacket::parse(&buf0).unwrap());
        let buf2 = packet(0x0020, false, 2, &[0xFF; 100]);
        demux.feed_packet(&TSPacket::parse(&buf2).unwrap());
        assert_eq!(demux.handler().errors, vec![Error::ContinuityError]);
    }

    #[test]
    fn section_spanning_two_packets_completes_on_second() {
        let mut demux = SectionDemux::new(Recorder::default());
        demux.add_pid(0x0000);
        let section = Section::new_long(0x00, false, 0x1234, 0, true, 0, 0, &[0xAA; 40]).unwrap();
        let bytes = section.bytes();
        let split = 50;
        let mut first_payload = vec![0x00];
        first_payload.extend_from_slice(&bytes[..split]);
        let buf0 = packet(0x0000, true, 0, &first_payload);
        demux.feed_packet(&TSPacket::parse(&buf0).unwrap());
        assert!(demux.handler().tables.is_empty());

        let buf1 = packet(0x0000, false, 1, &bytes[split..]);
        demux.feed_packet(&TSPacket::parse(&buf1).unwrap());
        assert_eq!(demux.handler().tables, vec![(0x0000, 0x00, true)]);
    }

    #[test]
    fn unfiltered_pid_is_ignored() {
        let mut demux = SectionDemux::new(Recorder::default());
        demux.add_pid(0x0000);
        let buf = packet(0x0010, true, 0, &[0x00, 0x72, 0x30, 0xFF, 0xFF]);
        demux.feed_packet(&TSPacket::parse(&buf).unwrap());
        assert!(demux.handler().sections.is_empty());
    }
}
