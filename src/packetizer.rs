//! Cycling packetizer: serializes a round-robin set of tables back into a
//! stream of transport-stream packets, generating `pointer_field`,
//! `payload_unit_start_indicator`, and continuity counters as it goes.

use crate::error::Result;
use crate::packet::PACKET_SIZE;
use crate::table::BinaryTable;
use modular_bitfield_msb::prelude::*;

/// How the packetizer pads a packet that does not fill the full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuffingPolicy {
    /// Only stuff the final packet of a cycle, so packets otherwise pack tightly.
    AtEnd,
    /// Always start a new packet for each table (never share a packet's tail).
    Always,
    /// Never stuff; short final packets are left with whatever bytes remain.
    Never,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct PacketHeaderBits {
    sync_byte: B8,
    transport_error_indicator: bool,
    payload_unit_start_indicator: bool,
    transport_priority: bool,
    pid: B13,
    scrambling_control: B2,
    has_adaptation_field: bool,
    has_payload: bool,
    continuity_counter: B4,
}

struct Lane {
    pid: u16,
    bytes: Vec<u8>,
    offset: usize,
    continuity_counter: u8,
}

impl Lane {
    fn new(pid: u16, bytes: Vec<u8>) -> Self {
        Self {
            pid,
            bytes,
            offset: 0,
            continuity_counter: 0,
        }
    }
    fn is_exhausted(&self) -> bool {
        self.offset >= self.bytes.len()
    }
    fn rewind(&mut self) {
        self.offset = 0;
    }
}

/// Serializes a fixed set of tables into packets, cycling through them in
/// round-robin order every time [`CyclingPacketizer::next_packet`] is called.
pub struct CyclingPacketizer {
    lanes: Vec<Lane>,
    next_lane: usize,
    stuffing: StuffingPolicy,
    repeat_forever: bool,
}

impl CyclingPacketizer {
    pub fn new(stuffing: StuffingPolicy) -> Self {
        Self {
            lanes: Vec::new(),
            next_lane: 0,
            stuffing,
            repeat_forever: true,
        }
    }

    /// Adds a table to the cycle, flattening its sections into one
    /// contiguous byte stream with no `pointer_field` logic of its own
    /// (that bookkeeping lives in `next_packet`, matching how section
    /// boundaries actually land inside generated packets).
    pub fn add_table(&mut self, pid: u16, table: &BinaryTable) {
        let mut bytes = Vec::with_capacity(table.total_size());
        for section in table.sections() {
            bytes.extend_from_slice(section.bytes());
        }
        self.lanes.push(Lane::new(pid, bytes));
    }

    /// If `false`, each lane is emitted exactly once and then removed from
    /// the cycle instead of rewinding, producing a one-shot carousel pass.
    pub fn set_repeat_forever(&mut self, repeat: bool) {
        self.repeat_forever = repeat;
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Selects the next non-exhausted lane to pull from, rewinding it (or
    /// dropping it under a one-shot pass) when its bytes have run out.
    /// Returns `None` once no lane has anything left to contribute.
    fn pick_lane(&mut self) -> Option<usize> {
        loop {
            if self.lanes.is_empty() {
                return None;
            }
            if self.next_lane >= self.lanes.len() {
                self.next_lane = 0;
            }
            if self.lanes[self.next_lane].is_exhausted() {
                if self.repeat_forever {
                    self.lanes[self.next_lane].rewind();
                } else {
                    self.lanes.remove(self.next_lane);
                    continue;
                }
            }
            let picked = self.next_lane;
            return Some(picked);
        }
    }

    /// Produces the next 188-byte packet in the cycle, or `None` once every
    /// lane has been exhausted under a one-shot (`repeat_forever == false`) pass.
    ///
    /// [`StuffingPolicy::Never`] and [`StuffingPolicy::AtEnd`] both keep
    /// pulling from successive lanes to pack a packet tight, so two short
    /// tables can share one packet; any stuffing left over is whatever the
    /// last lane happened to leave, which only shows up once no lane has
    /// anything left to contribute (or the next lane collides on PID).
    /// [`StuffingPolicy::Always`] instead stops and pads with `0xFF` (the
    /// initial buffer fill) after every single lane contribution, so each
    /// table's sections always start a fresh packet.
    pub fn next_packet(&mut self) -> Result<Option<[u8; PACKET_SIZE]>> {
        let Some(first_lane) = self.pick_lane() else {
            return Ok(None);
        };

        let mut packet = [0xFFu8; PACKET_SIZE];
        let pusi = self.lanes[first_lane].offset == 0;
        let pid = self.lanes[first_lane].pid;
        let continuity_counter = self.lanes[first_lane].continuity_counter;
        self.lanes[first_lane].continuity_counter = (continuity_counter + 1) & 0x0F;

        let mut header = PacketHeaderBits::new();
        header.set_sync_byte(0x47);
        header.set_payload_unit_start_indicator(pusi);
        header.set_pid(pid);
        header.set_has_payload(true);
        header.set_continuity_counter(continuity_counter);
        packet[0..4].copy_from_slice(&header.into_bytes());

        let mut write_at = 4;
        if pusi {
            // Every lane's bytes are pre-flattened section-aligned, so a
            // fresh start always begins a new section at the first payload byte.
            packet[write_at] = 0;
            write_at += 1;
        }

        let mut lane_index = first_lane;
        loop {
            let lane = &mut self.lanes[lane_index];
            let available = PACKET_SIZE - write_at;
            if available == 0 {
                break;
            }
            let remaining = lane.bytes.len() - lane.offset;
            let to_copy = available.min(remaining);
            packet[write_at..write_at + to_copy]
                .copy_from_slice(&lane.bytes[lane.offset..lane.offset + to_copy]);
            lane.offset += to_copy;
            write_at += to_copy;

            if self.stuffing == StuffingPolicy::Always {
                break;
            }
            if write_at >= PACKET_SIZE {
                break;
            }
            self.next_lane = (lane_index + 1) % self.lanes.len().max(1);
            match self.pick_lane() {
                Some(next) if self.lanes[next].pid == pid => {
                    // Packing two runs of the same PID back-to-back in one
                    // packet would need a second pointer_field; simpler to
                    // stop and let the next call start a fresh packet.
                    break;
                }
                Some(next) => lane_index = next,
                None => break,
            }
        }
        self.next_lane = (lane_index + 1) % self.lanes.len().max(1);

        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::Section;

    fn single_section_table(tid: u8) -> BinaryTable {
        let section = Section::new_long(tid, false, 0x1234, 0, true, 0, 0, &[0xAA; 4]).unwrap();
        let mut table = BinaryTable::new(tid, 0x1234, 0, 0);
        table.add_section(section, true).unwrap();
        table
    }

    #[test]
    fn small_table_fits_in_one_packet_with_pusi() {
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::AtEnd);
        packetizer.add_table(0x0000, &single_section_table(0x00));
        let packet = packetizer.next_packet().unwrap().unwrap();
        assert_eq!(packet[0], 0x47);
        assert_eq!(packet[1] & 0x40, 0x40); // PUSI set
        assert_eq!(packet[4], 0); // pointer_field
    }

    #[test]
    fn continuity_counter_advances_across_cycles() {
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::AtEnd);
        packetizer.add_table(0x0000, &single_section_table(0x00));
        let first = packetizer.next_packet().unwrap().unwrap();
        let second = packetizer.next_packet().unwrap().unwrap();
        assert_eq!(first[3] & 0x0F, 0);
        assert_eq!(second[3] & 0x0F, 1);
    }

    #[test]
    fn round_robin_alternates_between_two_lanes() {
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::Always);
        packetizer.add_table(0x0000, &single_section_table(0x00));
        packetizer.add_table(0x0001, &single_section_table(0x01));
        let pid_of = |p: [u8; PACKET_SIZE]| (((p[1] as u16) & 0x1F) << 8) | p[2] as u16;
        let first = packetizer.next_packet().unwrap().unwrap();
        let second = packetizer.next_packet().unwrap().unwrap();
        assert_eq!(pid_of(first), 0x0000);
        assert_eq!(pid_of(second), 0x0001);
    }

    #[test]
    fn one_shot_pass_exhausts_after_every_lane_emitted() {
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::AtEnd);
        packetizer.set_repeat_forever(false);
        packetizer.add_table(0x0000, &single_section_table(0x00));
        assert!(packetizer.next_packet().unwrap().is_some());
        assert!(packetizer.next_packet().unwrap().is_none());
    }

    /// Two tables short enough to both fit in one packet's payload.
    fn two_short_tables() -> (BinaryTable, BinaryTable) {
        (single_section_table(0x00), single_section_table(0x01))
    }

    #[test]
    fn at_end_packs_two_short_lanes_into_one_packet() {
        let (a, b) = two_short_tables();
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::AtEnd);
        packetizer.add_table(0x0000, &a);
        packetizer.add_table(0x0001, &b);
        let packet = packetizer.next_packet().unwrap().unwrap();
        // Both lanes' section bytes (0xAA-filled payload) should appear
        // packed into the same packet rather than one per packet.
        let payload = &packet[5..]; // pointer_field at [4], payload starts at [5]
        assert!(payload.windows(4).any(|w| w == [0xAA; 4]));
        assert!(payload.iter().filter(|&&b| b == 0xAA).count() >= 8);
    }

    #[test]
    fn always_stuffs_every_packet_even_with_room_to_spare() {
        let (a, b) = two_short_tables();
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::Always);
        packetizer.add_table(0x0000, &a);
        packetizer.add_table(0x0001, &b);
        let packet = packetizer.next_packet().unwrap().unwrap();
        let pid_of = |p: &[u8; PACKET_SIZE]| (((p[1] as u16) & 0x1F) << 8) | p[2] as u16;
        assert_eq!(pid_of(&packet), 0x0000);
        // Only the first lane's bytes made it in; the rest of the packet is
        // 0xFF stuffing, unlike AtEnd which would have packed the second
        // lane's bytes into the same packet.
        assert!(packet[PACKET_SIZE - 1] == 0xFF);
        let second = packetizer.next_packet().unwrap().unwrap();
        assert_eq!(pid_of(&second), 0x0001);
    }

    #[test]
    fn never_keeps_packing_lanes_until_the_packet_is_full() {
        let (a, b) = two_short_tables();
        let mut packetizer = CyclingPacketizer::new(StuffingPolicy::Never);
        packetizer.add_table(0x0000, &a);
        packetizer.add_table(0x0001, &b);
        let packet = packetizer.next_packet().unwrap().unwrap();
        let payload = &packet[5..];
        assert!(payload.iter().filter(|&&byte| byte == 0xAA).count() >= 8);
    }
}
