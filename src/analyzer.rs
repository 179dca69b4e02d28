//! PSI/TS analyzer: per-PID and per-service statistics, PCR-based bitrate
//! estimation, and PSI/SI-driven service discovery.
//!
//! Packets are fed in two parallel ways: every packet for per-PID counters
//! via [`PsiAnalyzer::feed_packet`], and completed tables via
//! [`PsiAnalyzer::on_table`] (wiring a [`crate::demux::SectionHandler`] impl
//! to a [`crate::demux::SectionDemux`] that shares the same packet stream).
//! Per-service aggregates are only current after [`PsiAnalyzer::recompute_statistics`].

use crate::packet::TSPacket;
use crate::table::BinaryTable;
use crate::tables::cat::Cat;
use crate::tables::pat::Pat;
use crate::tables::pmt::Pmt;
use crate::tables::sdt::Sdt;
use crate::tables::{TID_CAT, TID_PAT, TID_PMT, TID_SDT_ACTUAL, TID_SDT_OTHER};
use std::collections::{HashMap, HashSet};

/// A CA system's known operator family, classified from its `ca_system_id`.
/// Ranges are representative, not an exhaustive CAS registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOperator {
    Mediaguard,
    Viaccess,
    SafeAccess,
    Unknown,
}

impl CasOperator {
    pub fn of(ca_system_id: u16) -> Self {
        match ca_system_id {
            0x0100..=0x01FF => CasOperator::Mediaguard,
            0x0500..=0x05FF => CasOperator::Viaccess,
            0x4ABF => CasOperator::SafeAccess,
            _ => CasOperator::Unknown,
        }
    }
}

/// How a PID is currently understood by [`PsiAnalyzer::recompute_statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidClass {
    /// Referenced by PSI/SI structure but not tied to one service (e.g. NIT, SDT, CAT).
    Global,
    /// Seen in the stream but not named by any PAT/PMT/global table.
    Unreferenced,
    /// Carries content for exactly the services recorded in `referenced_by`.
    PerService,
}

/// Accumulates a running average bitrate from consecutive PCR deltas,
/// rejecting samples that go backwards or exceed a one-second gap (the
/// estimator's drift under skew is a documented property, not a bug: see
/// [`PsiAnalyzer::pid_bitrate`]).
#[derive(Debug, Clone, Copy, Default)]
struct BitrateEstimator {
    last_pcr_ticks: Option<u64>,
    last_packet_index: Option<u64>,
    sum_bits_per_second: f64,
    sample_count: u64,
}

const PCR_FREQUENCY_HZ: u64 = 27_000_000;
const ONE_SECOND_IN_TICKS: u64 = PCR_FREQUENCY_HZ;
const PCR_WRAP_TICKS: u64 = 1u64 << 42;

impl BitrateEstimator {
    fn sample(&mut self, packet_index: u64, pcr_ticks: u64) {
        if let (Some(last_ticks), Some(last_index)) = (self.last_pcr_ticks, self.last_packet_index) {
            let delta_ticks = if pcr_ticks >= last_ticks {
                pcr_ticks - last_ticks
            } else {
                // Handle the 42-bit PCR wraparound rather than reading it as "went backwards".
                PCR_WRAP_TICKS - last_ticks + pcr_ticks
            };
            let delta_packets = packet_index.saturating_sub(last_index);
            if delta_ticks > 0 && delta_ticks <= ONE_SECOND_IN_TICKS && delta_packets > 0 {
                let seconds = delta_ticks as f64 / PCR_FREQUENCY_HZ as f64;
                let bits = delta_packets as f64 * crate::packet::PACKET_SIZE as f64 * 8.0;
                self.sum_bits_per_second += bits / seconds;
                self.sample_count += 1;
            }
        }
        self.last_pcr_ticks = Some(pcr_ticks);
        self.last_packet_index = Some(packet_index);
    }

    fn average(&self) -> Option<f64> {
        if self.sample_count == 0 {
            None
        } else {
            Some(self.sum_bits_per_second / self.sample_count as f64)
        }
    }
}

/// Per-PID counters and discovered context.
#[derive(Debug, Clone, Default)]
pub struct PidRecord {
    pub first_packet_seen: Option<u64>,
    pub last_packet_seen: Option<u64>,
    pub packet_count: u64,
    pub unit_start_count: u64,
    pub scrambled_count: u64,
    pub duplicate_count: u64,
    pub discontinuities_expected: u64,
    pub discontinuities_unexpected: u64,
    pub pcr_count: u64,
    pub referenced_by: HashSet<u16>,
    last_continuity_counter: Option<u8>,
    bitrate: BitrateEstimator,
}

impl PidRecord {
    /// Rolling-average bitrate in bits/second, or `None` with fewer than one
    /// accepted PCR interval.
    pub fn bitrate_bps(&self) -> Option<f64> {
        self.bitrate.average()
    }
}

/// Per-service aggregate, populated by PSI/SI discovery and
/// [`PsiAnalyzer::recompute_statistics`].
#[derive(Debug, Clone, Default)]
pub struct ServiceRecord {
    pub name: String,
    pub provider: String,
    pub service_type: u8,
    pub pmt_pid: Option<u16>,
    pub pcr_pid: Option<u16>,
    pub pids: HashSet<u16>,
    pub scrambled: bool,
}

/// Stateful PSI/TS analyzer.
#[derive(Default)]
pub struct PsiAnalyzer {
    packet_index: u64,
    pids: HashMap<u16, PidRecord>,
    services: HashMap<u16, ServiceRecord>,
    cas_operators: HashMap<u16, CasOperator>,
    pmt_pids_seen: HashSet<u16>,
    global_pids: HashSet<u16>,
}

impl PsiAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates per-PID counters for one packet. Call this for every packet
    /// of the stream, in addition to feeding the same packet to a
    /// [`crate::demux::SectionDemux`] wired to [`PsiAnalyzer::on_table`].
    pub fn feed_packet(&mut self, packet: &TSPacket) {
        let pid = packet.pid();
        let index = self.packet_index;
        self.packet_index += 1;

        let record = self.pids.entry(pid).or_default();
        record.first_packet_seen.get_or_insert(index);
        record.last_packet_seen = Some(index);
        record.packet_count += 1;
        if packet.pusi() {
            record.unit_start_count += 1;
        }
        if packet.is_scrambled() {
            record.scrambled_count += 1;
        }

        let cc = packet.header.continuity_counter();
        let has_payload_cc = packet.payload.is_some();
        if has_payload_cc {
            if let Some(last) = record.last_continuity_counter {
                if cc == last {
                    record.duplicate_count += 1;
                } else if cc != (last + 1) & 0x0F {
                    let expected = packet
                        .adaptation_field
                        .as_ref()
                        .map(|af| af.header.discontinuity_indicator())
                        .unwrap_or(false);
                    if expected {
                        record.discontinuities_expected += 1;
                    } else {
                        record.discontinuities_unexpected += 1;
                    }
                }
            }
            record.last_continuity_counter = Some(cc);
        }

        if let Some(pcr) = packet.pcr() {
            record.pcr_count += 1;
            record.bitrate.sample(index, pcr.as_27mhz_ticks());
        }
    }

    /// Feeds one reassembled table, driving PSI/SI discovery. Intended as
    /// the `on_table` half of a [`crate::demux::SectionHandler`] wrapper.
    pub fn on_table(&mut self, pid: u16, table: &BinaryTable) {
        match table.table_id() {
            TID_PAT => {
                self.global_pids.insert(pid);
                if let Ok(pat) = Pat::deserialize(table) {
                    for (service_id, pmt_pid) in pat.pmts() {
                        self.pmt_pids_seen.insert(pmt_pid);
                        self.services.entry(service_id).or_default().pmt_pid = Some(pmt_pid);
                    }
                }
            }
            TID_PMT => {
                if let Ok(pmt) = Pmt::deserialize(table) {
                    let service = self.services.entry(pmt.program_number).or_default();
                    service.pmt_pid = Some(pid);
                    if pmt.pcr_pid != crate::tables::pmt::PCR_PID_NONE {
                        service.pcr_pid = Some(pmt.pcr_pid);
                        service.pids.insert(pmt.pcr_pid);
                    }
                    for stream in &pmt.streams {
                        service.pids.insert(stream.elementary_pid);
                        self.pids
                            .entry(stream.elementary_pid)
                            .or_default()
                            .referenced_by
                            .insert(pmt.program_number);
                    }
                    for (d, _) in pmt.program_descriptors.iter() {
                        self.note_ca_descriptor(d);
                    }
                    for stream in &pmt.streams {
                        for (d, _) in stream.descriptors.iter() {
                            self.note_ca_descriptor(d);
                        }
                    }
                }
            }
            TID_CAT => {
                self.global_pids.insert(pid);
                if let Ok(cat) = Cat::deserialize(table) {
                    for (d, _) in cat.descriptors.iter() {
                        self.note_ca_descriptor(d);
                    }
                }
            }
            TID_SDT_ACTUAL | TID_SDT_OTHER => {
                self.global_pids.insert(pid);
                if let Ok(sdt) = Sdt::deserialize(table) {
                    for svc in &sdt.services {
                        for (d, _) in svc.descriptors.iter() {
                            if d.tag() == crate::descriptors::service::TAG {
                                if let Ok(parsed) = crate::descriptors::service::ServiceDescriptor::parse(d) {
                                    let service = self.services.entry(svc.service_id).or_default();
                                    service.name = String::from_utf8_lossy(&parsed.service_name).into_owned();
                                    service.provider = String::from_utf8_lossy(&parsed.provider_name).into_owned();
                                    service.service_type = parsed.service_type;
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn note_ca_descriptor(&mut self, descriptor: &crate::descriptor::Descriptor) {
        if descriptor.tag() != crate::descriptors::ca::TAG {
            return;
        }
        if let Ok(ca) = crate::descriptors::ca::CaDescriptor::parse(descriptor) {
            self.cas_operators
                .insert(ca.ca_system_id, CasOperator::of(ca.ca_system_id));
        }
    }

    /// Flattens per-PID and PSI/SI discovery state into the final
    /// per-service aggregates (scrambled flag, full PID set). Call after
    /// feeding a representative slice of the stream.
    pub fn recompute_statistics(&mut self) {
        for service in self.services.values_mut() {
            service.scrambled = service
                .pids
                .iter()
                .filter_map(|pid| self.pids.get(pid))
                .any(|record| record.scrambled_count > 0);
        }
    }

    /// Classifies `pid` as global (PSI/SI table carrier not tied to a
    /// service), per-service, or unreferenced.
    pub fn classify_pid(&self, pid: u16) -> PidClass {
        if self.global_pids.contains(&pid) {
            return PidClass::Global;
        }
        match self.pids.get(&pid) {
            Some(record) if !record.referenced_by.is_empty() => PidClass::PerService,
            _ => PidClass::Unreferenced,
        }
    }

    pub fn pid_record(&self, pid: u16) -> Option<&PidRecord> {
        self.pids.get(&pid)
    }

    pub fn service(&self, service_id: u16) -> Option<&ServiceRecord> {
        self.services.get(&service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = (&u16, &ServiceRecord)> {
        self.services.iter()
    }

    pub fn cas_operators(&self) -> impl Iterator<Item = (&u16, &CasOperator)> {
        self.cas_operators.iter()
    }
}
