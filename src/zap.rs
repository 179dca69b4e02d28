//! Service-selection processor ("zap"): rewrites a stream down to one or
//! more selected services, dropping everything else.
//!
//! Feeds from the same two channels as [`crate::analyzer::PsiAnalyzer`] — a
//! raw packet stream for PID classification and a parallel
//! [`crate::demux::SectionDemux`] for PAT/SDT/PMT/EIT tables — and produces
//! rewritten PAT/SDT/PMT tables plus a per-PID forwarding decision.

use crate::descriptor::DescriptorList;
use crate::descriptors::ca::TAG as CA_TAG;
use crate::descriptors::iso639_language::Iso639LanguageDescriptor;
use crate::descriptors::service::ServiceDescriptor;
use crate::error::{Error, Result};
use crate::table::BinaryTable;
use crate::tables::pat::Pat;
use crate::tables::pmt::{ElementaryStream, Pmt};
use crate::tables::sdt::Sdt;
use crate::tables::{is_eit_table_id, TID_EIT_OTHER_PF};
use std::collections::{HashMap, HashSet};

const TAG_SUBTITLING: u8 = 0x59;

/// Names a service to keep, either directly or by the name broadcast in the SDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSelector {
    ById(u16),
    ByName(String),
}

/// How a dropped PID's packets are turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuffingMode {
    Drop,
    ReplaceWithNull,
}

/// Tunable filters applied to a selected service's PMT.
#[derive(Debug, Clone, Default)]
pub struct ZapFilters {
    pub no_ecm: bool,
    pub audio_langs: Vec<[u8; 3]>,
    pub audio_pids: HashSet<u16>,
    pub subtitle_langs: Vec<[u8; 3]>,
    pub subtitle_pids: HashSet<u16>,
}

#[derive(Debug, Clone)]
pub struct ZapOptions {
    pub selectors: Vec<ServiceSelector>,
    pub filters: ZapFilters,
    pub include_cas: bool,
    pub include_eit: bool,
    pub ignore_absent: bool,
    pub stuffing_mode: StuffingMode,
}

impl Default for ZapOptions {
    fn default() -> Self {
        Self {
            selectors: Vec::new(),
            filters: ZapFilters::default(),
            include_cas: true,
            include_eit: true,
            ignore_absent: false,
            stuffing_mode: StuffingMode::Drop,
        }
    }
}

/// How the zap processor wants a given PID's packets forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidClass {
    Drop,
    Pass,
    Pat,
    Sdt,
    Pmt,
    Pes,
    Data,
    Emm,
}

#[derive(Debug, Clone, Default)]
struct ServiceState {
    service_id: Option<u16>,
    pmt_pid: Option<u16>,
    component_pids: HashSet<u16>,
}

/// Stateful selection processor for one or more services.
pub struct ZapProcessor {
    options: ZapOptions,
    services: Vec<ServiceState>,
    pid_classes: HashMap<u16, PidClass>,
}

impl ZapProcessor {
    pub fn new(options: ZapOptions) -> Self {
        let mut services = Vec::with_capacity(options.selectors.len());
        for selector in &options.selectors {
            let service_id = match selector {
                ServiceSelector::ById(id) => Some(*id),
                ServiceSelector::ByName(_) => None,
            };
            services.push(ServiceState {
                service_id,
                ..Default::default()
            });
        }
        Self {
            options,
            services,
            pid_classes: HashMap::new(),
        }
    }

    fn selected_service_ids(&self) -> HashSet<u16> {
        self.services.iter().filter_map(|s| s.service_id).collect()
    }

    /// Resolves any `ByName` selector against a completed SDT's service
    /// names. Call this whenever an SDT table completes, before
    /// [`Self::handle_pat`] needs service ids to match against.
    pub fn resolve_names(&mut self, sdt: &Sdt) {
        for (index, selector) in self.options.selectors.clone().iter().enumerate() {
            let ServiceSelector::ByName(name) = selector else {
                continue;
            };
            if self.services[index].service_id.is_some() {
                continue;
            }
            for svc in &sdt.services {
                if let Some(parsed) = find_service_name(&svc.descriptors) {
                    if parsed.eq_ignore_ascii_case(name) {
                        self.services[index].service_id = Some(svc.service_id);
                        break;
                    }
                }
            }
        }
    }

    /// Builds a rewritten PAT containing only the NIT-pointer entry (if any)
    /// and the selected services, recording each selected service's PMT PID.
    pub fn handle_pat(&mut self, pat: &Pat) -> Result<Pat> {
        let selected = self.selected_service_ids();
        let mut programs = Vec::new();
        if let Some(nit_pid) = pat.nit_pid() {
            programs.push(crate::tables::pat::ProgramAssociation {
                program_number: 0,
                pid: nit_pid,
            });
        }
        for (service_id, pmt_pid) in pat.pmts() {
            if selected.contains(&service_id) {
                programs.push(crate::tables::pat::ProgramAssociation {
                    program_number: service_id,
                    pid: pmt_pid,
                });
                for state in self.services.iter_mut() {
                    if state.service_id == Some(service_id) {
                        state.pmt_pid = Some(pmt_pid);
                        self.pid_classes.insert(pmt_pid, PidClass::Pmt);
                    }
                }
            }
        }

        let missing = self
            .services
            .iter()
            .any(|s| s.service_id.map(|id| !selected.contains(&id)).unwrap_or(true));
        if missing && !self.options.ignore_absent {
            return Err(Error::InvalidField("selected service absent from PAT"));
        }

        Ok(Pat {
            transport_stream_id: pat.transport_stream_id,
            version: pat.version,
            is_current: pat.is_current,
            programs,
        })
    }

    /// Builds a rewritten SDT containing only the selected services;
    /// `SDT other` is dropped entirely (its PID is classified [`PidClass::Drop`]).
    pub fn handle_sdt(&self, sdt: &Sdt) -> Option<Sdt> {
        if !sdt.is_actual {
            return None;
        }
        let selected = self.selected_service_ids();
        let services: Vec<_> = sdt
            .services
            .iter()
            .filter(|s| selected.contains(&s.service_id))
            .cloned()
            .collect();
        Some(Sdt {
            is_actual: true,
            transport_stream_id: sdt.transport_stream_id,
            version: sdt.version,
            is_current: sdt.is_current,
            original_network_id: sdt.original_network_id,
            services,
        })
    }

    /// Filters one selected service's PMT per [`ZapFilters`], recording its
    /// elementary-stream PIDs for later PID classification. Returns `None`
    /// if `pmt.program_number` names a service this processor did not select.
    pub fn handle_pmt(&mut self, pmt: &Pmt) -> Option<Pmt> {
        let state_index = self
            .services
            .iter()
            .position(|s| s.service_id == Some(pmt.program_number))?;

        let program_descriptors = if self.options.filters.no_ecm {
            drop_ca_descriptors(&pmt.program_descriptors)
        } else {
            pmt.program_descriptors.clone()
        };

        let mut streams = Vec::new();
        let mut pids = HashSet::new();
        if pmt.pcr_pid != crate::tables::pmt::PCR_PID_NONE {
            pids.insert(pmt.pcr_pid);
        }
        for stream in &pmt.streams {
            if !self.keep_stream(stream) {
                continue;
            }
            let descriptors = if self.options.filters.no_ecm {
                drop_ca_descriptors(&stream.descriptors)
            } else {
                stream.descriptors.clone()
            };
            pids.insert(stream.elementary_pid);
            streams.push(ElementaryStream {
                stream_type: stream.stream_type,
                elementary_pid: stream.elementary_pid,
                descriptors,
            });
        }

        self.services[state_index].component_pids = pids.clone();
        for pid in &pids {
            self.pid_classes.insert(
                *pid,
                if is_likely_audio_or_video(&streams, *pid) {
                    PidClass::Pes
                } else {
                    PidClass::Data
                },
            );
        }

        Some(Pmt {
            program_number: pmt.program_number,
            version: pmt.version,
            is_current: pmt.is_current,
            pcr_pid: pmt.pcr_pid,
            program_descriptors,
            streams,
        })
    }

    fn keep_stream(&self, stream: &ElementaryStream) -> bool {
        let filters = &self.options.filters;
        let has_lang_filter = !filters.audio_langs.is_empty() || !filters.subtitle_langs.is_empty();
        let has_pid_filter = !filters.audio_pids.is_empty() || !filters.subtitle_pids.is_empty();
        if !has_lang_filter && !has_pid_filter {
            return true;
        }
        if filters.audio_pids.contains(&stream.elementary_pid)
            || filters.subtitle_pids.contains(&stream.elementary_pid)
        {
            return true;
        }
        if !filters.audio_langs.is_empty() && has_language(&stream.descriptors, &filters.audio_langs) {
            return true;
        }
        if !filters.subtitle_langs.is_empty()
            && has_subtitle_language(&stream.descriptors, &filters.subtitle_langs)
        {
            return true;
        }
        // Neither an audio nor subtitle candidate: keep streams that aren't
        // subject to either filter (e.g. video).
        !is_audio_stream_type(stream.stream_type) && descriptor_tag(&stream.descriptors, TAG_SUBTITLING).is_none()
    }

    /// Decides how an EIT table should be forwarded: entirely dropped if it
    /// is an "other transport stream" EIT (unless `include_eit` is false,
    /// which drops all EITs), else kept only if its `table_id_extension`
    /// (the EIT's service id) is one of the selected services.
    pub fn filter_eit(&self, table: &BinaryTable) -> bool {
        if !self.options.include_eit || !is_eit_table_id(table.table_id()) {
            return false;
        }
        if table.table_id() == TID_EIT_OTHER_PF || (0x60..=0x6F).contains(&table.table_id()) {
            return false;
        }
        self.selected_service_ids().contains(&table.table_id_extension())
    }

    /// Final classification for a PID once PAT/PMT/SDT processing has run.
    pub fn classify_pid(&self, pid: u16, pat_pid: u16, sdt_bat_pid: u16, cat_pid: u16) -> PidClass {
        if pid == pat_pid {
            return PidClass::Pat;
        }
        if pid == sdt_bat_pid {
            return PidClass::Sdt;
        }
        if pid == cat_pid {
            return if self.options.include_cas {
                PidClass::Emm
            } else {
                PidClass::Drop
            };
        }
        self.pid_classes.get(&pid).copied().unwrap_or(PidClass::Drop)
    }
}

fn find_service_name(descriptors: &DescriptorList) -> Option<String> {
    descriptors.iter().find_map(|(d, _)| {
        if d.tag() == crate::descriptors::service::TAG {
            ServiceDescriptor::parse(d)
                .ok()
                .map(|s| String::from_utf8_lossy(&s.service_name).into_owned())
        } else {
            None
        }
    })
}

fn drop_ca_descriptors(list: &DescriptorList) -> DescriptorList {
    let mut out = DescriptorList::new();
    for (d, _) in list.iter() {
        if d.tag() != CA_TAG {
            out.add(d.clone());
        }
    }
    out
}

fn descriptor_tag<'a>(list: &'a DescriptorList, tag: u8) -> Option<&'a crate::descriptor::Descriptor> {
    list.iter().find(|(d, _)| d.tag() == tag).map(|(d, _)| d)
}

fn has_language(list: &DescriptorList, wanted: &[[u8; 3]]) -> bool {
    list.iter().any(|(d, _)| {
        d.tag() == crate::descriptor::TAG_ISO_639_LANGUAGE
            && Iso639LanguageDescriptor::parse(d)
                .map(|parsed| parsed.entries.iter().any(|e| wanted.contains(&e.language_code)))
                .unwrap_or(false)
    })
}

fn has_subtitle_language(list: &DescriptorList, wanted: &[[u8; 3]]) -> bool {
    list.iter().any(|(d, _)| {
        d.tag() == TAG_SUBTITLING
            && d.payload()
                .chunks(8)
                .any(|c| c.len() >= 3 && wanted.contains(&[c[0], c[1], c[2]]))
    })
}

const AUDIO_STREAM_TYPES: [u8; 4] = [0x03, 0x04, 0x0F, 0x11];

fn is_audio_stream_type(stream_type: u8) -> bool {
    AUDIO_STREAM_TYPES.contains(&stream_type)
}

fn is_likely_audio_or_video(streams: &[ElementaryStream], pid: u16) -> bool {
    streams
        .iter()
        .find(|s| s.elementary_pid == pid)
        .map(|s| is_audio_stream_type(s.stream_type) || s.stream_type == 0x01 || s.stream_type == 0x02)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::pat::ProgramAssociation;

    fn sample_pat() -> Pat {
        Pat {
            transport_stream_id: 0x1,
            version: 0,
            is_current: true,
            programs: vec![
                ProgramAssociation { program_number: 0x0001, pid: 0x0101 },
                ProgramAssociation { program_number: 0x0002, pid: 0x0102 },
                ProgramAssociation { program_number: 0x0003, pid: 0x0103 },
            ],
        }
    }

    #[test]
    fn pat_rewritten_to_selected_service_only() {
        let mut zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0002)],
            ..Default::default()
        });
        let rewritten = zap.handle_pat(&sample_pat()).unwrap();
        assert_eq!(rewritten.programs.len(), 1);
        assert_eq!(rewritten.programs[0].program_number, 0x0002);
        assert_eq!(rewritten.programs[0].pid, 0x0102);
    }

    #[test]
    fn absent_service_is_fatal_unless_ignored() {
        let mut zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0099)],
            ..Default::default()
        });
        assert!(zap.handle_pat(&sample_pat()).is_err());

        let mut zap_tolerant = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0099)],
            ignore_absent: true,
            ..Default::default()
        });
        assert!(zap_tolerant.handle_pat(&sample_pat()).is_ok());
    }

    #[test]
    fn sdt_other_is_dropped_entirely() {
        let zap = ZapProcessor::new(ZapOptions::default());
        let sdt = Sdt {
            is_actual: false,
            transport_stream_id: 1,
            version: 0,
            is_current: true,
            original_network_id: 1,
            services: vec![],
        };
        assert!(zap.handle_sdt(&sdt).is_none());
    }

    #[test]
    fn pmt_drops_ecm_when_no_ecm_requested() {
        let mut zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0001)],
            filters: ZapFilters {
                no_ecm: true,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut program_descriptors = DescriptorList::new();
        program_descriptors.add(crate::descriptor::Descriptor::new(CA_TAG, &[0, 0, 0xE1, 0x00]).unwrap());
        let pmt = Pmt {
            program_number: 0x0001,
            version: 0,
            is_current: true,
            pcr_pid: 0x0200,
            program_descriptors,
            streams: vec![],
        };
        let filtered = zap.handle_pmt(&pmt).unwrap();
        assert!(filtered.program_descriptors.is_empty());
    }

    #[test]
    fn unselected_pmt_is_ignored() {
        let mut zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0001)],
            ..Default::default()
        });
        let pmt = Pmt {
            program_number: 0x0099,
            version: 0,
            is_current: true,
            pcr_pid: 0x0200,
            program_descriptors: DescriptorList::new(),
            streams: vec![],
        };
        assert!(zap.handle_pmt(&pmt).is_none());
    }

    #[test]
    fn eit_other_ts_is_filtered_out() {
        let zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0001)],
            ..Default::default()
        });
        let table = BinaryTable::new(TID_EIT_OTHER_PF, 0x0001, 0, 0x0012);
        assert!(!zap.filter_eit(&table));
    }

    #[test]
    fn eit_actual_for_selected_service_passes() {
        let zap = ZapProcessor::new(ZapOptions {
            selectors: vec![ServiceSelector::ById(0x0001)],
            ..Default::default()
        });
        let table = BinaryTable::new(0x4E, 0x0001, 0, 0x0012);
        assert!(zap.filter_eit(&table));
        let other_service = BinaryTable::new(0x4E, 0x0002, 0, 0x0012);
        assert!(!zap.filter_eit(&other_service));
    }
}
