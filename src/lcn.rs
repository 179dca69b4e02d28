//! Logical channel number (LCN) accumulation.
//!
//! Several incompatible private descriptors carry a service's end-user
//! channel number: DVB's own LCN descriptor, its HD-simulcast variant,
//! Nordig v1/v2, and EACEM — all four share the same `(service_id, visible,
//! lcn)` entry shape modulo reserved-bit placement, so one [`LcnMap`]
//! accumulates whichever of them a broadcaster actually sends and exposes a
//! single lookup keyed by `(original_network_id, transport_stream_id,
//! service_id)`.

use modular_bitfield_msb::prelude::*;
use std::collections::HashMap;

/// `get_lcn` returns this when no descriptor named the service.
pub const LCN_UNKNOWN: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ServiceKey {
    original_network_id: u16,
    transport_stream_id: u16,
    service_id: u16,
}

#[derive(Debug, Clone, Copy)]
struct LcnEntry {
    lcn: u16,
    visible: bool,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct LcnSlot {
    service_id: B16,
    visible_service_flag: bool,
    reserved: B5,
    logical_channel_number: B10,
}

/// Accumulated LCN bindings for an entire network, gathered across NIT/BAT
/// transport-stream descriptor loops.
#[derive(Debug, Clone, Default)]
pub struct LcnMap {
    entries: HashMap<ServiceKey, LcnEntry>,
}

impl LcnMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: ServiceKey, lcn: u16, visible: bool) {
        // First descriptor flavour to name a service wins; broadcasters do
        // not mix flavours for the same service within one network.
        self.entries.entry(key).or_insert(LcnEntry { lcn, visible });
    }

    /// Absorbs a DVB logical_channel_descriptor (tag 0x83) payload: a flat
    /// array of 4-byte `(service_id:16, visible:1, reserved:5, lcn:10)` slots.
    pub fn add_dvb_lcn(&mut self, original_network_id: u16, transport_stream_id: u16, payload: &[u8]) {
        self.add_slots(original_network_id, transport_stream_id, payload);
    }

    /// Absorbs a DVB HD-simulcast logical_channel_descriptor (tag 0x88):
    /// identical wire shape to the SD variant, just a different tag context.
    pub fn add_hd_simulcast_lcn(
        &mut self,
        original_network_id: u16,
        transport_stream_id: u16,
        payload: &[u8],
    ) {
        self.add_slots(original_network_id, transport_stream_id, payload);
    }

    /// Absorbs a Nordig logical channel descriptor, v1 or v2 (both tag
    /// 0x83 in their respective private data specifier scope, same slot shape).
    pub fn add_nordig_lcn(&mut self, original_network_id: u16, transport_stream_id: u16, payload: &[u8]) {
        self.add_slots(original_network_id, transport_stream_id, payload);
    }

    /// Absorbs an EACEM/Astra SGT-style logical channel descriptor: same
    /// slot shape as the DVB form.
    pub fn add_eacem_lcn(&mut self, original_network_id: u16, transport_stream_id: u16, payload: &[u8]) {
        self.add_slots(original_network_id, transport_stream_id, payload);
    }

    fn add_slots(&mut self, original_network_id: u16, transport_stream_id: u16, payload: &[u8]) {
        for chunk in payload.chunks_exact(4) {
            let slot = LcnSlot::from_bytes(chunk.try_into().unwrap());
            let key = ServiceKey {
                original_network_id,
                transport_stream_id,
                service_id: slot.service_id(),
            };
            self.insert(key, slot.logical_channel_number(), slot.visible_service_flag());
        }
    }

    /// The logical channel number bound to a service, or [`LCN_UNKNOWN`].
    pub fn get_lcn(&self, original_network_id: u16, transport_stream_id: u16, service_id: u16) -> u16 {
        self.entries
            .get(&ServiceKey {
                original_network_id,
                transport_stream_id,
                service_id,
            })
            .map(|e| e.lcn)
            .unwrap_or(LCN_UNKNOWN)
    }

    /// Whether a service should be shown in a channel list; `true` for any
    /// service no descriptor mentioned, matching the wire default.
    pub fn get_visible(&self, original_network_id: u16, transport_stream_id: u16, service_id: u16) -> bool {
        self.entries
            .get(&ServiceKey {
                original_network_id,
                transport_stream_id,
                service_id,
            })
            .map(|e| e.visible)
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(service_id: u16, visible: bool, lcn: u16) -> [u8; 4] {
        let mut s = LcnSlot::new();
        s.set_service_id(service_id);
        s.set_visible_service_flag(visible);
        s.set_logical_channel_number(lcn);
        s.into_bytes()
    }

    #[test]
    fn looks_up_lcn_and_visibility_after_accumulation() {
        let mut map = LcnMap::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&slot(0x0001, true, 101));
        payload.extend_from_slice(&slot(0x0002, false, 102));
        map.add_dvb_lcn(0x1000, 0x2000, &payload);

        assert_eq!(map.get_lcn(0x1000, 0x2000, 0x0001), 101);
        assert!(map.get_visible(0x1000, 0x2000, 0x0001));
        assert_eq!(map.get_lcn(0x1000, 0x2000, 0x0002), 102);
        assert!(!map.get_visible(0x1000, 0x2000, 0x0002));
    }

    #[test]
    fn unknown_service_returns_sentinel_and_default_visibility() {
        let map = LcnMap::new();
        assert_eq!(map.get_lcn(0x1000, 0x2000, 0x0099), LCN_UNKNOWN);
        assert!(map.get_visible(0x1000, 0x2000, 0x0099));
    }

    #[test]
    fn first_flavour_to_claim_a_service_wins() {
        let mut map = LcnMap::new();
        map.add_dvb_lcn(0x1000, 0x2000, &slot(0x0001, true, 5));
        map.add_nordig_lcn(0x1000, 0x2000, &slot(0x0001, true, 9));
        assert_eq!(map.get_lcn(0x1000, 0x2000, 0x0001), 5);
    }

    #[test]
    fn entries_are_scoped_per_transport_stream() {
        let mut map = LcnMap::new();
        map.add_dvb_lcn(0x1000, 0x2000, &slot(0x0001, true, 5));
        assert_eq!(map.get_lcn(0x1000, 0x3000, 0x0001), LCN_UNKNOWN);
    }
}
