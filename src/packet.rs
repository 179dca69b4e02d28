//! Transport-stream packet model.
//!
//! Covers the 4-byte header, optional adaptation field with PCR/OPCR
//! timestamps, the 204-byte ISDB-T trailer variant, and payload access.

use crate::error::{Error, Result};
use crate::slice_reader::{read_bitfield, SliceReader};
use modular_bitfield_msb::prelude::*;

/// Standard packet size per ISO/IEC 13818-1.
pub const PACKET_SIZE: usize = 188;
/// Packet size used by ISDB-T recordings that append a 16-byte trailer.
pub const PACKET_SIZE_204: usize = 204;
/// PID value reserved for null (stuffing) packets.
pub const NULL_PID: u16 = 0x1FFF;

/// TSC information used in a packet's header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum ScramblingControl {
    /// Not scrambled.
    NotScrambled,
    /// Reserved value; not used by any documented system.
    Reserved,
    /// Scrambled with the even-numbered control word.
    ScrambledEvenKey,
    /// Scrambled with the odd-numbered control word.
    ScrambledOddKey,
}

impl ScramblingControl {
    /// True for either scrambled variant.
    pub fn is_scrambled(self) -> bool {
        matches!(
            self,
            ScramblingControl::ScrambledEvenKey | ScramblingControl::ScrambledOddKey
        )
    }
}

/// Link-layer header found at the start of every TS packet.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sync_byte: B8,
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: B13,
    pub scrambling_control: ScramblingControl,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: B4,
}

/// Non-payload packet metadata carried in the adaptation field.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationFieldHeader {
    pub length: B8,
    pub discontinuity_indicator: bool,
    pub random_access_indicator: bool,
    pub elementary_stream_priority_indicator: bool,
    pub has_pcr: bool,
    pub has_opcr: bool,
    pub has_splicing_point: bool,
    pub has_transport_private_data: bool,
    pub has_adaptation_field_extension: bool,
}

/// A 42-bit Program Clock Reference sample (spec GLOSSARY).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcrTimestamp {
    /// 33 bits of a 90kHz base clock.
    pub base: u64,
    /// 9 bits of a 27MHz clock rolling over every 300 counts into the base.
    pub extension: u16,
}

impl PcrTimestamp {
    /// Full value expressed in 27MHz ticks.
    pub fn as_27mhz_ticks(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }
}

/// Parsed adaptation field.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationField {
    pub header: AdaptationFieldHeader,
    pub pcr: Option<PcrTimestamp>,
    pub opcr: Option<PcrTimestamp>,
    pub splice_countdown: Option<i8>,
}

fn parse_pcr(b: &[u8; 6]) -> PcrTimestamp {
    let mut base: u64 = (b[0] as u64) << 25;
    base |= (b[1] as u64) << 17;
    base |= (b[2] as u64) << 9;
    base |= (b[3] as u64) << 1;
    base |= (b[4] as u64) >> 7;

    let mut extension: u16 = ((b[4] & 0x1) as u16) << 8;
    extension |= b[5] as u16;
    PcrTimestamp { base, extension }
}

fn read_adaptation_field(reader: &mut SliceReader) -> Result<AdaptationField> {
    let header: AdaptationFieldHeader = read_bitfield!(reader, AdaptationFieldHeader);
    let length = header.length() as usize;
    if length == 0 {
        return Ok(AdaptationField {
            header,
            pcr: None,
            opcr: None,
            splice_countdown: None,
        });
    }
    if length > 183 {
        return Err(Error::BadSectionLength);
    }
    let mut body = reader.new_sub_reader(length)?;
    let mut out = AdaptationField {
        header,
        pcr: None,
        opcr: None,
        splice_countdown: None,
    };
    if header.has_pcr() {
        if body.remaining_len() < 6 {
            return Err(Error::TruncatedSection);
        }
        out.pcr = Some(parse_pcr(&body.read_array_ref::<6>()?));
    }
    if header.has_opcr() {
        if body.remaining_len() < 6 {
            return Err(Error::TruncatedSection);
        }
        out.opcr = Some(parse_pcr(&body.read_array_ref::<6>()?));
    }
    if header.has_splicing_point() {
        if body.remaining_len() < 1 {
            return Err(Error::TruncatedSection);
        }
        out.splice_countdown = Some(body.read_u8()? as i8);
    }
    // Transport private data and adaptation field extension are skipped: the
    // sub-reader already bounds remaining bytes to `length`, so any trailing
    // fields this crate doesn't interpret are simply not consumed.
    Ok(out)
}

/// ISDB-T layer-information trailer appended to 204-byte recordings
/// (ARIB STD-B31).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsdbtInformation {
    pub tmcc_identifier: B2,
    #[skip]
    reserved: B1,
    pub buffer_reset_flag: bool,
    pub switch_on_control_flag_for_emergency_broadcast: bool,
    pub initialization_timing_head_packet_flag: bool,
    pub frame_head_packet_flag: bool,
    pub frame_indicator: bool,
    pub layer_indicator: B4,
    pub count_down_index: B4,
    pub ac_data_invalid_flag: bool,
    ac_data_effective_bytes_raw: B2,
    pub tsp_counter: B13,
    ac_data_or_reserved_raw: B32,
}

/// Sentinel `AC_data_effective_bytes` value when `ac_data_invalid_flag` is set.
const AC_DATA_EFFECTIVE_BYTES_INVALID: u8 = 0;
/// Sentinel `AC_data`/reserved value when `ac_data_invalid_flag` is set.
const AC_DATA_OR_RESERVED_INVALID: u32 = 0xFFFF_FFFF;

impl IsdbtInformation {
    /// `true` when `layer_indicator` carries the documented "invalid" sentinel.
    pub fn layer_is_invalid(&self) -> bool {
        self.layer_indicator() == 15
    }

    /// Effective-byte count of the AC data field. Normalized to `0` when
    /// `ac_data_invalid_flag` is set, matching the original encoder's
    /// treatment of this span as reserved padding rather than trusting
    /// the wire bits.
    pub fn ac_data_effective_bytes(&self) -> u8 {
        if self.ac_data_invalid_flag() {
            AC_DATA_EFFECTIVE_BYTES_INVALID
        } else {
            self.ac_data_effective_bytes_raw()
        }
    }

    /// The AC data (or reserved padding) field. Normalized to `0xFFFFFFFF`
    /// when `ac_data_invalid_flag` is set, matching the original encoder's
    /// treatment of this span as reserved padding rather than trusting
    /// the wire bits.
    pub fn ac_data_or_reserved(&self) -> u32 {
        if self.ac_data_invalid_flag() {
            AC_DATA_OR_RESERVED_INVALID
        } else {
            self.ac_data_or_reserved_raw()
        }
    }
}

/// A parsed 204-byte trailer, or the knowledge that 188-byte framing was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trailer {
    pub info: IsdbtInformation,
    pub is_valid: bool,
}

/// PES header fields peeked at the start of a payload, when present.
///
/// Only the fixed six-byte start-code header and (when applicable) PTS/DTS
/// are extracted: full elementary-stream reassembly across packets is out of
/// scope here.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PesHeader {
    pub start_code: B24,
    pub stream_id: B8,
    pub packet_length: B16,
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct PesOptionalHeader {
    pub marker_bits: B2,
    pub scrambling_control: B2,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
    pub has_pts: bool,
    pub has_dts: bool,
    pub escr: bool,
    pub es_rate: bool,
    pub dsm_trick_mode: bool,
    pub has_additional_copy_info: bool,
    pub has_crc: bool,
    pub has_extension: bool,
    pub additional_header_length: B8,
}

fn parse_timestamp(b: &[u8; 5]) -> u64 {
    let mut ts: u64 = ((b[0] & 0x0E) as u64) << 29;
    ts |= (b[1] as u64) << 22;
    ts |= ((b[2] & 0xFE) as u64) << 14;
    ts |= (b[3] as u64) << 7;
    ts |= ((b[4] & 0xFE) as u64) >> 1;
    ts
}

/// Fields recovered by peeking at a PES start code at the head of a payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct PesInfo {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

fn parse_pes_info(payload: &[u8]) -> Result<PesInfo> {
    let mut reader = SliceReader::new(payload);
    let header: PesHeader = read_bitfield!(reader, PesHeader);
    let mut info = PesInfo {
        stream_id: header.stream_id(),
        pts: None,
        dts: None,
    };
    if header.packet_length() as usize >= 3 && header.stream_id() != 0xBF {
        let optional: PesOptionalHeader = read_bitfield!(reader, PesOptionalHeader);
        let additional_length = optional.additional_header_length() as usize;
        let mut body = reader.new_sub_reader(additional_length)?;
        if optional.has_pts() && body.remaining_len() >= 5 {
            info.pts = Some(parse_timestamp(&body.read_array_ref::<5>()?));
        }
        if optional.has_dts() && body.remaining_len() >= 5 {
            info.dts = Some(parse_timestamp(&body.read_array_ref::<5>()?));
        }
    }
    Ok(info)
}

fn sniff_pes(payload: &[u8]) -> Option<PesInfo> {
    if payload.len() < 6 || !(payload[0] == 0 && payload[1] == 0 && payload[2] == 1) {
        return None;
    }
    parse_pes_info(payload).ok()
}

/// One fully parsed transport-stream packet.
#[derive(Debug, Clone, PartialEq)]
pub struct TSPacket<'a> {
    pub header: PacketHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Option<&'a [u8]>,
    pub trailer: Option<Trailer>,
}

impl<'a> TSPacket<'a> {
    /// Parses one packet from a 188- or 204-byte buffer.
    ///
    /// Invalid sync framing is surfaced as `Err`; the caller discards the
    /// packet rather than attempting partial recovery.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let (body, trailer_bytes) = match buf.len() {
            PACKET_SIZE => (buf, None),
            PACKET_SIZE_204 => (&buf[..PACKET_SIZE], Some(&buf[PACKET_SIZE..])),
            _ => return Err(Error::BadSectionLength),
        };

        let mut reader = SliceReader::new(body);
        let header: PacketHeader = read_bitfield!(reader, PacketHeader);
        if header.sync_byte() != 0x47 {
            return Err(Error::InvalidSync);
        }
        if header.transport_error_indicator() {
            return Err(Error::TransportError);
        }

        let mut adaptation_field = None;
        if header.has_adaptation_field() {
            adaptation_field = Some(read_adaptation_field(&mut reader)?);
        }

        let payload = if header.has_payload() {
            Some(reader.read_to_end()?)
        } else {
            None
        };

        let trailer = trailer_bytes.map(|t| {
            let mut tr = SliceReader::new(t);
            match tr.read_array_ref::<8>() {
                Ok(bytes) => Trailer {
                    info: IsdbtInformation::from_bytes(bytes),
                    is_valid: true,
                },
                Err(_) => Trailer {
                    info: IsdbtInformation::from_bytes([0u8; 8]),
                    is_valid: false,
                },
            }
        });

        Ok(TSPacket {
            header,
            adaptation_field,
            payload,
            trailer,
        })
    }

    /// 13-bit packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid()
    }

    /// Payload-unit-start-indicator bit.
    pub fn pusi(&self) -> bool {
        self.header.payload_unit_start_indicator()
    }

    /// True if this packet carries content scrambled under either key parity.
    pub fn is_scrambled(&self) -> bool {
        self.header.scrambling_control().is_scrambled()
    }

    /// PCR sample carried in this packet's adaptation field, if any.
    pub fn pcr(&self) -> Option<PcrTimestamp> {
        self.adaptation_field.as_ref().and_then(|af| af.pcr)
    }

    /// If the payload begins with a PES start code, the header fields recovered from it.
    pub fn pes_info(&self) -> Option<PesInfo> {
        self.payload.and_then(sniff_pes)
    }

    /// `true` when the packet carries no payload content worth demultiplexing (null packet).
    pub fn is_null(&self) -> bool {
        self.pid() == NULL_PID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_packet() -> [u8; PACKET_SIZE] {
        let mut p = [0xFFu8; PACKET_SIZE];
        p[0] = 0x47;
        p[1] = 0x1F;
        p[2] = 0xFF;
        p[3] = 0x10;
        p
    }

    #[test]
    fn parses_null_packet() {
        let buf = null_packet();
        let packet = TSPacket::parse(&buf).unwrap();
        assert_eq!(packet.pid(), NULL_PID);
        assert!(packet.is_null());
        assert!(!packet.pusi());
    }

    #[test]
    fn rejects_bad_sync() {
        let mut buf = null_packet();
        buf[0] = 0x00;
        assert_eq!(TSPacket::parse(&buf), Err(Error::InvalidSync));
    }

    #[test]
    fn isdbt_trailer_decodes_bit_layout() {
        // Bytes per ARIB STD-B31 5.5.2 field order (tsISDBTInformation.cpp):
        // 0xC0 0x7E 0xFF*6 -> TMCC=3, all single-bit flags before layer_indicator
        // clear (they fall in the low six bits of 0xC0, which are zero), then
        // layer_indicator/count_down_index consume the top byte of 0x7E.
        let trailer: [u8; 8] = [0xC0, 0x7E, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let info = IsdbtInformation::from_bytes(trailer);
        assert_eq!(info.tmcc_identifier(), 3);
        assert!(!info.frame_head_packet_flag());
        assert_eq!(info.layer_indicator(), 7);
        assert_eq!(info.count_down_index(), 14);
        assert!(info.ac_data_invalid_flag());
        assert_eq!(info.ac_data_or_reserved(), 0xFFFF_FFFF);
    }

    #[test]
    fn isdbt_ac_data_invalid_flag_forces_sentinel_over_wire_bits() {
        // ac_data_invalid_flag set, but the AC_data span carries non-0xFF
        // bytes on the wire: the accessors must still report the sentinel
        // rather than passing the garbage bits through.
        let trailer: [u8; 8] = [0xC0, 0x7E, 0xD2, 0x34, 0x56, 0x78, 0x9A, 0x00];
        let info = IsdbtInformation::from_bytes(trailer);
        assert!(info.ac_data_invalid_flag());
        assert_eq!(info.ac_data_effective_bytes(), 0);
        assert_eq!(info.ac_data_or_reserved(), 0xFFFF_FFFF);
    }

    #[test]
    fn isdbt_invalid_layer_sentinel() {
        let trailer: [u8; 8] = [0x3F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let info = IsdbtInformation::from_bytes(trailer);
        assert_eq!(info.layer_indicator(), 15);
        assert!(info.layer_is_invalid());
    }

    #[test]
    fn parses_204_byte_packet_with_trailer() {
        let mut buf = [0u8; PACKET_SIZE_204];
        buf[..PACKET_SIZE].copy_from_slice(&null_packet());
        buf[PACKET_SIZE..].copy_from_slice(&[
            0xC0, 0x7E, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ]);
        let packet = TSPacket::parse(&buf).unwrap();
        let trailer = packet.trailer.unwrap();
        assert!(trailer.is_valid);
        assert_eq!(trailer.info.layer_indicator(), 7);
    }
}
