//! Local time offset descriptor (EN 300 468 §6.2.24): the TOT's usual
//! payload, giving the current and next UTC-local offset for a country/region.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG: u8 = 0x58;

/// One `(country, region, offset change)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimeOffsetEntry {
    pub country_code: [u8; 3],
    pub country_region_id: u8,
    pub local_time_offset_polarity_negative: bool,
    /// Minutes, always a multiple of the broadcast's BCD-HHMM granularity.
    pub local_time_offset_minutes: i16,
    pub time_of_change_mjd_bcd: [u8; 5],
    pub next_time_offset_minutes: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffsetDescriptor {
    pub entries: Vec<LocalTimeOffsetEntry>,
}

fn bcd_hhmm_to_minutes(b: [u8; 2]) -> i16 {
    let h = (b[0] >> 4) as i16 * 10 + (b[0] & 0x0F) as i16;
    let m = (b[1] >> 4) as i16 * 10 + (b[1] & 0x0F) as i16;
    h * 60 + m
}

fn minutes_to_bcd_hhmm(total_minutes: i16) -> [u8; 2] {
    let h = (total_minutes / 60) as u8;
    let m = (total_minutes % 60) as u8;
    [((h / 10) << 4) | (h % 10), ((m / 10) << 4) | (m % 10)]
}

impl LocalTimeOffsetDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not a local time offset descriptor"));
        }
        let p = descriptor.payload();
        if p.len() % 13 != 0 {
            return Err(Error::BadSectionLength);
        }
        let entries = p
            .chunks_exact(13)
            .map(|c| {
                let polarity_negative = c[3] & 0x01 != 0;
                let offset_minutes = bcd_hhmm_to_minutes([c[4], c[5]]);
                let next_offset_minutes = bcd_hhmm_to_minutes([c[11], c[12]]);
                LocalTimeOffsetEntry {
                    country_code: [c[0], c[1], c[2]],
                    country_region_id: c[3] >> 2,
                    local_time_offset_polarity_negative: polarity_negative,
                    local_time_offset_minutes: if polarity_negative {
                        -offset_minutes
                    } else {
                        offset_minutes
                    },
                    time_of_change_mjd_bcd: [c[6], c[7], c[8], c[9], c[10]],
                    next_time_offset_minutes: next_offset_minutes,
                }
            })
            .collect();
        Ok(LocalTimeOffsetDescriptor { entries })
    }

    pub fn build(&self) -> Result<Descriptor> {
        let mut payload = Vec::with_capacity(self.entries.len() * 13);
        for e in &self.entries {
            payload.extend_from_slice(&e.country_code);
            payload.push(
                (e.country_region_id << 2) | 0b10 | (e.local_time_offset_polarity_negative as u8),
            );
            payload.extend_from_slice(&minutes_to_bcd_hhmm(e.local_time_offset_minutes.unsigned_abs() as i16));
            payload.extend_from_slice(&e.time_of_change_mjd_bcd);
            payload.extend_from_slice(&minutes_to_bcd_hhmm(e.next_time_offset_minutes));
        }
        Descriptor::new(TAG, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_entry() {
        let desc = LocalTimeOffsetDescriptor {
            entries: vec![LocalTimeOffsetEntry {
                country_code: *b"FRA",
                country_region_id: 0,
                local_time_offset_polarity_negative: false,
                local_time_offset_minutes: 60,
                time_of_change_mjd_bcd: [0x4D, 0x9B, 0x00, 0x00, 0x00],
                next_time_offset_minutes: 120,
            }],
        };
        let d = desc.build().unwrap();
        assert_eq!(LocalTimeOffsetDescriptor::parse(&d).unwrap(), desc);
    }

    #[test]
    fn negative_offset_round_trips() {
        let desc = LocalTimeOffsetDescriptor {
            entries: vec![LocalTimeOffsetEntry {
                country_code: *b"USA",
                country_region_id: 3,
                local_time_offset_polarity_negative: true,
                local_time_offset_minutes: -300,
                time_of_change_mjd_bcd: [0, 0, 0, 0, 0],
                next_time_offset_minutes: -240,
            }],
        };
        let d = desc.build().unwrap();
        let parsed = LocalTimeOffsetDescriptor::parse(&d).unwrap();
        assert_eq!(parsed.entries[0].local_time_offset_minutes, -300);
    }
}
