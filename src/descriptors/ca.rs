//! CA descriptor (EN 300 468 §6.2.13): points a service or stream at the
//! ECM PID for one conditional access system.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG: u8 = 0x09;

/// Parsed `CA_descriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    pub ca_pid: u16,
    pub private_data: Vec<u8>,
}

impl CaDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not a CA descriptor"));
        }
        let p = descriptor.payload();
        if p.len() < 4 {
            return Err(Error::TruncatedSection);
        }
        Ok(CaDescriptor {
            ca_system_id: u16::from_be_bytes([p[0], p[1]]),
            ca_pid: u16::from_be_bytes([p[2], p[3]]) & 0x1FFF,
            private_data: p[4..].to_vec(),
        })
    }

    pub fn build(&self) -> Result<Descriptor> {
        let mut payload = Vec::with_capacity(4 + self.private_data.len());
        payload.extend_from_slice(&self.ca_system_id.to_be_bytes());
        payload.extend_from_slice(&(0xE000 | (self.ca_pid & 0x1FFF)).to_be_bytes());
        payload.extend_from_slice(&self.private_data);
        Descriptor::new(TAG, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ca = CaDescriptor {
            ca_system_id: 0x0500,
            ca_pid: 0x0123,
            private_data: vec![0xDE, 0xAD],
        };
        let d = ca.build().unwrap();
        assert_eq!(CaDescriptor::parse(&d).unwrap(), ca);
    }
}
