//! Service descriptor (EN 300 468 §6.2.33): service type plus provider and
//! service names, each an 8-bit-length-prefixed string.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG: u8 = 0x48;

/// Parsed `service_descriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider_name: Vec<u8>,
    pub service_name: Vec<u8>,
}

fn take_dvb_string(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let len = *data.first().ok_or(Error::TruncatedSection)? as usize;
    if data.len() < 1 + len {
        return Err(Error::TruncatedSection);
    }
    Ok((&data[1..1 + len], &data[1 + len..]))
}

impl ServiceDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not a service descriptor"));
        }
        let p = descriptor.payload();
        let service_type = *p.first().ok_or(Error::TruncatedSection)?;
        let (provider_name, rest) = take_dvb_string(&p[1..])?;
        let (service_name, _) = take_dvb_string(rest)?;
        Ok(ServiceDescriptor {
            service_type,
            provider_name: provider_name.to_vec(),
            service_name: service_name.to_vec(),
        })
    }

    pub fn build(&self) -> Result<Descriptor> {
        if self.provider_name.len() > 255 || self.service_name.len() > 255 {
            return Err(Error::InvalidField("DVB string exceeds 255 bytes"));
        }
        let mut payload = Vec::new();
        payload.push(self.service_type);
        payload.push(self.provider_name.len() as u8);
        payload.extend_from_slice(&self.provider_name);
        payload.push(self.service_name.len() as u8);
        payload.extend_from_slice(&self.service_name);
        Descriptor::new(TAG, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let svc = ServiceDescriptor {
            service_type: 0x01,
            provider_name: b"Provider".to_vec(),
            service_name: b"Channel One".to_vec(),
        };
        let d = svc.build().unwrap();
        assert_eq!(ServiceDescriptor::parse(&d).unwrap(), svc);
    }

    #[test]
    fn rejects_truncated_names() {
        let broken = Descriptor::new(TAG, &[0x01, 0x05, b'a', b'b']).unwrap();
        assert!(ServiceDescriptor::parse(&broken).is_err());
    }
}
