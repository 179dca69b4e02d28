//! Network name descriptor (EN 300 468 §6.2.27) and bouquet name descriptor
//! (§6.2.4): both are a bare name string under different tags.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG_NETWORK_NAME: u8 = 0x40;
pub const TAG_BOUQUET_NAME: u8 = 0x47;

/// Parsed `network_name_descriptor` or `bouquet_name_descriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDescriptor {
    pub name: Vec<u8>,
}

impl NameDescriptor {
    pub fn parse(descriptor: &Descriptor, expected_tag: u8) -> Result<Self> {
        if descriptor.tag() != expected_tag {
            return Err(Error::InvalidField("unexpected descriptor tag"));
        }
        Ok(NameDescriptor {
            name: descriptor.payload().to_vec(),
        })
    }

    pub fn build(&self, tag: u8) -> Result<Descriptor> {
        Descriptor::new(tag, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_both_tags() {
        let n = NameDescriptor {
            name: b"Example Network".to_vec(),
        };
        let d = n.build(TAG_NETWORK_NAME).unwrap();
        assert_eq!(NameDescriptor::parse(&d, TAG_NETWORK_NAME).unwrap(), n);

        let b = n.build(TAG_BOUQUET_NAME).unwrap();
        assert_eq!(NameDescriptor::parse(&b, TAG_BOUQUET_NAME).unwrap(), n);
        assert!(NameDescriptor::parse(&b, TAG_NETWORK_NAME).is_err());
    }
}
