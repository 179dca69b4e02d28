//! Stream identifier descriptor (EN 300 468 §6.2.39): a single component tag
//! disambiguating elementary streams that share a `stream_type`.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG: u8 = 0x52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamIdentifierDescriptor {
    pub component_tag: u8,
}

impl StreamIdentifierDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not a stream identifier descriptor"));
        }
        let p = descriptor.payload();
        let component_tag = *p.first().ok_or(Error::TruncatedSection)?;
        Ok(StreamIdentifierDescriptor { component_tag })
    }

    pub fn build(&self) -> Result<Descriptor> {
        Descriptor::new(TAG, &[self.component_tag])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let d = StreamIdentifierDescriptor { component_tag: 7 }.build().unwrap();
        assert_eq!(
            StreamIdentifierDescriptor::parse(&d).unwrap(),
            StreamIdentifierDescriptor { component_tag: 7 }
        );
    }
}
