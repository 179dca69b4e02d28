//! Short event descriptor (EN 300 468 §6.2.37): an EIT-carried event title
//! and short description, each length-prefixed, under a 3-letter language code.

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

pub const TAG: u8 = 0x4D;

/// Parsed `short_event_descriptor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEventDescriptor {
    pub language_code: [u8; 3],
    pub event_name: Vec<u8>,
    pub text: Vec<u8>,
}

fn take_len_prefixed(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let len = *data.first().ok_or(Error::TruncatedSection)? as usize;
    if data.len() < 1 + len {
        return Err(Error::TruncatedSection);
    }
    Ok((&data[1..1 + len], &data[1 + len..]))
}

impl ShortEventDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not a short event descriptor"));
        }
        let p = descriptor.payload();
        if p.len() < 3 {
            return Err(Error::TruncatedSection);
        }
        let language_code = [p[0], p[1], p[2]];
        let (event_name, rest) = take_len_prefixed(&p[3..])?;
        let (text, _) = take_len_prefixed(rest)?;
        Ok(ShortEventDescriptor {
            language_code,
            event_name: event_name.to_vec(),
            text: text.to_vec(),
        })
    }

    pub fn build(&self) -> Result<Descriptor> {
        if self.event_name.len() > 255 || self.text.len() > 255 {
            return Err(Error::InvalidField("DVB string exceeds 255 bytes"));
        }
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.language_code);
        payload.push(self.event_name.len() as u8);
        payload.extend_from_slice(&self.event_name);
        payload.push(self.text.len() as u8);
        payload.extend_from_slice(&self.text);
        Descriptor::new(TAG, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let event = ShortEventDescriptor {
            language_code: *b"eng",
            event_name: b"The Evening News".to_vec(),
            text: b"Today's headlines.".to_vec(),
        };
        let d = event.build().unwrap();
        assert_eq!(ShortEventDescriptor::parse(&d).unwrap(), event);
    }
}
