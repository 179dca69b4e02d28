//! ISO 639 language descriptor (EN 300 468 §6.2.21): one or more
//! `(language_code, audio_type)` pairs carried on an elementary stream.

use crate::descriptor::{Descriptor, TAG_ISO_639_LANGUAGE};
use crate::error::{Error, Result};

pub const TAG: u8 = TAG_ISO_639_LANGUAGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageEntry {
    pub language_code: [u8; 3],
    pub audio_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    pub entries: Vec<LanguageEntry>,
}

impl Iso639LanguageDescriptor {
    pub fn parse(descriptor: &Descriptor) -> Result<Self> {
        if descriptor.tag() != TAG {
            return Err(Error::InvalidField("not an ISO 639 language descriptor"));
        }
        let p = descriptor.payload();
        if p.len() % 4 != 0 {
            return Err(Error::BadSectionLength);
        }
        let entries = p
            .chunks_exact(4)
            .map(|c| LanguageEntry {
                language_code: [c[0], c[1], c[2]],
                audio_type: c[3],
            })
            .collect();
        Ok(Iso639LanguageDescriptor { entries })
    }

    pub fn build(&self) -> Result<Descriptor> {
        let mut payload = Vec::with_capacity(self.entries.len() * 4);
        for e in &self.entries {
            payload.extend_from_slice(&e.language_code);
            payload.push(e.audio_type);
        }
        Descriptor::new(TAG, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multiple_languages() {
        let desc = Iso639LanguageDescriptor {
            entries: vec![
                LanguageEntry {
                    language_code: *b"eng",
                    audio_type: 0,
                },
                LanguageEntry {
                    language_code: *b"fre",
                    audio_type: 3,
                },
            ],
        };
        let d = desc.build().unwrap();
        assert_eq!(Iso639LanguageDescriptor::parse(&d).unwrap(), desc);
    }
}
