//! Concrete descriptor codecs.
//!
//! Each submodule parses and builds one descriptor's payload against the
//! generic [`crate::descriptor::Descriptor`] TLV container. Registration only
//! records a display/XML name per [`crate::descriptor::Edid`] — constructing
//! the typed value is always a direct call to that submodule's `parse`.

pub mod ca;
pub mod iso639_language;
pub mod local_time_offset;
pub mod network_name;
pub mod service;
pub mod short_event;
pub mod stream_identifier;

use crate::descriptor::Edid;
use crate::registry::Registry;

pub(crate) fn register_all(r: &mut Registry) {
    r.register_descriptor(Edid::Standard(ca::TAG), "CA_descriptor");
    r.register_descriptor(Edid::Standard(service::TAG), "service_descriptor");
    r.register_descriptor(
        Edid::Standard(network_name::TAG_NETWORK_NAME),
        "network_name_descriptor",
    );
    r.register_descriptor(
        Edid::Standard(network_name::TAG_BOUQUET_NAME),
        "bouquet_name_descriptor",
    );
    r.register_descriptor(Edid::Standard(short_event::TAG), "short_event_descriptor");
    r.register_descriptor(
        Edid::Standard(stream_identifier::TAG),
        "stream_identifier_descriptor",
    );
    r.register_descriptor(
        Edid::Standard(iso639_language::TAG),
        "ISO_639_language_descriptor",
    );
    r.register_descriptor(
        Edid::Standard(local_time_offset::TAG),
        "local_time_offset_descriptor",
    );
    r.register_descriptor(
        Edid::Standard(crate::descriptor::TAG_PRIVATE_DATA_SPECIFIER),
        "private_data_specifier_descriptor",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registrations_are_resolvable() {
        let mut r = Registry::default();
        register_all(&mut r);
        let d = crate::descriptor::Descriptor::new(ca::TAG, &[0, 0, 0xE0, 0x10]).unwrap();
        assert_eq!(
            r.lookup_descriptor(&d, 0, None),
            Some("CA_descriptor")
        );
    }
}
