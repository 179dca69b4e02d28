//! Crate-wide error type.
//!
//! Continuity/CRC/length problems are always local to one PID and never abort
//! a [`crate::demux::SectionDemux`]; callers see them either as a
//! `Result::Err` from a one-shot constructor or as an `on_invalid_section`
//! notification.

use std::fmt;

/// Every way a packet, section, or table can fail to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A [`crate::packet::TSPacket`] did not start with the `0x47` sync byte.
    InvalidSync,
    /// The transport-error indicator bit was set on a packet.
    TransportError,
    /// The continuity counter did not advance by exactly one.
    ContinuityError,
    /// A packet repeated the previous continuity counter with a payload.
    DuplicatePacket,
    /// `section_length` produced an inconsistent total section size.
    BadSectionLength,
    /// CRC32 of a long section did not match its trailing four bytes.
    BadCrc,
    /// Fewer bytes were available than a section's header declared.
    TruncatedSection,
    /// A section's total size exceeded the applicable cap (1021/4093 bytes).
    SectionTooLarge,
    /// Two sections claiming the same `(tid, tidext, version)` disagreed.
    VersionMismatchInTable,
    /// A concrete table's field failed a structural invariant at deserialize time.
    InvalidField(&'static str),
    /// A wire format this build does not support (e.g. uncompiled charset).
    UnsupportedFormat(&'static str),
    /// A binary reader ran past the end of its buffer; carries the requested length.
    PacketOverrun(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSync => write!(f, "invalid sync byte"),
            Error::TransportError => write!(f, "transport error indicator set"),
            Error::ContinuityError => write!(f, "continuity counter discontinuity"),
            Error::DuplicatePacket => write!(f, "duplicate packet"),
            Error::BadSectionLength => write!(f, "inconsistent section length"),
            Error::BadCrc => write!(f, "CRC32 mismatch"),
            Error::TruncatedSection => write!(f, "truncated section"),
            Error::SectionTooLarge => write!(f, "section exceeds size cap"),
            Error::VersionMismatchInTable => write!(f, "version mismatch within table"),
            Error::InvalidField(field) => write!(f, "invalid field: {field}"),
            Error::UnsupportedFormat(what) => write!(f, "unsupported format: {what}"),
            Error::PacketOverrun(len) => write!(f, "read of {len} bytes overran buffer"),
        }
    }
}

impl std::error::Error for Error {}

/// [`std::result::Result`] alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
