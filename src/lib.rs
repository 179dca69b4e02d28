//! Toolkit for demultiplexing, modeling, and re-emitting MPEG-2 Transport
//! Stream Program-Specific Information / Service Information (PSI/SI).
//!
//! Covers the packet and section layers (ISO/IEC 13818-1), a representative
//! set of concrete tables and descriptors (ISO/IEC 13818-1 and DVB EN 300
//! 468), a section demultiplexer that reassembles tables from a live packet
//! stream, a cycling packetizer that re-emits them, a PSI/TS analyzer for
//! stream introspection, and a service-selection ("zap") processor.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! mpeg-psi = "~0.1.0"
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod analyzer;
pub mod crc32;
pub mod demux;
pub mod descriptor;
pub mod descriptors;
pub mod error;
pub mod lcn;
pub mod packet;
pub mod packetizer;
pub mod registry;
pub mod section;
mod slice_reader;
pub mod table;
pub mod tables;
pub mod tlv;
pub mod xml;
pub mod zap;

#[cfg(test)]
mod testutil;

pub use demux::{SectionDemux, SectionHandler};
pub use descriptor::{Descriptor, DescriptorList, Edid, Pds};
pub use error::{Error, Result};
pub use packet::TSPacket;
pub use packetizer::{CyclingPacketizer, StuffingPolicy};
pub use section::Section;
pub use table::BinaryTable;
