use crate::error::{Error, Result};

/// Bounds-checked cursor over a byte slice.
#[derive(Debug)]
pub struct SliceReader<'a> {
    slice: &'a [u8],
}

impl<'a> SliceReader<'a> {
    /// Initializes a reader from any byte slice.
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice }
    }

    /// Creates a fixed `length` sub-reader at the current position, then advances this reader to
    /// the sub-reader's end position.
    pub fn new_sub_reader(&mut self, length: usize) -> Result<Self> {
        Ok(Self {
            slice: self.read(length)?,
        })
    }

    /// Number of bytes remaining in the slice reader.
    pub fn remaining_len(&self) -> usize {
        self.slice.len()
    }

    /// Advance reader without extracting any data from the slice.
    pub fn skip(&mut self, length: usize) -> Result<()> {
        if length > self.slice.len() {
            Err(Error::PacketOverrun(length))
        } else {
            self.slice = &self.slice[length..];
            Ok(())
        }
    }

    /// Extract a fixed `length` sub-slice from this reader and advance.
    pub fn read(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(Error::PacketOverrun(length))
        } else {
            let (left, right) = self.slice.split_at(length);
            self.slice = right;
            Ok(left)
        }
    }

    /// Extract a sub-slice of all data remaining to be read.
    pub fn read_to_end(&mut self) -> Result<&'a [u8]> {
        self.read(self.slice.len())
    }

    /// Same as [`SliceReader::read`] but converts the slice to an owned array of length `N`.
    pub fn read_array_ref<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read one byte interpreted as [`u8`].
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array_ref::<1>()?[0])
    }

    /// Read two bytes interpreted as big-endian [`u16`].
    pub fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array_ref::<2>()?))
    }

    /// Read three bytes interpreted as big-endian `u24`.
    pub fn read_be_u24(&mut self) -> Result<u32> {
        let bytes = self.read_array_ref::<3>()?;
        Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Read four bytes interpreted as big-endian [`u32`].
    pub fn read_be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array_ref::<4>()?))
    }

    /// Read five bytes interpreted as big-endian `u33` (MPEG PTS/DTS/PCR-base width).
    pub fn read_be_u33(&mut self) -> Result<u64> {
        let bytes = self.read_array_ref::<5>()?;
        Ok(u64::from_be_bytes([
            0,
            0,
            0,
            bytes[0] & 0x1,
            bytes[1],
            bytes[2],
            bytes[3],
            bytes[4],
        ]))
    }

    /// Extract a fixed `length` sub-slice from this reader without advancing.
    pub fn peek(&self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(Error::PacketOverrun(length))
        } else {
            Ok(&self.slice[0..length])
        }
    }
}

/// Convenience macro to read a modular bitfield from a [`SliceReader`].
///
/// Wraps [`SliceReader::read_array_ref`] to read the exact number of bytes required by the
/// bitfield type. Must be expanded in a function that returns [`Result`].
macro_rules! read_bitfield {
    ($reader:expr, $type:ty) => {
        <$type>::from_bytes($reader.read_array_ref::<{ std::mem::size_of::<$type>() }>()?)
    };
}
pub(crate) use read_bitfield;
