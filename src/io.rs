//! Byte-level serialization of distributions.
//!
//! Trees persist as raw host-endian blobs: primitives are written as their
//! native byte representation, fixed arrays as concatenated elements, and
//! vectors as a `u64` count followed by the elements. There is no magic
//! header and no version tag; the format is an intra-host snapshot, and a
//! reader must be built with the same dimension, [`Float`](crate::Float)
//! width, value layout and node-id width as the writer.
//!
//! Custom value types opt in by implementing [`WriteBinary`] and
//! [`ReadBinary`] themselves.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::tree::TreeError;
use crate::value::{Rgb, Scalar};

/// Errors surfaced when reading a serialized tree.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The underlying reader failed (including truncated blobs).
    #[error("failed to read tree blob")]
    Io(#[from] io::Error),
    /// The blob declares zero nodes.
    #[error("tree blob contains no nodes")]
    Empty,
    /// The node records do not form a valid tree.
    #[error("tree blob is structurally invalid")]
    Malformed(#[from] TreeError),
}

/// Write `self` as raw bytes.
pub trait WriteBinary {
    fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;
}

/// Read a value previously written with [`WriteBinary`].
pub trait ReadBinary: Sized {
    fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
}

// =============================================================================
// Primitives
// =============================================================================

macro_rules! impl_binary_for_numeric {
    ($($ty:ty),*) => {
        $(
            impl WriteBinary for $ty {
                #[inline]
                fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                    writer.write_all(&self.to_ne_bytes())
                }
            }

            impl ReadBinary for $ty {
                #[inline]
                fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    reader.read_exact(&mut bytes)?;
                    Ok(<$ty>::from_ne_bytes(bytes))
                }
            }
        )*
    };
}

impl_binary_for_numeric!(f32, f64, u32, u64);

// =============================================================================
// Compounds
// =============================================================================

impl<T: WriteBinary, const N: usize> WriteBinary for [T; N] {
    fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for item in self {
            item.write_binary(writer)?;
        }
        Ok(())
    }
}

impl<T: ReadBinary, const N: usize> ReadBinary for [T; N] {
    fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::read_binary(reader)?);
        }
        match items.try_into() {
            Ok(array) => Ok(array),
            Err(_) => unreachable!("exactly N items were read"),
        }
    }
}

impl<T: WriteBinary> WriteBinary for Vec<T> {
    fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        (self.len() as u64).write_binary(writer)?;
        for item in self {
            item.write_binary(writer)?;
        }
        Ok(())
    }
}

impl<T: ReadBinary> ReadBinary for Vec<T> {
    fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let count = u64::read_binary(reader)?;
        // The count comes straight from the blob; cap the preallocation.
        let mut items = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            items.push(T::read_binary(reader)?);
        }
        Ok(items)
    }
}

// =============================================================================
// Values
// =============================================================================

impl WriteBinary for Scalar {
    #[inline]
    fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.0.write_binary(writer)
    }
}

impl ReadBinary for Scalar {
    #[inline]
    fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self(ReadBinary::read_binary(reader)?))
    }
}

impl WriteBinary for Rgb {
    #[inline]
    fn write_binary<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.0.write_binary(writer)
    }
}

impl ReadBinary for Rgb {
    #[inline]
    fn read_binary<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self(ReadBinary::read_binary(reader)?))
    }
}
