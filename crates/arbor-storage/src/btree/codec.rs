//! Binary encodings for keys and values stored in tree pages.
//!
//! Fixed-width kinds are written little-endian at their natural width. Strings
//! carry an 8-byte little-endian length prefix followed by raw UTF-8 bytes with
//! no terminator. Child page ids in intermediate cells use the `PageId` codec.

use arbor_common::page::PageId;
use arbor_common::types::ValueKind;
use arbor_common::{ArborError, Result};
use bytes::{Buf, BufMut};
use std::fmt::Debug;

/// A type that can be stored in a page cell.
///
/// `serialize` writes at the start of `dst` and never reports how far it
/// wrote; callers size the destination with `serialized_size` beforehand.
pub trait PageCodec: Sized {
    /// Kind tag for this encoding.
    const KIND: ValueKind;

    /// Number of bytes `serialize` will write.
    fn serialized_size(&self) -> usize;

    /// Writes the encoding at the start of `dst`.
    fn serialize(&self, dst: &mut [u8]) -> Result<()>;

    /// Reads a value from the start of `src`.
    fn deserialize(src: &[u8]) -> Result<Self>;

    /// Returns the size of the encoded value at the start of `src` without
    /// decoding it.
    fn encoded_len(src: &[u8]) -> Result<usize>;
}

/// A codec type usable as a tree key.
pub trait KeyCodec: PageCodec + Ord + Clone + Debug {}

impl<T: PageCodec + Ord + Clone + Debug> KeyCodec for T {}

/// Encodes a value into a fresh buffer of exactly its serialized size.
pub fn encode_to_vec<T: PageCodec>(value: &T) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; value.serialized_size()];
    value.serialize(&mut buf)?;
    Ok(buf)
}

#[inline]
fn writable(dst: &mut [u8], len: usize) -> Result<&mut [u8]> {
    if dst.len() < len {
        return Err(ArborError::PageFull);
    }
    Ok(&mut dst[..len])
}

#[inline]
fn readable(src: &[u8], len: usize, kind: ValueKind) -> Result<&[u8]> {
    if src.len() < len {
        return Err(ArborError::Decode(format!(
            "truncated {kind}: need {len} bytes, have {}",
            src.len()
        )));
    }
    Ok(&src[..len])
}

macro_rules! fixed_width_codec {
    ($ty:ty, $kind:expr, $put:ident, $get:ident) => {
        impl PageCodec for $ty {
            const KIND: ValueKind = $kind;

            #[inline]
            fn serialized_size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            #[inline]
            fn serialize(&self, dst: &mut [u8]) -> Result<()> {
                let mut buf = writable(dst, std::mem::size_of::<$ty>())?;
                buf.$put(*self);
                Ok(())
            }

            #[inline]
            fn deserialize(src: &[u8]) -> Result<Self> {
                let mut buf = readable(src, std::mem::size_of::<$ty>(), $kind)?;
                Ok(buf.$get())
            }

            #[inline]
            fn encoded_len(src: &[u8]) -> Result<usize> {
                readable(src, std::mem::size_of::<$ty>(), $kind).map(<[u8]>::len)
            }
        }
    };
}

fixed_width_codec!(i32, ValueKind::Int32, put_i32_le, get_i32_le);
fixed_width_codec!(i64, ValueKind::Int64, put_i64_le, get_i64_le);
fixed_width_codec!(u32, ValueKind::UInt32, put_u32_le, get_u32_le);
fixed_width_codec!(u64, ValueKind::UInt64, put_u64_le, get_u64_le);
fixed_width_codec!(f32, ValueKind::Float32, put_f32_le, get_f32_le);
fixed_width_codec!(f64, ValueKind::Float64, put_f64_le, get_f64_le);

impl PageCodec for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn serialized_size(&self) -> usize {
        1
    }

    fn serialize(&self, dst: &mut [u8]) -> Result<()> {
        let mut buf = writable(dst, 1)?;
        buf.put_u8(u8::from(*self));
        Ok(())
    }

    fn deserialize(src: &[u8]) -> Result<Self> {
        match readable(src, 1, Self::KIND)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ArborError::Decode(format!("invalid boolean byte {other:#x}"))),
        }
    }

    fn encoded_len(src: &[u8]) -> Result<usize> {
        readable(src, 1, Self::KIND).map(<[u8]>::len)
    }
}

impl PageCodec for PageId {
    const KIND: ValueKind = ValueKind::UInt32;

    fn serialized_size(&self) -> usize {
        4
    }

    fn serialize(&self, dst: &mut [u8]) -> Result<()> {
        self.0.serialize(dst)
    }

    fn deserialize(src: &[u8]) -> Result<Self> {
        u32::deserialize(src).map(PageId)
    }

    fn encoded_len(src: &[u8]) -> Result<usize> {
        u32::encoded_len(src)
    }
}

impl PageCodec for String {
    const KIND: ValueKind = ValueKind::Varchar;

    fn serialized_size(&self) -> usize {
        ValueKind::LENGTH_PREFIX_SIZE + self.len()
    }

    fn serialize(&self, dst: &mut [u8]) -> Result<()> {
        let mut buf = writable(dst, self.serialized_size())?;
        buf.put_u64_le(self.len() as u64);
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn deserialize(src: &[u8]) -> Result<Self> {
        let len = Self::encoded_len(src)?;
        let body = &src[ValueKind::LENGTH_PREFIX_SIZE..len];
        String::from_utf8(body.to_vec())
            .map_err(|e| ArborError::Decode(format!("invalid UTF-8 in string: {e}")))
    }

    fn encoded_len(src: &[u8]) -> Result<usize> {
        let mut prefix = readable(src, ValueKind::LENGTH_PREFIX_SIZE, Self::KIND)?;
        let body_len = prefix.get_u64_le();
        let available = (src.len() - ValueKind::LENGTH_PREFIX_SIZE) as u64;
        if body_len > available {
            return Err(ArborError::Decode(format!(
                "truncated VARCHAR: length prefix {body_len}, have {available} bytes"
            )));
        }
        Ok(ValueKind::LENGTH_PREFIX_SIZE + body_len as usize)
    }
}
