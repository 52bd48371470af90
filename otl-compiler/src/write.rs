//! Writing big-endian table data

use otl_types::Uint24;

use crate::error::Overflow;

/// A type that that can be written out as part of a layout table.
pub trait FontWrite {
    /// Write our data into this [TableWriter].
    fn write_into(&self, writer: &mut TableWriter);
}

/// A growable buffer of big-endian table data.
///
/// Unlike a general purpose serializer, this does not resolve offsets for
/// us: every table in this crate is laid out ahead of time, and offsets are
/// written as already-computed distances between two absolute positions.
/// The `offset*` and `count*` methods check that the value fits.
#[derive(Debug, Default)]
pub struct TableWriter {
    data: Vec<u8>,
}

impl TableWriter {
    /// The current write position, from the start of the buffer.
    pub fn position(&self) -> usize {
        self.data.len()
    }

    /// Write raw bytes.
    ///
    /// The caller is responsible for ensuring bytes are in big-endian order.
    #[inline]
    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes)
    }

    /// Write anything that knows how to write itself.
    #[inline]
    pub fn write<T: FontWrite + ?Sized>(&mut self, item: &T) {
        item.write_into(self)
    }

    /// Write a 16-bit offset from `base` to `target`.
    ///
    /// A `target` of `None` writes a null offset.
    pub fn offset16(
        &mut self,
        base: usize,
        target: Option<usize>,
        what: &'static str,
    ) -> Result<(), Overflow> {
        let value = match target {
            Some(target) => offset_value(base, target, u16::MAX as usize, what)?,
            None => 0,
        };
        self.write(&(value as u16));
        Ok(())
    }

    /// Write a 32-bit offset from `base` to `target`.
    pub fn offset32(
        &mut self,
        base: usize,
        target: Option<usize>,
        what: &'static str,
    ) -> Result<(), Overflow> {
        let value = match target {
            Some(target) => offset_value(base, target, u32::MAX as usize, what)?,
            None => 0,
        };
        self.write(&(value as u32));
        Ok(())
    }

    /// Write the length of some array as a u16.
    pub fn count16(&mut self, len: usize, what: &'static str) -> Result<(), Overflow> {
        let count = u16::try_from(len).map_err(|_| Overflow {
            what,
            value: len,
            limit: u16::MAX as usize,
        })?;
        self.write(&count);
        Ok(())
    }

    /// Return the finished bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

fn offset_value(
    base: usize,
    target: usize,
    limit: usize,
    what: &'static str,
) -> Result<usize, Overflow> {
    // offsets always point forward in the tables we write
    let value = target.checked_sub(base).ok_or(Overflow {
        what,
        value: 0,
        limit,
    })?;
    if value > limit {
        return Err(Overflow { what, value, limit });
    }
    Ok(value)
}

/// Check that a computed distance fits in an Offset16.
pub(crate) fn check_offset16(
    base: usize,
    target: usize,
    what: &'static str,
) -> Result<(), Overflow> {
    offset_value(base, target, u16::MAX as usize, what).map(|_| ())
}

macro_rules! write_be_bytes {
    ($ty:ty) => {
        impl FontWrite for $ty {
            #[inline]
            fn write_into(&self, writer: &mut TableWriter) {
                writer.write_slice(&self.to_be_bytes())
            }
        }
    };
}

//NOTE: not implemented for offsets! they are written through `offset16`/`offset32`.
write_be_bytes!(u8);
write_be_bytes!(i8);
write_be_bytes!(u16);
write_be_bytes!(i16);
write_be_bytes!(u32);
write_be_bytes!(i32);
write_be_bytes!(Uint24);
write_be_bytes!(otl_types::F2Dot14);
write_be_bytes!(otl_types::Tag);
write_be_bytes!(otl_types::MajorMinor);
write_be_bytes!(otl_types::GlyphId16);

impl FontWrite for otl_types::NameId {
    fn write_into(&self, writer: &mut TableWriter) {
        writer.write(&self.to_u16())
    }
}

impl<T: FontWrite> FontWrite for [T] {
    fn write_into(&self, writer: &mut TableWriter) {
        self.iter().for_each(|item| item.write_into(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_relative() {
        let mut writer = TableWriter::default();
        writer.write(&1u16);
        writer.offset16(0, Some(0x20), "test").unwrap();
        writer.offset16(0, None, "test").unwrap();
        writer.offset32(2, Some(0x10002), "test").unwrap();
        assert_eq!(
            writer.into_data(),
            [0, 1, 0, 0x20, 0, 0, 0, 1, 0, 0]
        );
    }

    #[test]
    fn offset_overflow_names_construct() {
        let mut writer = TableWriter::default();
        let err = writer
            .offset16(10, Some(10 + 0x1_0000), "coverage offset")
            .unwrap_err();
        assert_eq!(err.what, "coverage offset");
        assert_eq!(err.value, 0x1_0000);
        assert!(writer.count16(70_000, "glyph count").is_err());
        assert!(writer.count16(65_535, "glyph count").is_ok());
    }
}
