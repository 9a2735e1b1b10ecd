
//! Specialized binary input and output.
//! Uses the error handling for this crate and supports big-endian integers,
//! which is the byte order of every integer in the container format.

pub use ::std::io::{Read, Write, Seek, SeekFrom};
use lebe::prelude::*;
use crate::error::{Error, Result, UnitResult, IoResult, usize_to_u64};


/// Skip reading uninteresting bytes without allocating.
pub fn skip_bytes(read: &mut impl Read, count: u64) -> UnitResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    // the stream may end before the requested number of bytes
    if skipped < count {
        return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }

    Ok(())
}


/// Keep track of the byte position while delegating reads or writes
/// to an inner stream. Also enables seeking back to an absolute position
/// when the inner stream supports it.
#[derive(Debug)]
pub struct Tracking<T> {
    inner: T,
    position: u64,
}

impl<T> Tracking<T> {

    /// Create a new tracking stream, starting to count at byte zero.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// The number of bytes read or written so far,
    /// or the absolute position after a seek.
    pub fn byte_position(&self) -> u64 {
        self.position
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> IoResult<usize> {
        let byte_count = self.inner.read(buffer)?;
        self.position += usize_to_u64(byte_count);
        Ok(byte_count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> IoResult<usize> {
        let byte_count = self.inner.write(buffer)?;
        self.position += usize_to_u64(byte_count);
        Ok(byte_count)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Move the write cursor to the specified absolute byte position.
    /// Used to patch a placeholder header after all chunks have been written.
    pub fn seek_write_to(&mut self, position: u64) -> UnitResult {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }
}


/// Extension trait for primitive types like numbers and arrays.
/// All integers are serialized as big-endian.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this would consume in a container file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read this value from the stream.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Read as many values as the slice has room for.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write this value to the stream.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values in the slice to the stream.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read a vector of values whose length was decoded from the file.
    /// Refuses to allocate more than `soft_max` entries,
    /// as the length may come from an invalid file.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, purpose: &'static str) -> Result<Vec<Self>> {
        if data_size > soft_max {
            return Err(Error::bad_format(purpose));
        }

        let mut vec = vec![Self::default(); data_size];
        Self::read_slice(read, &mut vec)?;
        Ok(vec)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_big_endian()?)
            }

            fn write(self, write: &mut impl Write) -> Result<()> {
                write.write_as_big_endian(&self)?;
                Ok(())
            }

            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> Result<()> {
                read.read_from_big_endian_into(slice)?;
                Ok(())
            }

            fn write_slice(write: &mut impl Write, slice: &[Self]) -> Result<()> {
                write.write_as_big_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
