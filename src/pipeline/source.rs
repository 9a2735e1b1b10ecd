
//! Byte sources that multiple worker threads can read from concurrently.
//!
//! The file handle is shared under a mutex. Chunk positions are computed
//! from `index × chunk_size`, so each critical section covers exactly one
//! positioned read and nothing else.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result, UnitResult, u64_to_usize};


/// A source of bytes that hands out chunks by absolute position.
pub trait SharedSource: std::fmt::Debug + Send + Sync {

    /// The total number of bytes in this source.
    fn total_size(&self) -> u64;

    /// Fill the buffer with the bytes at the absolute offset.
    /// A short read is an error.
    fn read_exact_at(&self, offset: u64, buffer: &mut [u8]) -> UnitResult;
}


/// A file handle shared by all workers under a mutex.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {

    /// Open the file and determine its size.
    /// A missing path is an argument error, not an io error.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::argument(format!("input path `{}` is not an existing file", path.display())));
        }

        let file = File::open(path)?;
        let size = file.metadata()?.len();

        Ok(FileSource { file: Mutex::new(file), size })
    }

    /// Share an already opened file, for example after parsing its header.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(FileSource { file: Mutex::new(file), size })
    }
}

impl SharedSource for FileSource {
    fn total_size(&self) -> u64 {
        self.size
    }

    fn read_exact_at(&self, offset: u64, buffer: &mut [u8]) -> UnitResult {
        let mut file = self.file.lock().expect("source mutex poisoned");

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)?; // fails on a short read

        Ok(())
    }
}


/// An in-memory source, mainly for tests and in-memory round trips.
#[derive(Debug)]
pub struct MemorySource {
    bytes: Vec<u8>,
}

impl MemorySource {

    /// Share the specified bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        MemorySource { bytes }
    }
}

impl SharedSource for MemorySource {
    fn total_size(&self) -> u64 {
        crate::error::usize_to_u64(self.bytes.len())
    }

    fn read_exact_at(&self, offset: u64, buffer: &mut [u8]) -> UnitResult {
        let start = u64_to_usize(offset);
        let end = start + buffer.len();

        if end > self.bytes.len() {
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }

        buffer.copy_from_slice(&self.bytes[start .. end]);
        Ok(())
    }
}
