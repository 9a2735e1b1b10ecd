
//! Describes the container: the header with its chunk table,
//! both byte layouts, and the logic to locate the header in a file.

use smallvec::SmallVec;

use crate::digest::{Checksum, CHECKSUM_SIZE};
use crate::error::{Error, Result, UnitResult, u64_to_usize, usize_to_u64};
use crate::frequency::ALPHABET_SIZE;
use crate::io::{Data, Read, Seek, SeekFrom, Write};


/// The container format version this crate reads and writes.
pub const VERSION: u32 = 1;

/// Number of bytes of the footer pointer at the very end
/// of a footer-last container. Big-endian, like every container integer.
pub const FOOTER_POINTER_BYTES: u64 = 8;

/// Smallest accepted chunk size: 1 MiB.
pub const MIN_CHUNK_SIZE: u32 = 1024 * 1024;

/// Largest accepted chunk size: 1024 MiB.
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024 * 1024;

// a chunk table larger than this is certainly an invalid file
const MAX_CHUNK_COUNT: usize = 1 << 24;


/// The first four bytes of each container file in the header-first layout.
/// Used to abort reading unrelated files, and to tell the two layouts apart.
pub mod magic_number {
    use super::*;

    /// The magic bytes, spelling `DCZF`.
    pub const BYTES: [u8; 4] = [0x44, 0x43, 0x5A, 0x46];

    /// Without validation, write this instance to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consumes four bytes from the reader and returns whether they are the magic number.
    pub fn is_container(read: &mut impl Read) -> Result<bool> {
        let mut magic = [0_u8; 4];
        u8::read_slice(read, &mut magic)?;
        Ok(magic == self::BYTES)
    }

    /// Consumes four bytes and fails with `BadFormat` if they are not the magic number.
    pub fn validate(read: &mut impl Read) -> UnitResult {
        if self::is_container(read)? { Ok(()) }
        else { Err(Error::bad_format("magic number missing")) }
    }
}


/// How header and compressed data are arranged within the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {

    /// `[header][chunk 0][chunk 1]…` — chunk offsets are relative
    /// to the end of the header. The legacy arrangement.
    HeaderFirst,

    /// `[chunk 0][chunk 1]…[header][footer pointer]` — chunk offsets are
    /// absolute, and the last eight bytes locate the header.
    /// Can be written without seeking and is the preferred arrangement.
    FooterLast,
}


/// Everything the container records about a single chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDescriptor {

    /// Position of this chunk in the stream, starting at zero, dense.
    pub index: u32,

    /// Absolute position of the first byte of this chunk in the original stream.
    pub original_offset: u64,

    /// Number of bytes of this chunk before compression.
    /// Equal to the chunk size for all chunks except possibly the last.
    pub original_size: u32,

    /// Position of the compressed blob, relative to the start of the
    /// compressed-data region (header-first) or to byte zero (footer-last).
    pub compressed_offset: u64,

    /// Number of bytes of the compressed blob.
    pub compressed_size: u32,

    /// SHA-256 of the uncompressed chunk bytes.
    pub checksum: Checksum,

    /// Code lengths to rebuild the canonical code table from.
    /// All zeroes signal that the chunk is stored verbatim.
    pub code_lengths: [u16; ALPHABET_SIZE],
}

impl ChunkDescriptor {

    /// Number of bytes one serialized descriptor occupies.
    pub const BYTE_SIZE: usize = 4 + 8 + 4 + 8 + 4 + CHECKSUM_SIZE + 2 * ALPHABET_SIZE;

    /// Whether the chunk bypassed coding and is stored verbatim.
    pub fn is_stored(&self) -> bool {
        self.code_lengths.iter().all(|&length| length == 0)
    }

    fn read(read: &mut impl Read) -> Result<Self> {
        let index = u32::read(read)?;
        let original_offset = u64::read(read)?;
        let original_size = u32::read(read)?;
        let compressed_offset = u64::read(read)?;
        let compressed_size = u32::read(read)?;

        let mut checksum = [0_u8; CHECKSUM_SIZE];
        u8::read_slice(read, &mut checksum)?;

        let mut code_lengths = [0_u16; ALPHABET_SIZE];
        u16::read_slice(read, &mut code_lengths)?;

        Ok(ChunkDescriptor {
            index, original_offset, original_size,
            compressed_offset, compressed_size,
            checksum, code_lengths,
        })
    }

    fn write(&self, write: &mut impl Write) -> UnitResult {
        self.index.write(write)?;
        self.original_offset.write(write)?;
        self.original_size.write(write)?;
        self.compressed_offset.write(write)?;
        self.compressed_size.write(write)?;
        u8::write_slice(write, &self.checksum)?;
        u16::write_slice(write, &self.code_lengths)?;
        Ok(())
    }
}


/// List of chunk descriptors, in ascending index order.
pub type Descriptors = SmallVec<[ChunkDescriptor; 2]>;


/// The complete meta data of a container,
/// owning one descriptor per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHeader {

    /// Name of the original file, UTF-8.
    pub file_name: String,

    /// Total number of bytes of the original stream.
    pub original_size: u64,

    /// Modification time of the original file, in milliseconds since the epoch.
    pub timestamp_ms: u64,

    /// Number of bytes per chunk. Only the last chunk may be smaller.
    pub chunk_size: u32,

    /// SHA-256 over the concatenation of all chunk digests in index order.
    pub global_checksum: Checksum,

    /// One entry per chunk, in ascending index order.
    pub chunks: Descriptors,
}

impl ContainerHeader {

    /// The number of chunks in this container.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of bytes the serialized header will occupy,
    /// computable before any chunk has been compressed.
    pub fn byte_size_for(file_name_bytes: usize, chunk_count: usize) -> u64 {
        let fixed = 4 + 4 + 2 + 8 + 8 + 4 + CHECKSUM_SIZE + 4;
        usize_to_u64(fixed + file_name_bytes + chunk_count * ChunkDescriptor::BYTE_SIZE)
    }

    /// Number of bytes this header occupies when serialized.
    pub fn byte_size(&self) -> u64 {
        Self::byte_size_for(self.file_name.len(), self.chunks.len())
    }

    /// Serialize the header, starting with the magic number.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        if self.file_name.len() > u16::MAX as usize {
            return Err(Error::argument("file name is too long for the container"));
        }

        magic_number::write(write)?;
        VERSION.write(write)?;

        (self.file_name.len() as u16).write(write)?;
        u8::write_slice(write, self.file_name.as_bytes())?;

        self.original_size.write(write)?;
        self.timestamp_ms.write(write)?;
        self.chunk_size.write(write)?;
        u8::write_slice(write, &self.global_checksum)?;

        (self.chunks.len() as u32).write(write)?;
        for descriptor in &self.chunks {
            descriptor.write(write)?;
        }

        Ok(())
    }

    /// Deserialize a header, validating magic number and version.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        magic_number::validate(read)?;

        let version = u32::read(read)?;
        if version != VERSION {
            return Err(Error::bad_format("unsupported container version"));
        }

        let name_length = u16::read(read)? as usize;
        let name_bytes = u8::read_vec(read, name_length, u16::MAX as usize, "file name length")?;
        let file_name = String::from_utf8(name_bytes)
            .map_err(|_| Error::bad_format("file name is not valid utf-8"))?;

        let original_size = u64::read(read)?;
        let timestamp_ms = u64::read(read)?;
        let chunk_size = u32::read(read)?;

        let mut global_checksum = [0_u8; CHECKSUM_SIZE];
        u8::read_slice(read, &mut global_checksum)?;

        let chunk_count = u64_to_usize(u64::from(u32::read(read)?));
        if chunk_count > MAX_CHUNK_COUNT {
            return Err(Error::bad_format("unreasonably large chunk count"));
        }

        let mut chunks = Descriptors::with_capacity(chunk_count);
        for _ in 0 .. chunk_count {
            chunks.push(ChunkDescriptor::read(read)?);
        }

        Ok(ContainerHeader {
            file_name, original_size, timestamp_ms,
            chunk_size, global_checksum, chunks,
        })
    }

    /// Check that the chunk table is consistent in itself
    /// and fits into a file of the specified total size.
    pub fn validate(&self, layout: Layout, data_base: u64, total_file_size: u64) -> UnitResult {
        if self.chunks.is_empty() {
            if self.original_size != 0 {
                return Err(Error::bad_format("chunk count does not match the original size"));
            }

            return Ok(());
        }

        if self.chunk_size == 0 {
            return Err(Error::bad_format("chunk size is zero"));
        }

        let chunk_size = u64::from(self.chunk_size);
        let expected_count = compute_chunk_count(self.original_size, self.chunk_size);
        if expected_count != usize_to_u64(self.chunks.len()) {
            return Err(Error::bad_format("chunk count does not match the original size"));
        }

        let data_end = match layout {
            Layout::HeaderFirst => total_file_size,
            // in the footer-last layout, the data region ends where the header begins
            Layout::FooterLast => total_file_size
                .checked_sub(self.byte_size() + FOOTER_POINTER_BYTES)
                .ok_or_else(|| Error::bad_format("file is too small for its chunk table"))?,
        };

        for (position, descriptor) in self.chunks.iter().enumerate() {
            if u64::from(descriptor.index) != usize_to_u64(position) {
                return Err(Error::bad_format("chunk indices are not dense and ascending"));
            }

            if descriptor.original_offset != usize_to_u64(position) * chunk_size {
                return Err(Error::bad_format("chunk offset does not match its index"));
            }

            let is_last = position + 1 == self.chunks.len();
            let expected_size = if is_last { self.original_size - descriptor.original_offset }
                else { chunk_size };

            if u64::from(descriptor.original_size) != expected_size {
                return Err(Error::bad_format("chunk sizes do not match the original size"));
            }

            let start = data_base + descriptor.compressed_offset;
            let end = start + u64::from(descriptor.compressed_size);
            if end > data_end {
                return Err(Error::bad_format("compressed chunk extends past the data region"));
            }
        }

        Ok(())
    }
}


/// A located and validated container header,
/// ready to resolve chunk byte positions within the file.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenContainer {

    /// The parsed header.
    pub header: ContainerHeader,

    /// The layout the file was written in.
    pub layout: Layout,

    /// Absolute position that chunk offsets are relative to.
    /// Zero in the footer-last layout.
    pub data_base: u64,
}

impl OpenContainer {

    /// Locate and parse the header of a container file.
    ///
    /// First attempts the header-first layout by checking for the magic
    /// number at byte zero. Otherwise, the last eight bytes are interpreted
    /// as the absolute header position of a footer-last file.
    /// Fails with `BadFormat` if neither works.
    pub fn read_from(read: &mut (impl Read + Seek)) -> Result<Self> {
        let total_size = read.seek(SeekFrom::End(0))?;

        if total_size >= 4 {
            read.seek(SeekFrom::Start(0))?;
            if magic_number::is_container(read)? {
                read.seek(SeekFrom::Start(0))?;
                let mut tracked = crate::io::Tracking::new(read.by_ref());
                let header = ContainerHeader::read(&mut tracked)?;
                let data_base = tracked.byte_position();

                header.validate(Layout::HeaderFirst, data_base, total_size)?;
                return Ok(OpenContainer { header, layout: Layout::HeaderFirst, data_base });
            }
        }

        if total_size < FOOTER_POINTER_BYTES {
            return Err(Error::bad_format("file is too small to be a container"));
        }

        read.seek(SeekFrom::End(-(FOOTER_POINTER_BYTES as i64)))?;
        let header_position = u64::read(read)?;

        if header_position > total_size - FOOTER_POINTER_BYTES {
            return Err(Error::bad_format("footer pointer is outside the file"));
        }

        read.seek(SeekFrom::Start(header_position))?;
        let header = ContainerHeader::read(read)?;

        if header_position + header.byte_size() + FOOTER_POINTER_BYTES != total_size {
            return Err(Error::bad_format("footer pointer does not match the header size"));
        }

        header.validate(Layout::FooterLast, 0, total_size)?;
        Ok(OpenContainer { header, layout: Layout::FooterLast, data_base: 0 })
    }

    /// The absolute byte position of a chunk's compressed blob.
    pub fn chunk_start(&self, descriptor: &ChunkDescriptor) -> u64 {
        self.data_base + descriptor.compressed_offset
    }
}


/// The number of chunks a stream of the given size will be split into.
/// Rounds up, because a partially filled chunk at the end is still a chunk.
pub fn compute_chunk_count(total_size: u64, chunk_size: u32) -> u64 {
    let chunk_size = u64::from(chunk_size);
    (total_size + chunk_size - 1) / chunk_size
}
