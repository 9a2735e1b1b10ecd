
//! Encode and decode the contents of a single chunk.
//!
//! A chunk is coded independently with a table derived from its own
//! histogram. When the histogram is essentially flat, coding would not
//! shrink the data, so the raw bytes are stored verbatim instead.
//! A stored chunk is signalled by an all-zero code length table.

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::frequency::ALPHABET_SIZE;
use crate::huffman::{CodeTable, FastDecoder};


/// A chunk is stored verbatim when more than this many symbols
/// have a code length of eight bits, which only happens for
/// essentially uniform distributions.
pub const BYPASS_THRESHOLD: usize = 240;


/// The compressed form of one chunk, together with the code lengths
/// that the chunk table will record for it.
#[derive(Debug, Clone)]
pub struct EncodedChunk {

    /// The compressed blob, or the verbatim input when bypassed.
    pub bytes: Vec<u8>,

    /// The lengths the decoder will rebuild the code table from.
    /// All zeroes signal a verbatim chunk.
    pub code_lengths: [u16; ALPHABET_SIZE],
}

impl EncodedChunk {

    /// Whether this chunk bypassed coding and stores the raw bytes.
    pub fn is_stored(&self) -> bool {
        self.code_lengths.iter().all(|&length| length == 0)
    }
}


/// Compress the bytes of one chunk with the given code table,
/// which must have been built from the histogram of these exact bytes.
pub fn compress_chunk(bytes: &[u8], table: &CodeTable) -> EncodedChunk {
    if table.count_with_length(8) > BYPASS_THRESHOLD {
        return EncodedChunk {
            bytes: bytes.to_vec(),
            code_lengths: [0; ALPHABET_SIZE],
        };
    }

    // no terminator symbol is emitted; the decoder
    // stops after the expected number of symbols
    let mut writer = BitWriter::with_capacity(bytes.len() / 2);

    for &byte in bytes {
        let symbol = byte as usize;
        debug_assert_ne!(table.lengths[symbol], 0, "code table misses a symbol of its own chunk");

        writer.write_bits(
            u32::from(table.codes[symbol]),
            u32::from(table.lengths[symbol])
        );
    }

    EncodedChunk {
        bytes: writer.into_bytes(),
        code_lengths: table.lengths,
    }
}


/// Decompress one chunk back into exactly `original_size` bytes.
///
/// Fails with [`Error::DecodeFailure`] if the blob ends before producing
/// all symbols or contains a bit pattern that matches no codeword.
pub fn decompress_chunk(
    compressed: &[u8],
    code_lengths: &[u16; ALPHABET_SIZE],
    original_size: usize,
) -> Result<Vec<u8>>
{
    let is_stored = code_lengths.iter().all(|&length| length == 0);

    if is_stored {
        if compressed.len() != original_size {
            return Err(Error::decode("stored chunk size does not match the chunk table"));
        }

        return Ok(compressed.to_vec());
    }

    let table = CodeTable::from_lengths(code_lengths)?;
    let decoder = FastDecoder::new(&table);

    let mut reader = BitReader::new(compressed);
    let mut decoded = Vec::with_capacity(original_size);

    for _ in 0 .. original_size {
        decoded.push(decoder.decode_symbol(&mut reader)?);

        // the reader pads with zero bits past the end, so a truncated blob
        // would silently keep producing symbols if this was not checked
        if reader.bit_position() > reader.bit_count() {
            return Err(Error::decode("chunk bitstream ended before producing all symbols"));
        }
    }

    Ok(decoded)
}
