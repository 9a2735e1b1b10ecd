
//! Table-driven decoding of canonical Huffman bitstreams.

use std::collections::HashMap;

use crate::bits::BitReader;
use crate::error::{Error, Result};
use crate::frequency::ALPHABET_SIZE;
use super::{CodeTable, MAX_CODE_LENGTH};


/// Width of the primary lookup window in bits.
pub const PRIMARY_BITS: u32 = 10;

const PRIMARY_SIZE: usize = 1 << PRIMARY_BITS;


/// A resolved short code, or the fallback marker when the length is zero.
#[derive(Debug, Clone, Copy, Default)]
struct PrimaryEntry {
    symbol: u8,
    length: u8,
}


/// Decodes one symbol per call, near-constant-time in the common case.
///
/// Every 10-bit window whose top bits equal a codeword of length `L <= 10`
/// maps directly to `(symbol, L)`. Longer codes fall back to a
/// length-indexed secondary map, extending the window one bit at a time.
#[derive(Debug)]
pub struct FastDecoder {
    primary: Vec<PrimaryEntry>,
    long_codes: Vec<HashMap<u16, u8>>, // indexed by code length, 11..=16 populated
}

impl FastDecoder {

    /// Prepare the lookup tables for one code table.
    pub fn new(table: &CodeTable) -> Self {
        let mut primary = vec![PrimaryEntry::default(); PRIMARY_SIZE];
        let mut long_codes = vec![HashMap::new(); usize::from(MAX_CODE_LENGTH) + 1];

        for symbol in 0 .. ALPHABET_SIZE {
            let length = u32::from(table.lengths[symbol]);
            if length == 0 { continue; }

            let code = table.codes[symbol];

            if length <= PRIMARY_BITS {
                let first_window = usize::from(code) << (PRIMARY_BITS - length);
                let window_count = 1_usize << (PRIMARY_BITS - length);

                for entry in &mut primary[first_window .. first_window + window_count] {
                    *entry = PrimaryEntry { symbol: symbol as u8, length: length as u8 };
                }
            }
            else {
                long_codes[length as usize].insert(code, symbol as u8);
            }
        }

        FastDecoder { primary, long_codes }
    }

    /// Decode the next symbol from the bitstream and advance the reader.
    /// Fails if no canonical codeword of up to 16 bits matches.
    pub fn decode_symbol(&self, reader: &mut BitReader<'_>) -> Result<u8> {
        let entry = self.primary[reader.peek(PRIMARY_BITS) as usize];

        if entry.length != 0 {
            reader.advance(u32::from(entry.length));
            return Ok(entry.symbol);
        }

        // no short code matched, so the symbol uses 11 to 16 bits.
        // widen the window one bit at a time, re-deriving the candidate code value
        for length in PRIMARY_BITS + 1 ..= u32::from(MAX_CODE_LENGTH) {
            let candidate = reader.peek(length) as u16;

            if let Some(&symbol) = self.long_codes[length as usize].get(&candidate) {
                reader.advance(length);
                return Ok(symbol);
            }
        }

        Err(Error::decode("bit pattern matches no canonical codeword"))
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitWriter;
    use crate::huffman::build_code_table;

    fn roundtrip(message: &[u8]) {
        let mut histogram = [0_u64; ALPHABET_SIZE];
        for &byte in message { histogram[byte as usize] += 1; }

        let table = build_code_table(&histogram).unwrap();

        let mut writer = BitWriter::new();
        for &byte in message {
            writer.write_bits(
                u32::from(table.codes[byte as usize]),
                u32::from(table.lengths[byte as usize])
            );
        }

        let bytes = writer.into_bytes();
        let decoder = FastDecoder::new(&table);
        let mut reader = BitReader::new(&bytes);

        for &expected in message {
            assert_eq!(decoder.decode_symbol(&mut reader).unwrap(), expected);
        }
    }

    #[test]
    fn decodes_short_codes_through_the_primary_table(){
        roundtrip(b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn decodes_long_codes_through_the_fallback_maps(){
        // an exponential distribution forces codes beyond the 10 bit window
        let mut message = Vec::new();
        for symbol in 0 .. 16_u8 {
            let count = 1_usize << symbol;
            message.extend(std::iter::repeat(symbol).take(count));
        }

        roundtrip(&message);
    }

    #[test]
    fn garbage_bits_are_detected(){
        // an incomplete code, as a tampered chunk table may contain:
        // the pattern `11` matches none of the three codewords
        let mut lengths = [0_u16; ALPHABET_SIZE];
        lengths[0] = 2;
        lengths[1] = 2;
        lengths[2] = 2;

        let table = crate::huffman::CodeTable::from_lengths(&lengths).unwrap();
        let decoder = FastDecoder::new(&table);

        let bytes = [0xFF_u8, 0xFF];
        let mut reader = BitReader::new(&bytes);
        assert!(decoder.decode_symbol(&mut reader).is_err());
    }
}
