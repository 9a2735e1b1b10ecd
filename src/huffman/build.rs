
//! Compute code lengths from a symbol histogram.
//!
//! The Huffman tree only exists inside this module. Nodes live in a flat
//! arena referenced by indices, with the leaves at `0..256` and internal
//! nodes appended after them; the priority queue holds indices. Only the
//! finished code table escapes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::frequency::{Histogram, ALPHABET_SIZE};
use super::{CodeTable, MAX_CODE_LENGTH};


const NO_CHILD: usize = usize::MAX;


/// Build the canonical code table for the histogram of one chunk.
///
/// Tie-breaking between equal frequencies is deterministic:
/// the queue orders nodes by frequency first and node index second,
/// which puts leaves in ascending symbol order before internal nodes.
/// The canonical step re-derives the codewords from the lengths,
/// so the tie-break never changes the emitted bitstream,
/// but it keeps intermediate artefacts reproducible.
pub fn build_code_table(histogram: &Histogram) -> Result<CodeTable> {
    let symbols: Vec<usize> = (0 .. ALPHABET_SIZE)
        .filter(|&symbol| histogram[symbol] != 0)
        .collect();

    match symbols.len() {
        0 => Ok(CodeTable::empty()),

        // a single distinct symbol still needs one bit per occurrence,
        // as a zero-bit code could not be counted by the decoder
        1 => {
            let mut lengths = [0_u16; ALPHABET_SIZE];
            lengths[symbols[0]] = 1;
            CodeTable::from_lengths(&lengths)
        },

        _ => {
            let depths = tree_depths(histogram, &symbols);

            let max_depth = symbols.iter()
                .map(|&symbol| depths[symbol])
                .max().expect("symbol list is empty");

            let lengths =
                if max_depth <= u32::from(MAX_CODE_LENGTH) {
                    let mut lengths = [0_u16; ALPHABET_SIZE];
                    for &symbol in &symbols { lengths[symbol] = depths[symbol] as u16; }
                    lengths
                }
                else {
                    limited_lengths(histogram, &symbols, &depths)?
                };

            CodeTable::from_lengths(&lengths)
        },
    }
}


/// Merge the two least frequent nodes until a single root remains,
/// then walk the tree once to find the depth of every node.
/// Returns the depth per arena index; leaves are indexed by their symbol.
fn tree_depths(histogram: &Histogram, symbols: &[usize]) -> Vec<u32> {
    let mut children: Vec<(usize, usize)> = vec![(NO_CHILD, NO_CHILD); ALPHABET_SIZE];

    let mut queue: BinaryHeap<Reverse<(u64, usize)>> = symbols.iter()
        .map(|&symbol| Reverse((histogram[symbol], symbol)))
        .collect();

    while queue.len() >= 2 {
        let Reverse((left_frequency, left)) = queue.pop().expect("queue is empty");
        let Reverse((right_frequency, right)) = queue.pop().expect("queue is empty");

        let merged = children.len();
        children.push((left, right));
        queue.push(Reverse((left_frequency + right_frequency, merged)));
    }

    let Reverse((_, root)) = queue.pop().expect("queue is empty");

    let mut depths = vec![0_u32; children.len()];
    let mut stack = vec![(root, 0_u32)];

    while let Some((node, depth)) = stack.pop() {
        depths[node] = depth;

        let (left, right) = children[node];
        if left != NO_CHILD {
            stack.push((left, depth + 1));
            stack.push((right, depth + 1));
        }
    }

    depths
}


/// Cap all code lengths at 16 bits while keeping the code prefix-free.
///
/// Overlong codes are clamped to 16, which over-fills the code space.
/// The classic deflate repair then repeatedly moves one leaf down a level,
/// freeing a slot that absorbs one leaf from the deepest level.
/// In units of `2^-16`, every such move shrinks the Kraft sum by exactly one,
/// so the loop lands on a complete code.
/// Afterwards, lengths are dealt out shortest-first to the most frequent
/// symbols, which preserves the frequency ordering of the lengths.
fn limited_lengths(histogram: &Histogram, symbols: &[usize], depths: &[u32]) -> Result<[u16; ALPHABET_SIZE]> {
    let max_length = usize::from(MAX_CODE_LENGTH);

    let mut count_per_length = [0_u64; MAX_CODE_LENGTH as usize + 1];
    for &symbol in symbols {
        let clamped = (depths[symbol] as usize).min(max_length);
        count_per_length[clamped] += 1;
    }

    let mut scaled_kraft_sum: u64 = (1 ..= max_length)
        .map(|length| count_per_length[length] << (max_length - length))
        .sum();

    while scaled_kraft_sum > 1 << max_length {
        if count_per_length[max_length] == 0 {
            return Err(Error::LengthLimitExceeded);
        }

        let mut length = max_length - 1;
        while count_per_length[length] == 0 {
            if length == 1 { return Err(Error::LengthLimitExceeded); }
            length -= 1;
        }

        count_per_length[length] -= 1;
        count_per_length[length + 1] += 2;
        count_per_length[max_length] -= 1;
        scaled_kraft_sum -= 1;
    }

    if scaled_kraft_sum != 1 << max_length {
        return Err(Error::LengthLimitExceeded);
    }

    let mut ranked = symbols.to_vec();
    ranked.sort_by(|&first, &second|
        histogram[second].cmp(&histogram[first]).then(first.cmp(&second))
    );

    let mut lengths = [0_u16; ALPHABET_SIZE];
    let mut remaining = ranked.into_iter();

    for length in 1 ..= max_length {
        for _ in 0 .. count_per_length[length] {
            let symbol = remaining.next().ok_or(Error::LengthLimitExceeded)?;
            lengths[symbol] = length as u16;
        }
    }

    debug_assert!(remaining.next().is_none(), "repaired length histogram does not cover all symbols");
    Ok(lengths)
}


#[cfg(test)]
mod test {
    use super::*;
    use super::super::test::{scaled_kraft_sum, is_prefix_free};

    #[test]
    fn empty_histogram_yields_empty_table(){
        let table = build_code_table(&[0; ALPHABET_SIZE]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn single_symbol_gets_a_one_bit_code(){
        let mut histogram = [0_u64; ALPHABET_SIZE];
        histogram[7] = 1000;

        let table = build_code_table(&histogram).unwrap();
        assert_eq!(table.lengths[7], 1);
        assert_eq!(table.codes[7], 0);
        assert_eq!(table.symbol_count(), 1);
    }

    #[test]
    fn balanced_quartet_uses_two_bits_each(){
        let mut histogram = [0_u64; ALPHABET_SIZE];
        for symbol in b"ABCD" { histogram[*symbol as usize] = 4; }

        let table = build_code_table(&histogram).unwrap();
        for symbol in b"ABCD" {
            assert_eq!(table.lengths[*symbol as usize], 2);
        }
    }

    #[test]
    fn more_frequent_symbols_never_get_longer_codes(){
        let mut histogram = [0_u64; ALPHABET_SIZE];
        for symbol in 0 .. 100_usize {
            histogram[symbol] = (symbol as u64 + 1) * 7 % 83 + 1;
        }

        let table = build_code_table(&histogram).unwrap();

        for first in 0 .. 100_usize {
            for second in 0 .. 100_usize {
                if histogram[first] > histogram[second] {
                    assert!(
                        table.lengths[first] <= table.lengths[second],
                        "symbol {} is more frequent than {} but has the longer code",
                        first, second
                    );
                }
            }
        }

        assert_eq!(scaled_kraft_sum(&table), 1 << 16);
        assert!(is_prefix_free(&table));
    }

    #[test]
    fn every_counted_symbol_gets_a_code_and_no_other(){
        let mut histogram = [0_u64; ALPHABET_SIZE];
        histogram[3] = 90;
        histogram[200] = 1;
        histogram[201] = 2;

        let table = build_code_table(&histogram).unwrap();
        for symbol in 0 .. ALPHABET_SIZE {
            assert_eq!(histogram[symbol] != 0, table.lengths[symbol] != 0);
        }
    }

    #[test]
    fn fibonacci_frequencies_are_length_limited(){
        // fibonacci frequencies maximize tree depth:
        // 24 of them would require a 23 bit code without limiting
        let mut histogram = [0_u64; ALPHABET_SIZE];
        let (mut previous, mut current) = (1_u64, 1_u64);
        for symbol in 0 .. 24_usize {
            histogram[symbol] = current;
            let next = previous + current;
            previous = current;
            current = next;
        }

        let table = build_code_table(&histogram).unwrap();

        let longest = table.lengths.iter().max().unwrap();
        assert!(*longest <= MAX_CODE_LENGTH);
        assert_eq!(scaled_kraft_sum(&table), 1 << 16);
        assert!(is_prefix_free(&table));

        // limiting must preserve the frequency ordering of the lengths
        for first in 0 .. 24_usize {
            for second in 0 .. 24_usize {
                if histogram[first] > histogram[second] {
                    assert!(table.lengths[first] <= table.lengths[second]);
                }
            }
        }
    }

    #[test]
    fn equal_frequencies_break_ties_deterministically(){
        let mut histogram = [0_u64; ALPHABET_SIZE];
        for symbol in 10 .. 20_usize { histogram[symbol] = 5; }

        let first = build_code_table(&histogram).unwrap();
        let second = build_code_table(&histogram).unwrap();
        assert_eq!(first, second);
    }
}
