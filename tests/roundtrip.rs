
//! End-to-end round trips through the complete pipeline,
//! in memory and through real files.

extern crate dczf;

use std::io::Cursor;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use dczf::prelude::*;
use dczf::meta::OpenContainer;

const MIB: u32 = 1024 * 1024;


fn compress_options(chunk_size: u32) -> CompressOptions {
    CompressOptions::default().with_chunk_size(chunk_size)
}

fn roundtrip(bytes: &[u8], chunk_size: u32) -> Vec<u8> {
    let container = compress_bytes(bytes, "roundtrip.bin", &compress_options(chunk_size)).unwrap();
    let restored = decompress_bytes(&container, &DecompressOptions::default()).unwrap();
    assert_eq!(restored, bytes, "round trip is not byte-exact");
    container
}

fn parse(container: &[u8]) -> OpenContainer {
    OpenContainer::read_from(&mut Cursor::new(container)).unwrap()
}

fn temp_file(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("dczf-test-{}-{}", std::process::id(), name));
    path
}

fn pseudo_random_bytes(seed: u64, count: usize) -> Vec<u8> {
    let mut generator = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0_u8; count];
    generator.fill_bytes(&mut bytes);
    bytes
}


#[test]
fn repeated_text_shrinks_noticeably(){
    let message: Vec<u8> = b"Hello World! ".iter().cloned().cycle().take(1300).collect();
    let container = roundtrip(&message, MIB);

    let open = parse(&container);
    assert_eq!(open.header.chunk_count(), 1);
    assert!(
        (open.header.chunks[0].compressed_size as usize) < 1300 / 2,
        "text with thirteen distinct characters should compress well"
    );
}

#[test]
fn empty_input_yields_a_valid_empty_container(){
    let container = roundtrip(&[], MIB);

    let open = parse(&container);
    assert_eq!(open.header.chunk_count(), 0);
    assert_eq!(open.header.original_size, 0);

    // the global digest of no chunks is the digest of the empty string
    assert_eq!(open.header.global_checksum, dczf::digest::checksum_of(&[]));
}

#[test]
fn single_byte_input_yields_a_single_bit_body(){
    let container = roundtrip(&[0x5A], MIB);

    let open = parse(&container);
    assert_eq!(open.header.chunk_count(), 1);
    assert_eq!(open.header.chunks[0].original_size, 1);
    assert_eq!(open.header.chunks[0].compressed_size, 1); // one bit, padded to one byte
}

#[test]
fn input_of_exactly_one_chunk_yields_one_chunk(){
    let bytes = pseudo_random_bytes(7, MIB as usize);
    let container = roundtrip(&bytes, MIB);
    assert_eq!(parse(&container).header.chunk_count(), 1);
}

#[test]
fn one_byte_more_than_a_chunk_yields_a_tiny_second_chunk(){
    let bytes = pseudo_random_bytes(8, MIB as usize + 1);
    let container = roundtrip(&bytes, MIB);

    let open = parse(&container);
    assert_eq!(open.header.chunk_count(), 2);
    assert_eq!(open.header.chunks[0].original_size, MIB);
    assert_eq!(open.header.chunks[1].original_size, 1);
    assert_eq!(open.header.chunks[1].original_offset, u64::from(MIB));
}

#[test]
fn balanced_four_letter_alphabet_uses_two_bits_per_symbol(){
    let message = b"AAAABBBBCCCCDDDD";
    let container = roundtrip(message, 16 * MIB);

    let open = parse(&container);
    assert_eq!(open.header.chunk_count(), 1);

    let lengths = &open.header.chunks[0].code_lengths;
    for symbol in b"ABCD" {
        assert_eq!(lengths[*symbol as usize], 2);
    }
}

#[test]
fn uniform_random_input_triggers_the_bypass(){
    // one megabyte of uniform random bytes has an essentially flat histogram
    let bytes = pseudo_random_bytes(9, MIB as usize);
    let container = roundtrip(&bytes, MIB);

    let open = parse(&container);
    let chunk = &open.header.chunks[0];
    assert!(chunk.is_stored(), "uniform input should be stored verbatim");
    assert_eq!(chunk.compressed_size, chunk.original_size);
}

#[test]
fn small_random_input_stays_near_its_original_size(){
    let bytes = pseudo_random_bytes(42, 1024);
    let container = roundtrip(&bytes, 16 * MIB);

    let open = parse(&container);
    let compressed = open.header.chunks[0].compressed_size as usize;
    assert!(compressed >= 950 && compressed <= 1080,
        "1024 random bytes should be nearly incompressible, got {} bytes", compressed);
}

#[test]
fn output_is_identical_for_any_worker_count(){
    let bytes = pseudo_random_bytes(5, 10 * MIB as usize);

    let sequential = compress_bytes(
        &bytes, "same.bin",
        &compress_options(MIB).with_parallel_chunks(1)
    ).unwrap();

    let parallel = compress_bytes(
        &bytes, "same.bin",
        &compress_options(MIB).with_parallel_chunks(4)
    ).unwrap();

    assert_eq!(sequential, parallel, "worker count must not influence the container bytes");
    assert_eq!(decompress_bytes(&parallel, &DecompressOptions::default()).unwrap(), bytes);
}

#[test]
fn both_layouts_restore_the_same_plaintext(){
    let bytes = pseudo_random_bytes(6, 3 * MIB as usize + 500);

    let footer_last = compress_bytes(
        &bytes, "layout.bin",
        &compress_options(MIB).with_layout(Layout::FooterLast)
    ).unwrap();

    let header_first = compress_bytes(
        &bytes, "layout.bin",
        &compress_options(MIB).with_layout(Layout::HeaderFirst)
    ).unwrap();

    assert_eq!(parse(&footer_last).layout, Layout::FooterLast);
    assert_eq!(parse(&header_first).layout, Layout::HeaderFirst);

    let options = DecompressOptions::default();
    assert_eq!(decompress_bytes(&footer_last, &options).unwrap(), bytes);
    assert_eq!(decompress_bytes(&header_first, &options).unwrap(), bytes);
}

#[test]
fn three_chunk_file_reports_monotone_progress(){
    let input_path = temp_file("progress-input");
    let output_path = temp_file("progress-output");
    let restored_path = temp_file("progress-restored");

    // three megabytes of the repeating byte ramp
    let bytes: Vec<u8> = (0 .. 3 * MIB as usize).map(|index| index as u8).collect();
    std::fs::write(&input_path, &bytes).unwrap();

    let mut reported = Vec::new();
    compress_path_cancellable(
        &input_path, &output_path,
        &compress_options(MIB),
        &Operation::new(),
        |fraction| reported.push(fraction),
    ).unwrap();

    assert!(reported.len() >= 3, "expected one report per chunk at least");
    assert_eq!(reported.first(), Some(&0.0));
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]), "progress went backwards");
    assert!(*reported.last().unwrap() >= 1.0 - 1e-9);

    decompress_path(&output_path, &restored_path, &DecompressOptions::default()).unwrap();
    assert_eq!(std::fs::read(&restored_path).unwrap(), bytes);

    std::fs::remove_file(&input_path).unwrap();
    std::fs::remove_file(&output_path).unwrap();
    std::fs::remove_file(&restored_path).unwrap();
}

#[test]
fn files_round_trip_and_verify(){
    let input_path = temp_file("verify-input");
    let output_path = temp_file("verify-output");

    let bytes = pseudo_random_bytes(11, 2 * MIB as usize + 77);
    std::fs::write(&input_path, &bytes).unwrap();

    compress_path(&input_path, &output_path, &compress_options(MIB)).unwrap();

    let header = verify_path(&output_path, &DecompressOptions::default()).unwrap();
    assert_eq!(header.chunk_count(), 3);
    assert_eq!(header.original_size, bytes.len() as u64);
    assert!(header.file_name.contains("verify-input"));

    std::fs::remove_file(&input_path).unwrap();
    std::fs::remove_file(&output_path).unwrap();
}

#[test]
fn cancelled_operations_leave_no_output_behind(){
    let input_path = temp_file("cancel-input");
    let output_path = temp_file("cancel-output");

    std::fs::write(&input_path, pseudo_random_bytes(12, MIB as usize)).unwrap();

    let operation = Operation::new();
    operation.cancel();

    let result = compress_path_cancellable(
        &input_path, &output_path,
        &compress_options(MIB),
        &operation,
        |_progress| {},
    );

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(operation.state(), RunState::Cancelled);
    assert!(!output_path.exists(), "cancelled run must not leave an output file");

    std::fs::remove_file(&input_path).unwrap();
}

#[test]
fn missing_input_is_an_argument_error(){
    let result = compress_path(
        temp_file("does-not-exist"),
        temp_file("never-written"),
        &CompressOptions::default(),
    );

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
