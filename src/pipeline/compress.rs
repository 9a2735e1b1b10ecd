
//! The compression orchestrator.
//!
//! Chunks are read sequentially by position, compressed by a fixed pool
//! of workers in any order, and written strictly in ascending index order.
//! Given identical input and chunk size, the container is byte-identical
//! for every worker count.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use std::sync::Arc;

use crate::codec;
use crate::digest::{checksum_of, Checksum, GlobalChecksum, CHECKSUM_SIZE};
use crate::error::{Result, UnitResult, usize_to_u32, usize_to_u64, u64_to_usize};
use crate::frequency::{FrequencyBackend, ALPHABET_SIZE};
use crate::huffman;
use crate::io::{Data, Tracking, Write, Seek};
use crate::meta::{compute_chunk_count, ChunkDescriptor, ContainerHeader, Descriptors, Layout};
use crate::metrics::{MetricsSink, Stage};

use super::{CompressOptions, Operation, ProgressReporter};
use super::source::{FileSource, MemorySource, SharedSource};


/// Compress the input file into a container file.
/// On failure, the partially written output file is removed.
pub fn compress_path(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &CompressOptions,
) -> UnitResult
{
    compress_path_cancellable(input, output, options, &Operation::new(), |_progress| {})
}

/// Compress the input file into a container file, with an operation handle
/// for cancellation and a progress callback. The callback receives a
/// monotone non-decreasing fraction, starting at `0.0` and ending at `1.0`.
pub fn compress_path_cancellable(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &CompressOptions,
    operation: &Operation,
    on_progress: impl FnMut(f64),
) -> UnitResult
{
    let input = input.as_ref();
    let output = output.as_ref();
    options.validate()?;

    let result = operation.run(|| {
        let source = Arc::new(FileSource::open(input)?);

        let file_name = input.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let write = BufWriter::new(File::create(output)?);
        compress_source(source, file_name, file_timestamp_ms(input), write, options, operation, on_progress)
    });

    // an aborted run must not leave a partial container behind
    if result.is_err() {
        log::warn!("discarding partial output file {}", output.display());
        let _ = std::fs::remove_file(output);
    }

    result
}

/// Compress an in-memory byte stream into an in-memory container.
pub fn compress_bytes(bytes: &[u8], file_name: &str, options: &CompressOptions) -> Result<Vec<u8>> {
    options.validate()?;

    let source = Arc::new(MemorySource::new(bytes.to_vec()));
    let mut write = Cursor::new(Vec::new());

    let operation = Operation::new();
    operation.run(|| compress_source(
        source, file_name.to_string(), 0, &mut write,
        options, &operation, |_progress| {}
    ))?;

    Ok(write.into_inner())
}


/// One finished chunk, travelling from a worker to the writer.
#[derive(Debug)]
struct CompressedChunk {
    index: u32,
    original_offset: u64,
    original_size: u32,
    checksum: Checksum,
    code_lengths: [u16; ALPHABET_SIZE],
    bytes: Vec<u8>,
}


fn compress_source(
    source: Arc<dyn SharedSource>,
    file_name: String,
    timestamp_ms: u64,
    write: impl Write + Seek,
    options: &CompressOptions,
    operation: &Operation,
    on_progress: impl FnMut(f64),
) -> UnitResult
{
    let total_size = source.total_size();
    let chunk_size = u64::from(options.chunk_size);
    let chunk_count = u64_to_usize(compute_chunk_count(total_size, options.chunk_size));

    log::debug!(
        "compressing {} bytes as {} chunks with {} workers",
        total_size, chunk_count, options.parallel_chunks
    );

    let mut tracked = Tracking::new(write);

    // in the header-first layout, a placeholder reserves the header bytes
    // and is patched once all chunk descriptors are known
    let data_base = match options.layout {
        Layout::FooterLast => 0,

        Layout::HeaderFirst => {
            let placeholder = placeholder_header(&file_name, total_size, timestamp_ms, options.chunk_size, chunk_count);
            options.metrics.time(Stage::HeaderWrite, placeholder.byte_size(), || placeholder.write(&mut tracked))?;
            tracked.byte_position()
        },
    };

    let pool = threadpool::Builder::new()
        .num_threads(options.parallel_chunks)
        .thread_name("dczf chunk compressor".to_string())
        .build();

    // completed chunks may have to wait for an earlier sibling,
    // so the window is slightly wider than the pool
    let window_size = options.parallel_chunks + 2;
    let (sender, receiver) = flume::bounded::<Result<CompressedChunk>>(window_size);

    let mut descriptor_slots: Vec<Option<ChunkDescriptor>> = vec![None; chunk_count];
    let mut pending = BTreeMap::<u32, CompressedChunk>::new();
    let mut global_checksum = GlobalChecksum::new();
    let mut progress = ProgressReporter::new(chunk_count, on_progress);

    let mut next_submit = 0_usize;
    let mut next_write = 0_usize;
    let mut in_channel = 0_usize;

    while next_write < chunk_count {
        operation.check_cancelled()?;

        // keep the submission window full; this also bounds resident chunk memory
        while next_submit < chunk_count && next_submit - next_write < window_size {
            let offset = usize_to_u64(next_submit) * chunk_size;
            let size = u64_to_usize(chunk_size.min(total_size - offset));

            let source = source.clone();
            let frequency = options.frequency.clone();
            let metrics = options.metrics.clone();
            let sender = sender.clone();
            let index = usize_to_u32(next_submit);

            pool.execute(move || {
                let result = compress_one_chunk(&*source, &*frequency, &metrics, index, offset, size);

                // the writer may already have failed and hung up; nothing to do then
                let _ = sender.send(result);
            });

            next_submit += 1;
            in_channel += 1;
        }

        let next_index = usize_to_u32(next_write);
        if let Some(chunk) = pending.remove(&next_index) {
            let blob_position = tracked.byte_position();

            options.metrics.time(
                Stage::FileIo, usize_to_u64(chunk.bytes.len()),
                || u8::write_slice(&mut tracked, &chunk.bytes)
            )?;

            global_checksum.add_chunk(&chunk.checksum);

            descriptor_slots[next_write] = Some(ChunkDescriptor {
                index: chunk.index,
                original_offset: chunk.original_offset,
                original_size: chunk.original_size,
                compressed_offset: blob_position - data_base,
                compressed_size: usize_to_u32(chunk.bytes.len()),
                checksum: chunk.checksum,
                code_lengths: chunk.code_lengths,
            });

            next_write += 1;
            progress.chunk_written();
        }
        else {
            debug_assert!(in_channel > 0, "writer would wait with no chunk in flight");

            // propagate panics instead of waiting for a chunk that will never arrive
            assert_eq!(pool.panic_count(), 0, "a compressor worker panicked");

            let completed = receiver.recv().expect("compressor channel closed unexpectedly")?;
            in_channel -= 1;
            pending.insert(completed.index, completed);
        }
    }

    progress.finish();

    let chunks: Descriptors = descriptor_slots.into_iter()
        .map(|slot| slot.expect("chunk descriptor was never filled"))
        .collect();

    let header = ContainerHeader {
        file_name, timestamp_ms, chunks,
        original_size: total_size,
        chunk_size: options.chunk_size,
        global_checksum: global_checksum.finish(),
    };

    match options.layout {
        Layout::HeaderFirst => {
            tracked.seek_write_to(0)?;
            options.metrics.time(Stage::HeaderWrite, header.byte_size(), || header.write(&mut tracked))?;
        },

        Layout::FooterLast => {
            let header_position = tracked.byte_position();
            options.metrics.time(Stage::HeaderWrite, header.byte_size(), || header.write(&mut tracked))?;
            header_position.write(&mut tracked)?;
        },
    }

    tracked.flush()?; // catch delayed io errors before reporting success
    Ok(())
}


/// Pure per-chunk compute, run inside a worker:
/// one positioned read, then digest, histogram, code table, and encoding.
fn compress_one_chunk(
    source: &dyn SharedSource,
    frequency: &dyn FrequencyBackend,
    metrics: &MetricsSink,
    index: u32, offset: u64, size: usize,
) -> Result<CompressedChunk>
{
    let byte_count = usize_to_u64(size);

    let mut bytes = vec![0_u8; size];
    metrics.time(Stage::FileIo, byte_count, || source.read_exact_at(offset, &mut bytes))?;

    let checksum = metrics.time(Stage::Checksum, byte_count, || checksum_of(&bytes));
    let histogram = metrics.time(Stage::FrequencyAnalysis, byte_count, || frequency.compute_histogram(&bytes));
    let table = metrics.time(Stage::TreeBuild, 0, || huffman::build_code_table(&histogram))?;
    let encoded = metrics.time(Stage::Encoding, byte_count, || codec::compress_chunk(&bytes, &table));

    Ok(CompressedChunk {
        index,
        original_offset: offset,
        original_size: usize_to_u32(size),
        checksum,
        code_lengths: encoded.code_lengths,
        bytes: encoded.bytes,
    })
}


/// A header of the final size with zeroed contents,
/// reserving the header bytes at the start of a header-first container.
fn placeholder_header(
    file_name: &str, total_size: u64, timestamp_ms: u64,
    chunk_size: u32, chunk_count: usize,
) -> ContainerHeader
{
    let empty_descriptor = ChunkDescriptor {
        index: 0,
        original_offset: 0,
        original_size: 0,
        compressed_offset: 0,
        compressed_size: 0,
        checksum: [0_u8; CHECKSUM_SIZE],
        code_lengths: [0_u16; ALPHABET_SIZE],
    };

    ContainerHeader {
        file_name: file_name.to_string(),
        original_size: total_size,
        timestamp_ms,
        chunk_size,
        global_checksum: [0_u8; CHECKSUM_SIZE],
        chunks: std::iter::repeat(empty_descriptor).take(chunk_count).collect(),
    }
}


/// Modification time of the file in milliseconds since the epoch,
/// or zero if the file system does not provide one.
fn file_timestamp_ms(path: &Path) -> u64 {
    std::fs::metadata(path).ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
