
//! The decompression and verification orchestrator.
//!
//! Mirrors the compression pipeline: workers read their compressed blob
//! by position, decode it, and verify its digest, while the calling thread
//! appends the decoded chunks to the output in ascending index order.
//! A chunk that fails verification never reaches the output.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crate::codec;
use crate::digest::{checksum_of, Checksum, GlobalChecksum};
use crate::error::{Error, Result, UnitResult, usize_to_u32, usize_to_u64, u64_to_usize};
use crate::io::{Data, Write};
use crate::meta::{ChunkDescriptor, ContainerHeader, OpenContainer};
use crate::metrics::{MetricsSink, Stage};

use super::{DecompressOptions, Operation, ProgressReporter};
use super::source::{FileSource, MemorySource, SharedSource};


/// Decompress a container file into the original byte stream.
/// On failure, the partially written output file is removed.
pub fn decompress_path(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &DecompressOptions,
) -> UnitResult
{
    decompress_path_cancellable(input, output, options, &Operation::new(), |_progress| {})
}

/// Decompress a container file, with an operation handle for cancellation
/// and a progress callback. The callback receives a monotone non-decreasing
/// fraction, starting at `0.0` and ending at `1.0`.
pub fn decompress_path_cancellable(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &DecompressOptions,
    operation: &Operation,
    on_progress: impl FnMut(f64),
) -> UnitResult
{
    let input = input.as_ref();
    let output = output.as_ref();
    options.validate()?;

    let result = operation.run(|| {
        let (container, source) = open_file_container(input)?;
        let write = BufWriter::new(File::create(output)?);
        decompress_container(&container, source, write, options, operation, on_progress)
    });

    // an incomplete original must not be mistaken for the real file
    if result.is_err() {
        log::warn!("discarding partial output file {}", output.display());
        let _ = std::fs::remove_file(output);
    }

    result
}

/// Decompress an in-memory container into the original bytes.
pub fn decompress_bytes(container_bytes: &[u8], options: &DecompressOptions) -> Result<Vec<u8>> {
    options.validate()?;

    let container = OpenContainer::read_from(&mut Cursor::new(container_bytes))?;
    let source = Arc::new(MemorySource::new(container_bytes.to_vec()));
    let mut output = Cursor::new(Vec::new());

    let operation = Operation::new();
    operation.run(|| decompress_container(
        &container, source, &mut output,
        options, &operation, |_progress| {}
    ))?;

    Ok(output.into_inner())
}

/// Decode and digest every chunk of a container file without writing
/// the decompressed bytes anywhere. Returns the parsed header on success.
pub fn verify_path(input: impl AsRef<Path>, options: &DecompressOptions) -> Result<ContainerHeader> {
    options.validate()?;

    let (container, source) = open_file_container(input.as_ref())?;

    let operation = Operation::new();
    operation.run(|| decompress_container(
        &container, source, std::io::sink(),
        options, &operation, |_progress| {}
    ))?;

    Ok(container.header)
}


fn open_file_container(input: &Path) -> Result<(OpenContainer, Arc<dyn SharedSource>)> {
    if !input.is_file() {
        return Err(Error::argument(format!("input path `{}` is not an existing file", input.display())));
    }

    let mut file = File::open(input)?;
    let container = OpenContainer::read_from(&mut file)?;
    let source: Arc<dyn SharedSource> = Arc::new(FileSource::from_file(file)?);

    Ok((container, source))
}


/// One decoded and verified chunk, travelling from a worker to the writer.
#[derive(Debug)]
struct DecodedChunk {
    index: u32,
    checksum: Checksum,
    bytes: Vec<u8>,
}


fn decompress_container(
    container: &OpenContainer,
    source: Arc<dyn SharedSource>,
    write: impl Write,
    options: &DecompressOptions,
    operation: &Operation,
    on_progress: impl FnMut(f64),
) -> UnitResult
{
    let header = &container.header;
    let chunk_count = header.chunk_count();

    log::debug!(
        "decompressing {} chunks back into {} bytes with {} workers",
        chunk_count, header.original_size, options.parallel_chunks
    );

    let pool = threadpool::Builder::new()
        .num_threads(options.parallel_chunks)
        .thread_name("dczf chunk decompressor".to_string())
        .build();

    let window_size = options.parallel_chunks + 2;
    let (sender, receiver) = flume::bounded::<Result<DecodedChunk>>(window_size);

    let mut write = write;
    let mut pending = BTreeMap::<u32, DecodedChunk>::new();
    let mut global_checksum = GlobalChecksum::new();
    let mut progress = ProgressReporter::new(chunk_count, on_progress);

    let mut next_submit = 0_usize;
    let mut next_write = 0_usize;
    let mut in_channel = 0_usize;

    while next_write < chunk_count {
        operation.check_cancelled()?;

        while next_submit < chunk_count && next_submit - next_write < window_size {
            let descriptor = header.chunks[next_submit].clone();
            let blob_start = container.chunk_start(&descriptor);

            let source = source.clone();
            let metrics = options.metrics.clone();
            let sender = sender.clone();

            pool.execute(move || {
                let result = decompress_one_chunk(&*source, &metrics, &descriptor, blob_start);

                // the writer may already have failed and hung up; nothing to do then
                let _ = sender.send(result);
            });

            next_submit += 1;
            in_channel += 1;
        }

        let next_index = usize_to_u32(next_write);
        if let Some(chunk) = pending.remove(&next_index) {
            options.metrics.time(
                Stage::FileIo, usize_to_u64(chunk.bytes.len()),
                || u8::write_slice(&mut write, &chunk.bytes)
            )?;

            global_checksum.add_chunk(&chunk.checksum);
            next_write += 1;
            progress.chunk_written();
        }
        else {
            debug_assert!(in_channel > 0, "writer would wait with no chunk in flight");

            // propagate panics instead of waiting for a chunk that will never arrive
            assert_eq!(pool.panic_count(), 0, "a decompressor worker panicked");

            let completed = receiver.recv().expect("decompressor channel closed unexpectedly")?;
            in_channel -= 1;
            pending.insert(completed.index, completed);
        }
    }

    progress.finish();

    // the recomputed digest of all chunk digests must match the header
    let recomputed = global_checksum.finish();
    if recomputed != header.global_checksum {
        return Err(Error::corrupt("container digest does not match its chunks"));
    }

    write.flush()?;
    Ok(())
}


/// Pure per-chunk compute, run inside a worker: one positioned read,
/// then code table reconstruction, decoding, and digest verification.
fn decompress_one_chunk(
    source: &dyn SharedSource,
    metrics: &MetricsSink,
    descriptor: &ChunkDescriptor,
    blob_start: u64,
) -> Result<DecodedChunk>
{
    let compressed_size = u64_to_usize(u64::from(descriptor.compressed_size));
    let original_size = u64_to_usize(u64::from(descriptor.original_size));

    let mut compressed = vec![0_u8; compressed_size];
    metrics.time(
        Stage::FileIo, u64::from(descriptor.compressed_size),
        || source.read_exact_at(blob_start, &mut compressed)
    )?;

    let bytes = metrics.time(
        Stage::Decoding, u64::from(descriptor.original_size),
        || codec::decompress_chunk(&compressed, &descriptor.code_lengths, original_size)
    )?;

    let checksum = metrics.time(
        Stage::ChecksumVerify, u64::from(descriptor.original_size),
        || checksum_of(&bytes)
    );

    if checksum != descriptor.checksum {
        return Err(Error::corrupt(format!("chunk {} does not match its digest", descriptor.index)));
    }

    Ok(DecodedChunk { index: descriptor.index, checksum, bytes })
}
