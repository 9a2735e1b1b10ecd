
//! The streaming pipeline: chunked parallel compression and decompression
//! with strictly ordered output.
//!
//! Workers only ever do per-chunk compute. The thread calling into the
//! pipeline acts as the writer, draining completed chunks in ascending
//! index order. All services are explicit values; there is no global state.

pub mod source;
pub mod compress;
pub mod decompress;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{Error, UnitResult};
use crate::frequency::{CpuFrequency, FrequencyBackend};
use crate::meta::{Layout, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::metrics::MetricsSink;


/// The chunk size used when the caller does not specify one: 32 MiB.
pub const DEFAULT_CHUNK_SIZE: u32 = 32 * 1024 * 1024;

/// Upper bound for the worker pool size.
pub const MAX_PARALLEL_CHUNKS: usize = 64;


/// How many workers to use when the caller does not specify:
/// the available hardware parallelism, clamped to a sensible range.
pub fn default_parallel_chunks() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get()).unwrap_or(1)
        .clamp(1, 8)
}


/// The phases an operation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started yet.
    Idle,

    /// Currently compressing or decompressing.
    Running,

    /// Finished, and the output is complete.
    Succeeded,

    /// Aborted because of an error. Partial output was discarded.
    Failed,

    /// Aborted because the caller requested cancellation.
    Cancelled,
}


/// Shared handle onto one running operation.
/// Lets another thread observe the state machine and request cancellation.
#[derive(Debug)]
pub struct Operation {
    state: Mutex<RunState>,
    cancel_requested: AtomicBool,
}

impl Default for Operation {
    fn default() -> Self { Self::new() }
}

impl Operation {

    /// A fresh handle in the idle state.
    pub fn new() -> Self {
        Operation {
            state: Mutex::new(RunState::Idle),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// A fresh shared handle in the idle state.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Ask the operation to stop. Cancellation is cooperative:
    /// it is checked between chunks, so in-flight chunks still finish,
    /// but their results are discarded.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    /// Whether [`Operation::cancel`] has been called.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }

    /// The current phase of the operation.
    pub fn state(&self) -> RunState {
        *self.state.lock().expect("operation mutex poisoned")
    }

    pub(crate) fn transition_to(&self, state: RunState) {
        *self.state.lock().expect("operation mutex poisoned") = state;
    }

    pub(crate) fn check_cancelled(&self) -> UnitResult {
        if self.is_cancel_requested() { Err(Error::Cancelled) }
        else { Ok(()) }
    }

    /// Mark the operation as running, invoke it,
    /// and record the final state according to the outcome.
    pub(crate) fn run(&self, operation: impl FnOnce() -> UnitResult) -> UnitResult {
        self.transition_to(RunState::Running);
        let result = operation();

        self.transition_to(match &result {
            Ok(()) => RunState::Succeeded,
            Err(Error::Cancelled) => RunState::Cancelled,
            Err(_) => RunState::Failed,
        });

        result
    }
}


/// All parameters of a compression run. A plain record, passed by value.
#[derive(Debug, Clone)]
pub struct CompressOptions {

    /// Number of original bytes per chunk.
    /// Must lie between 1 MiB and 1024 MiB.
    pub chunk_size: u32,

    /// Number of worker threads, which bounds both concurrency and
    /// the number of chunks resident in memory at any moment.
    pub parallel_chunks: usize,

    /// Where to place the header within the container file.
    pub layout: Layout,

    /// The histogram implementation to use.
    pub frequency: Arc<dyn FrequencyBackend>,

    /// Optional per-stage timing collection.
    pub metrics: MetricsSink,
}

impl Default for CompressOptions {
    fn default() -> Self {
        CompressOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_chunks: default_parallel_chunks(),
            layout: Layout::FooterLast,
            frequency: Arc::new(CpuFrequency),
            metrics: MetricsSink::disabled(),
        }
    }
}

impl CompressOptions {

    /// Replace the chunk size.
    pub fn with_chunk_size(self, chunk_size: u32) -> Self {
        Self { chunk_size, ..self }
    }

    /// Replace the worker count.
    pub fn with_parallel_chunks(self, parallel_chunks: usize) -> Self {
        Self { parallel_chunks, ..self }
    }

    /// Replace the container layout.
    pub fn with_layout(self, layout: Layout) -> Self {
        Self { layout, ..self }
    }

    /// Check the options before starting any work.
    pub fn validate(&self) -> UnitResult {
        if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::argument("chunk size must lie between 1 MiB and 1024 MiB"));
        }

        if self.parallel_chunks == 0 || self.parallel_chunks > MAX_PARALLEL_CHUNKS {
            return Err(Error::argument("worker count must lie between 1 and 64"));
        }

        Ok(())
    }
}


/// All parameters of a decompression or verification run.
#[derive(Debug, Clone)]
pub struct DecompressOptions {

    /// Number of worker threads, which bounds both concurrency and
    /// the number of chunks resident in memory at any moment.
    pub parallel_chunks: usize,

    /// Optional per-stage timing collection.
    pub metrics: MetricsSink,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        DecompressOptions {
            parallel_chunks: default_parallel_chunks(),
            metrics: MetricsSink::disabled(),
        }
    }
}

impl DecompressOptions {

    /// Replace the worker count.
    pub fn with_parallel_chunks(self, parallel_chunks: usize) -> Self {
        Self { parallel_chunks, ..self }
    }

    /// Check the options before starting any work.
    pub fn validate(&self) -> UnitResult {
        if self.parallel_chunks == 0 || self.parallel_chunks > MAX_PARALLEL_CHUNKS {
            return Err(Error::argument("worker count must lie between 1 and 64"));
        }

        Ok(())
    }
}


/// Report a fraction in `[0, 1]` after each chunk has been written.
/// The reported values never decrease: the first call passes `0.0`
/// and the last call passes exactly `1.0`.
pub(crate) struct ProgressReporter<F> {
    on_progress: F,
    written_chunks: usize,
    total_chunks: usize,
}

impl<F: FnMut(f64)> ProgressReporter<F> {

    pub fn new(total_chunks: usize, mut on_progress: F) -> Self {
        on_progress(0.0);
        ProgressReporter { on_progress, written_chunks: 0, total_chunks }
    }

    pub fn chunk_written(&mut self) {
        self.written_chunks += 1;
        let on_progress = &mut self.on_progress;

        // float division might not reach exactly 1.0, so the last chunk is special
        on_progress({
            if self.written_chunks >= self.total_chunks { 1.0 }
            else { self.written_chunks as f64 / self.total_chunks as f64 }
        });
    }

    pub fn finish(mut self) {
        if self.total_chunks == 0 {
            (self.on_progress)(1.0);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancellation_is_sticky(){
        let operation = Operation::new();
        assert!(!operation.is_cancel_requested());
        assert!(operation.check_cancelled().is_ok());

        operation.cancel();
        assert!(operation.is_cancel_requested());
        assert!(matches!(operation.check_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn state_machine_reflects_the_outcome(){
        let operation = Operation::new();
        assert_eq!(operation.state(), RunState::Idle);

        operation.run(|| Ok(())).unwrap();
        assert_eq!(operation.state(), RunState::Succeeded);

        let operation = Operation::new();
        let _ = operation.run(|| Err(Error::Cancelled));
        assert_eq!(operation.state(), RunState::Cancelled);

        let operation = Operation::new();
        let _ = operation.run(|| Err(Error::argument("nope")));
        assert_eq!(operation.state(), RunState::Failed);
    }

    #[test]
    fn out_of_range_options_are_rejected(){
        let options = CompressOptions::default().with_chunk_size(1024);
        assert!(options.validate().is_err());

        let options = CompressOptions::default().with_parallel_chunks(0);
        assert!(options.validate().is_err());

        assert!(CompressOptions::default().validate().is_ok());
    }

    #[test]
    fn progress_is_monotone_and_complete(){
        let mut reported = Vec::new();
        {
            let mut progress = ProgressReporter::new(3, |fraction| reported.push(fraction));
            progress.chunk_written();
            progress.chunk_written();
            progress.chunk_written();
            progress.finish();
        }

        assert_eq!(reported.first(), Some(&0.0));
        assert_eq!(reported.last(), Some(&1.0));
        assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn empty_operations_still_report_completion(){
        let mut reported = Vec::new();
        ProgressReporter::new(0, |fraction| reported.push(fraction)).finish();
        assert_eq!(reported, vec![0.0, 1.0]);
    }
}
