
//! Optional per-stage timings for display in an external dashboard.
//! Recording is a no-op unless a recorder is attached to the options.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};


/// A pipeline stage whose work is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Counting symbol occurrences per chunk.
    FrequencyAnalysis,

    /// Building the Huffman tree and assigning canonical codes.
    TreeBuild,

    /// Emitting the compressed bitstream.
    Encoding,

    /// Hashing chunk contents during compression.
    Checksum,

    /// Reading input and writing output bytes.
    FileIo,

    /// Serializing the container header.
    HeaderWrite,

    /// Rebuilding code tables and decoding bitstreams.
    Decoding,

    /// Hashing and comparing digests during decompression.
    ChecksumVerify,
}

impl Stage {

    /// All stages, in display order.
    pub const ALL: [Stage; 8] = [
        Stage::FrequencyAnalysis, Stage::TreeBuild, Stage::Encoding, Stage::Checksum,
        Stage::FileIo, Stage::HeaderWrite, Stage::Decoding, Stage::ChecksumVerify,
    ];

    /// A short human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::FrequencyAnalysis => "frequency analysis",
            Stage::TreeBuild => "tree build",
            Stage::Encoding => "encoding",
            Stage::Checksum => "checksum",
            Stage::FileIo => "file io",
            Stage::HeaderWrite => "header write",
            Stage::Decoding => "decoding",
            Stage::ChecksumVerify => "checksum verification",
        }
    }

    fn table_index(self) -> usize {
        match self {
            Stage::FrequencyAnalysis => 0,
            Stage::TreeBuild => 1,
            Stage::Encoding => 2,
            Stage::Checksum => 3,
            Stage::FileIo => 4,
            Stage::HeaderWrite => 5,
            Stage::Decoding => 6,
            Stage::ChecksumVerify => 7,
        }
    }
}


/// Accumulated measurements of one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMetrics {

    /// Total time spent in this stage across all threads.
    pub duration: Duration,

    /// How often this stage ran.
    pub invocations: u64,

    /// Number of bytes this stage processed.
    pub bytes: u64,
}


/// Thread-safe accumulator for all stages of one operation.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    stages: Mutex<[StageMetrics; 8]>,
}

impl MetricsRecorder {

    /// A recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one finished invocation of the stage.
    pub fn record(&self, stage: Stage, duration: Duration, bytes: u64) {
        let mut stages = self.stages.lock().expect("metrics mutex poisoned");
        let entry = &mut stages[stage.table_index()];

        entry.duration += duration;
        entry.invocations += 1;
        entry.bytes += bytes;
    }

    /// The accumulated measurements of one stage.
    pub fn get(&self, stage: Stage) -> StageMetrics {
        self.stages.lock().expect("metrics mutex poisoned")[stage.table_index()]
    }

    /// A copy of all accumulated measurements, in [`Stage::ALL`] order.
    pub fn snapshot(&self) -> [StageMetrics; 8] {
        *self.stages.lock().expect("metrics mutex poisoned")
    }
}


/// Either records into a shared recorder, or does nothing at all.
/// Cloned into every worker of an operation.
#[derive(Debug, Clone, Default)]
pub struct MetricsSink {
    recorder: Option<Arc<MetricsRecorder>>,
}

impl MetricsSink {

    /// A sink that discards all measurements without any overhead.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A sink that feeds the specified recorder.
    pub fn attached(recorder: Arc<MetricsRecorder>) -> Self {
        MetricsSink { recorder: Some(recorder) }
    }

    /// Run the operation, measuring it if a recorder is attached.
    pub fn time<T>(&self, stage: Stage, bytes: u64, operation: impl FnOnce() -> T) -> T {
        match &self.recorder {
            None => operation(),

            Some(recorder) => {
                let start = Instant::now();
                let value = operation();
                recorder.record(stage, start.elapsed(), bytes);
                value
            },
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attached_sink_accumulates(){
        let recorder = Arc::new(MetricsRecorder::new());
        let sink = MetricsSink::attached(recorder.clone());

        sink.time(Stage::Encoding, 100, || ());
        sink.time(Stage::Encoding, 50, || ());
        sink.time(Stage::Checksum, 10, || ());

        let encoding = recorder.get(Stage::Encoding);
        assert_eq!(encoding.invocations, 2);
        assert_eq!(encoding.bytes, 150);

        assert_eq!(recorder.get(Stage::Checksum).invocations, 1);
        assert_eq!(recorder.get(Stage::Decoding), StageMetrics::default());
    }

    #[test]
    fn disabled_sink_still_runs_the_operation(){
        let sink = MetricsSink::disabled();
        let value = sink.time(Stage::TreeBuild, 0, || 42);
        assert_eq!(value, 42);
    }
}
