
//! The thin command line driver over the `dczf` library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use dczf::prelude::*;


#[derive(Debug, Parser)]
#[command(
    name = "dczf",
    version,
    about = "Chunked canonical Huffman compression with SHA-256 integrity checking.",
    after_help = "EXAMPLES:\n  dczf compress big.log big.log.dczf\n  dczf c big.log big.log.dczf 64\n  dczf decompress big.log.dczf restored.log\n  dczf verify big.log.dczf"
)]
struct Cli {

    #[command(subcommand)]
    command: Command,

    /// Print per-stage timing statistics after the operation.
    #[arg(short, long)]
    stats: bool,

    /// Number of chunks to process concurrently.
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {

    /// Compress a file into a container.
    #[command(alias = "c")]
    Compress {
        /// The file to compress.
        input: PathBuf,

        /// Where to write the container.
        output: PathBuf,

        /// Chunk size in whole megabytes, between 1 and 1024.
        #[arg(default_value_t = 32)]
        chunk_size_mb: u32,
    },

    /// Decompress a container back into the original file.
    #[command(alias = "d")]
    Decompress {
        /// The container to decompress.
        input: PathBuf,

        /// Where to write the original bytes.
        output: PathBuf,
    },

    /// Check all digests of a container without writing the contents anywhere.
    Verify {
        /// The container to check.
        input: PathBuf,
    },
}


fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(error) = run(cli) {
        eprintln!("dczf: {}", error);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let recorder = Arc::new(MetricsRecorder::new());

    let metrics =
        if cli.stats { MetricsSink::attached(recorder.clone()) }
        else { MetricsSink::disabled() };

    match cli.command {
        Command::Compress { input, output, chunk_size_mb } => {
            if chunk_size_mb < 1 || chunk_size_mb > 1024 {
                return Err(Error::argument("chunk size must lie between 1 and 1024 megabytes"));
            }

            let mut options = CompressOptions::default()
                .with_chunk_size(chunk_size_mb * 1024 * 1024);

            if let Some(jobs) = cli.jobs {
                options = options.with_parallel_chunks(jobs);
            }

            options.metrics = metrics;
            compress_path(&input, &output, &options)?;

            log::info!("compressed {} into {}", input.display(), output.display());
        },

        Command::Decompress { input, output } => {
            let mut options = DecompressOptions::default();

            if let Some(jobs) = cli.jobs {
                options = options.with_parallel_chunks(jobs);
            }

            options.metrics = metrics;
            decompress_path(&input, &output, &options)?;

            log::info!("decompressed {} into {}", input.display(), output.display());
        },

        Command::Verify { input } => {
            let mut options = DecompressOptions::default();

            if let Some(jobs) = cli.jobs {
                options = options.with_parallel_chunks(jobs);
            }

            options.metrics = metrics;
            let header = verify_path(&input, &options)?;

            println!(
                "ok: {} chunks, {} original bytes, all digests match",
                header.chunk_count(), header.original_size
            );
        },
    }

    if cli.stats {
        print_stats(&recorder);
    }

    Ok(())
}

fn print_stats(recorder: &MetricsRecorder) {
    eprintln!("{:<24} {:>12} {:>12} {:>16}", "stage", "seconds", "invocations", "bytes");

    for stage in Stage::ALL.iter() {
        let entry = recorder.get(*stage);
        if entry.invocations == 0 { continue; }

        eprintln!(
            "{:<24} {:>12.3} {:>12} {:>16}",
            stage.name(), entry.duration.as_secs_f64(), entry.invocations, entry.bytes
        );
    }
}
