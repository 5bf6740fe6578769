use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use paxz_core::{
    compress_tar_file, read_block_records, read_file_index, CompressOptions, DEFAULT_PRESET,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "paxz",
    version,
    about = "Parallel, seekably-indexed xz compression for tar archives"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a tar archive into an indexed .xz stream.
    Compress {
        /// Source tar archive.
        input: PathBuf,

        /// Destination .xz file.
        output: PathBuf,

        /// Number of encoder threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        workers: usize,

        /// LZMA2 preset level (0-9).
        #[arg(long, default_value_t = DEFAULT_PRESET)]
        preset: u32,
    },
    /// List the blocks of an indexed .xz stream.
    List {
        /// Also dump the embedded member index.
        #[arg(short = 't')]
        tar_index: bool,

        /// Stream to inspect (defaults to standard input).
        file: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compress {
            input,
            output,
            workers,
            preset,
        } => compress_command(input, output, workers, preset),
        Commands::List { tar_index, file } => list_command(tar_index, file),
    }
}

fn compress_command(
    input: PathBuf,
    output: PathBuf,
    workers: usize,
    preset: u32,
) -> anyhow::Result<()> {
    anyhow::ensure!(preset <= 9, "preset must be between 0 and 9");

    let options = CompressOptions {
        workers: Some(workers.max(1)),
        preset,
    };
    let summary = compress_tar_file(&input, &output, &options)?;

    eprintln!(
        "{}: {} members, {} blocks, {} -> {} bytes ({} workers)",
        output.display(),
        summary.members,
        summary.data_blocks,
        summary.input_bytes,
        summary.output_bytes,
        summary.workers,
    );
    Ok(())
}

fn list_command(tar_index: bool, file: Option<PathBuf>) -> anyhow::Result<()> {
    let (mut reader, label): (Box<dyn ReadSeek>, String) = match &file {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            (Box::new(file), path.display().to_string())
        }
        None => {
            // the index lives at the end of the stream, so a pipe has to be
            // buffered before it can be walked
            let mut buffered = Vec::new();
            io::stdin()
                .read_to_end(&mut buffered)
                .context("cannot read standard input")?;
            (Box::new(io::Cursor::new(buffered)), "stdin".to_string())
        }
    };

    let records = read_block_records(&mut reader)
        .with_context(|| format!("cannot read block index of {label}"))?;
    for record in &records {
        println!(
            "{:9} / {:9}",
            record.unpadded_size, record.uncompressed_size
        );
    }

    if tar_index {
        match read_file_index(&mut reader)? {
            Some(entries) => {
                println!();
                for entry in entries {
                    println!("{:10} {}", entry.offset, entry.name.as_deref().unwrap_or(""));
                }
            }
            None => eprintln!("{label}: no member index present"),
        }
    }

    Ok(())
}

trait ReadSeek: io::Read + io::Seek {}

impl<T: io::Read + io::Seek> ReadSeek for T {}
