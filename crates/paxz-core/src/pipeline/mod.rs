//! Three-stage compression pipeline: one reader fills fixed-size buffers
//! from the tar stream, N encoder workers compress them into independent
//! blocks, and the writer reassembles completed blocks in sequence order
//! while maintaining the block index and the trailing member index.

mod encoder;
mod reader;
mod reorder;
mod writer;

pub use reorder::ReorderBuffer;

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::info;

use crate::codec::{FilterChain, DEFAULT_PRESET};
use crate::error::{PaxzError, Result};
use crate::pool;

/// Options controlling a compression run.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Encoder thread count. `None` uses the number of logical CPUs.
    pub workers: Option<usize>,
    /// LZMA2 preset level (0-9). Determines the block size: a block holds
    /// twice the preset's dictionary size of uncompressed input.
    pub preset: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            workers: None,
            preset: DEFAULT_PRESET,
        }
    }
}

/// Figures from a completed compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressSummary {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub data_blocks: u64,
    /// Archive members recorded in the file index, excluding the sentinel.
    pub members: usize,
    pub workers: usize,
}

/// Cooperative kill switch observed by every stage; any fatal failure trips
/// it so the other stages stop pulling work.
#[derive(Clone, Default)]
pub(crate) struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Compresses the tar archive at `input` into an indexed stream at `output`.
pub fn compress_tar_file(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
) -> Result<CompressSummary> {
    let input_file = File::open(input)
        .map_err(|err| PaxzError::Io(err).with_context(format!("cannot open {}", input.display())))?;
    let output_file = File::create(output).map_err(|err| {
        PaxzError::Io(err).with_context(format!("cannot create {}", output.display()))
    })?;
    compress_tar(input_file, BufWriter::new(output_file), options)
}

/// Compresses a tar stream pulled from `input` into `output`.
///
/// The output is a single standard stream of independently compressed
/// blocks, followed by one extra block holding the member index, the block
/// index, and the stream footer. Any failure is fatal to the whole run;
/// partial output may be left behind.
pub fn compress_tar<R, W>(input: R, output: W, options: &CompressOptions) -> Result<CompressSummary>
where
    R: Read + Send + 'static,
    W: Write,
{
    let workers = options.workers.unwrap_or_else(num_cpus::get).max(1);
    let chain = Arc::new(FilterChain::for_preset(options.preset)?);
    let block_input_size = chain.block_input_size();
    let block_output_bound = chain.block_output_bound();
    let capacity = pool::pool_size(workers);

    info!(
        workers,
        preset = options.preset,
        block_input_size,
        pool_buffers = capacity,
        "starting compression pipeline"
    );

    let (read_tx, read_rx) = unbounded();
    let (encode_tx, encode_rx) = unbounded();
    let (write_tx, write_rx) = unbounded();
    pool::seed_pool(&read_tx, capacity, block_input_size, block_output_bound);

    let abort = AbortSignal::new();

    let mut encoder_handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let encode_rx = encode_rx.clone();
        let write_tx = write_tx.clone();
        let read_tx = read_tx.clone();
        let chain = Arc::clone(&chain);
        let abort = abort.clone();
        let handle = thread::Builder::new()
            .name(format!("paxz-encode-{worker_id}"))
            .spawn(move || encoder::run_encoder(encode_rx, write_tx, read_tx, chain, abort))
            .map_err(|err| PaxzError::Io(err).with_context("spawning encoder thread"))?;
        encoder_handles.push(handle);
    }
    drop(encode_rx);

    let reader_ctx = reader::ReaderContext {
        input,
        read_rx,
        read_tx: read_tx.clone(),
        encode_tx,
        write_tx: write_tx.clone(),
        encoder_handles,
        abort: abort.clone(),
        block_input_size,
    };
    let reader_handle = thread::Builder::new()
        .name("paxz-read".into())
        .spawn(move || reader::run_reader(reader_ctx))
        .map_err(|err| PaxzError::Io(err).with_context("spawning reader thread"))?;
    drop(write_tx);

    let summary = writer::run_writer(
        output,
        write_rx,
        read_tx,
        &chain,
        capacity,
        reader_handle,
        abort,
    )?;

    let summary = CompressSummary {
        input_bytes: summary.outcome.total_read,
        output_bytes: summary.output_bytes,
        data_blocks: summary.data_blocks,
        members: summary.outcome.file_index.member_count(),
        workers,
    };
    info!(
        input_bytes = summary.input_bytes,
        output_bytes = summary.output_bytes,
        data_blocks = summary.data_blocks,
        members = summary.members,
        "compression pipeline finished"
    );
    Ok(summary)
}
