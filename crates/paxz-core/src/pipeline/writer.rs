use std::io::Write;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::reader::ReaderOutcome;
use super::reorder::ReorderBuffer;
use super::AbortSignal;
use crate::codec::{self, BlockStreamEncoder, FilterChain, StreamIndex, CHUNK_SIZE};
use crate::error::{PaxzError, Result};
use crate::pool::{BlockBuffer, Message};

/// Figures reported by the writer after the stream is complete.
pub(crate) struct WriterSummary {
    pub outcome: ReaderOutcome,
    pub output_bytes: u64,
    pub data_blocks: u64,
}

/// Writer stage, run on the calling thread: emits the stream header, drains
/// encoder output back into sequence order while growing the block index,
/// then writes the epilogue (file-index block, encoded index, footer).
pub(crate) fn run_writer<W: Write>(
    mut out: W,
    write_rx: Receiver<Message>,
    read_tx: Sender<Message>,
    chain: &FilterChain,
    pool_capacity: usize,
    reader_handle: JoinHandle<Result<ReaderOutcome>>,
    abort: AbortSignal,
) -> Result<WriterSummary> {
    let mut output_bytes = 0u64;
    let mut index = StreamIndex::new()?;
    let mut reorder: ReorderBuffer<Box<BlockBuffer>> = ReorderBuffer::with_limit(pool_capacity);
    let mut data_blocks = 0u64;
    let mut first_error: Option<PaxzError> = None;

    if let Err(err) = write_header(&mut out, &mut output_bytes) {
        first_error = Some(err);
        abort.set();
    }

    loop {
        match write_rx.recv() {
            Ok(Message::Block(block)) => {
                if first_error.is_some() {
                    let _ = read_tx.send(Message::Block(block));
                    continue;
                }

                let seq = block.seq;
                let ready = match reorder.push(seq, block) {
                    Ok(ready) => ready,
                    Err(err) => {
                        first_error = Some(err);
                        abort.set();
                        continue;
                    }
                };

                for block in ready {
                    if first_error.is_none() {
                        if let Err(err) =
                            write_data_block(&mut out, &mut index, &block, &mut output_bytes)
                        {
                            first_error = Some(err);
                            abort.set();
                        } else {
                            data_blocks += 1;
                        }
                    }
                    let _ = read_tx.send(Message::Block(block));
                }
            }
            Ok(Message::Stop) | Err(_) => break,
        }
    }

    // hand stranded buffers back so an aborting reader can drain the pool
    let stranded = reorder.pending_len();
    for block in reorder.drain_pending() {
        let _ = read_tx.send(Message::Block(block));
    }

    let outcome = match reader_handle.join() {
        Ok(result) => result,
        Err(_) => Err(PaxzError::Worker("reader thread panicked".into())),
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => return Err(first_error.unwrap_or(err)),
    };
    if let Some(err) = first_error {
        return Err(err);
    }
    if stranded != 0 || reorder.next_expected() != outcome.blocks {
        return Err(PaxzError::InvalidFormat(
            "block sequence incomplete at end of stream",
        ));
    }

    debug!(data_blocks, "data blocks written, starting epilogue");
    write_file_index_block(&mut out, chain, &outcome, &mut index, &mut output_bytes)?;

    index.encode_to(|bytes| {
        out.write_all(bytes)?;
        output_bytes += bytes.len() as u64;
        Ok(())
    })?;

    out.write_all(&codec::stream_footer(index.encoded_size())?)?;
    output_bytes += codec::STREAM_HEADER_SIZE as u64;
    out.flush()?;

    Ok(WriterSummary {
        outcome,
        output_bytes,
        data_blocks,
    })
}

fn write_header<W: Write>(out: &mut W, output_bytes: &mut u64) -> Result<()> {
    out.write_all(&codec::stream_header()?)?;
    *output_bytes += codec::STREAM_HEADER_SIZE as u64;
    Ok(())
}

fn write_data_block<W: Write>(
    out: &mut W,
    index: &mut StreamIndex,
    block: &BlockBuffer,
    output_bytes: &mut u64,
) -> Result<()> {
    out.write_all(&block.output)?;
    *output_bytes += block.output.len() as u64;
    index.append(block.unpadded_size, block.uncompressed_size)
}

/// Encodes the member index as one more block and appends it to the block
/// index, so seekable readers can locate and decode it like any other block.
fn write_file_index_block<W: Write>(
    out: &mut W,
    chain: &FilterChain,
    outcome: &ReaderOutcome,
    index: &mut StreamIndex,
    output_bytes: &mut u64,
) -> Result<()> {
    let mut encoder = BlockStreamEncoder::new(chain)?;
    out.write_all(encoder.header())?;
    *output_bytes += encoder.header().len() as u64;

    let payload = outcome.file_index.to_bytes();
    for chunk in payload.chunks(CHUNK_SIZE) {
        encoder.update(chunk, |bytes| {
            out.write_all(bytes)?;
            *output_bytes += bytes.len() as u64;
            Ok(())
        })?;
    }
    let info = encoder.finish(|bytes| {
        out.write_all(bytes)?;
        *output_bytes += bytes.len() as u64;
        Ok(())
    })?;

    index.append(info.unpadded_size, info.uncompressed_size)
}
