use std::io::{self, Read};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::AbortSignal;
use crate::codec::CHUNK_SIZE;
use crate::error::{PaxzError, Result};
use crate::file_index::FileIndex;
use crate::pool::{BlockBuffer, Message};
use crate::tar_source;

/// Everything the reader stage owns, handed to its thread at startup.
pub(crate) struct ReaderContext<R> {
    pub input: R,
    pub read_rx: Receiver<Message>,
    pub read_tx: Sender<Message>,
    pub encode_tx: Sender<Message>,
    pub write_tx: Sender<Message>,
    pub encoder_handles: Vec<JoinHandle<Result<()>>>,
    pub abort: AbortSignal,
    pub block_input_size: usize,
}

/// State handed from the reader to the writer once reading is done.
pub(crate) struct ReaderOutcome {
    pub file_index: FileIndex,
    pub total_read: u64,
    pub blocks: u64,
}

/// Read adapter that captures every byte pulled by the tar walk into pool
/// buffers. A buffer receives its sequence number with its first byte; full
/// buffers are handed straight to the encode queue.
struct BlockFiller<R> {
    inner: R,
    read_rx: Receiver<Message>,
    encode_tx: Sender<Message>,
    abort: AbortSignal,
    block_input_size: usize,
    current: Option<Box<BlockBuffer>>,
    next_seq: u64,
    total_read: u64,
}

impl<R: Read> BlockFiller<R> {
    fn new(
        inner: R,
        read_rx: Receiver<Message>,
        encode_tx: Sender<Message>,
        abort: AbortSignal,
        block_input_size: usize,
    ) -> Self {
        Self {
            inner,
            read_rx,
            encode_tx,
            abort,
            block_input_size,
            current: None,
            next_seq: 0,
            total_read: 0,
        }
    }

    fn total_read(&self) -> u64 {
        self.total_read
    }

    fn acquire(&mut self) -> io::Result<Box<BlockBuffer>> {
        match self.read_rx.recv() {
            Ok(Message::Block(mut block)) => {
                block.reset();
                Ok(block)
            }
            Ok(Message::Stop) | Err(_) => Err(io::Error::other("buffer pool closed")),
        }
    }

    fn dispatch(&mut self, block: Box<BlockBuffer>) -> io::Result<()> {
        self.encode_tx
            .send(Message::Block(block))
            .map_err(|_| io::Error::other("encode queue closed"))
    }

    /// Pulls any bytes left after the end-of-archive marker so the output
    /// reproduces the input byte for byte.
    fn drain(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; CHUNK_SIZE];
        loop {
            if self.read(&mut scratch)? == 0 {
                return Ok(());
            }
        }
    }

    /// Flushes the partially filled buffer and reports totals. An untouched
    /// buffer goes back to the pool instead of the encoders.
    fn finish(mut self, read_tx: &Sender<Message>) -> (u64, u64) {
        if let Some(block) = self.current.take() {
            if block.input.is_empty() {
                let _ = read_tx.send(Message::Block(block));
            } else {
                let _ = self.encode_tx.send(Message::Block(block));
            }
        }
        (self.total_read, self.next_seq)
    }
}

impl<R: Read> Read for BlockFiller<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.abort.is_set() {
            return Err(io::Error::other("pipeline aborted"));
        }

        if self.current.is_none() {
            let block = self.acquire()?;
            self.current = Some(block);
        }
        let block = self
            .current
            .as_mut()
            .expect("a buffer was just installed");

        let space = (self.block_input_size - block.input.len())
            .min(CHUNK_SIZE)
            .min(buf.len());
        let read = self.inner.read(&mut buf[..space])?;
        if read > 0 {
            if block.input.is_empty() {
                block.seq = self.next_seq;
                self.next_seq += 1;
            }
            block.input.extend_from_slice(&buf[..read]);
            self.total_read += read as u64;
        }

        if block.input.len() == self.block_input_size {
            if let Some(block) = self.current.take() {
                self.dispatch(block)?;
            }
        }

        Ok(read)
    }
}

/// Reader stage: drives the tar walk, builds the member index, then runs the
/// shutdown protocol (one stop per encoder, join them, stop the writer).
pub(crate) fn run_reader<R: Read>(ctx: ReaderContext<R>) -> Result<ReaderOutcome> {
    let ReaderContext {
        input,
        read_rx,
        read_tx,
        encode_tx,
        write_tx,
        encoder_handles,
        abort,
        block_input_size,
    } = ctx;

    let mut filler = BlockFiller::new(
        input,
        read_rx,
        encode_tx.clone(),
        abort.clone(),
        block_input_size,
    );
    let mut file_index = FileIndex::new();

    let scan_result = tar_source::scan_members(&mut filler, |offset, name| {
        file_index.add(offset, Some(name));
    })
    .and_then(|()| filler.drain().map_err(PaxzError::from));

    if scan_result.is_err() {
        abort.set();
    }

    // end-of-archive sentinel carries the total uncompressed size
    file_index.add(filler.total_read(), None);
    let (total_read, blocks) = filler.finish(&read_tx);

    for _ in 0..encoder_handles.len() {
        let _ = encode_tx.send(Message::Stop);
    }
    let mut encoder_error: Option<PaxzError> = None;
    for handle in encoder_handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                encoder_error.get_or_insert(err);
            }
            Err(_) => {
                encoder_error.get_or_insert(PaxzError::Worker("encoder thread panicked".into()));
            }
        }
    }
    let _ = write_tx.send(Message::Stop);

    // an encoder failure is the root cause when it aborted the scan mid-read
    if let Some(err) = encoder_error {
        return Err(err);
    }
    scan_result?;

    debug!(
        blocks,
        total_read,
        members = file_index.member_count(),
        "reader finished"
    );
    Ok(ReaderOutcome {
        file_index,
        total_read,
        blocks,
    })
}
