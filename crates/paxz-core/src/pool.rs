use crossbeam_channel::Sender;

/// Unit of work shuttled between the pipeline stages.
///
/// Each buffer has exactly one owner at any instant; ownership moves with
/// the queue message carrying it. The input region holds uncompressed tar
/// bytes, the output region the complete encoded block.
#[derive(Debug)]
pub struct BlockBuffer {
    /// Dense 0-based ordinal assigned by the reader, used to restore order.
    pub seq: u64,
    pub input: Vec<u8>,
    pub output: Vec<u8>,
    /// Filled in by the encoder, consumed by the block index.
    pub unpadded_size: u64,
    pub uncompressed_size: u64,
}

impl BlockBuffer {
    pub fn with_capacity(input_capacity: usize, output_capacity: usize) -> Self {
        Self {
            seq: 0,
            input: Vec::with_capacity(input_capacity),
            output: Vec::with_capacity(output_capacity),
            unpadded_size: 0,
            uncompressed_size: 0,
        }
    }

    /// Prepares a recycled buffer for a new fill. Capacity is retained.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.input.clear();
        self.output.clear();
        self.unpadded_size = 0;
        self.uncompressed_size = 0;
    }
}

/// Message passed through the stage queues.
#[derive(Debug)]
pub enum Message {
    Block(Box<BlockBuffer>),
    /// One-way shutdown signal; carries no payload.
    Stop,
}

/// Pool cardinality for `workers` encoders: two buffers per encoder (one in
/// flight, one queued) plus slack for the reader, the writer, and the
/// reorder stash.
pub fn pool_size(workers: usize) -> usize {
    workers * 2 + 4
}

/// Pre-allocates the buffer pool into the read queue.
pub fn seed_pool(
    read_tx: &Sender<Message>,
    count: usize,
    input_capacity: usize,
    output_capacity: usize,
) {
    for _ in 0..count {
        let buffer = Box::new(BlockBuffer::with_capacity(input_capacity, output_capacity));
        read_tx
            .send(Message::Block(buffer))
            .expect("read queue receiver alive during pool seeding");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn pool_size_covers_stages() {
        assert_eq!(pool_size(1), 6);
        assert_eq!(pool_size(4), 12);
    }

    #[test]
    fn seeded_buffers_have_requested_capacity() {
        let (tx, rx) = unbounded();
        seed_pool(&tx, 3, 64, 128);
        drop(tx);

        let mut seen = 0;
        while let Ok(Message::Block(buffer)) = rx.recv() {
            assert!(buffer.input.capacity() >= 64);
            assert!(buffer.output.capacity() >= 128);
            assert!(buffer.input.is_empty());
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn reset_clears_state_but_keeps_capacity() {
        let mut buffer = BlockBuffer::with_capacity(16, 16);
        buffer.input.extend_from_slice(b"payload");
        buffer.unpadded_size = 9;
        buffer.uncompressed_size = 7;

        buffer.reset();
        assert_eq!(buffer.seq, 0);
        assert!(buffer.input.is_empty());
        assert_eq!(buffer.unpadded_size, 0);
        assert!(buffer.input.capacity() >= 16);
    }
}
