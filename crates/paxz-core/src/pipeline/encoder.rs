use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::AbortSignal;
use crate::codec::{self, FilterChain};
use crate::error::Result;
use crate::pool::{BlockBuffer, Message};

/// Encoder worker loop: pop a filled buffer, compress it into one complete
/// block, push it to the write queue. Workers never touch the indexes and
/// never coordinate with each other; the buffer's sequence number travels
/// with it.
///
/// On a codec failure the worker trips the abort signal, recycles its
/// buffer, nudges the writer with a stop, and exits with the error; the
/// reader collects it at join time.
pub(crate) fn run_encoder(
    encode_rx: Receiver<Message>,
    write_tx: Sender<Message>,
    read_tx: Sender<Message>,
    chain: Arc<FilterChain>,
    abort: AbortSignal,
) -> Result<()> {
    loop {
        match encode_rx.recv() {
            Ok(Message::Block(mut block)) => {
                if abort.is_set() {
                    let _ = read_tx.send(Message::Block(block));
                    continue;
                }

                let BlockBuffer { input, output, .. } = &mut *block;
                match codec::encode_block(&chain, input.as_slice(), output) {
                    Ok(info) => {
                        block.unpadded_size = info.unpadded_size;
                        block.uncompressed_size = info.uncompressed_size;
                        if write_tx.send(Message::Block(block)).is_err() {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        abort.set();
                        let _ = read_tx.send(Message::Block(block));
                        let _ = write_tx.send(Message::Stop);
                        return Err(err);
                    }
                }
            }
            Ok(Message::Stop) | Err(_) => return Ok(()),
        }
    }
}
