//! Safe boundary around the liblzma block codec.
//!
//! Everything the pipeline needs from the codec goes through this module:
//! filter-chain setup, one-shot and streaming block encoding, the block
//! index, stream edges, and a raw LZMA2 decoder for inspection. No unsafe
//! code exists outside of it.

mod block;
mod filters;
mod index;
mod stream;

pub use block::{encode_block, BlockStreamEncoder, EncodedBlockInfo};
pub use filters::FilterChain;
pub use index::StreamIndex;
pub use stream::{stream_footer, stream_header, RawBlockDecoder, STREAM_HEADER_SIZE};

use crate::error::{PaxzError, Result};

/// Integrity check applied to every block and declared in both stream edges.
pub(crate) const CHECK: lzma_sys::lzma_check = lzma_sys::LZMA_CHECK_CRC32;

/// Default LZMA2 preset level.
pub const DEFAULT_PRESET: u32 = 6;

/// I/O granularity for feeding the codec and writing its output.
pub const CHUNK_SIZE: usize = 4096;

fn check_ret(phase: &'static str, ret: lzma_sys::lzma_ret) -> Result<()> {
    if ret == lzma_sys::LZMA_OK {
        Ok(())
    } else {
        Err(PaxzError::codec(phase, ret as u32))
    }
}
