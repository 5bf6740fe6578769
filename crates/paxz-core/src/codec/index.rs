use std::ptr;

use super::{check_ret, CHUNK_SIZE};
use crate::error::{PaxzError, Result};

/// Block index accumulated by the writer, one record per emitted block.
///
/// Append order is on-disk order; the encoded form becomes the stream's
/// index field and its size goes into the footer.
pub struct StreamIndex {
    ptr: *mut lzma_sys::lzma_index,
}

// SAFETY: the index is only ever touched by one thread at a time; ownership
// moves with the struct.
unsafe impl Send for StreamIndex {}

impl StreamIndex {
    pub fn new() -> Result<Self> {
        // SAFETY: NULL allocator selects malloc/free.
        let ptr = unsafe { lzma_sys::lzma_index_init(ptr::null()) };
        if ptr.is_null() {
            return Err(PaxzError::codec("index init", 0));
        }
        Ok(Self { ptr })
    }

    /// Records one block's sizes. Must be called in on-disk block order.
    pub fn append(&mut self, unpadded_size: u64, uncompressed_size: u64) -> Result<()> {
        // SAFETY: ptr is valid until drop.
        check_ret("index append", unsafe {
            lzma_sys::lzma_index_append(self.ptr, ptr::null(), unpadded_size, uncompressed_size)
        })
    }

    /// Size in bytes of the encoded index field, as recorded in the footer.
    pub fn encoded_size(&self) -> u64 {
        // SAFETY: ptr is valid until drop.
        unsafe { lzma_sys::lzma_index_size(self.ptr) }
    }

    /// Streams the encoded index field to `sink`.
    pub fn encode_to<F>(&self, mut sink: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        // SAFETY: a zeroed lzma_stream is the documented initializer.
        let mut strm: lzma_sys::lzma_stream = unsafe { std::mem::zeroed() };
        // SAFETY: the index outlives the encoder loop below.
        check_ret("index encoder", unsafe {
            lzma_sys::lzma_index_encoder(&mut strm, self.ptr)
        })?;

        let mut obuf = [0u8; CHUNK_SIZE];
        let result = loop {
            strm.next_out = obuf.as_mut_ptr();
            strm.avail_out = obuf.len();
            // SAFETY: next_out covers exactly avail_out bytes.
            let ret = unsafe { lzma_sys::lzma_code(&mut strm, lzma_sys::LZMA_RUN) };
            if ret != lzma_sys::LZMA_OK && ret != lzma_sys::LZMA_STREAM_END {
                break Err(PaxzError::codec("index encode", ret as u32));
            }

            let produced = obuf.len() - strm.avail_out;
            if produced > 0 {
                if let Err(err) = sink(&obuf[..produced]) {
                    break Err(err);
                }
            }

            if ret == lzma_sys::LZMA_STREAM_END {
                break Ok(());
            }
        };

        // SAFETY: strm was initialized by lzma_index_encoder.
        unsafe { lzma_sys::lzma_end(&mut strm) };
        result
    }
}

impl Drop for StreamIndex {
    fn drop(&mut self) {
        // SAFETY: ptr came from lzma_index_init and is dropped exactly once.
        unsafe { lzma_sys::lzma_index_end(self.ptr, ptr::null()) };
    }
}
