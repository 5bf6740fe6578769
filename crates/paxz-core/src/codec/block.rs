use std::marker::PhantomData;
use std::ptr;

use super::{check_ret, FilterChain, CHECK, CHUNK_SIZE};
use crate::error::{PaxzError, Result};

/// Sizes recorded in the block index for one encoded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedBlockInfo {
    /// Header + compressed payload + check, without trailing padding.
    pub unpadded_size: u64,
    /// Bytes of input the block encodes.
    pub uncompressed_size: u64,
}

fn new_block(chain: &FilterChain) -> Result<lzma_sys::lzma_block> {
    // SAFETY: lzma_block is a plain C struct; every field the encoder reads
    // is set below or filled in by lzma_block_header_size.
    let mut block: lzma_sys::lzma_block = unsafe { std::mem::zeroed() };
    block.version = 0;
    block.check = CHECK;
    block.filters = chain.as_ptr() as *mut lzma_sys::lzma_filter;
    block.compressed_size = lzma_sys::LZMA_VLI_UNKNOWN;
    block.uncompressed_size = lzma_sys::LZMA_VLI_UNKNOWN;
    // SAFETY: block is fully initialized for header size computation.
    check_ret("block header size", unsafe {
        lzma_sys::lzma_block_header_size(&mut block)
    })?;
    Ok(block)
}

/// One-shot encode of `input` into `output` as a complete block: header,
/// compressed payload, padding, and integrity check.
///
/// `output` is overwritten; its capacity is grown to the codec's worst-case
/// bound for the chain's block size before encoding.
pub fn encode_block(
    chain: &FilterChain,
    input: &[u8],
    output: &mut Vec<u8>,
) -> Result<EncodedBlockInfo> {
    let mut block = new_block(chain)?;
    let bound = chain.block_output_bound();
    output.clear();
    output.reserve(bound);

    let mut out_pos: usize = 0;
    // SAFETY: the encoder writes at most `bound` bytes from the start of the
    // vec's allocation; `out_pos` reports how many were written and the
    // length is set to exactly that.
    unsafe {
        check_ret(
            "block encode",
            lzma_sys::lzma_block_buffer_encode(
                &mut block,
                ptr::null(),
                input.as_ptr(),
                input.len(),
                output.as_mut_ptr(),
                &mut out_pos,
                bound,
            ),
        )?;
        output.set_len(out_pos);
    }

    Ok(EncodedBlockInfo {
        // SAFETY: block sizes were filled in by the encoder above.
        unpadded_size: unsafe { lzma_sys::lzma_block_unpadded_size(&block) },
        uncompressed_size: block.uncompressed_size,
    })
}

/// Stateful block encoder fed in chunks, used for blocks whose payload is
/// produced incrementally rather than held in one input region.
///
/// The encoded block header is available up front via [`header`]; payload,
/// padding and check bytes are handed to the sink passed to [`update`] and
/// [`finish`].
///
/// [`header`]: BlockStreamEncoder::header
/// [`update`]: BlockStreamEncoder::update
/// [`finish`]: BlockStreamEncoder::finish
pub struct BlockStreamEncoder<'a> {
    strm: lzma_sys::lzma_stream,
    block: Box<lzma_sys::lzma_block>,
    header: Vec<u8>,
    chain: PhantomData<&'a FilterChain>,
}

impl<'a> BlockStreamEncoder<'a> {
    pub fn new(chain: &'a FilterChain) -> Result<Self> {
        let mut block = Box::new(new_block(chain)?);

        let mut header = vec![0u8; block.header_size as usize];
        // SAFETY: header has exactly block.header_size bytes.
        check_ret("block header encode", unsafe {
            lzma_sys::lzma_block_header_encode(&*block, header.as_mut_ptr())
        })?;

        // SAFETY: a zeroed lzma_stream is the documented initializer.
        let mut strm: lzma_sys::lzma_stream = unsafe { std::mem::zeroed() };
        // SAFETY: block is boxed so its address stays stable for the life of
        // the encoder, which holds on to it.
        check_ret("block encoder", unsafe {
            lzma_sys::lzma_block_encoder(&mut strm, &mut *block)
        })?;

        Ok(Self {
            strm,
            block,
            header,
            chain: PhantomData,
        })
    }

    /// The encoded block header, to be written before any payload output.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Compresses `input`, passing produced bytes to `sink`.
    pub fn update<F>(&mut self, input: &[u8], sink: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.code(input, lzma_sys::LZMA_RUN, sink)
    }

    /// Flushes the encoder and returns the sizes to record in the index.
    pub fn finish<F>(mut self, sink: F) -> Result<EncodedBlockInfo>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.code(&[], lzma_sys::LZMA_FINISH, sink)?;
        Ok(EncodedBlockInfo {
            // SAFETY: the encoder filled in the block sizes at stream end.
            unpadded_size: unsafe { lzma_sys::lzma_block_unpadded_size(&*self.block) },
            uncompressed_size: self.block.uncompressed_size,
        })
    }

    fn code<F>(&mut self, input: &[u8], action: lzma_sys::lzma_action, mut sink: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut obuf = [0u8; CHUNK_SIZE];
        self.strm.next_in = input.as_ptr();
        self.strm.avail_in = input.len();

        loop {
            self.strm.next_out = obuf.as_mut_ptr();
            self.strm.avail_out = obuf.len();
            // SAFETY: in/out pointers cover exactly avail_in/avail_out bytes.
            let ret = unsafe { lzma_sys::lzma_code(&mut self.strm, action) };
            if ret != lzma_sys::LZMA_OK && ret != lzma_sys::LZMA_STREAM_END {
                return Err(PaxzError::codec("block stream encode", ret as u32));
            }

            let produced = obuf.len() - self.strm.avail_out;
            if produced > 0 {
                sink(&obuf[..produced])?;
            }

            if ret == lzma_sys::LZMA_STREAM_END {
                break;
            }
            if action == lzma_sys::LZMA_RUN && self.strm.avail_in == 0 {
                break;
            }
        }

        self.strm.next_in = ptr::null();
        Ok(())
    }
}

impl Drop for BlockStreamEncoder<'_> {
    fn drop(&mut self) {
        // SAFETY: strm was initialized by lzma_block_encoder.
        unsafe { lzma_sys::lzma_end(&mut self.strm) };
    }
}
