use std::marker::PhantomData;
use std::ptr;

use super::{check_ret, FilterChain, CHECK, CHUNK_SIZE};
use crate::error::{PaxzError, Result};

/// On-disk size of the stream header and of the stream footer.
pub const STREAM_HEADER_SIZE: usize = 12;

fn stream_flags(backward_size: u64) -> lzma_sys::lzma_stream_flags {
    // SAFETY: lzma_stream_flags is a plain C struct; the fields the edge
    // encoders read are set explicitly.
    let mut flags: lzma_sys::lzma_stream_flags = unsafe { std::mem::zeroed() };
    flags.version = 0;
    flags.check = CHECK;
    flags.backward_size = backward_size;
    flags
}

/// Encodes the stream header: magic, check kind, header CRC.
pub fn stream_header() -> Result<[u8; STREAM_HEADER_SIZE]> {
    let flags = stream_flags(lzma_sys::LZMA_VLI_UNKNOWN);
    let mut buf = [0u8; STREAM_HEADER_SIZE];
    // SAFETY: buf has the fixed stream edge size.
    check_ret("stream header encode", unsafe {
        lzma_sys::lzma_stream_header_encode(&flags, buf.as_mut_ptr())
    })?;
    Ok(buf)
}

/// Encodes the stream footer for an index field of `backward_size` bytes.
pub fn stream_footer(backward_size: u64) -> Result<[u8; STREAM_HEADER_SIZE]> {
    let flags = stream_flags(backward_size);
    let mut buf = [0u8; STREAM_HEADER_SIZE];
    // SAFETY: buf has the fixed stream edge size.
    check_ret("stream footer encode", unsafe {
        lzma_sys::lzma_stream_footer_encode(&flags, buf.as_mut_ptr())
    })?;
    Ok(buf)
}

/// Decoder for a single block's compressed payload, configured with the
/// stream's shared filter chain rather than per-block header metadata.
pub struct RawBlockDecoder<'a> {
    strm: lzma_sys::lzma_stream,
    chain: PhantomData<&'a FilterChain>,
}

impl<'a> RawBlockDecoder<'a> {
    pub fn new(chain: &'a FilterChain) -> Result<Self> {
        // SAFETY: a zeroed lzma_stream is the documented initializer.
        let mut strm: lzma_sys::lzma_stream = unsafe { std::mem::zeroed() };
        // SAFETY: the chain outlives self via the lifetime parameter.
        check_ret("raw decoder", unsafe {
            lzma_sys::lzma_raw_decoder(&mut strm, chain.as_ptr())
        })?;
        Ok(Self {
            strm,
            chain: PhantomData,
        })
    }

    /// Decodes a complete compressed payload into a vector.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut obuf = [0u8; CHUNK_SIZE];
        self.strm.next_in = payload.as_ptr();
        self.strm.avail_in = payload.len();

        loop {
            self.strm.next_out = obuf.as_mut_ptr();
            self.strm.avail_out = obuf.len();
            // SAFETY: in/out pointers cover exactly avail_in/avail_out bytes.
            let ret = unsafe { lzma_sys::lzma_code(&mut self.strm, lzma_sys::LZMA_FINISH) };
            if ret != lzma_sys::LZMA_OK && ret != lzma_sys::LZMA_STREAM_END {
                return Err(PaxzError::codec("raw decode", ret as u32));
            }

            let produced = obuf.len() - self.strm.avail_out;
            out.extend_from_slice(&obuf[..produced]);

            if ret == lzma_sys::LZMA_STREAM_END {
                break;
            }
            if self.strm.avail_in == 0 && produced == 0 {
                return Err(PaxzError::InvalidFormat("truncated block payload"));
            }
        }

        self.strm.next_in = ptr::null();
        Ok(out)
    }
}

impl Drop for RawBlockDecoder<'_> {
    fn drop(&mut self) {
        // SAFETY: strm was initialized by lzma_raw_decoder.
        unsafe { lzma_sys::lzma_end(&mut self.strm) };
    }
}
