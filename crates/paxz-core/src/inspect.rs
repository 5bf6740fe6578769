//! Read-back support for produced streams: stream edge validation, block
//! index parsing, and extraction of the trailing member index block.
//!
//! The index and edges are parsed directly (they are small, checksummed
//! structures); only the member index block's LZMA2 payload goes through
//! the codec.

use std::io::{Read, Seek, SeekFrom};

use crate::codec::{FilterChain, RawBlockDecoder, DEFAULT_PRESET, STREAM_HEADER_SIZE};
use crate::error::{PaxzError, Result};
use crate::file_index::{parse_file_index, FileIndexEntry};

const HEADER_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
const FOOTER_MAGIC: [u8; 2] = [b'Y', b'Z'];

/// One record from the stream's block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Header + compressed payload + check, without trailing padding.
    pub unpadded_size: u64,
    /// Bytes of input the block encodes.
    pub uncompressed_size: u64,
}

impl BlockRecord {
    /// On-disk footprint of the block: unpadded size rounded up to four.
    pub fn padded_size(&self) -> u64 {
        (self.unpadded_size + 3) & !3
    }
}

/// Validates both stream edges and returns the decoded block index records
/// in on-disk order.
pub fn read_block_records<R: Read + Seek>(reader: &mut R) -> Result<Vec<BlockRecord>> {
    verify_stream_header(reader)?;
    let backward_size = read_footer(reader)?;

    let index_start = -(STREAM_HEADER_SIZE as i64 + backward_size as i64);
    reader.seek(SeekFrom::End(index_start))?;
    let mut index_bytes = vec![0u8; backward_size as usize];
    reader.read_exact(&mut index_bytes)?;

    parse_index_records(&index_bytes)
}

/// Extracts and parses the member index from the stream's final block.
///
/// Returns `Ok(None)` for streams whose last block is not a member index
/// (for example output of a plain compressor).
pub fn read_file_index<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<FileIndexEntry>>> {
    let check_size = verify_stream_header(reader)?;
    let records = read_block_records(reader)?;
    let Some(last) = records.last() else {
        return Ok(None);
    };

    let block_offset: u64 = STREAM_HEADER_SIZE as u64
        + records[..records.len() - 1]
            .iter()
            .map(BlockRecord::padded_size)
            .sum::<u64>();

    reader.seek(SeekFrom::Start(block_offset))?;
    let mut size_byte = [0u8; 1];
    reader.read_exact(&mut size_byte)?;
    if size_byte[0] == 0 {
        return Err(PaxzError::InvalidFormat("index field where block expected"));
    }
    let header_size = (size_byte[0] as u64 + 1) * 4;
    if last.unpadded_size < header_size + check_size {
        return Ok(None);
    }

    let payload_len = last.unpadded_size - header_size - check_size;
    reader.seek(SeekFrom::Start(block_offset + header_size))?;
    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload)?;

    let chain = FilterChain::for_preset(DEFAULT_PRESET)?;
    let mut decoder = RawBlockDecoder::new(&chain)?;
    let entries = match decoder.decode(&payload).and_then(|raw| parse_file_index(&raw)) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    Ok(Some(entries))
}

/// Validates the stream header and returns the on-disk size of the per-block
/// integrity check its flags declare.
fn verify_stream_header<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    reader.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; STREAM_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    if header[..6] != HEADER_MAGIC {
        return Err(PaxzError::InvalidFormat("bad stream header magic"));
    }
    if header[6] != 0 {
        return Err(PaxzError::InvalidFormat("bad stream flags"));
    }

    let stored = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    let actual = crc32fast::hash(&header[6..8]);
    if stored != actual {
        return Err(PaxzError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }
    check_size(header[7])
}

/// Check field sizes by check id, in groups of three.
fn check_size(check_id: u8) -> Result<u64> {
    match check_id {
        0 => Ok(0),
        1..=3 => Ok(4),
        4..=6 => Ok(8),
        7..=9 => Ok(16),
        10..=12 => Ok(32),
        13..=15 => Ok(64),
        _ => Err(PaxzError::InvalidFormat("bad check id in stream flags")),
    }
}

/// Validates the stream footer and returns the size in bytes of the encoded
/// index field it points back at.
fn read_footer<R: Read + Seek>(reader: &mut R) -> Result<u64> {
    reader.seek(SeekFrom::End(-(STREAM_HEADER_SIZE as i64)))?;
    let mut footer = [0u8; STREAM_HEADER_SIZE];
    reader.read_exact(&mut footer)?;
    parse_footer(&footer)
}

fn parse_footer(footer: &[u8; STREAM_HEADER_SIZE]) -> Result<u64> {
    if footer[10..12] != FOOTER_MAGIC {
        return Err(PaxzError::InvalidFormat("bad stream footer magic"));
    }
    if footer[8] != 0 {
        return Err(PaxzError::InvalidFormat("bad stream flags"));
    }

    let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let actual = crc32fast::hash(&footer[4..10]);
    if stored != actual {
        return Err(PaxzError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }

    let stored_backward = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
    Ok((stored_backward as u64 + 1) * 4)
}

fn parse_index_records(index: &[u8]) -> Result<Vec<BlockRecord>> {
    if index.first() != Some(&0) {
        return Err(PaxzError::InvalidFormat("bad index indicator"));
    }
    let mut pos = 1usize;

    let count = decode_vli(index, &mut pos)?;
    let mut records = Vec::with_capacity(count.min(1 << 20) as usize);
    for _ in 0..count {
        let unpadded_size = decode_vli(index, &mut pos)?;
        let uncompressed_size = decode_vli(index, &mut pos)?;
        records.push(BlockRecord {
            unpadded_size,
            uncompressed_size,
        });
    }

    let padding = (4 - pos % 4) % 4;
    if index.len() != pos + padding + 4 {
        return Err(PaxzError::InvalidFormat("index size mismatch"));
    }
    if index[pos..pos + padding].iter().any(|&b| b != 0) {
        return Err(PaxzError::InvalidFormat("nonzero index padding"));
    }

    let crc_start = pos + padding;
    let stored = u32::from_le_bytes([
        index[crc_start],
        index[crc_start + 1],
        index[crc_start + 2],
        index[crc_start + 3],
    ]);
    let actual = crc32fast::hash(&index[..crc_start]);
    if stored != actual {
        return Err(PaxzError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }

    Ok(records)
}

/// Decodes one variable-length integer: seven payload bits per byte, high
/// bit set on every byte but the last, at most nine bytes.
fn decode_vli(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    for i in 0..9 {
        let byte = *bytes
            .get(*pos)
            .ok_or(PaxzError::InvalidFormat("truncated integer in index"))?;
        *pos += 1;
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err(PaxzError::InvalidFormat("overlong integer in index"));
            }
            return Ok(value);
        }
    }
    Err(PaxzError::InvalidFormat("integer in index too long"))
}
