use std::io::{self, Cursor, Read};

use paxz_core::{
    compress_tar, read_block_records, read_file_index, CompressOptions, CompressSummary,
};

/// Small dictionary preset so multi-block behavior is reachable with
/// test-sized inputs.
const TEST_PRESET: u32 = 0;

fn fixture_tar(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in members {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

fn compress_fixture(tar: &[u8], workers: usize) -> (Vec<u8>, CompressSummary) {
    let options = CompressOptions {
        workers: Some(workers),
        preset: TEST_PRESET,
    };
    let mut out = Vec::new();
    let summary = compress_tar(Cursor::new(tar.to_vec()), &mut out, &options).unwrap();
    (out, summary)
}

fn decompress(stream: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    xz2::read::XzDecoder::new(stream)
        .read_to_end(&mut decoded)
        .unwrap();
    decoded
}

/// A plain decoder sees the archive followed by the member index payload,
/// since the index travels as an ordinary block.
fn assert_round_trip(stream: &[u8], tar: &[u8]) {
    let decoded = decompress(stream);
    assert_eq!(&decoded[..tar.len()], tar);
    paxz_core::parse_file_index(&decoded[tar.len()..]).unwrap();
}

#[test]
fn empty_archive_round_trips() {
    let tar = fixture_tar(&[]);
    assert_eq!(tar.len(), 1024);

    let (stream, summary) = compress_fixture(&tar, 2);
    assert_eq!(summary.input_bytes, 1024);
    assert_eq!(summary.data_blocks, 1);
    assert_eq!(summary.members, 0);
    assert_eq!(summary.output_bytes, stream.len() as u64);

    assert_round_trip(&stream, &tar);

    let entries = read_file_index(&mut Cursor::new(&stream)).unwrap().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].offset, 1024);
    assert!(entries[0].name.is_none());
}

#[test]
fn single_member_produces_one_data_block() {
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let tar = fixture_tar(&[("big.bin", payload)]);

    let (stream, summary) = compress_fixture(&tar, 4);
    assert_eq!(summary.data_blocks, 1);
    assert_eq!(summary.members, 1);
    // patterned content must compress
    assert!(stream.len() < tar.len());

    assert_round_trip(&stream, &tar);

    let entries = read_file_index(&mut Cursor::new(&stream)).unwrap().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name.as_deref(), Some("big.bin"));
    assert_eq!(entries[0].offset, 0);
    assert_eq!(entries[1].offset, tar.len() as u64);
    assert!(entries[1].name.is_none());
}

#[test]
fn sidecar_member_folds_into_successor() {
    let tar = fixture_tar(&[
        ("a", b"alpha".to_vec()),
        ("._a", b"side".to_vec()),
        ("b", b"beta".to_vec()),
    ]);

    let (stream, summary) = compress_fixture(&tar, 2);
    assert_eq!(summary.members, 2);
    assert_round_trip(&stream, &tar);

    let entries = read_file_index(&mut Cursor::new(&stream)).unwrap().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].name.as_deref(), Some("a"));
    assert_eq!(entries[0].offset, 0);
    // b is recorded at its sidecar's header offset, not its own
    assert_eq!(entries[1].name.as_deref(), Some("b"));
    assert_eq!(entries[1].offset, 1024);
    assert_eq!(entries[2].offset, tar.len() as u64);
}

#[test]
fn many_members_split_across_blocks() {
    let members: Vec<(String, Vec<u8>)> = (0..200)
        .map(|i| {
            let name = format!("files/member-{i:03}");
            let data: Vec<u8> = (0..8192u32).map(|j| ((i + j) % 241) as u8).collect();
            (name, data)
        })
        .collect();
    let borrowed: Vec<(&str, Vec<u8>)> = members
        .iter()
        .map(|(name, data)| (name.as_str(), data.clone()))
        .collect();
    let tar = fixture_tar(&borrowed);

    let (stream, summary) = compress_fixture(&tar, 4);
    assert!(summary.data_blocks >= 3, "blocks: {}", summary.data_blocks);
    assert_eq!(summary.members, 200);
    assert_round_trip(&stream, &tar);

    // the block index records every data block plus the member index block
    let records = read_block_records(&mut Cursor::new(&stream)).unwrap();
    assert_eq!(records.len() as u64, summary.data_blocks + 1);

    // byte conservation: the data blocks account for the whole input
    let data_bytes: u64 = records[..records.len() - 1]
        .iter()
        .map(|record| record.uncompressed_size)
        .sum();
    assert_eq!(data_bytes, tar.len() as u64);

    let entries = read_file_index(&mut Cursor::new(&stream)).unwrap().unwrap();
    assert_eq!(entries.len(), 201);
    for pair in entries.windows(2) {
        assert!(pair[0].offset <= pair[1].offset);
    }
    assert_eq!(entries.last().unwrap().offset, tar.len() as u64);
}

#[test]
fn output_is_deterministic_for_fixed_worker_count() {
    let members: Vec<(&str, Vec<u8>)> = vec![
        ("one", vec![1u8; 300_000]),
        ("two", (0..700_000u32).map(|i| (i % 199) as u8).collect()),
    ];
    let tar = fixture_tar(&members);

    let (first, _) = compress_fixture(&tar, 4);
    let (second, _) = compress_fixture(&tar, 4);
    assert_eq!(first, second);

    // worker count shifts scheduling, never the decoded bytes
    let (serial, _) = compress_fixture(&tar, 1);
    assert_eq!(decompress(&serial), decompress(&first));
}

struct FailingReader {
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("synthetic input failure"));
        }
        let n = self.remaining.min(buf.len());
        buf[..n].fill(0);
        self.remaining -= n;
        Ok(n)
    }
}

#[test]
fn input_read_failure_is_fatal() {
    // enough zeros for the walk to get past the first header reads
    let reader = FailingReader { remaining: 64 * 1024 };
    let options = CompressOptions {
        workers: Some(2),
        preset: TEST_PRESET,
    };
    let mut out = Vec::new();
    let result = compress_tar(reader, &mut out, &options);
    assert!(result.is_err());
}

#[test]
fn file_to_file_compression() {
    let dir = tempfile::tempdir().unwrap();
    let tar = fixture_tar(&[("hello.txt", b"hello world\n".to_vec())]);
    let tar_path = dir.path().join("input.tar");
    std::fs::write(&tar_path, &tar).unwrap();
    let out_path = dir.path().join("output.xz");

    let options = CompressOptions {
        workers: Some(2),
        preset: TEST_PRESET,
    };
    let summary = paxz_core::compress_tar_file(&tar_path, &out_path, &options).unwrap();
    assert_eq!(summary.input_bytes, tar.len() as u64);

    let stream = std::fs::read(&out_path).unwrap();
    assert_eq!(stream.len() as u64, summary.output_bytes);
    assert_round_trip(&stream, &tar);

    let mut file = std::fs::File::open(&out_path).unwrap();
    let records = read_block_records(&mut file).unwrap();
    assert_eq!(records.len() as u64, summary.data_blocks + 1);
    let entries = read_file_index(&mut file).unwrap().unwrap();
    assert_eq!(entries[0].name.as_deref(), Some("hello.txt"));

    let missing = dir.path().join("missing.tar");
    assert!(paxz_core::compress_tar_file(&missing, &out_path, &options).is_err());
}

#[test]
fn plain_stream_has_no_member_index() {
    let data = vec![b'x'; 4096];
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    io::Write::write_all(&mut encoder, &data).unwrap();
    let stream = encoder.finish().unwrap();

    let records = read_block_records(&mut Cursor::new(&stream)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uncompressed_size, data.len() as u64);

    assert!(read_file_index(&mut Cursor::new(&stream))
        .unwrap()
        .is_none());
}
