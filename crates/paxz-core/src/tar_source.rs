use std::io::Read;

use tar::Archive;

use crate::error::{PaxzError, Result};

/// Walks the members of an uncompressed tar stream pulled from `reader`,
/// invoking `on_member(header_offset, path_bytes)` for each entry in order.
///
/// Entry data is never materialized; the walk only pulls bytes through the
/// reader, which is what lets the caller's read adapter capture the raw
/// stream on the side. Returns once the end-of-archive marker has been
/// consumed; trailing padding after the marker is left in the reader.
pub fn scan_members<R, F>(reader: R, mut on_member: F) -> Result<()>
where
    R: Read,
    F: FnMut(u64, &[u8]),
{
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|err| PaxzError::Archive(format!("opening archive: {err}")))?;

    for entry in entries {
        let entry =
            entry.map_err(|err| PaxzError::Archive(format!("reading archive entry: {err}")))?;
        on_member(entry.raw_header_position(), &entry.path_bytes());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_tar(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in members {
            let mut header = tar::Header::new_ustar();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn emits_header_offsets_in_member_order() {
        let tar = fixture_tar(&[("a", b"hello"), ("b", &[0u8; 600])]);

        let mut events = Vec::new();
        scan_members(tar.as_slice(), |offset, name| {
            events.push((offset, String::from_utf8_lossy(name).into_owned()));
        })
        .unwrap();

        // a: header at 0, 5 data bytes padded to 512; b follows at 1024
        assert_eq!(events, vec![(0, "a".to_string()), (1024, "b".to_string())]);
    }

    #[test]
    fn empty_archive_emits_no_members() {
        let tar = fixture_tar(&[]);
        let mut count = 0;
        scan_members(tar.as_slice(), |_, _| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn corrupt_header_is_fatal() {
        let mut tar = fixture_tar(&[("a", b"hello")]);
        // break the checksum field of the first header
        tar[148..156].copy_from_slice(b"zzzzzzzz");
        assert!(scan_members(tar.as_slice(), |_, _| {}).is_err());
    }
}
