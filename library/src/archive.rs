// Pulls a single file out of a .tar.gz stream.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use anyhow::anyhow;
use flate2::read::GzDecoder;

use crate::cancel::is_cancellation;
use crate::file_errors::{FileOperation, IoResultExt};
use crate::network::is_transport_error;
use crate::updater::{Stage, UpdateError};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Decompresses `reader` as gzip, walks the tar entries in order and copies
/// the first file named `entry_name` (ignoring any leading directories) to
/// `destination`. Entries after the match are never read.
///
/// Returns whether a matching entry was found and written. An entry with
/// fewer bytes than its header declares is a decode error.
pub fn extract_entry<R: Read>(
    reader: R,
    entry_name: &str,
    destination: &Path,
) -> Result<bool, UpdateError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(read_error)?;

    for entry in entries {
        let mut entry = entry.map_err(read_error)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let matched = {
            let path = entry.path().map_err(read_error)?;
            entry_matches(&path, entry_name)
        };
        if !matched {
            continue;
        }

        mmdb_debug!("Extracting {} to {:?}", entry_name, destination);
        let expected = entry.size();
        let copied = copy_to_destination(&mut entry, destination)?;
        // The tar reader reports a cut-off entry as a normal end of data.
        if copied != expected {
            return Err(UpdateError::Decode(
                Stage::ReadArchive,
                anyhow!(
                    "Archive ended inside {}: got {} of {} bytes",
                    entry_name,
                    copied,
                    expected
                ),
            ));
        }
        return Ok(true);
    }

    Ok(false)
}

/// `GeoLite2-City_20240101/GeoLite2-City.mmdb`, `./GeoLite2-City.mmdb` and
/// `GeoLite2-City.mmdb` all match `GeoLite2-City.mmdb`.
fn entry_matches(path: &Path, entry_name: &str) -> bool {
    let path = path.to_string_lossy();
    path == entry_name
        || path
            .strip_suffix(entry_name)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Returns the number of bytes written.
fn copy_to_destination<R: Read>(entry: &mut R, destination: &Path) -> Result<u64, UpdateError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_file_context(FileOperation::CreateDir, parent)
            .map_err(|e| UpdateError::Filesystem(Stage::CreateDirectory, e))?;
    }

    let file = File::create(destination)
        .with_file_context(FileOperation::CreateFile, destination)
        .map_err(|e| UpdateError::Filesystem(Stage::CreateDestination, e))?;
    let mut writer = BufWriter::new(file);

    // Copied by hand rather than with io::copy so read failures (bad archive,
    // dropped connection) and write failures (disk) are reported apart.
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        writer
            .write_all(&buf[..n])
            .with_file_context(FileOperation::WriteFile, destination)
            .map_err(|e| UpdateError::Filesystem(Stage::WriteDestination, e))?;
        copied += n as u64;
    }

    // Flush and sync explicitly; errors on drop would be lost.
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_file_context(FileOperation::WriteFile, destination)
        .map_err(|e| UpdateError::Filesystem(Stage::WriteDestination, e))?;
    file.sync_all()
        .with_file_context(FileOperation::WriteFile, destination)
        .map_err(|e| UpdateError::Filesystem(Stage::WriteDestination, e))?;
    Ok(copied)
}

fn read_error(error: std::io::Error) -> UpdateError {
    if is_cancellation(&error) {
        UpdateError::Cancelled
    } else if is_transport_error(&error) {
        UpdateError::Transport(Stage::ReadArchive, error.into())
    } else {
        UpdateError::Decode(Stage::ReadArchive, error.into())
    }
}
