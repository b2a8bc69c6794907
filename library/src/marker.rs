// The marker file sits next to the database and holds the digest the server
// reported for the archive the database was last extracted from.

use std::fs;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::file_errors::{FileOperation, IoResultExt};

/// Used when the digest url has no final path segment to name the marker by.
const FALLBACK_MARKER_NAME: &str = "digest.md5";

/// Where the marker for `destination` lives: the destination's directory
/// joined with the last segment of the digest url's path, percent-decoded.
/// Query and fragment play no part, so `.../geoip_download?suffix=tar.gz.md5`
/// yields `geoip_download`.
pub fn marker_path(destination: &Path, digest_url: &Url) -> PathBuf {
    let name = digest_url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(decoded_file_name)
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_MARKER_NAME.to_string());
    let dir = destination.parent().unwrap_or_else(|| Path::new(""));
    dir.join(name)
}

/// `Geo%20Lite.md5` is `Geo Lite.md5`. An encoded `/` splits the name like a
/// real one would.
fn decoded_file_name(segment: &str) -> String {
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    match decoded.rfind('/') {
        Some(slash) => decoded[slash + 1..].to_string(),
        None => decoded.into_owned(),
    }
}

/// Reads the digest recorded by the previous successful update, if any.
pub fn read_local_digest(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read(path).with_file_context(FileOperation::ReadFile, path)?;
    Ok(Some(String::from_utf8_lossy(&contents).trim().to_string()))
}

/// Records `digest` as-is, replacing whatever the marker held before.
pub fn write_marker(path: &Path, digest: &str) -> anyhow::Result<()> {
    mmdb_debug!("Writing marker: {:?}", path);
    fs::write(path, digest.as_bytes()).with_file_context(FileOperation::WriteFile, path)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempdir::TempDir;
    use percent_encoding::percent_decode_str;
use url::Url;

    #[test]
    fn marker_path_ignores_query() {
        let url = Url::parse(
            "https://download.maxmind.com/app/geoip_download?edition_id=GeoLite2-City&suffix=tar.gz.md5",
        )
        .unwrap();
        assert_eq!(
            super::marker_path(Path::new("/var/lib/geoip/GeoLite2-City.mmdb"), &url),
            Path::new("/var/lib/geoip/geoip_download")
        );
    }

    #[test]
    fn marker_path_uses_last_segment() {
        let url = Url::parse("http://localhost/dbs/GeoLite2-ASN.tar.gz.md5#frag").unwrap();
        assert_eq!(
            super::marker_path(Path::new("data/asn.mmdb"), &url),
            Path::new("data/GeoLite2-ASN.tar.gz.md5")
        );
    }

    #[test]
    fn marker_path_is_percent_decoded() {
        let url = Url::parse("http://localhost/dbs/Geo%20Lite.md5").unwrap();
        assert_eq!(
            super::marker_path(Path::new("/data/db.mmdb"), &url),
            Path::new("/data/Geo Lite.md5")
        );
    }

    #[test]
    fn marker_path_encoded_slash_keeps_marker_in_destination_dir() {
        let url = Url::parse("http://localhost/dbs/nested%2Fdigest.md5").unwrap();
        assert_eq!(
            super::marker_path(Path::new("/data/db.mmdb"), &url),
            Path::new("/data/digest.md5")
        );
    }

    #[test]
    fn marker_path_relative_destination_without_dir() {
        let url = Url::parse("http://localhost/digest").unwrap();
        assert_eq!(
            super::marker_path(Path::new("db.mmdb"), &url),
            Path::new("digest")
        );
    }

    #[test]
    fn marker_path_falls_back_for_empty_segment() {
        let url = Url::parse("http://localhost/").unwrap();
        assert_eq!(
            super::marker_path(Path::new("/tmp/db.mmdb"), &url),
            Path::new("/tmp/digest.md5")
        );
    }

    #[test]
    fn read_local_digest_missing_file() {
        let tmp_dir = TempDir::new("marker").unwrap();
        let path = tmp_dir.path().join("geoip_download");
        assert_eq!(super::read_local_digest(&path).unwrap(), None);
    }

    #[test]
    fn read_local_digest_trims() {
        let tmp_dir = TempDir::new("marker").unwrap();
        let path = tmp_dir.path().join("geoip_download");
        std::fs::write(&path, " abc123\n").unwrap();
        assert_eq!(
            super::read_local_digest(&path).unwrap(),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn write_marker_overwrites() {
        let tmp_dir = TempDir::new("marker").unwrap();
        let path = tmp_dir.path().join("geoip_download");
        std::fs::write(&path, "an older and longer digest").unwrap();
        super::write_marker(&path, "abc123").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc123");
    }
}
