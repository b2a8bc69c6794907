// This file's job is to be the Rust API for the updater.

use std::fmt::{Display, Formatter};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::archive::extract_entry;
use crate::cancel::CancellableReader;
use crate::config::{MissingEntryPolicy, UpdateConfig};
use crate::editions::{self, Edition, Source};
use crate::marker::{marker_path, read_local_digest, write_marker};
use crate::network::{build_client, redacted};

/// The step of an update that failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    BuildRequest,
    FetchDigest,
    ReadDigest,
    ReadMarker,
    FetchArchive,
    ReadArchive,
    CreateDirectory,
    CreateDestination,
    WriteDestination,
    WriteMarker,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::BuildRequest => "building request",
            Stage::FetchDigest => "fetching digest",
            Stage::ReadDigest => "reading digest",
            Stage::ReadMarker => "reading marker file",
            Stage::FetchArchive => "fetching archive",
            Stage::ReadArchive => "reading archive",
            Stage::CreateDirectory => "creating directory",
            Stage::CreateDestination => "creating destination file",
            Stage::WriteDestination => "writing destination file",
            Stage::WriteMarker => "writing marker file",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug)]
pub enum UpdateError {
    InvalidArgument(String, String),
    /// The request could not be built or sent, or the server answered with
    /// a non-success status.
    Transport(Stage, anyhow::Error),
    /// The archive is not valid gzip or tar.
    Decode(Stage, anyhow::Error),
    Filesystem(Stage, anyhow::Error),
    /// Only returned with `MissingEntryPolicy::Error`.
    EntryNotFound(String),
    Cancelled,
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::Transport(_, err)
            | UpdateError::Decode(_, err)
            | UpdateError::Filesystem(_, err) => {
                let source: &(dyn std::error::Error + 'static) = err.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            UpdateError::InvalidArgument(name, value) => {
                write!(f, "Invalid Argument: {} -> {}", name, value)
            }
            UpdateError::Transport(stage, err) => write!(f, "Transport error {}: {:#}", stage, err),
            UpdateError::Decode(stage, err) => write!(f, "Decode error {}: {:#}", stage, err),
            UpdateError::Filesystem(stage, err) => {
                write!(f, "Filesystem error {}: {:#}", stage, err)
            }
            UpdateError::EntryNotFound(name) => write!(f, "Entry {} not found in archive", name),
            UpdateError::Cancelled => write!(f, "Update cancelled"),
        }
    }
}

/// What a call to [`Updater::update`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// True if the destination and marker were (re)written.
    pub changed: bool,
    /// Where the digest of the archive is (or would be) recorded.
    pub marker_path: PathBuf,
    /// The digest the server reported, trimmed.
    pub digest: String,
}

/// Keeps a local copy of a database in sync with a remote tar.gz archive,
/// downloading the archive only when the server's digest differs from the
/// one recorded by the previous update.
///
/// Not safe to run concurrently for the same destination.
#[derive(Debug)]
pub struct Updater {
    config: UpdateConfig,
    client: reqwest::blocking::Client,
}

impl Updater {
    pub fn new(config: UpdateConfig) -> Result<Self, UpdateError> {
        let client = build_client(
            config.connect_timeout,
            config.read_timeout,
            &config.user_agent,
        )
            .map_err(|e| UpdateError::Transport(Stage::BuildRequest, e))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn update_edition(
        &self,
        edition: &Edition,
        destination: &Path,
        credentials: Option<&str>,
    ) -> Result<UpdateOutcome, UpdateError> {
        self.update(destination, &edition.entry_name, &edition.source, credentials)
    }

    /// Checks the digest published by `source` against the marker next to
    /// `destination` and, if they differ, downloads the archive and writes
    /// its `entry_name` entry to `destination`, then records the new digest.
    ///
    /// At most two requests are made: the digest, and the archive only when
    /// the digest changed.
    pub fn update(
        &self,
        destination: &Path,
        entry_name: &str,
        source: &Source,
        credentials: Option<&str>,
    ) -> Result<UpdateOutcome, UpdateError> {
        let digest_url = source.digest_url(credentials)?;
        let digest = self.fetch_digest(&digest_url)?;
        let marker_path = marker_path(destination, &digest_url);

        let local_digest = read_local_digest(&marker_path)
            .map_err(|e| UpdateError::Filesystem(Stage::ReadMarker, e))?;
        if local_digest.as_deref() == Some(digest.as_str()) {
            mmdb_debug!("{:?} is up to date ({})", destination, digest);
            return Ok(UpdateOutcome {
                changed: false,
                marker_path,
                digest,
            });
        }

        let archive_url = source.archive_url(credentials)?;
        mmdb_info!("Downloading {}", redacted(&archive_url));
        let body = self.fetch(&archive_url, Stage::FetchArchive)?;
        let found = extract_entry(body, entry_name, destination)
            .map_err(|e| self.cancelled_or(e))?;

        if !found {
            return match self.config.missing_entry {
                MissingEntryPolicy::ReportUnchanged => {
                    mmdb_warn!(
                        "No entry named {} in {}, leaving {:?} as is",
                        entry_name,
                        redacted(&archive_url),
                        destination
                    );
                    Ok(UpdateOutcome {
                        changed: false,
                        marker_path,
                        digest,
                    })
                }
                MissingEntryPolicy::Error => Err(UpdateError::EntryNotFound(entry_name.to_string())),
            };
        }

        write_marker(&marker_path, &digest)
            .map_err(|e| UpdateError::Filesystem(Stage::WriteMarker, e))?;
        mmdb_info!("Updated {:?} ({})", destination, digest);
        Ok(UpdateOutcome {
            changed: true,
            marker_path,
            digest,
        })
    }

    fn fetch_digest(&self, url: &url::Url) -> Result<String, UpdateError> {
        let mut body = self.fetch(url, Stage::FetchDigest)?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).map_err(|e| {
            if crate::cancel::is_cancellation(&e) {
                UpdateError::Cancelled
            } else {
                self.cancelled_or(UpdateError::Transport(Stage::ReadDigest, e.into()))
            }
        })?;
        let digest = String::from_utf8(bytes)
            .context("Digest is not valid UTF-8")
            .map_err(|e| UpdateError::Decode(Stage::ReadDigest, e))?;
        Ok(digest.trim().to_string())
    }

    /// Sends the request on a worker thread so that cancelling returns
    /// immediately, even while the connection is stalled.
    fn fetch(&self, url: &url::Url, stage: Stage) -> Result<impl Read, UpdateError> {
        if self.config.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        let fetch_fn = self.config.network_hooks.fetch_fn;
        let client = self.client.clone();
        let url = url.clone();
        CancellableReader::spawn(
            move || fetch_fn(&client, &url),
            self.config.cancellation.clone(),
        )
        .map_err(|e| self.cancelled_or(UpdateError::Transport(stage, e)))
    }

    /// A failure seen after the token fired is reported as a cancellation,
    /// whatever the connection did in the meantime.
    fn cancelled_or(&self, error: UpdateError) -> UpdateError {
        if self.config.is_cancelled() {
            UpdateError::Cancelled
        } else {
            error
        }
    }
}

/// Updates `destination` from `source` with the default options. Returns
/// whether the destination was rewritten.
pub fn update(
    destination: &Path,
    entry_name: &str,
    source: &Source,
    credentials: Option<&str>,
) -> Result<bool, UpdateError> {
    let updater = Updater::new(UpdateConfig::default())?;
    Ok(updater
        .update(destination, entry_name, source, credentials)?
        .changed)
}

fn update_maxmind(
    edition: Edition,
    destination: &Path,
    license_key: &str,
) -> Result<bool, UpdateError> {
    update(
        destination,
        &edition.entry_name,
        &edition.source,
        Some(license_key),
    )
}

/// Downloads the GeoLite2 Country database to `destination` if it changed
/// since the last call. The archive's digest is kept in the same directory.
pub fn update_geolite2_country(destination: &Path, license_key: &str) -> Result<bool, UpdateError> {
    update_maxmind(editions::geolite2_country(), destination, license_key)
}

/// Downloads the GeoLite2 City database to `destination` if it changed
/// since the last call. The archive's digest is kept in the same directory.
pub fn update_geolite2_city(destination: &Path, license_key: &str) -> Result<bool, UpdateError> {
    update_maxmind(editions::geolite2_city(), destination, license_key)
}

/// Downloads the GeoLite2 ASN database to `destination` if it changed since
/// the last call. The archive's digest is kept in the same directory.
pub fn update_geolite2_asn(destination: &Path, license_key: &str) -> Result<bool, UpdateError> {
    update_maxmind(editions::geolite2_asn(), destination, license_key)
}
