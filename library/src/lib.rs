// This is a required file for rust libraries which declares what files are
// part of the library and what interfaces are public from the library.

//! Downloads GeoLite2 (or similarly packaged) databases and keeps them up to
//! date. Each update fetches the digest the server publishes for the tar.gz
//! archive, compares it with the digest recorded next to the database by the
//! previous update, and only downloads and extracts the archive if they
//! differ.

#[macro_use]
mod logging_macros;

// Declare other .rs file/module exists, but make them private.
mod archive;
mod cancel;
mod config;
mod editions;
mod file_errors;
mod logging;
mod marker;
mod network;
mod updater;

pub use self::cancel::CancellationToken;
pub use self::config::{MissingEntryPolicy, UpdateConfig};
pub use self::editions::{
    geolite2_asn, geolite2_city, geolite2_country, DigestConvention, Edition, Source,
};
pub use self::logging::init_logging;
pub use self::marker::marker_path;
pub use self::network::{FetchFn, NetworkHooks};

// Take all public items from the updater namespace and make them public.
pub use self::updater::*;

#[cfg(test)]
extern crate tempdir;
