#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use mockito::{Matcher, Mock, ServerGuard};
use mmdb_updater::{Edition, Source};

/// Builds a .tar.gz laid out like the MaxMind downloads: everything under a
/// dated directory.
pub fn tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn database_archive(entry_name: &str, contents: &str) -> Vec<u8> {
    let entry_path = format!("GeoLite2_20240101/{entry_name}");
    tar_gz(&[
        ("GeoLite2_20240101/COPYRIGHT.txt", "Database and Contents Copyright (c) MaxMind"),
        (entry_path.as_str(), contents),
        ("GeoLite2_20240101/LICENSE.txt", "license"),
    ])
}

/// A tar.gz whose `entry_name` declares `declared` bytes but whose tar
/// stream stops after `kept` of them. The gzip layer itself is intact.
pub fn truncated_database_archive(entry_name: &str, declared: usize, kept: usize) -> Vec<u8> {
    let contents = vec![b'x'; declared];
    let mut header = tar::Header::new_gnu();
    header.set_size(declared as u64);
    header.set_mode(0o644);
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(
            &mut header,
            format!("GeoLite2_20240101/{entry_name}"),
            &contents[..],
        )
        .unwrap();
    let mut tar = builder.into_inner().unwrap();
    tar.truncate(512 + kept);
    gzip(&tar)
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Starts a plain http server that answers requests for `.md5` paths with
/// `digest` (when given). Any other request gets its headers and the first
/// bytes of a gzip stream, then nothing more for `stall`. Returns the base
/// url.
pub fn stalling_server(digest: Option<&'static str>, stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                return;
            };
            thread::spawn(move || {
                let mut request = [0u8; 4096];
                let n = stream.read(&mut request).unwrap_or(0);
                let request = String::from_utf8_lossy(&request[..n]);
                let request_line = request.lines().next().unwrap_or_default();
                match digest {
                    Some(digest) if request_line.contains(".md5") => {
                        let _ = write!(
                            stream,
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            digest.len(),
                            digest
                        );
                    }
                    _ => {
                        let _ = write!(
                            stream,
                            "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n"
                        );
                        let _ = stream.write_all(&[0x1f, 0x8b, 0x08]);
                        let _ = stream.flush();
                        thread::sleep(stall);
                    }
                }
            });
        }
    });
    format!("http://{}", address)
}

/// Points a built-in edition at the mock server, keeping its query string.
pub fn local_edition(server: &ServerGuard, edition: Edition) -> Edition {
    let query = edition
        .source
        .address
        .split_once('?')
        .map(|(_, query)| query.to_string())
        .unwrap_or_default();
    Edition {
        source: Source {
            address: format!("{}/app/geoip_download?{}", server.url(), query),
            ..edition.source
        },
        ..edition
    }
}

pub fn edition_id(edition: &Edition) -> String {
    edition.entry_name.trim_end_matches(".mmdb").to_string()
}

/// Serves the digest for `edition`, matching on the suffix parameter the
/// way download.maxmind.com does. The caller adds expectations and calls
/// `create()`.
pub fn mock_digest(server: &mut ServerGuard, edition: &Edition, body: &str) -> Mock {
    server
        .mock("GET", "/app/geoip_download")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("edition_id".into(), edition_id(edition)),
            Matcher::UrlEncoded("license_key".into(), "test-key".into()),
            Matcher::UrlEncoded("suffix".into(), "tar.gz.md5".into()),
        ]))
        .with_status(200)
        .with_body(body)
}

pub fn mock_archive(server: &mut ServerGuard, edition: &Edition, body: Vec<u8>) -> Mock {
    server
        .mock("GET", "/app/geoip_download")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("edition_id".into(), edition_id(edition)),
            Matcher::UrlEncoded("license_key".into(), "test-key".into()),
            Matcher::UrlEncoded("suffix".into(), "tar.gz".into()),
        ]))
        .with_status(200)
        .with_body(body)
}
