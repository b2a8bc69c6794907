// This file's job is to deal with the network side of the updater: building
// the http client and issuing the GET requests for digests and archives.

use anyhow::{bail, Context};
use std::io::Read;
use std::time::Duration;
use url::Url;

pub type FetchFn = fn(&reqwest::blocking::Client, &Url) -> anyhow::Result<Box<dyn Read + Send>>;

/// A container for network callbacks which can be mocked out for testing.
#[derive(Clone)]
pub struct NetworkHooks {
    /// The function to call to GET a resource. Used for both the digest and
    /// the archive.
    pub fetch_fn: FetchFn,
}

// We have to implement Debug by hand since fn types don't implement it.
impl core::fmt::Debug for NetworkHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHooks")
            .field("fetch_fn", &"<fn>")
            .finish()
    }
}

impl Default for NetworkHooks {
    fn default() -> Self {
        Self {
            fetch_fn: fetch_default,
        }
    }
}

/// `connect_timeout` bounds establishing the connection. `read_timeout`
/// bounds the wait for the response headers and for each chunk of the
/// body, so a long download on a slow but live link is never cut off.
pub fn build_client(
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    user_agent: &str,
) -> anyhow::Result<reqwest::blocking::Client> {
    // The blocking client applies `timeout` per operation rather than to the
    // whole request. It is passed even when None: the client otherwise falls
    // back to its own 30s default.
    reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .build()
        .context("Failed to build http client")
}

/// Sends a GET request and hands back the body as a reader, so large
/// archives are streamed rather than buffered.
pub fn fetch_default(
    client: &reqwest::blocking::Client,
    url: &Url,
) -> anyhow::Result<Box<dyn Read + Send>> {
    mmdb_debug!("GET {}", redacted(url));
    let result = client.get(url.clone()).send();
    let response = handle_network_result(result)?;
    Ok(Box::new(response))
}

/// Handles the result of a network request, returning the response if it was
/// successful, an error if it was not, or a special error if the network
/// request failed due to a lack of internet connection.
fn handle_network_result(
    result: Result<reqwest::blocking::Response, reqwest::Error>,
) -> anyhow::Result<reqwest::blocking::Response> {
    use std::error::Error;

    match result {
        Ok(response) => {
            if response.status().is_success() {
                Ok(response)
            } else {
                bail!("Request failed with status: {}", response.status())
            }
        }
        Err(e) => match e.source() {
            Some(source)
                if source
                    .to_string()
                    .contains("failed to lookup address information") =>
            {
                bail!("Request failed due to network error. Please check your internet connection.");
            }
            _ => bail!(e),
        },
    }
}

/// True if a read error coming out of a response body was caused by the
/// http transport (connection reset, timeout) rather than by the bytes
/// themselves.
pub fn is_transport_error(error: &std::io::Error) -> bool {
    let mut source = error
        .get_ref()
        .map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(err) = source {
        if err.is::<reqwest::Error>() {
            return true;
        }
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if let Some(inner) = io.get_ref() {
                source = Some(inner as &(dyn std::error::Error + 'static));
                continue;
            }
        }
        source = err.source();
    }
    false
}

/// The url with anything that looks like a credential (`license_key`,
/// `api_key`, `token`, ...) masked, for logging.
pub fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key.contains("key") || key.contains("token") {
                "<redacted>".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}
