// This file describes where databases come from: the provider endpoint, how
// its digest resource is located and which archive entry is the database.

use serde::Deserialize;
use url::Url;

use crate::updater::UpdateError;

const MAXMIND_DOWNLOAD_URL: &str = "https://download.maxmind.com/app/geoip_download";

/// How to find the digest resource that belongs to an archive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestConvention {
    /// Digest and archive are served by the same endpoint, selected by the
    /// value of a query parameter (e.g. `suffix=tar.gz.md5` vs `suffix=tar.gz`).
    QueryParameter {
        name: String,
        digest_value: String,
        archive_value: String,
    },
    /// The digest sits next to the archive, at the archive path plus `suffix`.
    UrlSuffix { suffix: String },
}

/// A remote provider of tar.gz archives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Source {
    pub address: String,
    pub digest: DigestConvention,
    /// Name of the query parameter carrying the credentials, if the
    /// provider wants any.
    #[serde(default)]
    pub auth_param: Option<String>,
}

impl Source {
    /// The url of the digest resource for this source.
    pub fn digest_url(&self, credentials: Option<&str>) -> Result<Url, UpdateError> {
        let mut url = self.authenticated_url(credentials)?;
        match &self.digest {
            DigestConvention::QueryParameter {
                name, digest_value, ..
            } => set_query_param(&mut url, name, digest_value),
            DigestConvention::UrlSuffix { suffix } => {
                let path = format!("{}{}", url.path(), suffix);
                url.set_path(&path);
            }
        }
        Ok(url)
    }

    /// The url of the archive itself.
    pub fn archive_url(&self, credentials: Option<&str>) -> Result<Url, UpdateError> {
        let mut url = self.authenticated_url(credentials)?;
        if let DigestConvention::QueryParameter {
            name,
            archive_value,
            ..
        } = &self.digest
        {
            set_query_param(&mut url, name, archive_value);
        }
        Ok(url)
    }

    fn authenticated_url(&self, credentials: Option<&str>) -> Result<Url, UpdateError> {
        let mut url = Url::parse(&self.address).map_err(|e| {
            UpdateError::InvalidArgument("address".to_string(), format!("{}: {}", self.address, e))
        })?;
        if let (Some(param), Some(credentials)) = (&self.auth_param, credentials) {
            set_query_param(&mut url, param, credentials);
        }
        Ok(url)
    }
}

/// Sets `name` to `value`, dropping any previous values of `name` while
/// keeping the other parameters in place.
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
}

/// A database product: the file to pull out of the archive and the source
/// serving the archive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Edition {
    pub entry_name: String,
    pub source: Source,
}

impl Edition {
    /// Reads an edition description, e.g.
    ///
    /// ```yaml
    /// entry_name: GeoLite2-City.mmdb
    /// source:
    ///   address: https://example.com/GeoLite2-City.tar.gz
    ///   digest:
    ///     url_suffix:
    ///       suffix: .md5
    /// ```
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn maxmind(edition_id: &str) -> Self {
        Self {
            entry_name: format!("{edition_id}.mmdb"),
            source: Source {
                address: format!("{MAXMIND_DOWNLOAD_URL}?edition_id={edition_id}"),
                digest: DigestConvention::QueryParameter {
                    name: "suffix".to_string(),
                    digest_value: "tar.gz.md5".to_string(),
                    archive_value: "tar.gz".to_string(),
                },
                auth_param: Some("license_key".to_string()),
            },
        }
    }
}

pub fn geolite2_country() -> Edition {
    Edition::maxmind("GeoLite2-Country")
}

pub fn geolite2_city() -> Edition {
    Edition::maxmind("GeoLite2-City")
}

pub fn geolite2_asn() -> Edition {
    Edition::maxmind("GeoLite2-ASN")
}
