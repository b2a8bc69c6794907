// This file handles the options an Updater runs with.
use std::time::Duration;

use serde::Deserialize;

use crate::cancel::CancellationToken;
use crate::network::NetworkHooks;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_USER_AGENT: &str = concat!("mmdb-updater/", env!("CARGO_PKG_VERSION"));

/// What to do when the downloaded archive has no entry with the expected name.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MissingEntryPolicy {
    /// Report "no change", leaving the destination and marker untouched.
    /// A wrong archive therefore no-ops on every call; a warning is logged.
    #[default]
    ReportUnchanged,
    /// Fail with `UpdateError::EntryNotFound`.
    Error,
}

#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Limit on establishing a connection. None disables it.
    pub connect_timeout: Option<Duration>,
    /// Limit on waiting for the response headers or for the next chunk of a
    /// body. Not a limit on the whole download. None disables it.
    pub read_timeout: Option<Duration>,
    pub user_agent: String,
    pub missing_entry: MissingEntryPolicy,
    pub network_hooks: NetworkHooks,
    pub cancellation: Option<CancellationToken>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            missing_entry: MissingEntryPolicy::default(),
            network_hooks: NetworkHooks::default(),
            cancellation: None,
        }
    }
}

/// The subset of UpdateConfig that can be written down.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    /// 0 disables the timeout.
    connect_timeout_secs: Option<u64>,
    /// 0 disables the timeout.
    read_timeout_secs: Option<u64>,
    user_agent: Option<String>,
    /// Fail when the archive lacks the expected entry.
    #[serde(default)]
    strict: bool,
}

impl UpdateConfig {
    /// Reads options such as
    ///
    /// ```yaml
    /// connect_timeout_secs: 10
    /// read_timeout_secs: 120
    /// user_agent: my-service/1.0
    /// strict: true
    /// ```
    ///
    /// Anything left out keeps its default.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        // An empty document deserializes to unit, not to an empty map.
        let yaml_config: YamlConfig = if yaml.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let mut config = Self::default();
        if let Some(secs) = yaml_config.connect_timeout_secs {
            config.connect_timeout = seconds(secs);
        }
        if let Some(secs) = yaml_config.read_timeout_secs {
            config.read_timeout = seconds(secs);
        }
        if let Some(user_agent) = yaml_config.user_agent {
            config.user_agent = user_agent;
        }
        if yaml_config.strict {
            config.missing_entry = MissingEntryPolicy::Error;
        }
        Ok(config)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{MissingEntryPolicy, UpdateConfig};
    use crate::cancel::CancellationToken;

    #[test]
    fn defaults() {
        let config = UpdateConfig::default();
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
        assert!(config.user_agent.starts_with("mmdb-updater/"));
        assert_eq!(config.missing_entry, MissingEntryPolicy::ReportUnchanged);
        assert!(!config.is_cancelled());
    }

    #[test]
    fn from_yaml_overrides() {
        let config = UpdateConfig::from_yaml(
            "connect_timeout_secs: 5\nread_timeout_secs: 10\nuser_agent: geo-service/2.1\nstrict: true\n",
        )
        .unwrap();
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.user_agent, "geo-service/2.1");
        assert_eq!(config.missing_entry, MissingEntryPolicy::Error);
    }

    #[test]
    fn from_yaml_zero_timeout_disables_it() {
        let config = UpdateConfig::from_yaml("read_timeout_secs: 0").unwrap();
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn from_yaml_empty_keeps_defaults() {
        let config = UpdateConfig::from_yaml("").unwrap();
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.missing_entry, MissingEntryPolicy::ReportUnchanged);
    }

    #[test]
    fn from_yaml_rejects_unknown_fields() {
        let err = UpdateConfig::from_yaml("retries: 3").unwrap_err();
        assert!(err.to_string().contains("unknown field `retries`"));
    }

    #[test]
    fn cancellation_is_shared_with_config() {
        let token = CancellationToken::new();
        let config = UpdateConfig::default().with_cancellation(token.clone());
        token.cancel();
        assert!(config.is_cancelled());
    }
}
