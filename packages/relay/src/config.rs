//! YAML configuration.
//!
//! The file layout matches existing deployments; a few operational knobs are
//! optional additions with defaults. Secrets can be overridden from the
//! environment (or a `.env` file).

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use wallhaven_client::SearchParams;

use crate::error::{RelayError, Result};

/// Application configuration loaded from a YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,

    pub wallhaven: WallhavenConfig,

    /// SQLite ledger file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Seconds to sleep between cycles
    #[serde(default = "default_wait_time")]
    pub wait_time: u64,

    #[serde(default)]
    pub openai_key: String,

    #[serde(default)]
    pub mastodon: Option<MastodonConfig>,

    #[serde(default)]
    pub ntfy: Option<NtfyConfig>,

    /// Items processed in parallel per batch
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Timeout applied to every outbound request of the shared HTTP client
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Sinks to enable. When absent every configured section is enabled.
    #[serde(default)]
    pub sinks: Option<Vec<SinkKind>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatrixConfig {
    pub server_url: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub room_id: String,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WallhavenConfig {
    #[serde(default)]
    pub api_token: String,

    #[serde(default)]
    pub categories: String,

    #[serde(default)]
    pub purity: String,

    #[serde(default)]
    pub sorting: String,

    /// Discovery ranges, e.g. `1d`, `1w`
    #[serde(default)]
    pub toprange: Vec<String>,

    #[serde(default)]
    pub order: String,

    #[serde(default)]
    pub ai_filter: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl WallhavenConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            categories: self.categories.clone(),
            purity: self.purity.clone(),
            sorting: self.sorting.clone(),
            order: self.order.clone(),
            ai_art_filter: self.ai_filter.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MastodonConfig {
    pub mastodon_server: String,
    #[serde(default)]
    pub mastodon_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NtfyConfig {
    pub server: String,
    pub topic: String,
}

/// Publishing destinations known to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Matrix,
    Mastodon,
    Ntfy,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SinkKind::Matrix => "matrix",
            SinkKind::Mastodon => "mastodon",
            SinkKind::Ntfy => "ntfy",
        };
        f.write_str(s)
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("sent_images.db")
}

fn default_wait_time() -> u64 {
    3600
}

fn default_max_concurrent_items() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_user_agent() -> String {
    concat!("wallhaven-relay/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    /// Load, override from the environment, and validate.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let mut config = Self::from_yaml(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate().context("invalid configuration")?;

        Ok(config)
    }

    /// Parse without overrides or validation.
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Replace secrets with values from `lookup` when present and non-empty.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_key = key;
        }
        if let Some(key) = get("WALLHAVEN_API_KEY") {
            self.wallhaven.api_token = key;
        }
        if let (Some(password), Some(matrix)) = (get("MATRIX_PASSWORD"), self.matrix.as_mut()) {
            matrix.password = password;
        }
        if let (Some(token), Some(mastodon)) = (get("MASTODON_TOKEN"), self.mastodon.as_mut()) {
            mastodon.mastodon_token = token;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.wallhaven.toprange.is_empty() {
            return Err(config_error("wallhaven.toprange must list at least one range"));
        }
        if self.max_concurrent_items == 0 {
            return Err(config_error("max_concurrent_items must be greater than 0"));
        }
        if self.wait_time == 0 {
            return Err(config_error("wait_time must be greater than 0"));
        }

        let enabled = self.enabled_sinks();
        if let Some(requested) = &self.sinks {
            for kind in requested {
                if !self.has_section(*kind) {
                    return Err(config_error(format!(
                        "sink '{}' is enabled but has no configuration section",
                        kind
                    )));
                }
            }
        }

        if let (true, Some(m)) = (enabled.contains(&SinkKind::Matrix), &self.matrix) {
            if m.server_url.is_empty() || m.user.is_empty() || m.room_id.is_empty() {
                return Err(config_error("matrix needs server_url, user and room_id"));
            }
            if m.password.is_empty() && m.token_file.is_none() {
                return Err(config_error("matrix needs a password or a token_file"));
            }
        }
        if let (true, Some(m)) = (enabled.contains(&SinkKind::Mastodon), &self.mastodon) {
            if m.mastodon_server.is_empty() || m.mastodon_token.is_empty() {
                return Err(config_error("mastodon needs mastodon_server and mastodon_token"));
            }
        }
        if let (true, Some(n)) = (enabled.contains(&SinkKind::Ntfy), &self.ntfy) {
            if n.server.is_empty() || n.topic.is_empty() {
                return Err(config_error("ntfy needs server and topic"));
            }
        }

        Ok(())
    }

    /// Sinks to construct, in a stable order.
    pub fn enabled_sinks(&self) -> Vec<SinkKind> {
        let all = [SinkKind::Matrix, SinkKind::Mastodon, SinkKind::Ntfy];
        let selected: BTreeSet<SinkKind> = match &self.sinks {
            Some(list) => list.iter().copied().collect(),
            None => all.into_iter().collect(),
        };

        all.into_iter()
            .filter(|k| selected.contains(k) && self.has_section(*k))
            .collect()
    }

    fn has_section(&self, kind: SinkKind) -> bool {
        match kind {
            SinkKind::Matrix => self.matrix.is_some(),
            SinkKind::Mastodon => self.mastodon.is_some(),
            SinkKind::Ntfy => self.ntfy.is_some(),
        }
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn config_error(message: impl Into<String>) -> RelayError {
    RelayError::Config(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
matrix:
  server_url: https://matrix.example.org
  user: "@walls:example.org"
  password: hunter2
  room_id: "!room:example.org"
  token_file: matrix_token.txt
wallhaven:
  api_token: wh-key
  categories: "111"
  purity: "100"
  sorting: toplist
  toprange: [1d, 1w]
  order: desc
  ai_filter: "1"
  user_agent: walls-bot/1.0
database: sent.db
wait_time: 1800
openai_key: sk-file
mastodon:
  mastodon_server: https://mastodon.social
  mastodon_token: masto-file
ntfy:
  server: https://ntfy.sh
  topic: walls
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_yaml(FULL).unwrap();

        assert_eq!(config.wallhaven.toprange, vec!["1d", "1w"]);
        let params = config.wallhaven.search_params();
        assert_eq!(params.categories, "111");
        assert_eq!(params.ai_art_filter, "1");
        assert_eq!(config.wallhaven.user_agent, "walls-bot/1.0");
        assert_eq!(config.database, PathBuf::from("sent.db"));
        assert_eq!(config.wait_time(), Duration::from_secs(1800));
        assert_eq!(
            config.matrix.as_ref().unwrap().token_file,
            Some(PathBuf::from("matrix_token.txt"))
        );

        // Defaults for keys the file does not set
        assert_eq!(config.max_concurrent_items, 3);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.openai_model, "gpt-4o");

        config.validate().unwrap();
        assert_eq!(
            config.enabled_sinks(),
            vec![SinkKind::Matrix, SinkKind::Mastodon, SinkKind::Ntfy]
        );
    }

    #[test]
    fn test_sinks_list_restricts_enabled_sinks() {
        let raw = format!("{}\nsinks: [ntfy, matrix]\n", FULL);
        let config = Config::from_yaml(&raw).unwrap();
        assert_eq!(config.enabled_sinks(), vec![SinkKind::Matrix, SinkKind::Ntfy]);
    }

    #[test]
    fn test_missing_section_is_not_enabled() {
        let raw = r#"
wallhaven:
  toprange: [1d]
ntfy:
  server: https://ntfy.sh
  topic: walls
"#;
        let config = Config::from_yaml(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.enabled_sinks(), vec![SinkKind::Ntfy]);
    }

    #[test]
    fn test_listed_sink_without_section_is_rejected() {
        let raw = r#"
wallhaven:
  toprange: [1d]
sinks: [mastodon]
"#;
        let config = Config::from_yaml(raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mastodon"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::from_yaml(FULL).unwrap();
        config.wallhaven.toprange.clear();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        let mut config = Config::from_yaml(FULL).unwrap();
        config.max_concurrent_items = 0;
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        let mut config = Config::from_yaml(FULL).unwrap();
        config.wait_time = 0;
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("MASTODON_TOKEN", "masto-env"),
            ("MATRIX_PASSWORD", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::from_yaml(FULL).unwrap();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.openai_key, "sk-env");
        assert_eq!(config.mastodon.unwrap().mastodon_token, "masto-env");
        // Empty values do not clobber the file
        assert_eq!(config.matrix.unwrap().password, "hunter2");
        assert_eq!(config.wallhaven.api_token, "wh-key");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, FULL).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.wallhaven.toprange.len(), 2);

        let err = Config::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
