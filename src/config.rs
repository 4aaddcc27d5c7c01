//! Configuration types for the sync.

use crate::error::SyncError;
use crate::plan::Surface;
use crate::source::DecisionQuery;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Account and API settings.
    #[serde(default)]
    pub settings: Settings,

    /// Decision source invocation.
    #[serde(default)]
    pub source: SourceConfig,

    /// IP list surface.
    #[serde(default)]
    pub ip_list: Option<IpListConfig>,

    /// KV surface.
    #[serde(default)]
    pub kv: Option<KvConfig>,

    /// WAF rule surface.
    #[serde(default)]
    pub waf_rule: Option<WafRuleConfig>,
}

/// Account and API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Account identifier (supports ${ENV_VAR} syntax).
    #[serde(default)]
    pub account_id: String,

    /// API token (supports ${ENV_VAR} syntax).
    #[serde(default)]
    pub api_token: String,

    /// API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            api_token: String::new(),
            api_base_url: default_api_base_url(),
            timeout_ms: default_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

/// Decision source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Path to the cscli binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Kill the listing if it runs longer than this.
    #[serde(default = "default_source_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_seconds: default_source_timeout(),
        }
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("cscli")
}

fn default_source_timeout() -> u64 {
    60
}

/// IP list surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IpListConfig {
    /// Remote list identifier.
    #[serde(default)]
    pub list_id: String,

    /// Expected name of the remote list; the sync aborts on mismatch.
    #[serde(default)]
    pub list_name: String,

    /// Maximum number of items the list may hold.
    #[serde(default = "default_list_capacity")]
    pub max_items: usize,

    /// Which decisions to list.
    #[serde(default = "DecisionQuery::community_blocklist")]
    pub query: DecisionQuery,

    /// Prefix of every item comment.
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_list_capacity() -> usize {
    9900
}

fn default_label() -> String {
    "CrowdSec CAPI".to_string()
}

/// KV surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KvConfig {
    #[serde(default)]
    pub namespace_id: String,

    #[serde(default)]
    pub key_name: String,

    /// Optional cap on the number of addresses written.
    #[serde(default)]
    pub max_items: Option<usize>,

    #[serde(default = "DecisionQuery::community_blocklist")]
    pub query: DecisionQuery,

    /// Metadata string stored alongside the value.
    #[serde(default)]
    pub metadata: String,
}

/// WAF rule surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WafRuleConfig {
    #[serde(default)]
    pub zone_id: String,

    #[serde(default)]
    pub ruleset_id: String,

    #[serde(default)]
    pub rule_id: String,

    /// Optional cap on the number of addresses in the expression.
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Defaults to every local ban, regardless of origin.
    #[serde(default)]
    pub query: DecisionQuery,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    /// Build configuration from process environment variables, filling
    /// gaps from `./.env` when present.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_file(Path::new(".env"))
    }

    /// Like [`Config::from_env`] with an explicit dotenv file. Process
    /// variables win over the file; a missing file is not an error.
    pub fn from_env_file(path: &Path) -> anyhow::Result<Self> {
        let file_vars = read_dotenv(path)?;
        Ok(Self::from_lookup(|name| env_or_file(&file_vars, name)))
    }

    /// Build configuration from named variables.
    ///
    /// A surface is configured when any of its variables is set; missing
    /// ones are then reported by [`Config::validate_for`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).unwrap_or_default();
        let any_set = |names: &[&str]| names.iter().any(|n| !var(n).is_empty());

        let settings = Settings {
            account_id: var("CLOUDFLARE_ACCOUNT_ID"),
            api_token: var("CLOUDFLARE_API_TOKEN"),
            ..Settings::default()
        };

        let ip_list = any_set(&["CLOUDFLARE_LIST_ID", "CLOUDFLARE_LIST_NAME"]).then(|| {
            IpListConfig {
                list_id: var("CLOUDFLARE_LIST_ID"),
                list_name: var("CLOUDFLARE_LIST_NAME"),
                max_items: default_list_capacity(),
                query: DecisionQuery::community_blocklist(),
                label: default_label(),
            }
        });

        let kv = any_set(&["KV_NAMESPACE_ID", "KV_KEY_NAME"]).then(|| KvConfig {
            namespace_id: var("KV_NAMESPACE_ID"),
            key_name: var("KV_KEY_NAME"),
            max_items: None,
            query: DecisionQuery::community_blocklist(),
            metadata: String::new(),
        });

        let waf_rule = any_set(&[
            "CLOUDFLARE_ZONE_ID",
            "CLOUDFLARE_RULESET_ID",
            "CLOUDFLARE_RULE_ID",
        ])
        .then(|| WafRuleConfig {
            zone_id: var("CLOUDFLARE_ZONE_ID"),
            ruleset_id: var("CLOUDFLARE_RULESET_ID"),
            rule_id: var("CLOUDFLARE_RULE_ID"),
            max_items: None,
            query: DecisionQuery::default(),
        });

        Config {
            settings,
            source: SourceConfig::default(),
            ip_list,
            kv,
            waf_rule,
        }
    }

    /// Surfaces that have a configuration section.
    pub fn configured_surfaces(&self) -> Vec<Surface> {
        Surface::ALL
            .into_iter()
            .filter(|s| match s {
                Surface::IpList => self.ip_list.is_some(),
                Surface::Kv => self.kv.is_some(),
                Surface::WafRule => self.waf_rule.is_some(),
            })
            .collect()
    }

    /// Validate everything the given surfaces need, before any network call.
    pub fn validate_for(&self, surfaces: &[Surface]) -> Result<(), SyncError> {
        if surfaces.is_empty() {
            return Err(SyncError::config("no surface configured"));
        }

        require("settings.account_id", &self.settings.account_id)?;
        require("settings.api_token", &self.settings.api_token)?;
        require("settings.api_base_url", &self.settings.api_base_url)?;
        if self.settings.timeout_ms == 0 {
            return Err(SyncError::config("settings.timeout_ms must be > 0"));
        }
        if self.source.timeout_seconds == 0 {
            return Err(SyncError::config("source.timeout_seconds must be > 0"));
        }

        for surface in surfaces {
            match surface {
                Surface::IpList => {
                    let list = self.ip_list()?;
                    require("ip_list.list_id", &list.list_id)?;
                    require("ip_list.list_name", &list.list_name)?;
                }
                Surface::Kv => {
                    let kv = self.kv()?;
                    require("kv.namespace_id", &kv.namespace_id)?;
                    require("kv.key_name", &kv.key_name)?;
                }
                Surface::WafRule => {
                    let waf = self.waf_rule()?;
                    require("waf_rule.zone_id", &waf.zone_id)?;
                    require("waf_rule.ruleset_id", &waf.ruleset_id)?;
                    require("waf_rule.rule_id", &waf.rule_id)?;
                }
            }
        }

        Ok(())
    }

    pub fn ip_list(&self) -> Result<&IpListConfig, SyncError> {
        self.ip_list
            .as_ref()
            .ok_or_else(|| SyncError::config("ip_list section is missing"))
    }

    pub fn kv(&self) -> Result<&KvConfig, SyncError> {
        self.kv
            .as_ref()
            .ok_or_else(|| SyncError::config("kv section is missing"))
    }

    pub fn waf_rule(&self) -> Result<&WafRuleConfig, SyncError> {
        self.waf_rule
            .as_ref()
            .ok_or_else(|| SyncError::config("waf_rule section is missing"))
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Edge blocklist sync configuration

settings:
  account_id: "${CLOUDFLARE_ACCOUNT_ID}"
  api_token: "${CLOUDFLARE_API_TOKEN}"   # Use environment variable
  timeout_ms: 30000                     # Per-request timeout, no retries

# Decision source (cscli decisions list -o json)
source:
  binary: "cscli"
  timeout_seconds: 60

# Account IP list, fully replaced on every run
ip_list:
  list_id: "${CLOUDFLARE_LIST_ID}"
  list_name: "crowdsec-blocklist"       # Sync aborts if the remote name differs
  max_items: 9900                       # Most severe scenarios kept first
  label: "CrowdSec CAPI"
  query:
    all: true
    origin: "CAPI"

# KV value holding a JSON array of addresses (optional)
kv:
  namespace_id: "${KV_NAMESPACE_ID}"
  key_name: "blocklist"
  query:
    all: true
    origin: "CAPI"

# WAF rule whose expression lists banned source IPs (optional)
waf_rule:
  zone_id: "${CLOUDFLARE_ZONE_ID}"
  ruleset_id: "${CLOUDFLARE_RULESET_ID}"
  rule_id: "${CLOUDFLARE_RULE_ID}"
"#
        .to_string()
    }
}

/// Parse a dotenv file without touching the process environment.
fn read_dotenv(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path)? {
        let (key, value) = item?;
        vars.insert(key, value);
    }
    tracing::debug!(path = %path.display(), vars = vars.len(), "Loaded dotenv file");
    Ok(vars)
}

fn env_or_file(file_vars: &HashMap<String, String>, name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .or_else(|| file_vars.get(name).cloned())
}

fn require(field: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::config(format!("{} is required", field)));
    }
    Ok(())
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid");
    re.replace_all(content, |cap: &regex::Captures| {
        std::env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn full_config() -> Config {
        let yaml = r#"
settings:
  account_id: "acc"
  api_token: "token"
ip_list:
  list_id: "l1"
  list_name: "crowdsec-blocklist"
kv:
  namespace_id: "ns"
  key_name: "blocklist"
waf_rule:
  zone_id: "z"
  ruleset_id: "rs"
  rule_id: "r"
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = full_config();
        let list = config.ip_list().unwrap();
        assert_eq!(list.max_items, 9900);
        assert_eq!(list.label, "CrowdSec CAPI");
        assert_eq!(list.query, DecisionQuery::community_blocklist());
        assert_eq!(config.waf_rule().unwrap().query, DecisionQuery::default());
        assert_eq!(config.settings.timeout_ms, 30_000);
        assert_eq!(config.source.binary, PathBuf::from("cscli"));
        assert_eq!(config.configured_surfaces(), Surface::ALL.to_vec());
    }

    #[test]
    fn test_validate_ok() {
        assert!(full_config().validate_for(&Surface::ALL).is_ok());
    }

    #[test]
    fn test_validate_missing_token() {
        let mut config = full_config();
        config.settings.api_token = String::new();
        let err = config.validate_for(&[Surface::Kv]).unwrap_err();
        assert!(matches!(err, SyncError::Config(msg) if msg.contains("api_token")));
    }

    #[test]
    fn test_validate_missing_surface_field() {
        let mut config = full_config();
        if let Some(list) = config.ip_list.as_mut() {
            list.list_name = " ".to_string();
        }
        assert!(config.validate_for(&[Surface::Kv]).is_ok());
        assert!(config.validate_for(&[Surface::IpList]).is_err());
    }

    #[test]
    fn test_validate_unconfigured_surface() {
        let mut config = full_config();
        config.waf_rule = None;
        assert!(config.validate_for(&[Surface::WafRule]).is_err());
        assert_eq!(config.configured_surfaces(), vec![Surface::IpList, Surface::Kv]);
    }

    #[test]
    fn test_validate_no_surfaces() {
        assert!(full_config().validate_for(&[]).is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("CLOUDFLARE_LIST_ID", "l1"),
            ("CLOUDFLARE_LIST_NAME", "crowdsec-blocklist"),
            ("CLOUDFLARE_RULE_ID", "r"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.settings.account_id, "acc");
        assert_eq!(config.ip_list().unwrap().list_name, "crowdsec-blocklist");
        assert!(config.kv.is_none());
        assert_eq!(
            config.configured_surfaces(),
            vec![Surface::IpList, Surface::WafRule]
        );
        assert!(config.validate_for(&[Surface::IpList]).is_ok());
        // Zone and ruleset ids are missing.
        assert!(config.validate_for(&[Surface::WafRule]).is_err());
    }

    #[test]
    fn test_env_file_fills_missing_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# operator settings\n\
             EDGE_SYNC_TEST_ONLY=1\n\
             CLOUDFLARE_LIST_ID=l1\n\
             CLOUDFLARE_LIST_NAME=\"crowdsec-blocklist\"\n\
             PATH=/from/dotenv"
        )
        .unwrap();
        file.flush().unwrap();

        let vars = read_dotenv(file.path()).unwrap();
        assert_eq!(vars.get("CLOUDFLARE_LIST_NAME").map(String::as_str), Some("crowdsec-blocklist"));
        assert_eq!(vars.len(), 4);

        // The process environment wins over the file.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(env_or_file(&vars, "PATH"), Some(path));
        assert_eq!(env_or_file(&vars, "EDGE_SYNC_TEST_ONLY").as_deref(), Some("1"));

        let config = Config::from_env_file(file.path()).unwrap();
        let list = config.ip_list().unwrap();
        assert_eq!(list.list_id, "l1");
        assert_eq!(list.list_name, "crowdsec-blocklist");
    }

    #[test]
    fn test_env_file_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_dotenv(&dir.path().join(".env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let input = "api_token: \"${EDGE_SYNC_NONEXISTENT_VAR}\"";
        assert_eq!(expand_env_vars(input), "api_token: \"\"");
    }

    #[test]
    fn test_expand_env_vars_from_path() {
        // PATH is always set; avoids mutating the environment.
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("p: ${PATH}"), format!("p: {}", path));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "settings:\n  account_id: acc\n  api_token: t\nkv:\n  namespace_id: ns\n  key_name: k\n  max_items: 10\n"
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.kv().unwrap().max_items, Some(10));
        assert!(config.validate_for(&config.configured_surfaces()).is_ok());
    }

    #[test]
    fn test_example_parses() {
        let config: Config = serde_yaml::from_str(&Config::example()).unwrap();
        assert_eq!(config.configured_surfaces(), Surface::ALL.to_vec());
        assert_eq!(config.ip_list().unwrap().list_name, "crowdsec-blocklist");
    }
}
