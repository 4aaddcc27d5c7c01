//! Edge platform surfaces.

pub mod cloudflare;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata of a remote IP list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub num_items: u64,
}

/// One item written to a remote IP list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub ip: String,
    pub comment: String,
}

/// A single rule within a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub expression: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A ruleset and its rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ruleset {
    pub id: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Body of an in-place rule edit.
///
/// Everything except the expression is copied from the fetched rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEdit {
    pub id: String,
    pub action: String,
    pub description: String,
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl RuleEdit {
    /// Copy `rule` with a new expression.
    pub fn replace_expression(rule: &Rule, expression: String) -> Self {
        Self {
            id: rule.id.clone(),
            action: rule.action.clone(),
            description: rule.description.clone(),
            expression,
            enabled: rule.enabled,
        }
    }
}

/// Error from a remote call.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Http(e)
        }
    }
}

/// Calls against the edge platform.
///
/// `get_*` are reads; the rest mutate remote state.
#[async_trait]
pub trait EdgeApi: Send + Sync {
    async fn get_list(&self, list_id: &str) -> Result<ListInfo, RemoteError>;

    /// Replace the full contents of a list. Returns the operation id.
    async fn replace_list_items(
        &self,
        list_id: &str,
        items: &[ListItem],
    ) -> Result<String, RemoteError>;

    async fn put_kv_value(
        &self,
        namespace_id: &str,
        key: &str,
        value: &str,
        metadata: &str,
    ) -> Result<(), RemoteError>;

    async fn get_ruleset(&self, zone_id: &str, ruleset_id: &str) -> Result<Ruleset, RemoteError>;

    async fn edit_rule(
        &self,
        zone_id: &str,
        ruleset_id: &str,
        rule_id: &str,
        edit: &RuleEdit,
    ) -> Result<(), RemoteError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_edit_preserves_fields() {
        let rule = Rule {
            id: "r1".to_string(),
            expression: "(ip.src in {1.1.1.1})".to_string(),
            action: "block".to_string(),
            description: "CrowdSec bans".to_string(),
            version: "3".to_string(),
            enabled: Some(true),
        };

        let edit = RuleEdit::replace_expression(&rule, "(ip.src in {2.2.2.2})".to_string());
        assert_eq!(edit.id, "r1");
        assert_eq!(edit.action, "block");
        assert_eq!(edit.description, "CrowdSec bans");
        assert_eq!(edit.enabled, Some(true));
        assert_eq!(edit.expression, "(ip.src in {2.2.2.2})");
    }

    #[test]
    fn test_rule_deserializes_sparse() {
        let rule: Rule = serde_json::from_str(r#"{"id": "r1", "action": "block"}"#).unwrap();
        assert_eq!(rule.expression, "");
        assert!(rule.enabled.is_none());
    }
}
