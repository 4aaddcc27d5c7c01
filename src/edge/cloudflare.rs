//! Cloudflare v4 API client.

use super::{EdgeApi, ListInfo, ListItem, RemoteError, RuleEdit, Ruleset};
use crate::config::Settings;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Standard v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct BulkOperation {
    operation_id: String,
}

/// Cloudflare API client scoped to one account.
pub struct CloudflareClient {
    client: Client,
    base_url: String,
    account_id: String,
    api_token: String,
}

impl CloudflareClient {
    /// Create a new client. Every request is bounded by `settings.timeout_ms`.
    pub fn new(settings: &Settings) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(concat!("edge-blocklist-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            account_id: settings.account_id.clone(),
            api_token: settings.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of a KV value. Each segment is percent-encoded, so a key holding
    /// `/`, `?` or `#` still addresses exactly that key.
    fn kv_value_url(&self, namespace_id: &str, key: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::InvalidResponse(format!("invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidResponse("API base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend([
                "accounts",
                self.account_id.as_str(),
                "storage",
                "kv",
                "namespaces",
                namespace_id,
                "values",
                key,
            ]);
        Ok(url)
    }

    /// Send a request and unwrap the envelope. No retries.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, RemoteError> {
        let response = request.bearer_auth(&self.api_token).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Cloudflare rate limit exceeded");
            return Err(RemoteError::RateLimited);
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                RemoteError::InvalidResponse(format!("Failed to parse response: {}", e))
            } else {
                RemoteError::Api {
                    status: status.as_u16(),
                    message: body.chars().take(200).collect(),
                }
            }
        })?;

        if !status.is_success() || !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(envelope.result)
    }

    async fn execute_required<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        self.execute(request)
            .await?
            .ok_or_else(|| RemoteError::InvalidResponse("missing result".to_string()))
    }
}

#[async_trait]
impl EdgeApi for CloudflareClient {
    async fn get_list(&self, list_id: &str) -> Result<ListInfo, RemoteError> {
        let url = self.url(&format!(
            "/accounts/{}/rules/lists/{}",
            self.account_id, list_id
        ));
        debug!(list_id = %list_id, "Fetching IP list metadata");
        self.execute_required(self.client.get(url)).await
    }

    async fn replace_list_items(
        &self,
        list_id: &str,
        items: &[ListItem],
    ) -> Result<String, RemoteError> {
        let url = self.url(&format!(
            "/accounts/{}/rules/lists/{}/items",
            self.account_id, list_id
        ));
        debug!(list_id = %list_id, items = items.len(), "Replacing IP list items");
        let op: BulkOperation = self
            .execute_required(self.client.put(url).json(items))
            .await?;
        Ok(op.operation_id)
    }

    async fn put_kv_value(
        &self,
        namespace_id: &str,
        key: &str,
        value: &str,
        metadata: &str,
    ) -> Result<(), RemoteError> {
        let url = self.kv_value_url(namespace_id, key)?;

        let mut form = reqwest::multipart::Form::new().text("value", value.to_string());
        if !metadata.is_empty() {
            form = form.text("metadata", metadata.to_string());
        }

        debug!(namespace_id = %namespace_id, key = %key, bytes = value.len(), "Writing KV value");
        self.execute::<serde_json::Value>(self.client.put(url).multipart(form))
            .await?;
        Ok(())
    }

    async fn get_ruleset(&self, zone_id: &str, ruleset_id: &str) -> Result<Ruleset, RemoteError> {
        let url = self.url(&format!("/zones/{}/rulesets/{}", zone_id, ruleset_id));
        debug!(zone_id = %zone_id, ruleset_id = %ruleset_id, "Fetching ruleset");
        self.execute_required(self.client.get(url)).await
    }

    async fn edit_rule(
        &self,
        zone_id: &str,
        ruleset_id: &str,
        rule_id: &str,
        edit: &RuleEdit,
    ) -> Result<(), RemoteError> {
        let url = self.url(&format!(
            "/zones/{}/rulesets/{}/rules/{}",
            zone_id, ruleset_id, rule_id
        ));
        debug!(rule_id = %rule_id, bytes = edit.expression.len(), "Editing rule expression");
        self.execute::<serde_json::Value>(self.client.patch(url).json(edit))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            account_id: "acc".to_string(),
            api_token: "token".to_string(),
            api_base_url: "https://api.example.test/client/v4/".to_string(),
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_url_joins_base() {
        let client = CloudflareClient::new(&settings()).unwrap();
        assert_eq!(
            client.url("/accounts/acc/rules/lists/l1"),
            "https://api.example.test/client/v4/accounts/acc/rules/lists/l1"
        );
    }

    #[test]
    fn test_kv_url_encodes_key() {
        let client = CloudflareClient::new(&settings()).unwrap();

        let url = client.kv_value_url("ns", "blocklist").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/client/v4/accounts/acc/storage/kv/namespaces/ns/values/blocklist"
        );

        for (key, encoded) in [
            ("crowdsec#ips", "crowdsec%23ips"),
            ("crowdsec?v=2", "crowdsec%3Fv=2"),
            ("lists/crowdsec", "lists%2Fcrowdsec"),
        ] {
            let url = client.kv_value_url("ns", key).unwrap();
            let request = client.client.put(url).build().unwrap();
            assert_eq!(
                request.url().path(),
                format!("/client/v4/accounts/acc/storage/kv/namespaces/ns/values/{}", encoded)
            );
            assert!(request.url().query().is_none());
            assert!(request.url().fragment().is_none());
        }
    }

    #[test]
    fn test_envelope_parse() {
        let body = r#"{"success": true, "errors": [], "messages": [],
            "result": {"id": "l1", "name": "crowdsec-blocklist", "num_items": 42, "kind": "ip"}}"#;
        let envelope: Envelope<ListInfo> = serde_json::from_str(body).unwrap();
        assert!(envelope.success);
        let list = envelope.result.unwrap();
        assert_eq!(list.name, "crowdsec-blocklist");
        assert_eq!(list.num_items, 42);
    }

    #[test]
    fn test_envelope_errors_parse() {
        let body = r#"{"success": false, "errors": [{"code": 10000, "message": "Authentication error"}], "result": null}"#;
        let envelope: Envelope<ListInfo> = serde_json::from_str(body).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
        assert_eq!(envelope.errors[0].code, 10000);
    }

    #[test]
    fn test_list_item_serializes() {
        let items = vec![ListItem {
            ip: "1.2.3.4".to_string(),
            comment: "CrowdSec CAPI: http:exploit".to_string(),
        }];
        assert_eq!(
            serde_json::to_string(&items).unwrap(),
            r#"[{"ip":"1.2.3.4","comment":"CrowdSec CAPI: http:exploit"}]"#
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let mut s = settings();
        s.api_base_url = "http://127.0.0.1:1".to_string();
        let client = CloudflareClient::new(&s).unwrap();
        assert!(client.get_list("l1").await.is_err());
    }
}
