//! Sync pipeline: fetch, normalize, prioritize, drift-check, apply.

use crate::config::Config;
use crate::edge::{EdgeApi, ListItem, RuleEdit};
use crate::error::{Result, SyncError};
use crate::guard::{check_identity, find_rule};
use crate::normalize::{normalize, Entry, FilterSpec};
use crate::plan::{Mode, Surface, SyncPlan, SyncResult};
use crate::prioritize::{prioritize, Prioritized};
use crate::source::{fetch_decisions, DecisionQuery, DecisionSource};
use tracing::info;

/// Label used for annotations on surfaces that do not store them.
const PLAIN_LABEL: &str = "CrowdSec";

/// Build the WAF expression matching every entry, in plan order.
pub fn build_waf_expression(entries: &[Entry]) -> String {
    let addresses = entries
        .iter()
        .map(|e| e.address.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("(ip.src in {{{}}})", addresses)
}

/// Serialize plan addresses as the KV value (a JSON array of strings).
pub fn kv_value(entries: &[Entry]) -> String {
    let addresses: Vec<&str> = entries.iter().map(|e| e.address.as_str()).collect();
    serde_json::Value::from(addresses).to_string()
}

/// Runs sync passes for one configuration.
///
/// Each pass is sequential and stateless. Concurrent runs against the same
/// remote resources are not coordinated; the last full replace wins.
pub struct Syncer<'a> {
    config: &'a Config,
    api: &'a dyn EdgeApi,
    source: &'a dyn DecisionSource,
}

impl<'a> Syncer<'a> {
    pub fn new(config: &'a Config, api: &'a dyn EdgeApi, source: &'a dyn DecisionSource) -> Self {
        Self {
            config,
            api,
            source,
        }
    }

    /// Validate, then sync each surface in order. The first error aborts.
    pub async fn run(&self, surfaces: &[Surface], mode: Mode) -> Result<Vec<SyncResult>> {
        self.config.validate_for(surfaces)?;

        let mut results = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            results.push(self.sync(*surface, mode).await?);
        }
        Ok(results)
    }

    /// Sync a single surface.
    pub async fn sync(&self, surface: Surface, mode: Mode) -> Result<SyncResult> {
        info!(surface = %surface, mode = ?mode, "Starting sync");
        match surface {
            Surface::IpList => self.sync_ip_list(mode).await,
            Surface::Kv => self.sync_kv(mode).await,
            Surface::WafRule => self.sync_waf_rule(mode).await,
        }
    }

    /// Fetch, normalize and prioritize entries for a surface.
    ///
    /// Fails when nothing is left to sync: writing an empty set would wipe
    /// the remote resource.
    async fn collect(
        &self,
        surface: Surface,
        query: &DecisionQuery,
        filter: &FilterSpec,
        label: &str,
        capacity: usize,
    ) -> Result<Prioritized> {
        let fetch = fetch_decisions(self.source, query).await;
        if let Some(reason) = fetch.unavailable {
            return Err(SyncError::SourceUnavailable(reason));
        }

        let entries = normalize(&fetch.decisions, filter, label);
        if entries.is_empty() {
            return Err(SyncError::NoEntries {
                surface: surface.to_string(),
            });
        }

        Ok(prioritize(entries, capacity))
    }

    /// Replace the IP list contents with the prioritized entries.
    pub async fn sync_ip_list(&self, mode: Mode) -> Result<SyncResult> {
        let cfg = self.config.ip_list()?;

        let selected = self
            .collect(
                Surface::IpList,
                &cfg.query,
                &FilterSpec::ip_and_range(),
                &cfg.label,
                cfg.max_items,
            )
            .await?;
        require_entries(Surface::IpList, &selected)?;

        let identity = check_identity(self.api, &cfg.list_id, &cfg.list_name).await?;

        let plan = SyncPlan {
            surface: Surface::IpList,
            target: format!("{} ({})", cfg.list_name, cfg.list_id),
            entries: selected.entries,
            truncated: selected.truncated,
            mode,
        };
        let mut result = SyncResult::from_plan(&plan);

        if mode.is_dry_run() {
            log_dry_run(&plan);
            return Ok(result);
        }

        let items: Vec<ListItem> = plan
            .entries
            .iter()
            .map(|e| ListItem {
                ip: e.address.clone(),
                comment: e.annotation.clone(),
            })
            .collect();

        let operation_id = self.api.replace_list_items(&cfg.list_id, &items).await?;

        info!(
            resource = %plan.target,
            entries = items.len(),
            previous_items = identity.item_count,
            operation_id = %operation_id,
            "IP list synced"
        );

        result.operation_id = Some(operation_id);
        Ok(result)
    }

    /// Write the address set to the KV key.
    pub async fn sync_kv(&self, mode: Mode) -> Result<SyncResult> {
        let cfg = self.config.kv()?;

        let selected = self
            .collect(
                Surface::Kv,
                &cfg.query,
                &FilterSpec::ip_and_range(),
                PLAIN_LABEL,
                cfg.max_items.unwrap_or(usize::MAX),
            )
            .await?;
        require_entries(Surface::Kv, &selected)?;

        let plan = SyncPlan {
            surface: Surface::Kv,
            target: format!("{}/{}", cfg.namespace_id, cfg.key_name),
            entries: selected.entries,
            truncated: selected.truncated,
            mode,
        };
        let result = SyncResult::from_plan(&plan);

        if mode.is_dry_run() {
            log_dry_run(&plan);
            return Ok(result);
        }

        let value = kv_value(&plan.entries);
        self.api
            .put_kv_value(&cfg.namespace_id, &cfg.key_name, &value, &cfg.metadata)
            .await?;

        info!(resource = %plan.target, entries = plan.entries.len(), "KV value synced");
        Ok(result)
    }

    /// Replace the WAF rule expression, keeping the rule's other fields.
    pub async fn sync_waf_rule(&self, mode: Mode) -> Result<SyncResult> {
        let cfg = self.config.waf_rule()?;

        let selected = self
            .collect(
                Surface::WafRule,
                &cfg.query,
                &FilterSpec::bans(),
                PLAIN_LABEL,
                cfg.max_items.unwrap_or(usize::MAX),
            )
            .await?;

        let ruleset = self.api.get_ruleset(&cfg.zone_id, &cfg.ruleset_id).await?;
        let rule = find_rule(&ruleset, &cfg.rule_id)?;

        let plan = SyncPlan {
            surface: Surface::WafRule,
            target: format!("{}/{}/{}", cfg.zone_id, cfg.ruleset_id, cfg.rule_id),
            entries: selected.entries,
            truncated: selected.truncated,
            mode,
        };

        if plan.entries.is_empty() {
            return Err(SyncError::EmptyExpression {
                rule_id: cfg.rule_id.clone(),
            });
        }

        let expression = build_waf_expression(&plan.entries);
        let mut result = SyncResult::from_plan(&plan);
        result.new_expression = Some(expression.clone());

        if mode.is_dry_run() {
            log_dry_run(&plan);
            info!(
                rule_id = %rule.id,
                version = %rule.version,
                current_expression = %rule.expression,
                new_expression = %expression,
                "Dry run: rule expression not changed"
            );
            result.current_expression = Some(rule.expression);
            return Ok(result);
        }

        let edit = RuleEdit::replace_expression(&rule, expression);
        self.api
            .edit_rule(&cfg.zone_id, &cfg.ruleset_id, &cfg.rule_id, &edit)
            .await?;

        info!(
            resource = %plan.target,
            entries = plan.entries.len(),
            previous_version = %rule.version,
            "WAF rule synced"
        );
        Ok(result)
    }
}

/// A zero capacity can still empty the selection after prioritizing; a full
/// replace with nothing would wipe the list or key.
fn require_entries(surface: Surface, selected: &Prioritized) -> Result<()> {
    if selected.entries.is_empty() {
        return Err(SyncError::NoEntries {
            surface: surface.to_string(),
        });
    }
    Ok(())
}

fn log_dry_run(plan: &SyncPlan) {
    info!(
        surface = %plan.surface,
        resource = %plan.target,
        entries = plan.entries.len(),
        truncated = plan.truncated,
        "Dry run: nothing sent"
    );
}
