//! Computed sync plans and their results.

use crate::normalize::Entry;
use serde::Serialize;
use std::fmt;

/// One of the remote targets a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Surface {
    /// Account IP list used by firewall rules.
    IpList,
    /// Single KV value read by edge logic.
    Kv,
    /// Expression of one WAF rule.
    WafRule,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::IpList, Surface::Kv, Surface::WafRule];
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Surface::IpList => "ip-list",
            Surface::Kv => "kv",
            Surface::WafRule => "waf-rule",
        };
        f.write_str(s)
    }
}

/// Whether a run mutates remote state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    DryRun,
    #[default]
    Apply,
}

impl Mode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Mode::DryRun
        } else {
            Mode::Apply
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == Mode::DryRun
    }
}

/// The computed, not yet applied result of one surface sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub surface: Surface,
    /// Human-readable target, e.g. `crowdsec-blocklist (abc123)`.
    pub target: String,
    pub entries: Vec<Entry>,
    pub truncated: bool,
    pub mode: Mode,
}

impl SyncPlan {
    pub fn addresses(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.address.as_str()).collect()
    }
}

/// Outcome of applying (or dry-running) a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub surface: Surface,
    pub target: String,
    pub applied_count: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub mode: Mode,
    /// For WAF dry runs: the expression currently installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_expression: Option<String>,
    /// For WAF runs: the expression computed by this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_expression: Option<String>,
    /// Dry runs only: the addresses that would have been sent.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

impl SyncResult {
    pub(crate) fn from_plan(plan: &SyncPlan) -> Self {
        Self {
            surface: plan.surface,
            target: plan.target.clone(),
            applied_count: plan.entries.len(),
            truncated: plan.truncated,
            operation_id: None,
            mode: plan.mode,
            current_expression: None,
            new_expression: None,
            addresses: if plan.mode.is_dry_run() {
                plan.addresses().into_iter().map(str::to_string).collect()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Severity;

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(Mode::from_dry_run(true), Mode::DryRun);
        assert_eq!(Mode::from_dry_run(false), Mode::Apply);
        assert!(Mode::DryRun.is_dry_run());
    }

    #[test]
    fn test_surface_display() {
        assert_eq!(Surface::IpList.to_string(), "ip-list");
        assert_eq!(Surface::WafRule.to_string(), "waf-rule");
    }

    #[test]
    fn test_plan_serializes_for_dry_run_echo() {
        let plan = SyncPlan {
            surface: Surface::IpList,
            target: "crowdsec-blocklist (l1)".to_string(),
            entries: vec![Entry {
                address: "1.2.3.4".to_string(),
                annotation: "CrowdSec CAPI: http:exploit".to_string(),
                severity: Severity::Exploit,
            }],
            truncated: false,
            mode: Mode::DryRun,
        };

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["surface"], "ip-list");
        assert_eq!(json["mode"], "dry-run");
        assert_eq!(json["entries"][0]["severity"], "exploit");
        assert_eq!(plan.addresses(), vec!["1.2.3.4"]);

        let result = SyncResult::from_plan(&plan);
        assert_eq!(result.addresses, vec!["1.2.3.4".to_string()]);
        assert_eq!(result.applied_count, 1);
    }
}
