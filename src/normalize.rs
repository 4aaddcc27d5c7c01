//! Decision filtering, canonicalization and deduplication.

use crate::source::{Decision, DecisionType, Scope};
use ipnet::IpNet;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Severity class derived from a decision's scenario.
///
/// Declaration order is priority order: `Exploit` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Exploit,
    Bruteforce,
    Scan,
    Unclassified,
}

impl Severity {
    /// All classes, highest priority first.
    pub const ORDERED: [Severity; 4] = [
        Severity::Exploit,
        Severity::Bruteforce,
        Severity::Scan,
        Severity::Unclassified,
    ];

    /// Classify a scenario label by substring.
    pub fn from_scenario(scenario: &str) -> Self {
        let scenario = scenario.to_ascii_lowercase();
        if scenario.contains("exploit") {
            Severity::Exploit
        } else if scenario.contains("bruteforce") {
            Severity::Bruteforce
        } else if scenario.contains("scan") {
            Severity::Scan
        } else {
            Severity::Unclassified
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Exploit => "exploit",
            Severity::Bruteforce => "bruteforce",
            Severity::Scan => "scan",
            Severity::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// A normalized unit ready for prioritization and sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Canonical IP or CIDR string.
    pub address: String,
    /// Provenance, used as the remote item comment.
    pub annotation: String,
    pub severity: Severity,
}

impl Entry {
    pub(crate) fn severity_index(&self) -> usize {
        self.severity.index()
    }
}

/// Which decisions a surface admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub scopes: Vec<Scope>,
    pub ban_only: bool,
}

impl FilterSpec {
    /// IPs and ranges, any decision type.
    pub fn ip_and_range() -> Self {
        Self {
            scopes: vec![Scope::Ip, Scope::Range],
            ban_only: false,
        }
    }

    /// Ban decisions of any scope.
    pub fn bans() -> Self {
        Self {
            scopes: vec![Scope::Ip, Scope::Range, Scope::Other],
            ban_only: true,
        }
    }

    pub fn admits(&self, decision: &Decision) -> bool {
        if self.ban_only && decision.kind != DecisionType::Ban {
            return false;
        }
        self.scopes.contains(&decision.scope)
    }
}

/// Canonical text form of an IP address or CIDR range.
///
/// Host bits are cleared, so `10.0.0.1/8` becomes `10.0.0.0/8`.
pub fn canonical_address(value: &str) -> Option<String> {
    let value = value.trim();

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip.to_string());
    }

    if let Ok(net) = value.parse::<IpNet>() {
        return Some(net.trunc().to_string());
    }

    None
}

/// Turn raw decisions into a deduplicated entry sequence for one surface.
///
/// Input order is preserved. When an address appears more than once the
/// first occurrence wins, including its annotation. Overlapping CIDR ranges
/// are distinct entries.
pub fn normalize(decisions: &[Decision], filter: &FilterSpec, label: &str) -> Vec<Entry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut rejected = 0usize;

    for decision in decisions {
        if !filter.admits(decision) {
            rejected += 1;
            continue;
        }

        let Some(address) = canonical_address(&decision.value) else {
            warn!(value = %decision.value, scope = ?decision.scope, "Skipping decision with invalid address");
            continue;
        };

        if !seen.insert(address.clone()) {
            continue;
        }

        entries.push(Entry {
            address,
            annotation: format!("{}: {}", label, decision.scenario),
            severity: Severity::from_scenario(&decision.scenario),
        });
    }

    debug!(
        decisions = decisions.len(),
        rejected = rejected,
        entries = entries.len(),
        "Normalized decisions"
    );

    entries
}
