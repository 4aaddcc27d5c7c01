//! Decision sources.

pub mod cscli;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

/// What kind of network object a decision value denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Ip,
    Range,
    Other,
}

impl Scope {
    /// Parse the scope string reported by the engine (case-insensitive).
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ip") {
            Scope::Ip
        } else if s.eq_ignore_ascii_case("range") {
            Scope::Range
        } else {
            Scope::Other
        }
    }
}

/// Disposition the engine assigned to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionType {
    Ban,
    Other,
}

impl DecisionType {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ban") {
            DecisionType::Ban
        } else {
            DecisionType::Other
        }
    }
}

/// One raw record from the local decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// IP address or CIDR range.
    pub value: String,
    pub scope: Scope,
    pub kind: DecisionType,
    /// Label of the scenario that produced the decision, e.g. `http:exploit`.
    pub scenario: String,
    /// Where the decision came from (`CAPI`, `cscli`, `crowdsec`, ...).
    pub origin: Option<String>,
}

impl Decision {
    /// Build an IP-scoped ban decision.
    pub fn ban(value: &str, scenario: &str) -> Self {
        Self {
            value: value.to_string(),
            scope: Scope::Ip,
            kind: DecisionType::Ban,
            scenario: scenario.to_string(),
            origin: None,
        }
    }

    /// Override the scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Override the decision type.
    pub fn with_kind(mut self, kind: DecisionType) -> Self {
        self.kind = kind;
        self
    }
}

/// Filters passed to the decision listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DecisionQuery {
    /// Include decisions from every origin, not just local ones (`-a`).
    #[serde(default)]
    pub all: bool,

    /// Restrict to a single origin such as `CAPI`.
    #[serde(default)]
    pub origin: Option<String>,
}

impl DecisionQuery {
    /// Community blocklist decisions (`-a --origin CAPI`).
    pub fn community_blocklist() -> Self {
        Self {
            all: true,
            origin: Some("CAPI".to_string()),
        }
    }

    /// Arguments passed to `cscli`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["decisions".to_string(), "list".to_string()];
        if self.all {
            args.push("-a".to_string());
        }
        if let Some(origin) = &self.origin {
            args.push("--origin".to_string());
            args.push(origin.clone());
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        args
    }
}

/// Error from a decision source invocation.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to start decision source: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("decision source timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("decision source exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("decision source produced no output")]
    EmptyOutput,

    #[error("unparsable decision source output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Something that can list decisions.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// List decisions matching the query.
    async fn list(&self, query: &DecisionQuery) -> Result<Vec<Decision>, SourceError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Outcome of [`fetch_decisions`].
#[derive(Debug, Default)]
pub struct SourceFetch {
    pub decisions: Vec<Decision>,
    /// Set when the source failed; `decisions` is then empty.
    pub unavailable: Option<String>,
}

impl fmt::Display for SourceFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unavailable {
            Some(reason) => write!(f, "unavailable ({})", reason),
            None => write!(f, "{} decisions", self.decisions.len()),
        }
    }
}

/// Fetch decisions without raising.
///
/// Failures are logged and turned into an empty sequence with the reason
/// attached; whether that is fatal is up to the caller.
pub async fn fetch_decisions<S>(source: &S, query: &DecisionQuery) -> SourceFetch
where
    S: DecisionSource + ?Sized,
{
    info!(source = source.name(), all = query.all, origin = ?query.origin, "Fetching decisions");

    match source.list(query).await {
        Ok(decisions) => {
            info!(source = source.name(), decisions = decisions.len(), "Decisions fetched");
            SourceFetch {
                decisions,
                unavailable: None,
            }
        }
        Err(e) => {
            error!(source = source.name(), error = %e, "Error fetching decisions");
            SourceFetch {
                decisions: Vec::new(),
                unavailable: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source returning a fixed set of decisions.
    pub struct StaticSource {
        decisions: Option<Vec<Decision>>,
        pub calls: AtomicUsize,
    }

    impl StaticSource {
        pub fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: Some(decisions),
                calls: AtomicUsize::new(0),
            }
        }

        /// A source whose every invocation fails.
        pub fn failing() -> Self {
            Self {
                decisions: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DecisionSource for StaticSource {
        async fn list(&self, _query: &DecisionQuery) -> Result<Vec<Decision>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.decisions.clone().ok_or(SourceError::EmptyOutput)
        }

        fn name(&self) -> &str {
            "static"
        }
    }
}
