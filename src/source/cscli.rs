//! `cscli decisions list` adapter.

use super::{Decision, DecisionQuery, DecisionSource, DecisionType, Scope, SourceError};
use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Top-level cscli JSON output: one alert or an array of alerts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CscliOutput {
    Many(Vec<CscliAlert>),
    One(CscliAlert),
}

#[derive(Debug, Deserialize)]
struct CscliAlert {
    #[serde(default)]
    decisions: Option<Vec<CscliDecision>>,
}

#[derive(Debug, Deserialize)]
struct CscliDecision {
    value: String,
    scope: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default)]
    origin: Option<String>,
}

impl From<CscliDecision> for Decision {
    fn from(d: CscliDecision) -> Self {
        Decision {
            value: d.value,
            scope: Scope::parse(&d.scope),
            kind: DecisionType::parse(&d.kind),
            scenario: d.scenario.unwrap_or_default(),
            origin: d.origin,
        }
    }
}

/// Decision source backed by the `cscli` binary.
pub struct CscliSource {
    config: SourceConfig,
}

impl CscliSource {
    /// Create a new cscli source.
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }
}

#[async_trait]
impl DecisionSource for CscliSource {
    async fn list(&self, query: &DecisionQuery) -> Result<Vec<Decision>, SourceError> {
        let args = query.to_args();
        debug!(binary = %self.config.binary.display(), args = ?args, "Running decision listing");

        let child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout kills the child.
        let output = tokio::time::timeout(self.timeout(), child.wait_with_output())
            .await
            .map_err(|_| SourceError::Timeout(self.timeout()))??;

        if !output.status.success() {
            return Err(SourceError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_decisions(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &str {
        "cscli"
    }
}

/// Parse `cscli decisions list -o json` output.
///
/// Any schema deviation fails the whole document. A literal `null` means
/// there are no alerts at all.
pub fn parse_decisions(stdout: &str) -> Result<Vec<Decision>, SourceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(SourceError::EmptyOutput);
    }

    let parsed: Option<CscliOutput> = serde_json::from_str(trimmed)?;
    let alerts = match parsed {
        None => Vec::new(),
        Some(CscliOutput::Many(alerts)) => alerts,
        Some(CscliOutput::One(alert)) => vec![alert],
    };

    let decisions = alerts
        .into_iter()
        .flat_map(|alert| alert.decisions.unwrap_or_default())
        .map(Decision::from)
        .collect::<Vec<_>>();

    debug!(decisions = decisions.len(), "Parsed decision source output");
    Ok(decisions)
}
