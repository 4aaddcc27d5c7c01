//! Remote identity checks performed before any mutation.
//!
//! The check is optimistic: metadata is read, compared, and only then is the
//! write issued. Nothing stops the remote resource from being renamed in
//! between; the platform offers no compare-and-swap for these resources.

use crate::edge::{EdgeApi, Rule, Ruleset};
use crate::error::{Result, SyncError};
use tracing::{debug, warn};

/// Snapshot of a remote list used for the drift check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListIdentity {
    pub id: String,
    pub declared_name: String,
    pub actual_name: String,
    pub item_count: u64,
}

/// Succeeds only when the actual name equals the declared one exactly.
pub fn verify_identity(identity: &RemoteListIdentity) -> Result<()> {
    if identity.actual_name != identity.declared_name {
        warn!(
            list_id = %identity.id,
            declared = %identity.declared_name,
            actual = %identity.actual_name,
            "List name does not match declared name, aborting"
        );
        return Err(SyncError::DriftMismatch {
            declared: identity.declared_name.clone(),
            actual: identity.actual_name.clone(),
        });
    }
    Ok(())
}

/// Fetch the list metadata and verify its name.
pub async fn check_identity<A>(api: &A, list_id: &str, declared_name: &str) -> Result<RemoteListIdentity>
where
    A: EdgeApi + ?Sized,
{
    let list = api.get_list(list_id).await?;

    let identity = RemoteListIdentity {
        id: list_id.to_string(),
        declared_name: declared_name.to_string(),
        actual_name: list.name,
        item_count: list.num_items,
    };
    verify_identity(&identity)?;

    debug!(
        list_id = %identity.id,
        name = %identity.actual_name,
        items = identity.item_count,
        "List identity verified"
    );
    Ok(identity)
}

/// Look up a declared rule in a fetched ruleset.
///
/// A missing rule is a configuration error; no rule is created in its place.
pub fn find_rule(ruleset: &Ruleset, rule_id: &str) -> Result<Rule> {
    ruleset
        .rules
        .iter()
        .find(|r| r.id == rule_id)
        .cloned()
        .ok_or_else(|| SyncError::RuleNotFound {
            ruleset_id: ruleset.id.clone(),
            rule_id: rule_id.to_string(),
        })
}
