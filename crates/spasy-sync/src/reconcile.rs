//! Deciding staleness and applying remote state.
//!
//! Staleness is equality-only: any difference in root hash means "pull".
//! A peer first tries to catch up by replaying the records of the remote
//! update log it has not seen; if the hashes still differ afterwards the
//! divergence is outside the log window and only adopting the full remote
//! tree converges. Adoption keeps the local records the remote log has not
//! seen, so a change made here and not yet pulled by the remote survives.

use spasy_tree::{GeoTree, Hash, UpdateLog, UpdateRecord};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of one reconciliation attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Remote records replayed against the local tree.
    pub applied: usize,
    /// Remote records the local tree refused (structural errors).
    pub rejected: usize,
    /// Whether the local root hash now equals the remote one.
    pub converged: bool,
}

/// True unless the two hashes are identical. Cannot tell "remote is ahead"
/// apart from "the two have diverged".
pub fn is_newer(local: &Hash, remote: &Hash) -> bool {
    local != remote
}

/// Records of `remote_log` that `local` does not hold, in replay order.
///
/// Replay order is `(timestamp, action, name)`, so an insert and a later
/// delete of the same item within the window are applied in the order they
/// happened.
pub fn missing_records(local: &UpdateLog, remote_log: &[UpdateRecord]) -> Vec<UpdateRecord> {
    let seen: HashSet<&UpdateRecord> = local.iter().collect();
    let mut missing: Vec<UpdateRecord> = remote_log
        .iter()
        .filter(|record| !seen.contains(record))
        .cloned()
        .collect();
    missing.sort();
    missing.dedup();
    missing
}

/// Replay every remote record missing from the local log.
pub fn apply_remote_log(local: &mut GeoTree, remote_log: &[UpdateRecord]) -> Reconciliation {
    let missing = missing_records(local.recent_updates(), remote_log);
    let mut outcome = Reconciliation::default();

    for record in &missing {
        match local.replay(record) {
            Ok(changed) => {
                outcome.applied += 1;
                debug!(
                    "replayed {} {} (changed: {})",
                    record.action, record.name, changed
                );
            }
            Err(e) => {
                outcome.rejected += 1;
                warn!("rejected remote {} {}: {}", record.action, record.name, e);
            }
        }
    }
    outcome
}

/// Replay the remote log and report whether the hashes now agree.
pub fn reconcile(
    local: &mut GeoTree,
    remote_log: &[UpdateRecord],
    remote_hash: &Hash,
) -> Reconciliation {
    if !is_newer(&local.root_hash(), remote_hash) {
        return Reconciliation {
            converged: true,
            ..Reconciliation::default()
        };
    }

    let mut outcome = apply_remote_log(local, remote_log);
    outcome.converged = local.root_hash() == *remote_hash;

    if outcome.converged {
        info!(
            "converged on {} after replaying {} records",
            remote_hash.short(),
            outcome.applied
        );
    } else {
        info!(
            "still diverged after replaying {} records: local {} remote {}",
            outcome.applied,
            local.root_hash().short(),
            remote_hash.short()
        );
    }
    outcome
}

/// Replace the local tree, log included, with the remote one.
pub fn adopt_full_state(local: &mut GeoTree, remote: &GeoTree) {
    info!(
        "adopting full state {} in place of {}",
        remote.root_hash().short(),
        local.root_hash().short()
    );
    local.adopt(remote);
}

/// Local records missing from `remote`, in replay order, minus those the
/// remote log overrides with a later record for the same name.
pub fn unshared_records(local: &UpdateLog, remote: &UpdateLog) -> Vec<UpdateRecord> {
    let mut latest: HashMap<&str, u64> = HashMap::new();
    for record in remote.iter() {
        let stamp = latest.entry(record.name.as_str()).or_insert(record.timestamp);
        *stamp = (*stamp).max(record.timestamp);
    }

    missing_records(remote, &local.snapshot())
        .into_iter()
        .filter(|record| {
            latest
                .get(record.name.as_str())
                .map_or(true, |&stamp| stamp < record.timestamp)
        })
        .collect()
}

/// Adopt the remote tree, then replay the local records it has not seen.
/// Returns the records replayed.
pub fn adopt_keeping_local(local: &mut GeoTree, remote: &GeoTree) -> Vec<UpdateRecord> {
    let unshared = unshared_records(local.recent_updates(), remote.recent_updates());
    adopt_full_state(local, remote);

    let mut reapplied = Vec::with_capacity(unshared.len());
    for record in unshared {
        match local.replay(&record) {
            Ok(_) => reapplied.push(record),
            Err(e) => warn!("dropped local {} {}: {}", record.action, record.name, e),
        }
    }
    if !reapplied.is_empty() {
        info!(
            "re-applied {} local records over {}, now at {}",
            reapplied.len(),
            remote.root_hash().short(),
            local.root_hash().short()
        );
    }
    reapplied
}
