//! The sync coordinator.
//!
//! A local mutation moves through four phases:
//!
//! ```text
//! Mutated -> LogAppended -> Republished -> Notified
//! ```
//!
//! The tree is changed, its update log appended, and both serialized under
//! one lock, so the published log always sits under the hash it produced.
//! The log and the full tree are then packed and published, and every peer
//! gets a notification carrying that root hash and the log's segment count.
//! A report stops at the last phase reached.
//!
//! An inbound notification is filtered by zone and hash before anything is
//! fetched, then the advertised log is pulled and replayed. The hash of a
//! delete notification stays pending until its log has been replayed; a
//! pending log is retried ahead of the next pull. When replay does not
//! converge the full remote tree is adopted, local records it has not seen
//! are replayed on top, and if that leaves this node ahead it republishes
//! and notifies its peers.
//!
//! Node state sits behind a `parking_lot` mutex that is never held across an
//! `.await`, so mutate-and-rehash stays atomic under a multi-threaded
//! runtime.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::names::{Notification, SyncNames};
use crate::reconcile::{self, Reconciliation};
use crate::stats::{Stats, Timer};
use futures::future::join_all;
use parking_lot::Mutex;
use spasy_transport::{pack, FetchFailure, Fetched, Fetcher, Name, NamedNetwork};
use spasy_tree::{Action, GeoTree, Hash, ItemName, TreeSnapshot, UpdateLog, UpdateRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How far a local mutation got.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MutationPhase {
    /// The tree was left unchanged; nothing was published.
    Unchanged,
    /// The tree changed but its state could not be serialized.
    Mutated,
    /// Log and tree were captured under the mutation's lock.
    LogAppended,
    Republished,
    Notified,
}

/// Result of a local insert or delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationReport {
    pub zone: String,
    pub phase: MutationPhase,
    pub root_hash: Hash,
    /// Segment count of the published update log.
    pub log_segments: u64,
    /// Peers that accepted the notification.
    pub notified: usize,
    /// Peers the notification could not be delivered to.
    pub unreachable: usize,
}

/// What handling an inbound notification did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The advertised hash equals the local one.
    UpToDate,
    /// The remote log was replayed.
    Reconciled(Reconciliation),
    /// Log replay did not converge and the full remote tree was adopted.
    /// `reapplied` local records were replayed on top of it, leaving the
    /// zone at `root_hash`.
    Adopted { root_hash: Hash, reapplied: usize },
    /// Log replay did not converge and no full state could be adopted.
    Diverged(Reconciliation),
    /// The advertised log could not be fetched completely.
    FetchIncomplete {
        name: Name,
        failure: Option<FetchFailure>,
    },
}

#[derive(Default)]
struct NodeState {
    zones: BTreeMap<String, GeoTree>,
    peers: Vec<String>,
    assets: HashMap<String, Vec<u8>>,
    /// Hash advertised by the latest delete notification whose log has
    /// not been replayed yet, per zone.
    pending: HashMap<String, Hash>,
}

/// A zone's root hash, log and tree, serialized together.
struct Capture {
    root_hash: Hash,
    log_bytes: Vec<u8>,
    tree_bytes: Vec<u8>,
}

impl Capture {
    fn of(tree: &GeoTree) -> Result<Self> {
        Ok(Capture {
            root_hash: tree.root_hash(),
            log_bytes: tree.recent_updates().to_bytes()?,
            tree_bytes: TreeSnapshot::capture(tree).to_bytes()?,
        })
    }
}

impl NodeState {
    fn tree(&self, zone: &str) -> Result<&GeoTree> {
        self.zones
            .get(zone)
            .ok_or_else(|| SyncError::UntrackedZone(zone.to_string()))
    }

    fn tree_mut(&mut self, zone: &str) -> Result<&mut GeoTree> {
        self.zones
            .get_mut(zone)
            .ok_or_else(|| SyncError::UntrackedZone(zone.to_string()))
    }

    /// The longest tracked zone that prefixes `code`.
    fn zone_for(&self, code: &str) -> Option<String> {
        self.zones
            .keys()
            .filter(|zone| code.starts_with(zone.as_str()))
            .max_by_key(|zone| zone.len())
            .cloned()
    }
}

/// Orchestrates trees, logs and transport for one node.
pub struct SyncCoordinator {
    config: SyncConfig,
    names: SyncNames,
    network: Arc<dyn NamedNetwork>,
    fetcher: Fetcher,
    state: Mutex<NodeState>,
    timer: Mutex<Timer>,
    stats: Mutex<Stats>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, network: Arc<dyn NamedNetwork>) -> Self {
        let fetcher = Fetcher::new(network.clone(), config.transport());
        let state = NodeState {
            peers: config.routes.clone(),
            ..NodeState::default()
        };

        SyncCoordinator {
            names: SyncNames::new(&config.app_prefix),
            config,
            network,
            fetcher,
            state: Mutex::new(state),
            timer: Mutex::new(Timer::new()),
            stats: Mutex::new(Stats::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    pub fn names(&self) -> &SyncNames {
        &self.names
    }

    // --- Membership ---

    /// Start tracking `zone` with an empty tree and publish it.
    pub async fn track(&self, zone: &str, max_depth: usize) -> Result<Hash> {
        let zone = normalize_zone(zone)?;
        let tree = GeoTree::with_log_capacity(&zone, max_depth, self.config.update_log_capacity)?;
        let root_hash = tree.root_hash();
        self.state.lock().zones.insert(zone.clone(), tree);

        info!("{} tracking zone {} (depth {})", self.node_name(), zone, max_depth);
        self.republish(&zone).await?;
        Ok(root_hash)
    }

    /// Fetch the full tree of `zone` from the network and adopt it.
    pub async fn join(&self, zone: &str) -> Result<Hash> {
        let zone = normalize_zone(zone)?;
        let started = Instant::now();

        let remote = self.fetch_tree(&zone).await?;
        let root_hash = remote.root_hash();
        {
            let mut state = self.state.lock();
            match state.zones.get_mut(&zone) {
                Some(local) => reconcile::adopt_full_state(local, &remote),
                None => {
                    state.zones.insert(zone.clone(), remote);
                }
            }
            state.pending.remove(&zone);
        }

        self.timer.lock().record(format!("{}_join", zone), started.elapsed());
        info!("{} joined zone {} at {}", self.node_name(), zone, root_hash.short());
        Ok(root_hash)
    }

    pub fn add_peer(&self, route: impl Into<String>) {
        let route = route.into();
        let mut state = self.state.lock();
        if route != self.config.node_name && !state.peers.contains(&route) {
            state.peers.push(route);
        }
    }

    pub fn peers(&self) -> Vec<String> {
        self.state.lock().peers.clone()
    }

    pub fn zones(&self) -> Vec<String> {
        self.state.lock().zones.keys().cloned().collect()
    }

    // --- Local mutations ---

    /// Insert an item and propagate the change.
    pub async fn insert(&self, item: &str) -> Result<MutationReport> {
        self.mutate(Action::Insert, &[item.to_string()], None).await
    }

    /// Insert an item whose asset bytes are published alongside it.
    pub async fn insert_with_asset(&self, item: &str, asset: Vec<u8>) -> Result<MutationReport> {
        self.mutate(Action::Insert, &[item.to_string()], Some(asset))
            .await
    }

    /// Insert many items into one zone, publishing and notifying once.
    pub async fn insert_batch(&self, items: &[String]) -> Result<MutationReport> {
        self.mutate(Action::Insert, items, None).await
    }

    /// Delete an item and propagate the change.
    pub async fn delete(&self, item: &str) -> Result<MutationReport> {
        self.mutate(Action::Delete, &[item.to_string()], None).await
    }

    async fn mutate(
        &self,
        action: Action,
        items: &[String],
        asset: Option<Vec<u8>>,
    ) -> Result<MutationReport> {
        let parsed = items
            .iter()
            .map(|item| ItemName::parse(item))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let Some(first) = parsed.first() else {
            return Err(SyncError::Config("no items to mutate".to_string()));
        };

        let started = Instant::now();
        let (zone, root_hash, capture) = {
            let mut state = self.state.lock();
            let zone = state
                .zone_for(first.code())
                .ok_or_else(|| SyncError::UntrackedZone(first.code().to_string()))?;
            let tree = state.tree_mut(&zone)?;
            for item in &parsed {
                tree.validate(item)?;
            }

            let mut changed = false;
            for item in &parsed {
                changed |= match action {
                    Action::Insert => tree.insert(item.as_str())?,
                    Action::Delete => tree.delete(item.as_str()),
                };
            }
            let root_hash = tree.root_hash();
            let capture = changed.then(|| Capture::of(tree));
            if changed && action == Action::Insert && self.config.asset_distribution {
                if let Some(bytes) = &asset {
                    state.assets.insert(first.as_str().to_string(), bytes.clone());
                }
            }
            (zone, root_hash, capture)
        };
        self.timer
            .lock()
            .record(format!("{}_{}", zone, action), started.elapsed());

        let mut report = MutationReport {
            zone: zone.clone(),
            phase: MutationPhase::Unchanged,
            root_hash,
            log_segments: 0,
            notified: 0,
            unreachable: 0,
        };
        let Some(capture) = capture else {
            debug!("{} {} left zone {} unchanged", action, first, zone);
            return Ok(report);
        };
        report.phase = MutationPhase::Mutated;
        let capture = match capture {
            Ok(capture) => capture,
            Err(e) => {
                warn!(
                    "{} {} {} in {} but could not serialize the zone: {}",
                    self.node_name(),
                    action,
                    first,
                    zone,
                    e
                );
                return Ok(report);
            }
        };
        report.phase = MutationPhase::LogAppended;

        report.log_segments = self.publish(&zone, capture).await;
        if action == Action::Insert && self.config.asset_distribution {
            if let Some(bytes) = asset {
                let name = self.names.asset(&zone, first.as_str());
                self.network
                    .publish(pack(&bytes, &name, self.config.segment_size))
                    .await;
            }
        }
        report.phase = MutationPhase::Republished;

        let notification = Notification {
            route: String::new(),
            subject: zone.clone(),
            action,
            root_hash,
            geocode: first.code().to_string(),
            segment_count: report.log_segments,
        };
        let (notified, unreachable) = self.notify_peers(notification).await;
        report.notified = notified;
        report.unreachable = unreachable;
        report.phase = MutationPhase::Notified;

        info!(
            "{} {} {} in {}: root {} ({} peers notified, {} unreachable)",
            self.node_name(),
            action,
            first,
            zone,
            root_hash.short(),
            notified,
            unreachable
        );
        Ok(report)
    }

    /// Capture the zone as it is now and publish it. Returns the root hash
    /// the log was published under and its segment count.
    async fn republish(&self, zone: &str) -> Result<(Hash, u64)> {
        let capture = {
            let state = self.state.lock();
            Capture::of(state.tree(zone)?)?
        };
        let root_hash = capture.root_hash;
        Ok((root_hash, self.publish(zone, capture).await))
    }

    /// Publish a captured update log under its root hash and the full tree
    /// under the zone's tree name. Returns the log's segment count.
    async fn publish(&self, zone: &str, capture: Capture) -> u64 {
        let started = Instant::now();
        let Capture {
            root_hash,
            log_bytes,
            tree_bytes,
        } = capture;

        let segment_size = self.config.segment_size;
        let log = pack(&log_bytes, &self.names.log(zone, &root_hash), segment_size);
        let log_segments = log.segment_count();
        let tree = pack(&tree_bytes, &self.names.tree(zone), segment_size);
        let tree_segments = tree.segment_count();

        join_all([self.network.publish(log), self.network.publish(tree)]).await;

        {
            let mut stats = self.stats.lock();
            stats.record(format!("{}_log_bytes", zone), log_bytes.len());
            stats.record(format!("{}_log_segments", zone), log_segments);
            stats.record(format!("{}_tree_bytes", zone), tree_bytes.len());
            stats.record(format!("{}_tree_segments", zone), tree_segments);
        }
        self.timer
            .lock()
            .record(format!("{}_republish", zone), started.elapsed());
        debug!(
            "{} republished {} at {} ({} log segments, {} tree segments)",
            self.node_name(),
            zone,
            root_hash.short(),
            log_segments,
            tree_segments
        );
        log_segments
    }

    /// Send one notification per peer concurrently. Returns the number of
    /// deliveries that succeeded and failed.
    async fn notify_peers(&self, notification: Notification) -> (usize, usize) {
        let peers = self.peers();
        let timeout = self.config.notification_timeout();

        let sends = peers.iter().map(|peer| {
            let name = self.names.notification(&Notification {
                route: peer.clone(),
                ..notification.clone()
            });
            async move {
                match tokio::time::timeout(timeout, self.network.notify(peer, name)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!("notification to {} failed: {}", peer, e);
                        false
                    }
                    Err(_) => {
                        warn!("notification to {} timed out", peer);
                        false
                    }
                }
            }
        });

        let results = join_all(sends).await;
        let notified = results.iter().filter(|ok| **ok).count();
        (notified, results.len() - notified)
    }

    // --- Inbound notifications ---

    /// Filter, fetch and reconcile in response to a peer notification.
    pub async fn handle_notification(&self, name: &Name) -> Result<NotificationOutcome> {
        let note = self.names.parse_notification(name)?;
        if note.route != self.config.node_name {
            return Err(SyncError::Misrouted {
                route: note.route,
                node: self.config.node_name.clone(),
            });
        }

        let local_hash = {
            let state = self.state.lock();
            match state.zones.get(&note.subject) {
                Some(tree) => tree.root_hash(),
                None => {
                    warn!(
                        "{} rejecting notification for untracked zone {}",
                        self.node_name(),
                        note.subject
                    );
                    return Err(SyncError::UntrackedZone(note.subject));
                }
            }
        };

        if !reconcile::is_newer(&local_hash, &note.root_hash) {
            debug!("{} already at {}", self.node_name(), note.root_hash.short());
            return Ok(NotificationOutcome::UpToDate);
        }

        if note.action == Action::Delete {
            debug!(
                "{} pulling delete in {} at {}",
                self.node_name(),
                note.subject,
                note.root_hash.short()
            );
            self.state
                .lock()
                .pending
                .insert(note.subject.clone(), note.root_hash);
        }

        self.pull(&note).await
    }

    /// Replay the log behind a delete notification whose own pull did not
    /// complete. Tried once; the entry is cleared either way.
    async fn replay_pending(&self, zone: &str, hash: &Hash) {
        let name = self.names.log(zone, hash);
        let fetched = self
            .fetcher
            .fetch_with_timeout(
                &name,
                None,
                self.config.fetch_strategy,
                self.config.log_timeout(),
            )
            .await;
        let records = complete(fetched)
            .and_then(|bytes| Ok(UpdateLog::records_from_bytes(&bytes)?));

        let mut state = self.state.lock();
        state.pending.remove(zone);
        match records {
            Ok(records) => {
                if let Some(tree) = state.zones.get_mut(zone) {
                    let outcome = reconcile::apply_remote_log(tree, &records);
                    debug!(
                        "{} replayed pending log {}: {} applied, {} rejected",
                        self.node_name(),
                        hash.short(),
                        outcome.applied,
                        outcome.rejected
                    );
                }
            }
            Err(e) => warn!(
                "{} dropping pending log {} for {}: {}",
                self.node_name(),
                hash.short(),
                zone,
                e
            ),
        }
    }

    async fn pull(&self, note: &Notification) -> Result<NotificationOutcome> {
        let zone = &note.subject;
        let started = Instant::now();

        let pending = self
            .state
            .lock()
            .pending
            .get(zone)
            .copied()
            .filter(|hash| *hash != note.root_hash);
        if let Some(hash) = pending {
            self.replay_pending(zone, &hash).await;
        }

        let log_name = self.names.log(zone, &note.root_hash);
        let fetched = self
            .fetcher
            .fetch_with_timeout(
                &log_name,
                Some(note.segment_count),
                self.config.fetch_strategy,
                self.config.log_timeout(),
            )
            .await;
        self.timer
            .lock()
            .record(format!("{}_fetch_log", zone), started.elapsed());

        if !fetched.is_complete() {
            warn!(
                "{} could not fetch {}: {}/{:?} segments",
                self.node_name(),
                log_name,
                fetched.received,
                fetched.expected
            );
            return Ok(NotificationOutcome::FetchIncomplete {
                name: log_name,
                failure: fetched.first_failure().cloned(),
            });
        }
        let remote_log = UpdateLog::records_from_bytes(&fetched.data)?;

        let (outcome, inserted) = {
            let mut state = self.state.lock();
            let tree = state.tree_mut(zone)?;
            let inserted: Vec<String> =
                reconcile::missing_records(tree.recent_updates(), &remote_log)
                    .into_iter()
                    .filter(|record| record.action == Action::Insert)
                    .map(|record| record.name)
                    .collect();
            let outcome = reconcile::reconcile(tree, &remote_log, &note.root_hash);
            let inserted: Vec<String> =
                inserted.into_iter().filter(|name| tree.find(name)).collect();
            if outcome.converged {
                state.pending.remove(zone);
            }
            (outcome, inserted)
        };
        self.timer
            .lock()
            .record(format!("{}_reconcile", zone), started.elapsed());

        if self.config.asset_distribution && !inserted.is_empty() {
            self.fetch_assets(zone, &inserted).await;
        }

        if outcome.converged {
            return Ok(NotificationOutcome::Reconciled(outcome));
        }
        if !self.config.full_state_fallback {
            return Ok(NotificationOutcome::Diverged(outcome));
        }

        match self.fetch_tree(zone).await {
            Ok(remote) => {
                let (root_hash, reapplied) = {
                    let mut state = self.state.lock();
                    let tree = state.tree_mut(zone)?;
                    let reapplied = reconcile::adopt_keeping_local(tree, &remote);
                    let root_hash = tree.root_hash();
                    state.pending.remove(zone);
                    (root_hash, reapplied)
                };
                if root_hash != remote.root_hash() {
                    if let Some(record) = reapplied.last() {
                        if let Err(e) = self.announce(zone, record).await {
                            warn!("{} could not announce {}: {}", self.node_name(), zone, e);
                        }
                    }
                }
                Ok(NotificationOutcome::Adopted {
                    root_hash,
                    reapplied: reapplied.len(),
                })
            }
            Err(e) => {
                warn!(
                    "{} full-state fallback for {} failed: {}",
                    self.node_name(),
                    zone,
                    e
                );
                Ok(NotificationOutcome::Diverged(outcome))
            }
        }
    }

    /// Republish a zone left ahead of its peers by re-applied local records
    /// and notify them, naming `record` as the change.
    async fn announce(&self, zone: &str, record: &UpdateRecord) -> Result<()> {
        let (root_hash, segment_count) = self.republish(zone).await?;
        let geocode = ItemName::parse(&record.name)?.code().to_string();
        let (notified, unreachable) = self
            .notify_peers(Notification {
                route: String::new(),
                subject: zone.to_string(),
                action: record.action,
                root_hash,
                geocode,
                segment_count,
            })
            .await;
        info!(
            "{} kept local {} {} through adoption of {}: root {} ({} peers notified, {} unreachable)",
            self.node_name(),
            record.action,
            record.name,
            zone,
            root_hash.short(),
            notified,
            unreachable
        );
        Ok(())
    }

    async fn fetch_tree(&self, zone: &str) -> Result<GeoTree> {
        let name = self.names.tree(zone);
        let fetched = self
            .fetcher
            .fetch_with_timeout(
                &name,
                None,
                self.config.fetch_strategy,
                self.config.tree_timeout(),
            )
            .await;
        let bytes = complete(fetched)?;
        self.stats
            .lock()
            .record(format!("{}_received_tree_bytes", zone), bytes.len());
        Ok(TreeSnapshot::from_bytes(&bytes)?.into_tree())
    }

    async fn fetch_assets(&self, zone: &str, items: &[String]) {
        let timeout = self.config.asset_timeout();
        let fetches = items.iter().map(|item| {
            let name = self.names.asset(zone, item);
            async move {
                let fetched = self
                    .fetcher
                    .fetch_with_timeout(&name, None, self.config.fetch_strategy, timeout)
                    .await;
                (item.clone(), fetched)
            }
        });

        for (item, fetched) in join_all(fetches).await {
            match complete(fetched) {
                Ok(bytes) => {
                    self.state.lock().assets.insert(item, bytes);
                }
                Err(e) => warn!("{} missing asset for {}: {}", self.node_name(), item, e),
            }
        }
    }

    /// Handle notifications from `inbox` until it closes, each in its own
    /// task.
    pub async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<Name>) {
        info!("{} listening for notifications", self.node_name());
        let mut tasks = Vec::new();

        while let Some(name) = inbox.recv().await {
            let coordinator = self.clone();
            tasks.retain(|task: &tokio::task::JoinHandle<()>| !task.is_finished());
            tasks.push(tokio::spawn(async move {
                match coordinator.handle_notification(&name).await {
                    Ok(outcome) => {
                        debug!("{} handled {}: {:?}", coordinator.node_name(), name, outcome)
                    }
                    Err(e) => warn!("{} rejected {}: {}", coordinator.node_name(), name, e),
                }
            }));
        }

        join_all(tasks).await;
        info!("{} stopped listening", self.node_name());
    }

    // --- Introspection ---

    pub fn root_hash(&self, zone: &str) -> Option<Hash> {
        self.state.lock().zones.get(zone).map(GeoTree::root_hash)
    }

    /// A copy of the zone's tree.
    pub fn tree(&self, zone: &str) -> Option<GeoTree> {
        self.state.lock().zones.get(zone).cloned()
    }

    /// Whether any tracked zone holds exactly `item`.
    pub fn find(&self, item: &str) -> bool {
        self.state.lock().zones.values().any(|tree| tree.find(item))
    }

    pub fn asset(&self, item: &str) -> Option<Vec<u8>> {
        let key = item.trim().to_lowercase();
        self.state.lock().assets.get(&key).cloned()
    }

    /// Hash of a delete notification whose log has not been replayed yet.
    pub fn pending_delete(&self, zone: &str) -> Option<Hash> {
        self.state.lock().pending.get(zone).copied()
    }

    pub fn timing(&self, name: &str) -> Option<Duration> {
        self.timer.lock().get(name)
    }

    pub fn stat(&self, name: &str) -> Option<String> {
        self.stats.lock().get(name).map(str::to_string)
    }

    /// Log every zone's content, then the timers and stats; write them to
    /// the configured output directory if there is one.
    pub fn dump(&self) -> Result<()> {
        {
            let state = self.state.lock();
            for (zone, tree) in &state.zones {
                info!(
                    "{} zone {}: root {}, {} items, {} nodes, {} log records",
                    self.node_name(),
                    zone,
                    tree.root_hash().short(),
                    tree.len(),
                    tree.node_count(),
                    tree.recent_updates().len()
                );
                for (namespace, items) in tree.by_namespace() {
                    debug!("  {}: {:?}", namespace, items);
                }
            }
        }

        let timer = self.timer.lock();
        let stats = self.stats.lock();
        timer.dump();
        stats.dump();

        if let Some(dir) = &self.config.output_path {
            std::fs::create_dir_all(dir)?;
            let results = dir.join(format!("{}.results", self.node_name()));
            std::fs::write(results, timer.to_string())?;
            stats.write_to(&dir.join(format!("{}.stats", self.node_name())))?;
        }
        Ok(())
    }
}

fn normalize_zone(zone: &str) -> Result<String> {
    let zone = zone.trim().to_lowercase();
    if zone.is_empty() || zone.contains('/') || !spasy_tree::geocode::is_valid(&zone) {
        return Err(SyncError::InvalidZone(zone));
    }
    Ok(zone)
}

fn complete(fetched: Fetched) -> Result<Vec<u8>> {
    if fetched.is_complete() {
        return Ok(fetched.data);
    }
    if let Some(failure) = fetched.first_failure() {
        return Err(SyncError::Fetch(failure.clone()));
    }
    Err(SyncError::Incomplete {
        name: fetched.name.to_string(),
        received: fetched.received,
        expected: fetched.expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spasy_transport::{FetchStrategy, MemoryNetwork};

    fn coordinator(name: &str, network: &Arc<MemoryNetwork>) -> SyncCoordinator {
        let config = SyncConfig::builder().node_name(name).build();
        SyncCoordinator::new(config, network.clone())
    }

    #[test]
    fn test_normalize_zone() {
        assert_eq!(normalize_zone(" DPWHWT ").unwrap(), "dpwhwt");
        assert!(normalize_zone("").is_err());
        assert!(normalize_zone("dp/wh").is_err());
        assert!(normalize_zone("dpwhwa").is_err());
    }

    #[tokio::test]
    async fn test_track_publishes_empty_tree() {
        let network = Arc::new(MemoryNetwork::new());
        let a = coordinator("a", &network);
        let hash = a.track("dpwhwt", 4).await.unwrap();

        assert_eq!(hash, Hash::empty());
        assert!(network.is_published(&a.names().tree("dpwhwt")));
        assert!(network.is_published(&a.names().log("dpwhwt", &hash)));
        assert_eq!(a.zones(), ["dpwhwt"]);
    }

    #[tokio::test]
    async fn test_insert_outside_tracked_zones() {
        let network = Arc::new(MemoryNetwork::new());
        let a = coordinator("a", &network);
        a.track("dpwhwt", 4).await.unwrap();

        assert!(matches!(
            a.insert("/x/dpwhwxmpz0").await,
            Err(SyncError::UntrackedZone(_))
        ));
        assert!(matches!(
            a.insert("/x/dpwhwtmpz").await,
            Err(SyncError::Tree(_))
        ));
    }

    #[tokio::test]
    async fn test_unchanged_mutation_stops_early() {
        let network = Arc::new(MemoryNetwork::new());
        let a = coordinator("a", &network);
        a.track("dpwhwt", 4).await.unwrap();

        let report = a.delete("/x/dpwhwtmpz0").await.unwrap();
        assert_eq!(report.phase, MutationPhase::Unchanged);
        assert_eq!(report.root_hash, Hash::empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_publish_logs_under_their_hashes() {
        let network = Arc::new(MemoryNetwork::new());
        let a = Arc::new(coordinator("a", &network));
        a.track("dpwhwt", 4).await.unwrap();

        let inserts = (0..16).map(|i| {
            let a = a.clone();
            tokio::spawn(async move { a.insert(&format!("/item{}/dpwhwtmpz0", i)).await })
        });
        let reports: Vec<MutationReport> = join_all(inserts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        for report in reports {
            assert_eq!(report.phase, MutationPhase::Notified);
            let name = a.names().log("dpwhwt", &report.root_hash);
            let bytes = a
                .fetcher
                .fetch(&name, None, FetchStrategy::Sequential)
                .await
                .into_complete()
                .unwrap();
            let mut replayed = GeoTree::new("dpwhwt", 4).unwrap();
            for record in UpdateLog::records_from_bytes(&bytes).unwrap() {
                replayed.replay(&record).unwrap();
            }
            assert_eq!(replayed.root_hash(), report.root_hash);
        }
    }

    #[tokio::test]
    async fn test_peers_exclude_self_and_duplicates() {
        let network = Arc::new(MemoryNetwork::new());
        let a = coordinator("a", &network);
        a.add_peer("b");
        a.add_peer("b");
        a.add_peer("a");
        assert_eq!(a.peers(), ["b"]);
    }

    #[tokio::test]
    async fn test_misrouted_notification() {
        let network = Arc::new(MemoryNetwork::new());
        let a = coordinator("a", &network);
        a.track("dpwhwt", 4).await.unwrap();

        let name = a.names().notification(&Notification {
            route: "c".to_string(),
            subject: "dpwhwt".to_string(),
            action: Action::Insert,
            root_hash: Hash::empty(),
            geocode: "dpwhwtmpz0".to_string(),
            segment_count: 1,
        });
        assert!(matches!(
            a.handle_notification(&name).await,
            Err(SyncError::Misrouted { .. })
        ));
    }
}
