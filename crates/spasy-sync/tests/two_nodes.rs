//! Integration tests for two coordinators on one in-memory network.
//!
//! Tests cover:
//! - Insert propagation through notification, log fetch and replay
//! - Delete notifications pulled right away, or ahead of the next pull
//! - Deletions made by a non-originating node surviving full-state adoption
//! - Divergence beyond the log window, with and without full-state fallback
//! - Corrupt full-state payloads reported as divergence
//! - Joining a zone from its published tree
//! - The notification receive loop
//! - Asset distribution

use spasy_sync::{
    MutationPhase, NotificationOutcome, SyncConfig, SyncConfigBuilder, SyncCoordinator, SyncError,
};
use spasy_transport::{pack, FetchStrategy, MemoryNetwork, Name, NamedNetwork};
use spasy_tree::TreeSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ZONE: &str = "dpwhwt";

fn builder(name: &str, peer: &str) -> SyncConfigBuilder {
    SyncConfig::builder()
        .node_name(name)
        .route(peer)
        .segment_size(64)
        .max_depth(4)
}

struct Pair {
    network: Arc<MemoryNetwork>,
    a: Arc<SyncCoordinator>,
    b: Arc<SyncCoordinator>,
    inbox_a: mpsc::Receiver<Name>,
    inbox_b: mpsc::Receiver<Name>,
}

async fn pair_with(configure: impl Fn(SyncConfigBuilder) -> SyncConfigBuilder) -> Pair {
    let network = Arc::new(MemoryNetwork::new());
    let inbox_b = network.register("b");
    let inbox_a = network.register("a");

    let a = Arc::new(SyncCoordinator::new(
        configure(builder("a", "b")).build(),
        network.clone(),
    ));
    let b = Arc::new(SyncCoordinator::new(
        configure(builder("b", "a")).build(),
        network.clone(),
    ));
    a.track(ZONE, 4).await.unwrap();
    b.track(ZONE, 4).await.unwrap();

    Pair {
        network,
        a,
        b,
        inbox_a,
        inbox_b,
    }
}

async fn pair() -> Pair {
    pair_with(|config| config).await
}

impl Pair {
    async fn deliver_to_b(&mut self) -> NotificationOutcome {
        let name = self.inbox_b.recv().await.unwrap();
        self.b.handle_notification(&name).await.unwrap()
    }

    async fn deliver_to_a(&mut self) -> NotificationOutcome {
        let name = self.inbox_a.recv().await.unwrap();
        self.a.handle_notification(&name).await.unwrap()
    }

    /// Most recent notification queued for b, discarding older ones.
    fn latest_for_b(&mut self) -> Name {
        let mut last = None;
        while let Ok(name) = self.inbox_b.try_recv() {
            last = Some(name);
        }
        last.unwrap()
    }
}

#[tokio::test]
async fn test_insert_propagates() {
    let mut pair = pair().await;

    let report = pair.a.insert("/alice/ball/_v0/dpwhwtmpz0").await.unwrap();
    assert_eq!(report.phase, MutationPhase::Notified);
    assert_eq!(report.notified, 1);
    assert!(report.log_segments >= 1);

    match pair.deliver_to_b().await {
        NotificationOutcome::Reconciled(outcome) => {
            assert_eq!(outcome.applied, 1);
            assert!(outcome.converged);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
    assert!(pair.b.find("/alice/ball/_v0/dpwhwtmpz0"));
    assert!(pair.a.stat("dpwhwt_log_segments").is_some());
    assert!(pair.a.timing("dpwhwt_republish").is_some());
}

#[tokio::test]
async fn test_two_inserts_one_behind() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    pair.deliver_to_b().await;

    pair.a.insert("/y/dpwhwtbr2v").await.unwrap();
    match pair.deliver_to_b().await {
        NotificationOutcome::Reconciled(outcome) => assert_eq!(outcome.applied, 1),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
}

#[tokio::test]
async fn test_repeated_notification_is_up_to_date() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    let name = pair.inbox_b.recv().await.unwrap();

    pair.b.handle_notification(&name).await.unwrap();
    assert_eq!(
        pair.b.handle_notification(&name).await.unwrap(),
        NotificationOutcome::UpToDate
    );
}

#[tokio::test]
async fn test_delete_notification_pulls_log() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    pair.deliver_to_b().await;

    pair.a.delete("/x/dpwhwtmpz0").await.unwrap();
    match pair.deliver_to_b().await {
        NotificationOutcome::Reconciled(outcome) => {
            assert_eq!(outcome.applied, 1);
            assert!(outcome.converged);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!pair.b.find("/x/dpwhwtmpz0"));
    assert_eq!(pair.b.pending_delete(ZONE), None);
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
}

#[tokio::test]
async fn test_unfetched_delete_is_replayed_before_next_pull() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    pair.deliver_to_b().await;

    // advertise more segments than any fetch accepts
    let report = pair.a.delete("/x/dpwhwtmpz0").await.unwrap();
    let latest = pair.latest_for_b();
    let mut note = pair.b.names().parse_notification(&latest).unwrap();
    note.segment_count = 1_000;
    let oversized = pair.b.names().notification(&note);
    assert!(matches!(
        pair.b.handle_notification(&oversized).await.unwrap(),
        NotificationOutcome::FetchIncomplete { .. }
    ));
    assert_eq!(pair.b.pending_delete(ZONE), Some(report.root_hash));
    assert!(pair.b.find("/x/dpwhwtmpz0"));

    pair.a.insert("/y/dpwhwtbr2v").await.unwrap();
    match pair.deliver_to_b().await {
        NotificationOutcome::Reconciled(outcome) => {
            assert_eq!(outcome.applied, 1);
            assert!(outcome.converged);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!pair.b.find("/x/dpwhwtmpz0"));
    assert!(pair.b.find("/y/dpwhwtbr2v"));
    assert_eq!(pair.b.pending_delete(ZONE), None);
}

#[tokio::test]
async fn test_peer_delete_reaches_origin() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    pair.deliver_to_b().await;

    pair.b.delete("/x/dpwhwtmpz0").await.unwrap();
    match pair.deliver_to_a().await {
        NotificationOutcome::Reconciled(outcome) => assert!(outcome.converged),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!pair.a.find("/x/dpwhwtmpz0"));

    pair.a.insert("/y/dpwhwtbr2v").await.unwrap();
    pair.deliver_to_b().await;
    assert!(!pair.a.find("/x/dpwhwtmpz0"));
    assert!(!pair.b.find("/x/dpwhwtmpz0"));
    assert!(pair.b.find("/y/dpwhwtbr2v"));
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
}

#[tokio::test]
async fn test_peer_delete_survives_adoption_of_origin_state() {
    let mut pair = pair().await;
    pair.a.insert("/x/dpwhwtmpz0").await.unwrap();
    pair.deliver_to_b().await;

    // a never hears about b's delete before mutating again
    pair.b.delete("/x/dpwhwtmpz0").await.unwrap();
    pair.inbox_a.recv().await.unwrap();
    pair.a.insert("/y/dpwhwtbr2v").await.unwrap();

    match pair.deliver_to_b().await {
        NotificationOutcome::Adopted {
            root_hash,
            reapplied,
        } => {
            assert_eq!(reapplied, 1);
            assert_eq!(Some(root_hash), pair.b.root_hash(ZONE));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!pair.b.find("/x/dpwhwtmpz0"));
    assert!(pair.b.find("/y/dpwhwtbr2v"));

    // b republished and told a, which converges by replaying b's log
    match pair.deliver_to_a().await {
        NotificationOutcome::Reconciled(outcome) => assert!(outcome.converged),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!pair.a.find("/x/dpwhwtmpz0"));
    assert!(pair.a.find("/y/dpwhwtbr2v"));
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
}

#[tokio::test]
async fn test_divergence_beyond_window_adopts_full_state() {
    let mut pair = pair_with(|config| config.update_log_capacity(2)).await;
    for i in 0..5 {
        pair.a
            .insert(&format!("/item{}/dpwhwtmpz0", i))
            .await
            .unwrap();
    }
    let last = pair.latest_for_b();

    let outcome = pair.b.handle_notification(&last).await.unwrap();
    assert_eq!(
        outcome,
        NotificationOutcome::Adopted {
            root_hash: pair.a.root_hash(ZONE).unwrap(),
            reapplied: 0,
        }
    );
    assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
    assert_eq!(pair.b.tree(ZONE).unwrap().len(), 5);
}

#[tokio::test]
async fn test_divergence_without_fallback_is_reported() {
    let mut pair = pair_with(|config| config.update_log_capacity(2).full_state_fallback(false)).await;
    for i in 0..5 {
        pair.a
            .insert(&format!("/item{}/dpwhwtmpz0", i))
            .await
            .unwrap();
    }
    let last = pair.latest_for_b();

    match pair.b.handle_notification(&last).await.unwrap() {
        NotificationOutcome::Diverged(outcome) => {
            assert_eq!(outcome.applied, 2);
            assert!(!outcome.converged);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_ne!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE));
}

#[tokio::test]
async fn test_corrupt_full_state_is_reported_as_divergence() {
    let mut pair = pair_with(|config| config.update_log_capacity(2)).await;
    for i in 0..5 {
        pair.a
            .insert(&format!("/item{}/dpwhwtmpz0", i))
            .await
            .unwrap();
    }
    let last = pair.latest_for_b();
    let before = pair.b.root_hash(ZONE);

    // replace the published tree with one whose first child links back to the root
    let snapshot = TreeSnapshot::capture(&pair.a.tree(ZONE).unwrap());
    let mut value = serde_json::to_value(&snapshot).unwrap();
    value["tree"]["nodes"][1]["children"][0] = serde_json::json!(0);
    let bytes = serde_json::to_vec(&value).unwrap();
    pair.network
        .publish(pack(&bytes, &pair.a.names().tree(ZONE), 64))
        .await;

    match pair.b.handle_notification(&last).await.unwrap() {
        NotificationOutcome::Diverged(outcome) => assert!(!outcome.converged),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(pair.b.tree(ZONE).unwrap().verify());
    assert_ne!(pair.b.root_hash(ZONE), before);
    assert_eq!(pair.b.tree(ZONE).unwrap().len(), 2);
}

#[tokio::test]
async fn test_untracked_subject_is_rejected() {
    let network = Arc::new(MemoryNetwork::new());
    let mut inbox = network.register("b");
    let a = SyncCoordinator::new(builder("a", "b").build(), network.clone());
    let b = SyncCoordinator::new(builder("b", "a").build(), network.clone());

    a.track(ZONE, 4).await.unwrap();
    a.insert("/x/dpwhwtmpz0").await.unwrap();

    let name = inbox.recv().await.unwrap();
    assert!(matches!(
        b.handle_notification(&name).await,
        Err(SyncError::UntrackedZone(zone)) if zone == ZONE
    ));
}

#[tokio::test]
async fn test_join_fetches_published_tree() {
    let network = Arc::new(MemoryNetwork::new());
    let a = SyncCoordinator::new(builder("a", "b").build(), network.clone());
    let c = SyncCoordinator::new(builder("c", "a").build(), network.clone());

    assert!(c.join(ZONE).await.is_err());

    a.track(ZONE, 4).await.unwrap();
    a.insert("/alice/ball/_v0/dpwhwtmpz0").await.unwrap();
    a.insert("/bob/net/_v1/dpwhwtbr2v").await.unwrap();

    let hash = c.join(ZONE).await.unwrap();
    assert_eq!(Some(hash), a.root_hash(ZONE));
    assert_eq!(c.zones(), [ZONE]);
    assert!(c.find("/bob/net/_v1/dpwhwtbr2v"));
    assert_eq!(
        c.tree(ZONE).unwrap().recent_updates(),
        a.tree(ZONE).unwrap().recent_updates()
    );
}

#[tokio::test]
async fn test_every_strategy_converges() {
    for strategy in FetchStrategy::ALL {
        let mut pair = pair_with(|config| config.fetch_strategy(strategy).batch_size(2)).await;
        let items: Vec<String> = (0..12)
            .map(|i| format!("/namespace{}/some-longer-item-name/_v{}/dpwhwtmpz0", i, i))
            .collect();
        let report = pair.a.insert_batch(&items).await.unwrap();
        assert!(report.log_segments > 2, "{}", strategy);

        match pair.deliver_to_b().await {
            NotificationOutcome::Reconciled(outcome) => assert_eq!(outcome.applied, 12),
            other => panic!("{}: unexpected outcome {:?}", strategy, other),
        }
        assert_eq!(pair.b.root_hash(ZONE), pair.a.root_hash(ZONE), "{}", strategy);
    }
}

#[tokio::test]
async fn test_assets_follow_inserts() {
    let mut pair = pair_with(|config| config.asset_distribution(true)).await;
    let asset: Vec<u8> = (0..200u8).collect();

    pair.a
        .insert_with_asset("/alice/ball/_v0/dpwhwtmpz0", asset.clone())
        .await
        .unwrap();
    pair.deliver_to_b().await;

    assert_eq!(pair.b.asset("/alice/ball/_v0/dpwhwtmpz0"), Some(asset));
}

#[tokio::test]
async fn test_receive_loop() {
    let pair = pair().await;
    let Pair {
        network,
        a,
        b,
        inbox_b,
        ..
    } = pair;
    let listener = tokio::spawn(b.clone().run(inbox_b));

    a.insert("/x/dpwhwtmpz0").await.unwrap();
    a.insert("/y/dpwhwtbr2v").await.unwrap();

    for _ in 0..100 {
        if b.root_hash(ZONE) == a.root_hash(ZONE) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(b.root_hash(ZONE), a.root_hash(ZONE));

    network.unregister("b");
    listener.await.unwrap();
}
