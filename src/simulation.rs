//! In-memory multi-node demo.
//!
//! Node 0 tracks and populates a zone, the others join it, and then a
//! seeded stream of random inserts and deletes is applied across the nodes
//! while their receive loops propagate each change.

use crate::population;
use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spasy_sync::{SyncConfig, SyncCoordinator};
use spasy_transport::{FetchStrategy, MemoryConfig, MemoryNetwork};
use spasy_tree::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct DemoOptions {
    pub nodes: usize,
    pub operations: usize,
    pub seed: u64,
    pub strategy: FetchStrategy,
    pub zone: String,
    pub max_depth: usize,
    /// Items node 0 starts with.
    pub initial_items: usize,
    pub log_capacity: usize,
    pub segment_size: usize,
    pub latency: Duration,
    /// Pause after each mutation so peers can catch up before the next.
    pub settle: Duration,
}

impl Default for DemoOptions {
    fn default() -> Self {
        DemoOptions {
            nodes: 3,
            operations: 40,
            seed: 7,
            strategy: FetchStrategy::Batched,
            zone: "dpwhwt".to_string(),
            max_depth: 4,
            initial_items: 16,
            log_capacity: 32,
            segment_size: 4096,
            latency: Duration::from_millis(1),
            settle: Duration::from_millis(20),
        }
    }
}

/// One generated mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub node: usize,
    pub action: Action,
    pub item: String,
}

/// Final state of one node.
#[derive(Clone, Debug)]
pub struct NodeSummary {
    pub name: String,
    pub root_hash: String,
    pub items: usize,
    pub log_records: usize,
}

#[derive(Clone, Debug)]
pub struct DemoReport {
    pub nodes: Vec<NodeSummary>,
    pub inserts: usize,
    pub deletes: usize,
    pub requests: u64,
    pub total_time: Duration,
    pub converged: bool,
}

impl DemoReport {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Spatial Sync Demo Report                      ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Nodes:                     {:>30} ║", self.nodes.len());
        println!("║  Inserts:                   {:>30} ║", self.inserts);
        println!("║  Deletes:                   {:>30} ║", self.deletes);
        println!("║  Segment Requests:          {:>30} ║", self.requests);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Converged:                 {:>30} ║", if self.converged { "yes" } else { "no" });
        println!("╠════════════════════════════════════════════════════════════╣");
        for node in &self.nodes {
            println!(
                "║  {:<10} root {:<16} items {:>5}  log {:>5}   ║",
                node.name, node.root_hash, node.items, node.log_records
            );
        }
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Random mutations reproducible from `seed`. Deletes pick an item that
/// is still live; a delete is only produced when one exists.
fn mutation_stream(
    options: &DemoOptions,
    mut live: Vec<String>,
    words: Vec<String>,
) -> impl Stream<Item = Mutation> {
    let DemoOptions {
        nodes,
        operations,
        seed,
        zone,
        max_depth,
        ..
    } = options.clone();

    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for i in 0..operations {
            let node = rng.gen_range(0..nodes);
            if !live.is_empty() && rng.gen_bool(0.3) {
                let item = live.swap_remove(rng.gen_range(0..live.len()));
                yield Mutation { node, action: Action::Delete, item };
            } else {
                let item = population::item_name(&mut rng, &zone, max_depth, &words, &format!("op{}", i));
                live.push(item.clone());
                yield Mutation { node, action: Action::Insert, item };
            }
        }
    }
}

pub async fn run_demo(options: DemoOptions) -> spasy_sync::Result<DemoReport> {
    let options = DemoOptions {
        nodes: options.nodes.max(2),
        ..options
    };
    let nodes = options.nodes;
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Spatial Sync Demo (in-memory)                       ║");
    println!(
        "║  Nodes: {} | Operations: {} | Strategy: {} ║",
        nodes, options.operations, options.strategy
    );
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let network = Arc::new(MemoryNetwork::with_config(MemoryConfig {
        latency: options.latency,
        ..MemoryConfig::default()
    }));
    let names: Vec<String> = (0..nodes).map(|i| format!("node-{}", i)).collect();

    let mut coordinators = Vec::with_capacity(nodes);
    let mut inboxes = Vec::with_capacity(nodes);
    for name in &names {
        let mut config = SyncConfig::builder()
            .node_name(name.clone())
            .segment_size(options.segment_size)
            .fetch_strategy(options.strategy)
            .update_log_capacity(options.log_capacity)
            .max_depth(options.max_depth)
            .build();
        config.routes = names.iter().filter(|r| *r != name).cloned().collect();
        config.validate()?;

        inboxes.push(network.register(name.clone()));
        coordinators.push(Arc::new(SyncCoordinator::new(config, network.clone())));
    }

    println!("\n[Phase 1/3] Building zone {}...", options.zone);
    let words = population::load_words(None)?;
    coordinators[0].track(&options.zone, options.max_depth).await?;
    let initial = population::item_names(
        &options.zone,
        options.max_depth,
        options.initial_items,
        options.seed,
        &words,
    );
    if !initial.is_empty() {
        coordinators[0].insert_batch(&initial).await?;
    }
    for coordinator in &coordinators[1..] {
        coordinator.join(&options.zone).await?;
    }
    println!("[Phase 1/3] ✓ Completed");

    let listeners: Vec<_> = coordinators
        .iter()
        .zip(inboxes)
        .map(|(coordinator, inbox)| tokio::spawn(coordinator.clone().run(inbox)))
        .collect();

    println!("[Phase 2/3] Applying random mutations...");
    let (mut inserts, mut deletes) = (0, 0);
    let mut mutations = Box::pin(mutation_stream(&options, initial, words));
    while let Some(mutation) = mutations.next().await {
        let coordinator = &coordinators[mutation.node];
        let result = match mutation.action {
            Action::Insert => coordinator.insert(&mutation.item).await,
            Action::Delete => coordinator.delete(&mutation.item).await,
        };
        match result {
            Ok(report) => {
                debug!("{} {} -> {:?}", coordinator.node_name(), mutation.item, report.phase);
                match mutation.action {
                    Action::Insert => inserts += 1,
                    Action::Delete => deletes += 1,
                }
            }
            Err(e) => warn!("{} failed {} {}: {}", coordinator.node_name(), mutation.action, mutation.item, e),
        }
        tokio::time::sleep(options.settle).await;
    }

    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Waiting for convergence...");
    let mut converged = false;
    for _ in 0..50 {
        tokio::time::sleep(options.settle).await;
        if all_equal(&coordinators, &options.zone) {
            converged = true;
            break;
        }
    }
    if converged {
        println!("[Phase 3/3] ✓ Completed");
    } else {
        println!("[Phase 3/3] ✗ Nodes still disagree");
    }

    let summaries = coordinators
        .iter()
        .map(|coordinator| summarize(coordinator, &options.zone))
        .collect();
    for coordinator in &coordinators {
        coordinator.dump()?;
    }

    network.shutdown();
    futures::future::join_all(listeners).await;

    let report = DemoReport {
        nodes: summaries,
        inserts,
        deletes,
        requests: network.request_count(),
        total_time: start.elapsed(),
        converged,
    };
    info!(
        "demo finished: {} inserts, {} deletes, converged {}",
        report.inserts, report.deletes, report.converged
    );
    Ok(report)
}

fn all_equal(coordinators: &[Arc<SyncCoordinator>], zone: &str) -> bool {
    let first = coordinators[0].root_hash(zone);
    first.is_some() && coordinators.iter().all(|c| c.root_hash(zone) == first)
}

fn summarize(coordinator: &SyncCoordinator, zone: &str) -> NodeSummary {
    let tree = coordinator.tree(zone);
    NodeSummary {
        name: coordinator.node_name().to_string(),
        root_hash: tree
            .as_ref()
            .map(|t| t.root_hash().short())
            .unwrap_or_else(|| "-".to_string()),
        items: tree.as_ref().map_or(0, |t| t.len()),
        log_records: tree.as_ref().map_or(0, |t| t.recent_updates().len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mutation_stream_is_reproducible() {
        let options = DemoOptions::default();
        let words = population::load_words(None).unwrap();

        let a: Vec<Mutation> = mutation_stream(&options, Vec::new(), words.clone()).collect().await;
        let b: Vec<Mutation> = mutation_stream(&options, Vec::new(), words).collect().await;

        assert_eq!(a, b);
        assert_eq!(a.len(), options.operations);
        assert_eq!(a[0].action, Action::Insert);
        assert!(a.iter().all(|m| m.node < options.nodes));
    }

    #[tokio::test]
    async fn test_deletes_only_target_live_items() {
        let options = DemoOptions {
            operations: 200,
            ..DemoOptions::default()
        };
        let words = population::load_words(None).unwrap();
        let mutations: Vec<Mutation> = mutation_stream(&options, Vec::new(), words).collect().await;

        let mut live = std::collections::HashSet::new();
        for mutation in mutations {
            match mutation.action {
                Action::Insert => assert!(live.insert(mutation.item)),
                Action::Delete => assert!(live.remove(&mutation.item)),
            }
        }
    }

    #[tokio::test]
    async fn test_demo_converges() {
        let options = DemoOptions {
            nodes: 3,
            operations: 12,
            initial_items: 4,
            ..DemoOptions::default()
        };
        let report = run_demo(options).await.unwrap();

        assert!(report.converged);
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.inserts + report.deletes, 12);
        let first = &report.nodes[0];
        assert!(report.nodes.iter().all(|n| n.root_hash == first.root_hash && n.items == first.items));
    }
}
