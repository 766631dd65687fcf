//! The named-content network collaborator.
//!
//! The sync core needs three things from the network: make a packed
//! payload available under its name, request one segment of a name, and
//! deliver a small notification to a peer's route. [`MemoryNetwork`]
//! provides all three in-process for tests and the demo binary.

use crate::error::FetchFailure;
use crate::name::Name;
use crate::segment::{PackedPayload, Segment};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Abstract named-content network.
#[async_trait]
pub trait NamedNetwork: Send + Sync + 'static {
    /// Serve every segment of `packed` under its name, replacing any
    /// payload previously published under the same name.
    async fn publish(&self, packed: PackedPayload);

    /// Request segment `seq` of `name`. A dropped request may never
    /// complete; callers are expected to bound it with a timeout.
    async fn request(&self, name: &Name, seq: u64) -> Result<Segment, FetchFailure>;

    /// Deliver a notification, carried entirely in its name, to `route`.
    async fn notify(&self, route: &str, notification: Name) -> Result<(), FetchFailure>;
}

/// Configuration for the in-memory network.
#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// One-way delay applied to every request and notification.
    pub latency: Duration,

    /// Probability in `[0, 1]` that a segment request is silently lost.
    pub drop_rate: f64,

    /// Buffered notifications per route before senders wait.
    pub channel_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            latency: Duration::ZERO,
            drop_rate: 0.0,
            channel_capacity: 256,
        }
    }
}

/// In-process hub: a shared content store plus one notification channel
/// per registered route.
pub struct MemoryNetwork {
    config: MemoryConfig,
    store: RwLock<HashMap<Name, PackedPayload>>,
    routes: RwLock<HashMap<String, mpsc::Sender<Name>>>,
    requests: AtomicU64,
    dropped: AtomicU64,
    closed: watch::Sender<bool>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        MemoryNetwork {
            config,
            store: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            requests: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: watch::channel(false).0,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Register a route and return the receiving end of its notifications.
    /// Registering an existing route replaces its channel.
    pub fn register(&self, route: impl Into<String>) -> mpsc::Receiver<Name> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        self.routes.write().insert(route.into(), tx);
        rx
    }

    pub fn unregister(&self, route: &str) {
        self.routes.write().remove(route);
    }

    /// Close every route and cancel in-flight requests. Later requests and
    /// notifications fail with [`FetchFailure::Canceled`].
    pub fn shutdown(&self) {
        self.closed.send_replace(true);
        self.routes.write().clear();
        debug!("memory network shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.read().keys().cloned().collect();
        routes.sort();
        routes
    }

    pub fn is_published(&self, name: &Name) -> bool {
        self.store.read().contains_key(name)
    }

    /// Segment count of the payload currently published under `name`.
    pub fn segment_count(&self, name: &Name) -> Option<u64> {
        self.store.read().get(name).map(PackedPayload::segment_count)
    }

    /// Total segment requests served or dropped so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self) -> bool {
        self.config.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.config.drop_rate.min(1.0))
    }

    async fn delay(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }

    async fn until_shut_down(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    async fn serve(&self, name: &Name, seq: u64) -> Result<Segment, FetchFailure> {
        if self.should_drop() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("dropping request for {}", name.with_segment(seq));
            return futures::future::pending().await;
        }
        self.delay().await;

        let store = self.store.read();
        let packed = store
            .get(name)
            .ok_or_else(|| FetchFailure::Nack(format!("no content for {}", name)))?;
        packed
            .get(seq)
            .cloned()
            .ok_or_else(|| FetchFailure::Nack(format!("no segment {} for {}", seq, name)))
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NamedNetwork for MemoryNetwork {
    async fn publish(&self, packed: PackedPayload) {
        debug!(
            "publishing {} ({} segments, {} bytes)",
            packed.name(),
            packed.segment_count(),
            packed.byte_len()
        );
        self.store.write().insert(packed.name().clone(), packed);
    }

    async fn request(&self, name: &Name, seq: u64) -> Result<Segment, FetchFailure> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if self.is_shut_down() {
            return Err(FetchFailure::Canceled);
        }
        tokio::select! {
            result = self.serve(name, seq) => result,
            _ = self.until_shut_down() => {
                trace!("canceling request for {}", name.with_segment(seq));
                Err(FetchFailure::Canceled)
            }
        }
    }

    async fn notify(&self, route: &str, notification: Name) -> Result<(), FetchFailure> {
        if self.is_shut_down() {
            return Err(FetchFailure::Canceled);
        }
        self.delay().await;

        let sender = self
            .routes
            .read()
            .get(route)
            .cloned()
            .ok_or_else(|| FetchFailure::Nack(format!("no route to {}", route)))?;
        sender
            .send(notification)
            .await
            .map_err(|_| FetchFailure::Transport(format!("route {} closed", route)))
    }
}
