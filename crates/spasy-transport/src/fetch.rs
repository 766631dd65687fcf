//! Segmented fetch with three strategies.
//!
//! - **Sequential**: one request in flight, following segments until the
//!   one marked final.
//! - **Concurrent**: learn the count from segment 0 (or take it from the
//!   caller), then request every remaining segment at once.
//! - **Batched**: like concurrent, but requests go out in fixed-size
//!   batches, each starting after the previous one completes.
//!
//! Every request is bounded by a timeout. A failed segment is recorded and
//! contributes no bytes; nothing is retried.

use crate::error::FetchFailure;
use crate::name::Name;
use crate::network::NamedNetwork;
use crate::segment::{Segment, DEFAULT_SEGMENT_SIZE};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How segments beyond the first are requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    Sequential,
    Concurrent,
    #[default]
    Batched,
}

impl FetchStrategy {
    pub const ALL: [FetchStrategy; 3] = [
        FetchStrategy::Sequential,
        FetchStrategy::Concurrent,
        FetchStrategy::Batched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Sequential => "sequential",
            FetchStrategy::Concurrent => "concurrent",
            FetchStrategy::Batched => "batched",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(FetchStrategy::Sequential),
            "concurrent" => Ok(FetchStrategy::Concurrent),
            "batched" => Ok(FetchStrategy::Batched),
            other => Err(format!("unknown fetch strategy: {}", other)),
        }
    }
}

/// Configuration for segmentation and fetching.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportConfig {
    /// Maximum body size of one segment.
    pub segment_size: usize,

    /// Hard ceiling on the segment count of any fetched payload.
    pub max_segments: u64,

    /// Requests per batch for [`FetchStrategy::Batched`].
    pub batch_size: usize,

    /// Default per-request timeout.
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            segment_size: DEFAULT_SEGMENT_SIZE,
            max_segments: 100,
            batch_size: 75,
            request_timeout: Duration::from_millis(100),
        }
    }
}

/// Outcome of a segmented fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub name: Name,
    /// Segment bodies concatenated by sequence number; failed segments
    /// contribute nothing.
    pub data: Vec<u8>,
    /// Segment count, when it was supplied or learned.
    pub expected: Option<u64>,
    pub received: u64,
    /// Failures keyed by the sequence number they occurred at.
    pub failures: Vec<(u64, FetchFailure)>,
}

impl Fetched {
    fn empty(name: &Name) -> Self {
        Fetched {
            name: name.clone(),
            data: Vec::new(),
            expected: None,
            received: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.expected == Some(self.received)
    }

    pub fn first_failure(&self) -> Option<&FetchFailure> {
        self.failures.first().map(|(_, f)| f)
    }

    /// The payload, only if every segment arrived.
    pub fn into_complete(self) -> Option<Vec<u8>> {
        self.is_complete().then_some(self.data)
    }

    fn fail(&mut self, seq: u64, failure: FetchFailure) {
        warn!(
            "segment {} of {} failed: {}",
            seq, self.name, failure
        );
        self.failures.push((seq, failure));
    }

    fn accept(&mut self, segment: Segment) {
        self.received += 1;
        self.data.extend_from_slice(&segment.payload);
    }
}

/// Fetches segmented payloads over a [`NamedNetwork`].
#[derive(Clone)]
pub struct Fetcher {
    network: Arc<dyn NamedNetwork>,
    config: TransportConfig,
}

impl Fetcher {
    pub fn new(network: Arc<dyn NamedNetwork>, config: TransportConfig) -> Self {
        Fetcher { network, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<dyn NamedNetwork> {
        &self.network
    }

    /// Fetch `name` with the configured request timeout.
    pub async fn fetch(
        &self,
        name: &Name,
        known_count: Option<u64>,
        strategy: FetchStrategy,
    ) -> Fetched {
        self.fetch_with_timeout(name, known_count, strategy, self.config.request_timeout)
            .await
    }

    /// Fetch `name`, bounding each segment request by `timeout`.
    ///
    /// A `known_count` lets the concurrent strategies skip the discovery
    /// round trip. A count of zero is treated as unknown.
    pub async fn fetch_with_timeout(
        &self,
        name: &Name,
        known_count: Option<u64>,
        strategy: FetchStrategy,
        timeout: Duration,
    ) -> Fetched {
        let known_count = known_count.filter(|&count| count > 0);
        let mut fetched = Fetched::empty(name);

        if let Some(count) = known_count {
            if count > self.config.max_segments {
                fetched.expected = Some(count);
                fetched.fail(0, self.too_many(count));
                return fetched;
            }
        }

        debug!(
            "fetching {} ({}, known count {:?})",
            name, strategy, known_count
        );

        match strategy {
            FetchStrategy::Sequential => self.sequential(&mut fetched, known_count, timeout).await,
            FetchStrategy::Concurrent => {
                self.concurrent(&mut fetched, known_count, None, timeout).await
            }
            FetchStrategy::Batched => {
                let batch = self.config.batch_size.max(1);
                self.concurrent(&mut fetched, known_count, Some(batch), timeout)
                    .await
            }
        }

        debug!(
            "fetched {}: {}/{:?} segments, {} bytes, {} failures",
            name,
            fetched.received,
            fetched.expected,
            fetched.data.len(),
            fetched.failures.len()
        );
        fetched
    }

    async fn sequential(&self, fetched: &mut Fetched, known_count: Option<u64>, timeout: Duration) {
        fetched.expected = known_count;
        let name = fetched.name.clone();
        let mut seq = 0;

        loop {
            let segment = match self.request(&name, seq, timeout).await {
                Ok(segment) => segment,
                Err(failure) => {
                    fetched.fail(seq, failure);
                    return;
                }
            };

            let count = segment.segment_count();
            if seq == 0 {
                if count > self.config.max_segments {
                    fetched.expected = Some(count);
                    fetched.fail(0, self.too_many(count));
                    return;
                }
                fetched.expected = Some(count);
            } else if fetched.expected != Some(count) {
                fetched.fail(
                    seq,
                    FetchFailure::ValidationFailed(format!(
                        "segment count {} disagrees with {:?}",
                        count, fetched.expected
                    )),
                );
                return;
            }

            let last = segment.is_final();
            fetched.accept(segment);
            if last {
                return;
            }
            seq += 1;
        }
    }

    async fn concurrent(
        &self,
        fetched: &mut Fetched,
        known_count: Option<u64>,
        batch: Option<usize>,
        timeout: Duration,
    ) {
        let name = fetched.name.clone();

        let (count, first) = match known_count {
            Some(count) => (count, 0),
            None => {
                let segment = match self.request(&name, 0, timeout).await {
                    Ok(segment) => segment,
                    Err(failure) => {
                        fetched.fail(0, failure);
                        return;
                    }
                };
                let count = segment.segment_count();
                fetched.expected = Some(count);
                if count > self.config.max_segments {
                    fetched.fail(0, self.too_many(count));
                    return;
                }
                fetched.accept(segment);
                (count, 1)
            }
        };
        fetched.expected = Some(count);

        let seqs: Vec<u64> = (first..count).collect();
        let chunk = batch.unwrap_or(seqs.len()).max(1);

        for group in seqs.chunks(chunk) {
            let results = join_all(group.iter().map(|&seq| {
                let name = name.clone();
                async move { (seq, self.request(&name, seq, timeout).await) }
            }))
            .await;

            for (seq, result) in results {
                match result {
                    Ok(segment) if segment.segment_count() != count => fetched.fail(
                        seq,
                        FetchFailure::ValidationFailed(format!(
                            "segment count {} disagrees with {}",
                            segment.segment_count(),
                            count
                        )),
                    ),
                    Ok(segment) => fetched.accept(segment),
                    Err(failure) => fetched.fail(seq, failure),
                }
            }
        }
    }

    /// One bounded, validated segment request.
    async fn request(&self, name: &Name, seq: u64, timeout: Duration) -> Result<Segment, FetchFailure> {
        let segment = tokio::time::timeout(timeout, self.network.request(name, seq))
            .await
            .map_err(|_| FetchFailure::Timeout)??;

        if segment.name != *name || segment.seq != seq {
            return Err(FetchFailure::ValidationFailed(format!(
                "asked for {}, got {}",
                name.with_segment(seq),
                segment.full_name()
            )));
        }
        if segment.seq > segment.final_block {
            return Err(FetchFailure::ValidationFailed(format!(
                "segment {} is past final block {}",
                segment.seq, segment.final_block
            )));
        }
        Ok(segment)
    }

    fn too_many(&self, count: u64) -> FetchFailure {
        FetchFailure::TooManySegments {
            count,
            limit: self.config.max_segments,
        }
    }
}
