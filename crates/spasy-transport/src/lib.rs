//! # spasy-transport
//!
//! Segmented named-content transport for Spatial Sync.
//!
//! Payloads are split into fixed-size segments addressed as
//! `<name>/<seq>`, each carrying the sequence number of the final segment.
//! A [`Fetcher`] reassembles them over any [`NamedNetwork`] using one of
//! three [`FetchStrategy`] variants. Failed segments are reported in the
//! [`Fetched`] result rather than raised.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use spasy_transport::{pack, FetchStrategy, Fetcher, MemoryNetwork, Name, NamedNetwork, TransportConfig};
//!
//! # tokio_test_block_on(async {
//! let network = Arc::new(MemoryNetwork::new());
//! let name = Name::parse("/spasy/dpwhwt/geocode-tree");
//! network.publish(pack(b"payload", &name, 4)).await;
//!
//! let fetcher = Fetcher::new(network, TransportConfig::default());
//! let fetched = fetcher.fetch(&name, None, FetchStrategy::Batched).await;
//! assert!(fetched.is_complete());
//! assert_eq!(fetched.data, b"payload");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod error;
mod fetch;
mod name;
mod network;
mod segment;

pub use error::FetchFailure;
pub use fetch::{FetchStrategy, Fetched, Fetcher, TransportConfig};
pub use name::Name;
pub use network::{MemoryConfig, MemoryNetwork, NamedNetwork};
pub use segment::{pack, PackedPayload, Segment, DEFAULT_SEGMENT_SIZE};
