//! # spasy-tree
//!
//! Geocoded Merkle quadtree for Spatial Sync.
//!
//! This crate provides:
//! - A quadtree indexing named items by geohash location code
//! - Incremental Merkle hashing from any mutated node up to the root
//! - A bounded, timestamp-ordered log of recent mutations
//! - Versioned full-tree snapshots for peers without a usable baseline
//!
//! ## Example
//!
//! ```rust
//! use spasy_tree::GeoTree;
//!
//! let mut tree = GeoTree::new("dpwhwt", 4).unwrap();
//! let empty = tree.root_hash();
//!
//! tree.insert("/alice/ball/_v0/dpwhwtmpz0").unwrap();
//! assert!(tree.find("/alice/ball/_v0/dpwhwtmpz0"));
//! assert_ne!(tree.root_hash(), empty);
//!
//! tree.delete("/alice/ball/_v0/dpwhwtmpz0");
//! assert_eq!(tree.root_hash(), empty);
//! ```

pub mod error;
pub mod geocode;
mod hash;
mod log;
mod name;
mod node;
mod snapshot;
mod tree;

pub use error::{SnapshotError, TreeError};
pub use hash::Hash;
pub use log::{now, Action, UpdateLog, UpdateRecord, DEFAULT_LOG_CAPACITY};
pub use name::ItemName;
pub use node::{Node, NodeId};
pub use snapshot::{TreeSnapshot, SNAPSHOT_VERSION};
pub use tree::GeoTree;
