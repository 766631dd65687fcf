//! Versioned full-tree snapshots.
//!
//! A snapshot is what a joining peer (or one that fell too far behind)
//! fetches instead of a log. The encoding is internal: both ends must run
//! the same [`SNAPSHOT_VERSION`].

use crate::error::SnapshotError;
use crate::hash::Hash;
use crate::tree::GeoTree;
use serde::{Deserialize, Serialize};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// A serialized tree together with its root hash at capture time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Format version for compatibility.
    pub version: u8,

    /// Root hash of `tree` when the snapshot was taken.
    pub root_hash: Hash,

    pub tree: GeoTree,
}

impl TreeSnapshot {
    pub fn capture(tree: &GeoTree) -> Self {
        TreeSnapshot {
            version: SNAPSHOT_VERSION,
            root_hash: tree.root_hash(),
            tree: tree.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a snapshot, rejecting other format versions, malformed
    /// arenas and trees whose stored hashes do not match their content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: TreeSnapshot = serde_json::from_slice(bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: snapshot.version,
            });
        }
        snapshot
            .tree
            .check()
            .map_err(|e| SnapshotError::InvalidData(e.to_string()))?;
        if snapshot.tree.root_hash() != snapshot.root_hash {
            return Err(SnapshotError::InvalidData(format!(
                "root hash {} does not match advertised {}",
                snapshot.tree.root_hash().short(),
                snapshot.root_hash.short()
            )));
        }

        Ok(snapshot)
    }

    pub fn into_tree(self) -> GeoTree {
        self.tree
    }
}
