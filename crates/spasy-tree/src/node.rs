//! Quadtree node definition.
//!
//! Each node holds:
//! - A Merkle hash summarizing its content
//! - The set of equal-length location codes it currently represents
//! - Up to four children, one per quadrant, owned through the tree's arena
//! - A non-owning parent index, used only to walk upward when rehashing
//! - The item names stored at this node (leaves only)

use crate::geocode::BRANCHING;
use crate::hash::Hash;
use crate::name::ItemName;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Index of a node in its tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A spatial index node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) hashcode: Hash,
    pub(crate) geocode: BTreeSet<String>,
    pub(crate) children: [Option<NodeId>; BRANCHING],
    pub(crate) parent: Option<NodeId>,
    /// Kept sorted so the data hash does not depend on insertion order.
    pub(crate) data: Vec<String>,
}

impl Node {
    /// Create a childless, dataless node for a single location code.
    pub fn new(code: impl Into<String>, parent: Option<NodeId>) -> Self {
        let mut geocode = BTreeSet::new();
        geocode.insert(code.into());
        Node {
            hashcode: Hash::empty(),
            geocode,
            children: [None; BRANCHING],
            parent,
            data: Vec::new(),
        }
    }

    pub fn hashcode(&self) -> Hash {
        self.hashcode
    }

    pub fn geocode(&self) -> &BTreeSet<String> {
        &self.geocode
    }

    pub fn children(&self) -> &[Option<NodeId>; BRANCHING] {
        &self.children
    }

    pub fn child(&self, slot: usize) -> Option<NodeId> {
        self.children.get(slot).copied().flatten()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn data(&self) -> &[String] {
        &self.data
    }

    /// Length shared by every code this node represents.
    pub fn code_len(&self) -> usize {
        self.geocode.iter().next().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of present children.
    pub fn child_count(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }

    /// A node with neither data nor children.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.child_count() == 0
    }

    /// Exact membership of a normalized item name.
    pub fn contains(&self, name: &str) -> bool {
        self.data.binary_search_by(|d| d.as_str().cmp(name)).is_ok()
    }

    /// Insert an item, resolving conflicts with an older or newer entry for
    /// the same item. Returns whether the data changed.
    pub(crate) fn insert_data(&mut self, item: &ItemName) -> bool {
        if self.contains(item.as_str()) {
            return false;
        }

        let existing = self.data.iter().enumerate().find_map(|(i, d)| {
            ItemName::parse(d)
                .ok()
                .filter(|other| other.same_item(item))
                .map(|other| (i, other))
        });

        if let Some((index, other)) = existing {
            if item.cmp_version(&other) != Ordering::Greater {
                return false;
            }
            self.data.remove(index);
        }

        let pos = self
            .data
            .binary_search_by(|d| d.as_str().cmp(item.as_str()))
            .unwrap_or_else(|pos| pos);
        self.data.insert(pos, item.as_str().to_string());
        true
    }

    /// Remove an exact item name. Returns whether it was present.
    pub(crate) fn remove_data(&mut self, name: &str) -> bool {
        match self.data.binary_search_by(|d| d.as_str().cmp(name)) {
            Ok(pos) => {
                self.data.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Compute this node's hash from its data, or from the given child
    /// hashes (in slot order) when it holds no data.
    pub(crate) fn digest(&self, child_hashes: impl IntoIterator<Item = Hash>) -> Hash {
        if self.data.is_empty() {
            Hash::of_children(child_hashes)
        } else {
            Hash::of_names(self.data.iter().map(String::as_str))
        }
    }
}
