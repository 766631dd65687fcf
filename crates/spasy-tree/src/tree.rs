//! The geocoded Merkle quadtree.
//!
//! Nodes live in an arena owned by the tree. Children are referenced by
//! [`NodeId`]; the parent link is a plain index used only to walk back up
//! the path after a mutation and recompute hashes. Every insert or delete
//! runs to completion without suspending, so no reader ever sees a
//! half-updated hash chain.
//!
//! ## Geometry
//!
//! A tree rooted at a code of length `R` with `max_depth` `D` has `D + 1`
//! levels counting the root. Each level below the root consumes one code
//! character, routed to a child slot by [`crate::geocode::quadrant`]. Only
//! codes of length exactly `R + D` that start with the root code are
//! accepted, and item data is stored at depth `D`.

use crate::error::{Result, TreeError};
use crate::geocode;
use crate::hash::Hash;
use crate::log::{Action, UpdateLog, UpdateRecord, DEFAULT_LOG_CAPACITY};
use crate::name::ItemName;
use crate::node::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Index, IndexMut};
use tracing::{debug, warn};

/// A Merkle quadtree indexing named items by location code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    root_code: String,
    max_depth: usize,
    recent_updates: UpdateLog,
}

impl GeoTree {
    /// Create an empty tree with the default update-log capacity.
    pub fn new(root_code: &str, max_depth: usize) -> Result<Self> {
        Self::with_log_capacity(root_code, max_depth, DEFAULT_LOG_CAPACITY)
    }

    /// Create an empty tree whose update log holds at most `capacity` records.
    pub fn with_log_capacity(root_code: &str, max_depth: usize, capacity: usize) -> Result<Self> {
        let root_code = root_code.trim().to_lowercase();
        if !root_code.is_empty() && !geocode::is_valid(&root_code) {
            return Err(TreeError::InvalidCode(root_code));
        }

        Ok(GeoTree {
            nodes: vec![Some(Node::new(root_code.clone(), None))],
            free: Vec::new(),
            root: NodeId(0),
            root_code,
            max_depth,
            recent_updates: UpdateLog::new(capacity),
        })
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        &self[self.root]
    }

    /// The Merkle digest summarizing all current content.
    pub fn root_hash(&self) -> Hash {
        self.root().hashcode()
    }

    pub fn root_code(&self) -> &str {
        &self.root_code
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Length every accepted location code must have.
    pub fn code_len(&self) -> usize {
        self.root_code.len() + self.max_depth
    }

    pub fn recent_updates(&self) -> &UpdateLog {
        &self.recent_updates
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().map(|n| n.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that an item's code belongs in this tree.
    pub fn validate(&self, item: &ItemName) -> Result<()> {
        let code = item.code();
        if !code.starts_with(&self.root_code) {
            return Err(TreeError::OutsideRoot {
                code: code.to_string(),
                root: self.root_code.clone(),
            });
        }
        if code.len() != self.code_len() {
            return Err(TreeError::WrongCodeLength {
                code: code.to_string(),
                expected: self.code_len(),
                actual: code.len(),
            });
        }
        if !geocode::is_valid(code) {
            return Err(TreeError::InvalidCode(code.to_string()));
        }
        Ok(())
    }

    /// Insert an item and record the mutation in the update log.
    ///
    /// Returns `Ok(false)` when the item (or a newer version of it) is
    /// already present. Structural rejections leave the tree untouched.
    pub fn insert(&mut self, name: &str) -> Result<bool> {
        let item = self.parse_checked(name)?;
        let changed = self.insert_item(&item);
        if changed {
            self.recent_updates.record(Action::Insert, item.as_str());
        }
        Ok(changed)
    }

    /// Delete an exact item and record the mutation in the update log.
    ///
    /// Returns `false`, leaving the tree untouched, when the item is absent.
    pub fn delete(&mut self, name: &str) -> bool {
        let Ok(item) = self.parse_checked(name) else {
            return false;
        };
        let changed = self.delete_item(&item);
        if changed {
            self.recent_updates.record(Action::Delete, item.as_str());
        }
        changed
    }

    /// Apply a mutation received from a peer, keeping its timestamp.
    pub fn replay(&mut self, record: &UpdateRecord) -> Result<bool> {
        let item = self.parse_checked(&record.name)?;
        let changed = match record.action {
            Action::Insert => self.insert_item(&item),
            Action::Delete => self.delete_item(&item),
        };
        self.recent_updates
            .push(UpdateRecord::new(record.timestamp, record.action, item.as_str()));
        Ok(changed)
    }

    /// Exact-match membership test.
    pub fn find(&self, name: &str) -> bool {
        let Ok(item) = ItemName::parse(name) else {
            return false;
        };
        if self.validate(&item).is_err() {
            return false;
        }
        self.locate(&item)
            .and_then(|path| path.last().copied())
            .map(|leaf| self[leaf].contains(item.as_str()))
            .unwrap_or(false)
    }

    /// Every location code under which a logical name currently has data.
    ///
    /// The argument may be a logical name (`/alice/ball/_v0`), an identity
    /// without version (`/alice/ball`), or a full item name whose own code
    /// is ignored.
    pub fn find_without_code(&self, logical_name: &str) -> Vec<String> {
        let wanted = match ItemName::parse(logical_name) {
            Ok(item) if self.validate(&item).is_ok() => item.logical().to_string(),
            _ => normalize_logical(logical_name),
        };

        let codes: BTreeSet<String> = self
            .items()
            .filter(|item| item.logical() == wanted || item.identity() == wanted)
            .map(|item| item.code().to_string())
            .collect();
        codes.into_iter().collect()
    }

    /// All stored items grouped by their leading path segment.
    pub fn by_namespace(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in self.items() {
            groups
                .entry(item.namespace().to_string())
                .or_default()
                .push(item.as_str().to_string());
        }
        groups
    }

    /// All stored items grouped by their location code.
    pub fn by_geocode(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in self.items() {
            groups
                .entry(item.code().to_string())
                .or_default()
                .push(item.as_str().to_string());
        }
        groups
    }

    /// Every stored item name, in traversal order.
    pub fn item_names(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .flat_map(|id| self[id].data.iter().cloned())
            .collect()
    }

    /// Replace this tree's content, shape and log with another's.
    pub fn adopt(&mut self, other: &GeoTree) {
        *self = other.clone();
    }

    /// Recompute every hash bottom-up and compare with the stored ones.
    pub fn verify(&self) -> bool {
        self.check().is_ok()
    }

    /// Validate the arena and every stored hash without recursion.
    ///
    /// Each live node must be reached exactly once from the root, through a
    /// child link its own parent link agrees with, at most `max_depth`
    /// levels down. Free-listed slots must be vacant and distinct.
    pub fn check(&self) -> Result<()> {
        if !self.root_code.is_empty() && !geocode::is_valid(&self.root_code) {
            return Err(TreeError::InvalidCode(self.root_code.clone()));
        }
        let Some(root) = self.node(self.root) else {
            return corrupt(format!("root {:?} is not a live node", self.root));
        };
        if root.parent.is_some() {
            return corrupt(format!("root {:?} has a parent", self.root));
        }

        let mut freed = vec![false; self.nodes.len()];
        for id in &self.free {
            match self.nodes.get(id.0) {
                Some(None) if !freed[id.0] => freed[id.0] = true,
                _ => return corrupt(format!("free list entry {:?} is not a vacant slot", id)),
            }
        }

        let mut visited = vec![false; self.nodes.len()];
        visited[self.root.0] = true;
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            order.push(id);
            for &child in self[id].children.iter().flatten() {
                let Some(node) = self.node(child) else {
                    return corrupt(format!("{:?} links to vacant {:?}", id, child));
                };
                if visited[child.0] {
                    return corrupt(format!("{:?} is linked more than once", child));
                }
                if node.parent != Some(id) {
                    return corrupt(format!("{:?} does not point back to {:?}", child, id));
                }
                if depth >= self.max_depth {
                    return corrupt(format!("{:?} lies below max depth {}", child, self.max_depth));
                }
                visited[child.0] = true;
                stack.push((child, depth + 1));
            }
        }
        if order.len() != self.node_count() {
            return corrupt(format!(
                "{} of {} live nodes unreachable from the root",
                self.node_count() - order.len(),
                self.node_count()
            ));
        }

        // Preorder reversed puts every child before its parent.
        let mut hashes: Vec<Option<Hash>> = vec![None; self.nodes.len()];
        for &id in order.iter().rev() {
            let node = &self[id];
            let expected = node.digest(node.children.iter().flatten().filter_map(|c| hashes[c.0]));
            if expected != node.hashcode {
                return corrupt(format!("stored hash of {:?} does not match its content", id));
            }
            hashes[id.0] = Some(expected);
        }
        Ok(())
    }

    fn parse_checked(&self, name: &str) -> Result<ItemName> {
        let item = ItemName::parse(name).map_err(|e| {
            warn!("rejecting {}: {}", name, e);
            e
        })?;
        self.validate(&item).map_err(|e| {
            warn!("rejecting {}: {}", name, e);
            e
        })?;
        Ok(item)
    }

    /// Descend one character per level, creating nodes lazily, then store
    /// the item at the leaf and rehash up to the root.
    fn insert_item(&mut self, item: &ItemName) -> bool {
        let code = item.code();
        let start = self.root_code.len();
        let Some(slots) = geocode::path(code, start) else {
            return false;
        };

        let mut current = self.root;
        for (depth, slot) in slots.into_iter().enumerate() {
            let prefix = &code[..start + depth + 1];
            current = match self[current].child(slot) {
                Some(child) => {
                    self[child].geocode.insert(prefix.to_string());
                    child
                }
                None => {
                    let child = self.alloc(Node::new(prefix, Some(current)));
                    self[current].children[slot] = Some(child);
                    child
                }
            };
        }

        let changed = self[current].insert_data(item);
        if changed {
            debug!("inserted {} at {:?}", item, current);
            self.rehash_upward(current);
        }
        changed
    }

    /// Remove the item, prune nodes left empty, and rehash what survives.
    fn delete_item(&mut self, item: &ItemName) -> bool {
        let Some(path) = self.locate(item) else {
            return false;
        };
        let Some(&leaf) = path.last() else {
            return false;
        };
        if !self[leaf].remove_data(item.as_str()) {
            return false;
        }

        let mut current = leaf;
        while current != self.root && self[current].is_empty() {
            let Some(parent) = self[current].parent else {
                break;
            };
            for slot in self[parent].children.iter_mut() {
                if *slot == Some(current) {
                    *slot = None;
                }
            }
            self.release(current);
            current = parent;
        }

        debug!("deleted {}, pruned up to {:?}", item, current);
        self.rehash_upward(current);
        true
    }

    /// Node ids from the root down to the leaf holding `item`'s code.
    fn locate(&self, item: &ItemName) -> Option<Vec<NodeId>> {
        let code = item.code();
        let start = self.root_code.len();
        let slots = geocode::path(code, start)?;

        let mut path = Vec::with_capacity(slots.len() + 1);
        let mut current = self.root;
        path.push(current);
        for (depth, slot) in slots.into_iter().enumerate() {
            let child = self[current].child(slot)?;
            if !self[child].geocode.contains(&code[..start + depth + 1]) {
                return None;
            }
            current = child;
            path.push(current);
        }
        Some(path)
    }

    /// Recompute code sets and hashes from `id` up to the root.
    fn rehash_upward(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.refresh_codes(id);
            let child_hashes: Vec<Hash> = self[id]
                .children
                .iter()
                .flatten()
                .map(|child| self[*child].hashcode)
                .collect();
            let hash = self[id].digest(child_hashes);
            self[id].hashcode = hash;
            current = self[id].parent;
        }
    }

    /// Drop codes no longer backed by data (leaves) or by a child's code.
    fn refresh_codes(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let node = &self[id];
        let codes: BTreeSet<String> = if !node.data.is_empty() {
            node.data
                .iter()
                .filter_map(|d| ItemName::parse(d).ok())
                .map(|item| item.code().to_string())
                .collect()
        } else {
            let len = node.code_len();
            node.children
                .iter()
                .flatten()
                .flat_map(|child| self[*child].geocode.iter())
                .filter_map(|code| code.get(..len))
                .map(str::to_string)
                .collect()
        };
        if !codes.is_empty() {
            self[id].geocode = codes;
        }
    }

    /// Depth-first node ids in slot order, root first.
    fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self[id].children.iter().rev().flatten().copied());
        }
        order
    }

    fn items(&self) -> impl Iterator<Item = ItemName> + '_ {
        self.walk()
            .into_iter()
            .flat_map(move |id| self[id].data.iter())
            .filter_map(|d| ItemName::parse(d).ok())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.nodes.get_mut(id.0) {
            if slot.take().is_some() {
                self.free.push(id);
            }
        }
    }
}

impl Index<NodeId> for GeoTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling node id {:?}", id),
        }
    }
}

impl IndexMut<NodeId> for GeoTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling node id {:?}", id),
        }
    }
}

/// Two trees are equal when they hold the same items under the same root.
impl PartialEq for GeoTree {
    fn eq(&self, other: &Self) -> bool {
        self.root_code == other.root_code
            && self.max_depth == other.max_depth
            && self.root_hash() == other.root_hash()
            && self.by_geocode() == other.by_geocode()
    }
}

fn corrupt(what: String) -> Result<()> {
    Err(TreeError::Corrupt(what))
}

fn normalize_logical(name: &str) -> String {
    let trimmed = name.trim().trim_matches('/').to_lowercase();
    format!("/{}", trimmed)
}
