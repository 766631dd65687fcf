//! Parsing of fully-qualified item names.
//!
//! An item name is a slash-separated path whose last component is the
//! item's location code, optionally preceded by a version token:
//!
//! ```text
//! /alice/ball/_v0/dpwhwtmpz0
//!  \________/ \_/ \________/
//!   identity  ver    code
//! ```
//!
//! A version token is either all digits (a timestamp) or `_v` followed by
//! digits. Names are normalized to lower case.

use crate::error::TreeError;
use std::cmp::Ordering;
use std::fmt;

/// A parsed item name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemName {
    full: String,
    code: String,
    logical: String,
    identity: String,
    version: Option<u64>,
}

impl ItemName {
    /// Parse and normalize an item name.
    pub fn parse(name: &str) -> Result<Self, TreeError> {
        let full = name.trim().to_lowercase();
        let components: Vec<&str> = full.split('/').filter(|c| !c.is_empty()).collect();

        let (code, rest) = match components.split_last() {
            Some((code, rest)) if !rest.is_empty() => (code.to_string(), rest),
            _ => return Err(TreeError::MalformedName(name.to_string())),
        };

        let logical = format!("/{}", rest.join("/"));
        let (identity, version) = match rest.split_last() {
            Some((last, head)) => match parse_version(last) {
                Some(v) if !head.is_empty() => (format!("/{}", head.join("/")), Some(v)),
                _ => (logical.clone(), None),
            },
            None => (logical.clone(), None),
        };

        Ok(ItemName {
            full,
            code,
            logical,
            identity,
            version,
        })
    }

    /// The normalized full name.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The trailing location code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The name without its location code (version token kept).
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// The name without its location code and version token.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Leading path segment, used to group items by namespace.
    pub fn namespace(&self) -> &str {
        self.logical
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
    }

    /// Whether `self` and `other` name the same item at the same place,
    /// regardless of version.
    pub fn same_item(&self, other: &ItemName) -> bool {
        self.identity == other.identity && self.code == other.code
    }

    /// Order two entries for the same item. Unversioned entries are older
    /// than any versioned one.
    pub fn cmp_version(&self, other: &ItemName) -> Ordering {
        match (self.version, other.version) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

fn parse_version(component: &str) -> Option<u64> {
    let digits = component.strip_prefix("_v").unwrap_or(component);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
