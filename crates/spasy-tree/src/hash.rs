//! Quadtree node digests.
//!
//! A node hashes exactly one of three inputs:
//!
//! ```text
//! data node      sha256(name_0 0x00 name_1 0x00 ... name_n 0x00)   names sorted
//! internal node  sha256(child_0 || child_1 || ...)                 slot order
//! empty node     sha256("")
//! ```
//!
//! The hex form doubles as a name component, so it parses back with
//! [`str::parse`].

use crate::error::TreeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Separator written after every item name in a data digest.
const NAME_SEPARATOR: u8 = 0x00;

/// A node's SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest of empty input, carried by nodes with neither data nor children.
    pub fn empty() -> Self {
        Self::finish(Sha256::new())
    }

    /// Digest of a leaf's item names. Callers pass them sorted.
    pub fn of_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut sha = Sha256::new();
        for name in names {
            sha.update(name.as_bytes());
            sha.update([NAME_SEPARATOR]);
        }
        Self::finish(sha)
    }

    /// Digest of an internal node's present children, in slot order.
    pub fn of_children(children: impl IntoIterator<Item = Hash>) -> Self {
        let mut sha = Sha256::new();
        for child in children {
            sha.update(child.0);
        }
        Self::finish(sha)
    }

    fn finish(sha: Sha256) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&sha.finalize());
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight hex digits, for logs.
    pub fn short(&self) -> String {
        let mut out = self.to_string();
        out.truncate(8);
        out
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl FromStr for Hash {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TreeError::InvalidHash(s.to_string());
        if s.len() != 64 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 32];
        for (byte, pair) in bytes.iter_mut().zip(s.as_bytes().chunks(2)) {
            let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Hash(bytes))
    }
}
