//! Hierarchical content names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A slash-separated content name such as `/spasy/dpwhwt/root/<hash>`.
///
/// Empty components are dropped on parse, so `/a//b/` and `a/b` name the
/// same content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    pub fn new() -> Self {
        Name::default()
    }

    pub fn parse(s: &str) -> Self {
        Name {
            components: s
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Extend with one or more components. A string containing slashes is
    /// split into several components.
    pub fn append(mut self, component: impl AsRef<str>) -> Self {
        self.components.extend(
            component
                .as_ref()
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// The name of one segment of this content.
    pub fn with_segment(&self, seq: u64) -> Self {
        self.clone().append(seq.to_string())
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &Name) -> bool {
        self.components.starts_with(&prefix.components)
    }

    /// Split a segment name into its content name and sequence number.
    pub fn split_segment(&self) -> Option<(Name, u64)> {
        let (last, head) = self.components.split_last()?;
        let seq = last.parse().ok()?;
        Some((
            Name {
                components: head.to_vec(),
            },
            seq,
        ))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Name::parse(s))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let name = Name::parse("spasy//dpwhwt/geocode-tree/");
        assert_eq!(name.len(), 3);
        assert_eq!(name.to_string(), "/spasy/dpwhwt/geocode-tree");
        assert_eq!(Name::new().to_string(), "/");
    }

    #[test]
    fn test_append_splits_components() {
        let name = Name::parse("/spasy").append("dpwhwt/asset").append("/alice/ball/");
        assert_eq!(name.components(), ["spasy", "dpwhwt", "asset", "alice", "ball"]);
    }

    #[test]
    fn test_segment_names() {
        let base = Name::parse("/spasy/dpwhwt/geocode-tree");
        let seg = base.with_segment(7);
        assert_eq!(seg.last(), Some("7"));
        assert!(seg.starts_with(&base));
        assert_eq!(seg.split_segment(), Some((base.clone(), 7)));
        assert_eq!(base.split_segment(), None);
    }
}
