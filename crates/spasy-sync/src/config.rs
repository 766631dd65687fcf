//! Node configuration.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use spasy_transport::{FetchStrategy, TransportConfig, DEFAULT_SEGMENT_SIZE};
use spasy_tree::DEFAULT_LOG_CAPACITY;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one sync node.
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// This node's route; notifications addressed elsewhere are rejected.
    pub node_name: String,
    /// Application prefix shared by every name the node produces.
    pub app_prefix: String,
    /// Routes of the peers notified after each local mutation.
    pub routes: Vec<String>,
    pub segment_size: usize,
    /// Ceiling on the segment count of any fetched payload.
    pub max_segments: u64,
    pub fetch_strategy: FetchStrategy,
    pub batch_size: usize,
    pub notification_timeout_ms: u64,
    pub log_timeout_ms: u64,
    pub tree_timeout_ms: u64,
    pub asset_timeout_ms: u64,
    pub update_log_capacity: usize,
    /// Levels below a zone's root; item codes are zone length plus this.
    pub max_depth: usize,
    /// Publish and fetch asset bytes alongside inserts.
    pub asset_distribution: bool,
    /// Fetch and adopt the full tree when log replay does not converge.
    pub full_state_fallback: bool,
    /// Default tracing filter, e.g. `info` or `spasy_sync=debug`.
    pub log_level: String,
    /// Where timer and stats dumps are written, if anywhere.
    pub output_path: Option<PathBuf>,
    /// Word list used to generate item names for populated zones.
    pub word_list_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            node_name: format!("node-{}", ulid::Ulid::new().to_string().to_lowercase()),
            app_prefix: "/spasy".to_string(),
            routes: Vec::new(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            max_segments: 100,
            fetch_strategy: FetchStrategy::Batched,
            batch_size: 75,
            notification_timeout_ms: 100,
            log_timeout_ms: 1000,
            tree_timeout_ms: 6000,
            asset_timeout_ms: 6000,
            update_log_capacity: DEFAULT_LOG_CAPACITY,
            max_depth: 4,
            asset_distribution: false,
            full_state_fallback: true,
            log_level: "info".to_string(),
            output_path: None,
            word_list_path: None,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SyncConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() || self.node_name.contains('/') {
            return Err(SyncError::Config(format!(
                "node_name must be a single name component, got {:?}",
                self.node_name
            )));
        }
        if self.segment_size == 0 {
            return Err(SyncError::Config("segment_size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be positive".to_string()));
        }
        if self.max_segments == 0 {
            return Err(SyncError::Config("max_segments must be positive".to_string()));
        }
        Ok(())
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            segment_size: self.segment_size,
            max_segments: self.max_segments,
            batch_size: self.batch_size,
            request_timeout: self.log_timeout(),
        }
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.log_timeout_ms)
    }

    pub fn tree_timeout(&self) -> Duration {
        Duration::from_millis(self.tree_timeout_ms)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.config.node_name = name.into();
        self
    }

    pub fn app_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.app_prefix = prefix.into();
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.config.routes.push(route.into());
        self
    }

    pub fn segment_size(mut self, size: usize) -> Self {
        self.config.segment_size = size;
        self
    }

    pub fn max_segments(mut self, count: u64) -> Self {
        self.config.max_segments = count;
        self
    }

    pub fn fetch_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.config.fetch_strategy = strategy;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn notification_timeout(mut self, ms: u64) -> Self {
        self.config.notification_timeout_ms = ms;
        self
    }

    pub fn log_timeout(mut self, ms: u64) -> Self {
        self.config.log_timeout_ms = ms;
        self
    }

    pub fn tree_timeout(mut self, ms: u64) -> Self {
        self.config.tree_timeout_ms = ms;
        self
    }

    pub fn asset_timeout(mut self, ms: u64) -> Self {
        self.config.asset_timeout_ms = ms;
        self
    }

    pub fn update_log_capacity(mut self, capacity: usize) -> Self {
        self.config.update_log_capacity = capacity;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn asset_distribution(mut self, enabled: bool) -> Self {
        self.config.asset_distribution = enabled;
        self
    }

    pub fn full_state_fallback(mut self, enabled: bool) -> Self {
        self.config.full_state_fallback = enabled;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_node_names_are_unique() {
        let a = SyncConfig::default();
        let b = SyncConfig::default();
        assert_ne!(a.node_name, b.node_name);
        assert!(a.node_name.starts_with("node-"));
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::builder()
            .node_name("a")
            .route("b")
            .route("c")
            .fetch_strategy(FetchStrategy::Sequential)
            .update_log_capacity(8)
            .tree_timeout(250)
            .build();

        assert_eq!(config.routes, ["b", "c"]);
        assert_eq!(config.fetch_strategy, FetchStrategy::Sequential);
        assert_eq!(config.update_log_capacity, 8);
        assert_eq!(config.tree_timeout(), Duration::from_millis(250));
        assert_eq!(config.transport().request_timeout, config.log_timeout());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(
            r#"{ "node_name": "a", "fetch_strategy": "concurrent", "max_depth": 5 }"#,
        )
        .unwrap();
        assert_eq!(config.node_name, "a");
        assert_eq!(config.fetch_strategy, FetchStrategy::Concurrent);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.app_prefix, "/spasy");
        assert!(config.full_state_fallback);
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("spasy-config-{}.json", ulid::Ulid::new()));
        std::fs::write(&path, r#"{ "node_name": "a/b" }"#).unwrap();
        assert!(matches!(
            SyncConfig::from_json_file(&path),
            Err(SyncError::Config(_))
        ));

        std::fs::write(&path, r#"{ "node_name": "a", "routes": ["b"] }"#).unwrap();
        let config = SyncConfig::from_json_file(&path).unwrap();
        assert_eq!(config.routes, ["b"]);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            SyncConfig::from_json_file(&path),
            Err(SyncError::Io(_))
        ));
    }
}
