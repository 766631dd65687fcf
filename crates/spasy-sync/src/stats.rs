//! Per-operation timings and named statistics.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

/// Named elapsed durations.
#[derive(Debug, Default)]
pub struct Timer {
    started: HashMap<String, Instant>,
    timers: BTreeMap<String, Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: impl Into<String>) {
        self.started.insert(name.into(), Instant::now());
    }

    /// Stop a running timer and keep its elapsed time.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        let elapsed = self.started.remove(name)?.elapsed();
        self.timers.insert(name.to_string(), elapsed);
        Some(elapsed)
    }

    /// Keep an elapsed time measured elsewhere.
    pub fn record(&mut self, name: impl Into<String>, elapsed: Duration) {
        self.timers.insert(name.into(), elapsed);
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.timers.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn dump(&self) {
        info!("dumping {} timers", self.timers.len());
        for (name, elapsed) in &self.timers {
            info!("{}, {}, {}", name, elapsed.as_nanos(), elapsed.as_millis());
        }
    }
}

impl Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, elapsed) in &self.timers {
            writeln!(f, "{} {}", name, elapsed.as_nanos())?;
        }
        Ok(())
    }
}

/// Named values, typically sizes and counts.
#[derive(Debug, Default)]
pub struct Stats {
    stats: BTreeMap<String, String>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, value: impl Display) {
        self.stats.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.stats.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn dump(&self) {
        info!("dumping {} stats", self.stats.len());
        for (name, value) in &self.stats {
            info!("{} {}", name, value);
        }
    }

    /// Write one `name value` line per stat.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        info!("writing {} stats to {}", self.stats.len(), path.display());
        let mut file = std::fs::File::create(path)?;
        write!(file, "{}", self)
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.stats {
            writeln!(f, "{} {}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_start_stop() {
        let mut timer = Timer::new();
        assert_eq!(timer.stop("insert"), None);

        timer.start("insert");
        let elapsed = timer.stop("insert").unwrap();
        assert_eq!(timer.get("insert"), Some(elapsed));
        assert_eq!(timer.stop("insert"), None);

        timer.record("join", Duration::from_millis(5));
        assert_eq!(timer.len(), 2);
        assert!(timer.to_string().contains("join 5000000"));
    }

    #[test]
    fn test_stats_last_value_wins() {
        let mut stats = Stats::new();
        stats.record("log_segments", 1);
        stats.record("log_segments", 3);
        stats.record("tree_bytes", 512);
        assert_eq!(stats.get("log_segments"), Some("3"));
        assert_eq!(stats.to_string(), "log_segments 3\ntree_bytes 512\n");
    }
}
