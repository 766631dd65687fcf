//! Action scripts.
//!
//! A script drives one node on an in-memory network, one command per line:
//!
//! ```text
//! INIT dpwhwt 4
//! PEER observer
//! POPULATE dpwhwt 25 7
//! ADD /alice/ball/_v0/dpwhwtmpz0
//! WAIT 50
//! DUMP
//! ```
//!
//! Every `PEER` route is backed by a passive replica that follows the node's
//! zones, so a `DUMP` shows whether the peers caught up.

use crate::population;
use spasy_sync::{SyncConfig, SyncCoordinator, SyncError};
use spasy_transport::MemoryNetwork;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One script command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Track a zone; the depth falls back to the configured one.
    Init { zone: String, max_depth: Option<usize> },
    Peer(String),
    Join(String),
    Add(String),
    Delete(String),
    /// Insert `count` generated items in one batch.
    Populate { zone: String, count: usize, seed: u64 },
    Wait(u64),
    Dump,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or("empty command")?.to_ascii_uppercase();
        let args: Vec<&str> = words.collect();

        let arity = |min: usize, max: usize| {
            if args.len() < min || args.len() > max {
                Err(format!("{} takes {} to {} arguments, got {}", keyword, min, max, args.len()))
            } else {
                Ok(())
            }
        };
        let number = |index: usize, what: &str| {
            args[index]
                .parse::<u64>()
                .map_err(|_| format!("{} is not a valid {}", args[index], what))
        };

        match keyword.as_str() {
            "INIT" => {
                arity(1, 2)?;
                let max_depth = match args.get(1) {
                    Some(_) => Some(number(1, "depth")? as usize),
                    None => None,
                };
                Ok(Command::Init {
                    zone: args[0].to_string(),
                    max_depth,
                })
            }
            "PEER" => arity(1, 1).map(|_| Command::Peer(args[0].to_string())),
            "JOIN" => arity(1, 1).map(|_| Command::Join(args[0].to_string())),
            "ADD" => arity(1, 1).map(|_| Command::Add(args[0].to_string())),
            "DELETE" => arity(1, 1).map(|_| Command::Delete(args[0].to_string())),
            "POPULATE" => {
                arity(3, 3)?;
                Ok(Command::Populate {
                    zone: args[0].to_string(),
                    count: number(1, "count")? as usize,
                    seed: number(2, "seed")?,
                })
            }
            "WAIT" => {
                arity(1, 1)?;
                Ok(Command::Wait(number(0, "duration")?))
            }
            "DUMP" => arity(0, 0).map(|_| Command::Dump),
            other => Err(format!("unknown command {}", other)),
        }
    }
}

/// Parse a whole script, skipping blank lines and `#` comments.
pub fn parse_script(text: &str) -> Result<Vec<Command>, ActionError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            text.parse::<Command>()
                .map_err(|message| ActionError::Parse { line, message })
        })
        .collect()
}

/// Executes commands against a node and its passive peers.
pub struct ScriptRunner {
    network: Arc<MemoryNetwork>,
    node: Arc<SyncCoordinator>,
    peers: Vec<Arc<SyncCoordinator>>,
    words: Vec<String>,
    listeners: Vec<JoinHandle<()>>,
}

impl ScriptRunner {
    pub fn new(config: SyncConfig, network: Arc<MemoryNetwork>) -> Result<Self, ActionError> {
        config.validate()?;
        let words = population::load_words(config.word_list_path.as_deref())?;

        let inbox = network.register(config.node_name.clone());
        let node = Arc::new(SyncCoordinator::new(config, network.clone()));
        let listeners = vec![tokio::spawn(node.clone().run(inbox))];

        Ok(ScriptRunner {
            network,
            node,
            peers: Vec::new(),
            words,
            listeners,
        })
    }

    pub fn node(&self) -> &Arc<SyncCoordinator> {
        &self.node
    }

    pub fn peers(&self) -> &[Arc<SyncCoordinator>] {
        &self.peers
    }

    pub async fn run(&mut self, commands: &[Command]) -> Result<(), ActionError> {
        for command in commands {
            self.execute(command).await?;
        }
        Ok(())
    }

    pub async fn execute(&mut self, command: &Command) -> Result<(), ActionError> {
        info!("{} action: {:?}", self.node.node_name(), command);

        match command {
            Command::Init { zone, max_depth } => {
                let depth = max_depth.unwrap_or(self.node.config().max_depth);
                self.node.track(zone, depth).await?;
                for peer in &self.peers {
                    peer.join(zone).await?;
                }
            }
            Command::Peer(route) => self.add_peer(route).await?,
            Command::Join(zone) => {
                self.node.join(zone).await?;
            }
            Command::Add(item) => {
                let report = self.node.insert(item).await?;
                info!("{} add {}: {:?}", self.node.node_name(), item, report.phase);
            }
            Command::Delete(item) => {
                let report = self.node.delete(item).await?;
                info!("{} delete {}: {:?}", self.node.node_name(), item, report.phase);
            }
            Command::Populate { zone, count, seed } => {
                let zone = zone.trim().to_lowercase();
                let tree = self
                    .node
                    .tree(&zone)
                    .ok_or_else(|| SyncError::UntrackedZone(zone.clone()))?;
                let items = population::item_names(
                    tree.root_code(),
                    tree.max_depth(),
                    *count,
                    *seed,
                    &self.words,
                );
                let report = self.node.insert_batch(&items).await?;
                info!(
                    "{} populated {} with {} items, root {}",
                    self.node.node_name(),
                    zone,
                    count,
                    report.root_hash.short()
                );
            }
            Command::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Command::Dump => self.dump()?,
        }
        Ok(())
    }

    /// Back `route` with a replica that joins every zone the node tracks.
    async fn add_peer(&mut self, route: &str) -> Result<(), ActionError> {
        if route == self.node.node_name() || self.peers.iter().any(|p| p.node_name() == route) {
            warn!("{} ignoring duplicate peer {}", self.node.node_name(), route);
            return Ok(());
        }

        let mut config = self.node.config().clone();
        config.node_name = route.to_string();
        config.routes = vec![self.node.node_name().to_string()];

        let inbox = self.network.register(route);
        let peer = Arc::new(SyncCoordinator::new(config, self.network.clone()));
        for zone in self.node.zones() {
            peer.join(&zone).await?;
        }
        self.listeners.push(tokio::spawn(peer.clone().run(inbox)));
        self.node.add_peer(route);
        self.peers.push(peer);
        Ok(())
    }

    fn dump(&self) -> Result<(), ActionError> {
        self.node.dump()?;
        for peer in &self.peers {
            peer.dump()?;
            for zone in self.node.zones() {
                let converged = peer.root_hash(&zone) == self.node.root_hash(&zone);
                info!(
                    "{} zone {} in sync with {}: {}",
                    peer.node_name(),
                    zone,
                    self.node.node_name(),
                    converged
                );
            }
        }
        Ok(())
    }

    /// Close every notification channel and wait for in-flight handling.
    pub async fn shutdown(self) {
        self.network.unregister(self.node.node_name());
        for peer in &self.peers {
            self.network.unregister(peer.node_name());
        }
        futures::future::join_all(self.listeners).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> SyncConfig {
        SyncConfig::builder()
            .node_name(name)
            .segment_size(1024)
            .build()
    }

    #[test]
    fn test_parse_script() {
        let script = "\
# setup
INIT dpwhwt 4
init dpwhwt
PEER observer

POPULATE dpwhwt 10 7
ADD /alice/ball/_v0/dpwhwtmpz0
DELETE /alice/ball/_v0/dpwhwtmpz0
JOIN dpwhwt
WAIT 25
DUMP
";
        let commands = parse_script(script).unwrap();
        assert_eq!(commands.len(), 9);
        assert_eq!(
            commands[0],
            Command::Init {
                zone: "dpwhwt".to_string(),
                max_depth: Some(4)
            }
        );
        assert_eq!(
            commands[1],
            Command::Init {
                zone: "dpwhwt".to_string(),
                max_depth: None
            }
        );
        assert_eq!(
            commands[3],
            Command::Populate {
                zone: "dpwhwt".to_string(),
                count: 10,
                seed: 7
            }
        );
        assert_eq!(commands[7], Command::Wait(25));
        assert_eq!(commands[8], Command::Dump);
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_script("INIT dpwhwt\n\nWAIT soon\n").unwrap_err();
        assert!(matches!(err, ActionError::Parse { line: 3, .. }));

        assert!(parse_script("UPDATE 0").is_err());
        assert!(parse_script("ADD").is_err());
        assert!(parse_script("DUMP now").is_err());
        assert!(parse_script("POPULATE dpwhwt 10").is_err());
    }

    #[tokio::test]
    async fn test_script_keeps_peers_in_sync() {
        let network = Arc::new(MemoryNetwork::new());
        let mut runner = ScriptRunner::new(config("main"), network).unwrap();

        let script = parse_script(
            "INIT dpwhwt 4\nPEER observer\nPOPULATE dpwhwt 12 3\nADD /alice/ball/_v0/dpwhwtmpz0\nWAIT 50\n",
        )
        .unwrap();
        runner.run(&script).await.unwrap();

        let node_hash = runner.node().root_hash("dpwhwt").unwrap();
        assert_eq!(runner.node().tree("dpwhwt").unwrap().len(), 13);
        assert_eq!(runner.peers()[0].root_hash("dpwhwt"), Some(node_hash));
        assert!(runner.peers()[0].find("/alice/ball/_v0/dpwhwtmpz0"));

        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_added_before_init_joins_later() {
        let network = Arc::new(MemoryNetwork::new());
        let mut runner = ScriptRunner::new(config("main"), network).unwrap();

        let script = parse_script("PEER observer\nPEER observer\nINIT dpwhwt 3\nADD /bob/net/_v1/dpwhwtbr2\nWAIT 50\n").unwrap();
        runner.run(&script).await.unwrap();

        assert_eq!(runner.peers().len(), 1);
        assert_eq!(runner.node().peers(), vec!["observer".to_string()]);
        assert!(runner.peers()[0].find("/bob/net/_v1/dpwhwtbr2"));
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_populate_requires_tracked_zone() {
        let network = Arc::new(MemoryNetwork::new());
        let mut runner = ScriptRunner::new(config("main"), network).unwrap();

        let result = runner
            .execute(&Command::Populate {
                zone: "dpwhwt".to_string(),
                count: 3,
                seed: 1,
            })
            .await;
        assert!(matches!(result, Err(ActionError::Sync(SyncError::UntrackedZone(_)))));
        runner.shutdown().await;
    }
}
