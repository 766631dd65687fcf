//! Name shapes used by the sync protocol.
//!
//! | Purpose | Name |
//! |---|---|
//! | Full tree of a zone | `<app>/<zone>/geocode-tree/<seg>` |
//! | Update log for a root hash | `<app>/<zone>/root/<hash>/<seg>` |
//! | Asset by item name | `<app>/<zone>/asset/<item>/<seg>` |
//! | Notification | `<app>/<route>/multi/<subject>/<action>/<hash>/<geocode>/<segcount>` |
//!
//! Notifications carry everything in the name so a receiver can filter
//! before fetching anything.

use crate::error::NameError;
use spasy_transport::Name;
use spasy_tree::{Action, Hash};

const TREE: &str = "geocode-tree";
const ROOT: &str = "root";
const ASSET: &str = "asset";
const MULTI: &str = "multi";

/// Components of a notification name after the application prefix.
const NOTIFICATION_LEN: usize = 7;

/// A parsed peer notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Route of the receiving peer.
    pub route: String,
    /// Zone (tree root code) the change belongs to.
    pub subject: String,
    pub action: Action,
    pub root_hash: Hash,
    /// Location code of the mutated item.
    pub geocode: String,
    /// Segment count of the packed update log.
    pub segment_count: u64,
}

/// Builds and parses names under one application prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncNames {
    app: Name,
}

impl SyncNames {
    pub fn new(app_prefix: &str) -> Self {
        SyncNames {
            app: Name::parse(app_prefix),
        }
    }

    pub fn app(&self) -> &Name {
        &self.app
    }

    pub fn tree(&self, zone: &str) -> Name {
        self.app.clone().append(zone).append(TREE)
    }

    pub fn log(&self, zone: &str, root_hash: &Hash) -> Name {
        self.app
            .clone()
            .append(zone)
            .append(ROOT)
            .append(root_hash.to_string())
    }

    pub fn asset(&self, zone: &str, item: &str) -> Name {
        self.app.clone().append(zone).append(ASSET).append(item)
    }

    pub fn notification(&self, notification: &Notification) -> Name {
        self.app
            .clone()
            .append(&notification.route)
            .append(MULTI)
            .append(&notification.subject)
            .append(notification.action.as_str())
            .append(notification.root_hash.to_string())
            .append(&notification.geocode)
            .append(notification.segment_count.to_string())
    }

    pub fn parse_notification(&self, name: &Name) -> Result<Notification, NameError> {
        if !name.starts_with(&self.app) {
            return Err(NameError::WrongPrefix(name.to_string()));
        }
        let rest = &name.components()[self.app.len()..];
        if rest.len() != NOTIFICATION_LEN {
            return Err(NameError::WrongShape {
                name: name.to_string(),
                expected: NOTIFICATION_LEN,
                actual: rest.len(),
            });
        }
        if rest[1] != MULTI {
            return Err(NameError::NotNotification(name.to_string()));
        }

        let action = rest[3]
            .parse::<Action>()
            .map_err(|_| NameError::InvalidAction(rest[3].clone()))?;
        let root_hash = rest[4]
            .parse::<Hash>()
            .map_err(|_| NameError::InvalidHash(rest[4].clone()))?;
        let segment_count = rest[6]
            .parse::<u64>()
            .map_err(|_| NameError::InvalidCount(rest[6].clone()))?;

        Ok(Notification {
            route: rest[0].clone(),
            subject: rest[2].clone(),
            action,
            root_hash,
            geocode: rest[5].clone(),
            segment_count,
        })
    }
}
