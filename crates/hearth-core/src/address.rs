//! Actor addressing
//!
//! Actors are addressed by process-independent paths of the form
//! `hearth://<system>/<group>/<entity>`. A path stays valid when the actor
//! moves between nodes; resolving it to a live mailbox is the placement
//! service's job and happens lazily, at send time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::role::ShardRole;

const SCHEME: &str = "hearth://";

/// Shard key identifying one actor instance inside a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Errors parsing an actor path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Path does not start with the `hearth://` scheme
    #[error("actor path {0:?} is missing the hearth:// scheme")]
    MissingScheme(String),
    /// Path does not have exactly system, group and entity segments
    #[error("actor path {0:?} must be hearth://<system>/<group>/<entity>")]
    Malformed(String),
    /// Group segment is not a known shard role
    #[error("actor path {path:?} names unknown group: {reason}")]
    UnknownGroup {
        /// Offending path
        path: String,
        /// Parse failure
        reason: String,
    },
}

/// Process-independent address of an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorPath {
    system: String,
    group: ShardRole,
    entity: EntityId,
}

impl ActorPath {
    /// Create a path for `entity` in `group` of actor system `system`
    pub fn new(system: impl Into<String>, group: ShardRole, entity: EntityId) -> Self {
        Self {
            system: system.into(),
            group,
            entity,
        }
    }

    /// Actor system name
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Actor group
    pub fn group(&self) -> ShardRole {
        self.group
    }

    /// Entity within the group
    pub fn entity(&self) -> &EntityId {
        &self.entity
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}/{}", self.system, self.group, self.entity)
    }
}

impl FromStr for ActorPath {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| AddressError::MissingScheme(s.to_string()))?;

        let mut segments = rest.splitn(3, '/');
        let (Some(system), Some(group), Some(entity)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(AddressError::Malformed(s.to_string()));
        };
        if system.is_empty() || entity.is_empty() || entity.contains('/') {
            return Err(AddressError::Malformed(s.to_string()));
        }

        let group = group
            .parse::<ShardRole>()
            .map_err(|reason| AddressError::UnknownGroup {
                path: s.to_string(),
                reason,
            })?;

        Ok(Self::new(system, group, EntityId::new(entity)))
    }
}

/// Handle naming a remote actor host, resolved lazily through placement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorLocator(ActorPath);

impl ActorLocator {
    /// Path this locator points at
    pub fn path(&self) -> &ActorPath {
        &self.0
    }
}

impl From<ActorPath> for ActorLocator {
    fn from(path: ActorPath) -> Self {
        Self(path)
    }
}

impl fmt::Display for ActorLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
