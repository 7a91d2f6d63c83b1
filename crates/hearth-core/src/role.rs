//! Node roles and distributed actor group roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of server node; fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// Client-facing connection gateway
    Gate,
    /// Account login
    Login,
    /// Hosts player actors
    Home,
    /// Hosts world actors
    World,
}

impl RoleType {
    /// Lowercase role name, also the stem of the role configuration file
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Gate => "gate",
            RoleType::Login => "login",
            RoleType::Home => "home",
            RoleType::World => "world",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gate" => Ok(RoleType::Gate),
            "login" => Ok(RoleType::Login),
            "home" => Ok(RoleType::Home),
            "world" => Ok(RoleType::World),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Name of a distributed actor group bound through the placement layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardRole {
    /// One actor per player
    Player,
    /// One actor per world instance
    World,
}

impl ShardRole {
    /// Lowercase group name
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardRole::Player => "player",
            ShardRole::World => "world",
        }
    }
}

impl fmt::Display for ShardRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShardRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "player" => Ok(ShardRole::Player),
            "world" => Ok(ShardRole::World),
            other => Err(format!("unknown shard role: {other}")),
        }
    }
}
