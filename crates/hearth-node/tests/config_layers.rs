//! Layered Configuration Files
#![allow(clippy::unwrap_used)]

use std::fs;

use assert_matches::assert_matches;
use hearth_core::{RoleType, ShardRole};
use hearth_node::config::BASE_CONFIG_FILE;
use hearth_node::{ConfigError, NodeConfig};
use serde::Deserialize;

const BASE: &str = r#"
system_name = "shard-eu"

[tick]
period_ms = 1000

[placement]
mailbox_capacity = 256
proxied = ["player"]

[chat]
channel = "global"
"#;

const HOME: &str = r#"
[placement]
proxied = []
hosted = ["player"]

[chat]
history = 40
"#;

#[derive(Debug, Deserialize, PartialEq)]
struct Chat {
    channel: String,
    #[serde(default)]
    history: u32,
}

#[test]
fn test_role_file_overlays_base() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(BASE_CONFIG_FILE), BASE).unwrap();
    fs::write(dir.path().join("home.toml"), HOME).unwrap();

    let home = NodeConfig::load_layered(dir.path(), RoleType::Home).unwrap();
    assert_eq!(home.system_name, "shard-eu");
    assert_eq!(home.placement.mailbox_capacity, 256);
    assert_eq!(home.placement.hosted, vec![ShardRole::Player]);
    assert!(home.placement.proxied.is_empty());
    assert_eq!(
        home.section::<Chat>("chat").unwrap(),
        Some(Chat {
            channel: "global".into(),
            history: 40
        })
    );
}

#[test]
fn test_missing_role_file_uses_base() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(BASE_CONFIG_FILE), BASE).unwrap();
    fs::write(dir.path().join("home.toml"), HOME).unwrap();

    let gate = NodeConfig::load_layered(dir.path(), RoleType::Gate).unwrap();
    assert!(gate.placement.hosted.is_empty());
    assert_eq!(gate.placement.proxied, vec![ShardRole::Player]);
    assert_eq!(gate.section::<Chat>("chat").unwrap().unwrap().history, 0);
}

#[test]
fn test_missing_base_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("home.toml"), HOME).unwrap();

    assert_matches!(
        NodeConfig::load_layered(dir.path(), RoleType::Home),
        Err(ConfigError::Read { path, .. }) if path.ends_with(BASE_CONFIG_FILE)
    );
}

#[test]
fn test_broken_role_file_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(BASE_CONFIG_FILE), BASE).unwrap();
    fs::write(dir.path().join("world.toml"), "[tick\nperiod_ms = 5").unwrap();

    assert_matches!(
        NodeConfig::load_layered(dir.path(), RoleType::World),
        Err(ConfigError::Parse { origin, .. }) if origin.ends_with("world.toml")
    );
}
