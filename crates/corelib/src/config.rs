//! Configuration documents.
//!
//! Both subsystems are driven by a single JSON file per deployment. Each
//! role receives the path on its command line, deserializes the document
//! it cares about, and validates it before binding any sockets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::id::KeySpace;

/// An `ip`/`port` pair as it appears in the DHT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Configuration for the DHT subsystem (bootstrap coordinator, ring
/// nodes, dictionary client).
#[derive(Debug, Clone, Deserialize)]
pub struct DhtConfig {
    pub super_node: Endpoint,
    pub chord_nodes: Vec<Endpoint>,
    pub num_bits: u32,
    pub caching: bool,
    /// Seconds a joiner sleeps between `DhtBusy` retries.
    pub sleep_delay: f64,
    #[serde(default)]
    pub client_commands: Vec<String>,
    #[serde(default)]
    pub reuse_connection: bool,
    #[serde(default)]
    pub debug: bool,
}

impl DhtConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Surfaces the num_bits range error at load time.
        KeySpace::new(self.num_bits)?;
        if self.sleep_delay < 0.0 {
            return Err(Error::Config("sleep_delay must be non-negative".into()));
        }
        Ok(())
    }

    /// The identifier space every role in this deployment shares.
    pub fn key_space(&self) -> KeySpace {
        // Validated in load().
        KeySpace::new(self.num_bits).expect("num_bits validated at load")
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_delay)
    }

    pub fn node(&self, index: usize) -> Result<&Endpoint> {
        self.chord_nodes.get(index).ok_or_else(|| {
            Error::Config(format!(
                "chord node index {} out of range ({} configured)",
                index,
                self.chord_nodes.len()
            ))
        })
    }
}

/// How the quorum coordinator serializes access to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LockingScheme {
    /// A single exclusive lock; reads and writes contend equally.
    #[default]
    #[serde(rename = "default")]
    Standard,
    /// Reader/writer lock; concurrent reads proceed together.
    #[serde(rename = "readwrite")]
    ReadWrite,
}

/// One file server entry in the quorum configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    pub port: u16,
    /// Exactly one server entry carries `coordinator: true`; that
    /// process also runs the coordinator listener.
    #[serde(default)]
    pub coordinator: bool,
    /// Optional per-server override of the top-level storage root.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

impl ServerEntry {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One scripted client entry in the quorum configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    pub host: String,
    pub commands_file: PathBuf,
}

fn default_coordinator_port() -> u16 {
    8080
}

fn default_coordinator_sleep_delay() -> f64 {
    3.0
}

/// Configuration for the quorum-replicated file store.
#[derive(Debug, Clone, Deserialize)]
pub struct QuorumConfig {
    pub servers: Vec<ServerEntry>,
    pub q_write: usize,
    pub q_read: usize,
    #[serde(default)]
    pub locking_scheme: LockingScheme,
    #[serde(default = "default_coordinator_port")]
    pub coordinator_port: u16,
    /// Seconds non-coordinator servers wait before serving, so the
    /// coordinator is reachable first.
    #[serde(default = "default_coordinator_sleep_delay")]
    pub coordinator_sleep_delay: f64,
    pub storage_path: PathBuf,
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
    #[serde(default)]
    pub debug: bool,
}

impl QuorumConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("at least one server is required".into()));
        }
        if self.q_write == 0 || self.q_write > self.servers.len() {
            return Err(Error::Config(format!(
                "q_write must be in 1..={}, got {}",
                self.servers.len(),
                self.q_write
            )));
        }
        if self.q_read == 0 || self.q_read > self.servers.len() {
            return Err(Error::Config(format!(
                "q_read must be in 1..={}, got {}",
                self.servers.len(),
                self.q_read
            )));
        }
        // qW + qR > N is deliberately NOT enforced; running without
        // intersecting quorums is the operator's call.
        if self.servers.iter().filter(|s| s.coordinator).count() != 1 {
            return Err(Error::Config(
                "exactly one server must be marked coordinator".into(),
            ));
        }
        Ok(())
    }

    pub fn server(&self, index: usize) -> Result<&ServerEntry> {
        self.servers.get(index).ok_or_else(|| {
            Error::Config(format!(
                "server index {} out of range ({} configured)",
                index,
                self.servers.len()
            ))
        })
    }

    pub fn client(&self, index: usize) -> Result<&ClientEntry> {
        self.clients.get(index).ok_or_else(|| {
            Error::Config(format!(
                "client index {} out of range ({} configured)",
                index,
                self.clients.len()
            ))
        })
    }

    /// The coordinator's server entry.
    pub fn coordinator(&self) -> &ServerEntry {
        // Validated in load(): exactly one exists.
        self.servers
            .iter()
            .find(|s| s.coordinator)
            .expect("coordinator validated at load")
    }

    /// Address of the coordinator RPC listener.
    pub fn coordinator_addr(&self) -> String {
        format!("{}:{}", self.coordinator().host, self.coordinator_port)
    }

    /// Storage directory for one server: `<root>/<index>`.
    pub fn storage_dir(&self, index: usize) -> Result<PathBuf> {
        let entry = self.server(index)?;
        let root = entry
            .storage_path
            .clone()
            .unwrap_or_else(|| self.storage_path.clone());
        Ok(root.join(index.to_string()))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.coordinator_sleep_delay.max(0.0))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dht_json() -> &'static str {
        r#"{
            "super_node": {"ip": "127.0.0.1", "port": 9000},
            "chord_nodes": [
                {"ip": "127.0.0.1", "port": 9001},
                {"ip": "127.0.0.1", "port": 9002}
            ],
            "num_bits": 5,
            "caching": true,
            "sleep_delay": 0.5,
            "client_commands": ["put apple fruit", "get apple"],
            "reuse_connection": true,
            "debug": true
        }"#
    }

    #[test]
    fn parses_dht_document() {
        let config: DhtConfig = serde_json::from_str(dht_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.chord_nodes.len(), 2);
        assert_eq!(config.key_space().modulus(), 32);
        assert!(config.reuse_connection);
    }

    #[test]
    fn rejects_out_of_range_num_bits() {
        let mut config: DhtConfig = serde_json::from_str(dht_json()).unwrap();
        config.num_bits = 0;
        assert!(config.validate().is_err());
        config.num_bits = 48;
        assert!(config.validate().is_err());
    }

    fn quorum_json() -> &'static str {
        r#"{
            "servers": [
                {"host": "127.0.0.1", "port": 9101, "coordinator": true},
                {"host": "127.0.0.1", "port": 9102},
                {"host": "127.0.0.1", "port": 9103}
            ],
            "q_write": 2,
            "q_read": 2,
            "locking_scheme": "readwrite",
            "coordinator_port": 9100,
            "storage_path": "/tmp/ringstore",
            "clients": [{"host": "127.0.0.1", "commands_file": "commands.txt"}]
        }"#
    }

    #[test]
    fn parses_quorum_document() {
        let config: QuorumConfig = serde_json::from_str(quorum_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.locking_scheme, LockingScheme::ReadWrite);
        assert_eq!(config.coordinator_addr(), "127.0.0.1:9100");
        assert_eq!(
            config.storage_dir(2).unwrap(),
            PathBuf::from("/tmp/ringstore/2")
        );
    }

    #[test]
    fn rejects_quorum_larger_than_server_set() {
        let mut config: QuorumConfig = serde_json::from_str(quorum_json()).unwrap();
        config.q_write = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn requires_exactly_one_coordinator() {
        let mut config: QuorumConfig = serde_json::from_str(quorum_json()).unwrap();
        config.servers[1].coordinator = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn locking_scheme_defaults_to_standard() {
        let json = quorum_json().replace("\"locking_scheme\": \"readwrite\",", "");
        let config: QuorumConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.locking_scheme, LockingScheme::Standard);
    }
}
