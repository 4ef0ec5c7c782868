use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RingError};
use crate::ring::types::{BOOTSTRAP_ID, NodeId, check_id};
use crate::storage::store::KeySlice;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_RPC_ATTEMPTS: usize = 3;

pub const ENV_BIND_HOST: &str = "RING_BIND_HOST";
pub const ENV_RPC_TIMEOUT_MS: &str = "RING_RPC_TIMEOUT_MS";
pub const ENV_RPC_ATTEMPTS: &str = "RING_RPC_ATTEMPTS";
pub const ENV_LOG_LEVEL: &str = "RING_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Bootstrap,
    Node,
}

/// Everything needed to start one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub role: Role,
    pub id: NodeId,
    /// Listening port. `0` picks an ephemeral port.
    pub port: u16,
    /// Address the node binds and advertises to peers.
    pub host: IpAddr,
    /// Where the bootstrap node listens. Unused by the bootstrap node itself.
    pub bootstrap: Option<SocketAddr>,
    /// Initial contents of the bootstrap node.
    pub initial_keys: KeySlice,
    pub rpc_timeout: Duration,
    pub rpc_attempts: usize,
}

impl NodeConfig {
    pub fn bootstrap(port: u16, initial_keys: KeySlice) -> Self {
        Self {
            role: Role::Bootstrap,
            id: BOOTSTRAP_ID,
            port,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bootstrap: None,
            initial_keys,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            rpc_attempts: DEFAULT_RPC_ATTEMPTS,
        }
    }

    pub fn node(id: NodeId, port: u16, bootstrap: SocketAddr) -> Self {
        Self {
            role: Role::Node,
            id,
            port,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bootstrap: Some(bootstrap),
            initial_keys: KeySlice::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            rpc_attempts: DEFAULT_RPC_ATTEMPTS,
        }
    }

    pub fn load(role: Role, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RingError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(role, &text)
    }

    /// Parses the config file format.
    ///
    /// ```text
    /// <id>
    /// <port>
    /// <bootstrap-address> <bootstrap-port>   (ring node)
    /// <key> <value>                          (bootstrap node, any number)
    /// ```
    pub fn parse(role: Role, text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (id_line, raw_id) = lines
            .next()
            .ok_or_else(|| RingError::Config("missing node id".to_string()))?;
        let id: NodeId = parse_field(id_line, "node id", raw_id)?;

        let (line_no, raw_port) = lines
            .next()
            .ok_or_else(|| RingError::Config("missing port".to_string()))?;
        let port: u16 = parse_field(line_no, "port", raw_port)?;

        match role {
            Role::Bootstrap => {
                if id != BOOTSTRAP_ID {
                    return Err(RingError::Config(format!(
                        "line {}: bootstrap node id must be {}, found {}",
                        id_line,
                        BOOTSTRAP_ID,
                        id
                    )));
                }

                let mut keys = KeySlice::new();
                for (line_no, line) in lines {
                    let (raw_key, value) = line.split_once(char::is_whitespace).ok_or_else(|| {
                        RingError::Config(format!("line {}: expected '<key> <value>'", line_no))
                    })?;
                    let key: u32 = parse_field(line_no, "key", raw_key)?;
                    check_id(key).map_err(|e| RingError::Config(format!("line {}: {}", line_no, e)))?;
                    keys.insert(key, value.trim().to_string());
                }

                Ok(Self::bootstrap(port, keys))
            }
            Role::Node => {
                check_id(id).map_err(|e| RingError::Config(format!("line {}: {}", id_line, e)))?;

                let (line_no, line) = lines.next().ok_or_else(|| {
                    RingError::Config("missing bootstrap address line".to_string())
                })?;
                let mut parts = line.split_whitespace();
                let (Some(raw_addr), Some(raw_port), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(RingError::Config(format!(
                        "line {}: expected '<bootstrap-address> <bootstrap-port>'",
                        line_no
                    )));
                };
                let addr: IpAddr = parse_field(line_no, "bootstrap address", raw_addr)?;
                let bootstrap_port: u16 = parse_field(line_no, "bootstrap port", raw_port)?;

                if let Some((line_no, _)) = lines.next() {
                    return Err(RingError::Config(format!(
                        "line {}: unexpected content after bootstrap address",
                        line_no
                    )));
                }

                Ok(Self::node(id, port, SocketAddr::new(addr, bootstrap_port)))
            }
        }
    }

    /// Applies the `RING_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from any name → value source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BIND_HOST) {
            self.host = parse_env(ENV_BIND_HOST, &host)?;
        }
        if let Some(ms) = lookup(ENV_RPC_TIMEOUT_MS) {
            let ms: u64 = parse_env(ENV_RPC_TIMEOUT_MS, &ms)?;
            if ms == 0 {
                return Err(RingError::Config(format!("{} must be positive", ENV_RPC_TIMEOUT_MS)));
            }
            self.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = lookup(ENV_RPC_ATTEMPTS) {
            let attempts: usize = parse_env(ENV_RPC_ATTEMPTS, &attempts)?;
            if attempts == 0 {
                return Err(RingError::Config(format!("{} must be positive", ENV_RPC_ATTEMPTS)));
            }
            self.rpc_attempts = attempts;
        }
        Ok(())
    }
}

/// Log level from `RING_LOG_LEVEL`, defaulting to INFO.
pub fn log_level(value: Option<&str>) -> Result<tracing::Level> {
    match value {
        None => Ok(tracing::Level::INFO),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RingError::Config(format!("{}: unknown level '{}'", ENV_LOG_LEVEL, raw))),
    }
}

fn parse_field<T: std::str::FromStr>(line_no: usize, what: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| RingError::Config(format!("line {}: invalid {} '{}'", line_no, what, raw)))
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RingError::Config(format!("{}: invalid value '{}'", name, raw)))
}
