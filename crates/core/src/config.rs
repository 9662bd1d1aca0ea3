//! Server configuration
//!
//! Loaded from a TOML file, with every key overridable through `SKIFF_*`
//! environment variables so containers can tweak a deployment without
//! shipping a new file.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A configured user account
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    /// Login name
    pub name: String,

    /// Clear-text password
    pub password: String,

    /// Virtual home directory (defaults to `/`)
    #[serde(default)]
    pub home: Option<String>,
}

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    /// Address the control listener binds to
    pub hostname: String,

    /// Control listener port
    pub port: u16,

    /// Idle timeout on the control connection, in seconds
    pub timeout_secs: u64,

    /// Whether anonymous (guest) logins are accepted
    pub guest: bool,

    /// On-disk root the virtual filesystem is jailed to
    pub homedir: PathBuf,

    /// Address advertised to clients in PASV replies.
    /// Needed when the server sits behind NAT.
    pub external_ip: Option<Ipv4Addr>,

    /// Ports the passive pool may listen on. An entry of 0 binds an
    /// ephemeral port and reports the actual one.
    pub pasv_ports: Vec<u16>,

    /// Upper bound on concurrently executing commands across all sessions
    pub workers: usize,

    /// Owner name reported in LIST lines
    pub owner: String,

    /// User accounts for the static user store
    pub users: Vec<UserEntry>,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 2021,
            timeout_secs: 15,
            guest: true,
            homedir: PathBuf::from("."),
            external_ip: None,
            pasv_ports: vec![6001, 6002, 6003],
            workers: 4,
            owner: "ftp".to_string(),
            users: Vec::new(),
        }
    }
}

impl FtpConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file from disk
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Apply `SKIFF_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SKIFF_HOSTNAME") {
            self.hostname = v;
        }
        if let Ok(v) = std::env::var("SKIFF_PORT") {
            self.port = parse_env("SKIFF_PORT", &v)?;
        }
        if let Ok(v) = std::env::var("SKIFF_TIMEOUT_SECS") {
            self.timeout_secs = parse_env("SKIFF_TIMEOUT_SECS", &v)?;
        }
        if let Ok(v) = std::env::var("SKIFF_GUEST") {
            self.guest = parse_env("SKIFF_GUEST", &v)?;
        }
        if let Ok(v) = std::env::var("SKIFF_HOMEDIR") {
            self.homedir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SKIFF_EXTERNAL_IP") {
            self.external_ip = Some(parse_env("SKIFF_EXTERNAL_IP", &v)?);
        }
        if let Ok(v) = std::env::var("SKIFF_PASV_PORTS") {
            self.pasv_ports = parse_port_list(&v)?;
        }
        if let Ok(v) = std::env::var("SKIFF_WORKERS") {
            self.workers = parse_env("SKIFF_WORKERS", &v)?;
        }
        Ok(())
    }

    /// The control-connection idle timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The `(hostname, port)` pair to bind the control listener to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{}: invalid value {:?}: {}", key, value, e)))
}

/// Parse a comma-separated port list, e.g. `"6001,6002,6010"`
pub fn parse_port_list(text: &str) -> Result<Vec<u16>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid port {:?}: {}", s, e)))
        })
        .collect()
}
