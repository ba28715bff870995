//! Configuration for the daemon client

use crate::error::{Error, Result};
use crate::models::BuildLabels;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that turns on build log forwarding in [`ClientConfig::with_debug_env`]
pub const DEBUG_ENV_VAR: &str = "DEBUG";

/// Daemon client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daemon host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// Daemon TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for ordinary API requests, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for image builds, in seconds
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Well-known container port every managed workload exposes
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Labels attached to built images and used to filter discovery
    #[serde(default)]
    pub labels: BuildLabels,

    /// Dockerfile name inside the build context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Forward build progress lines to the tracing log
    #[serde(default)]
    pub forward_build_logs: bool,

    /// Parent directory for temporary build directories (system temp dir when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2375
}

fn default_request_timeout() -> u64 {
    20
}

fn default_build_timeout() -> u64 {
    600
}

fn default_service_port() -> u16 {
    3000
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            build_timeout_secs: default_build_timeout(),
            service_port: default_service_port(),
            labels: BuildLabels::default(),
            dockerfile: default_dockerfile(),
            forward_build_logs: false,
            staging_dir: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load configuration from file (YAML for `.yaml`/`.yml`, JSON otherwise)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;

        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Turn on build log forwarding when the `DEBUG` environment variable is set.
    ///
    /// The environment is read here, once, and never by the client itself.
    pub fn with_debug_env(self) -> Self {
        let flag = std::env::var_os(DEBUG_ENV_VAR);
        self.with_debug_flag(flag)
    }

    fn with_debug_flag(mut self, flag: Option<OsString>) -> Self {
        if flag.is_some_and(|v| !v.is_empty()) {
            self.forward_build_logs = true;
        }
        self
    }

    /// Check that the configuration can be used to build a client
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.request_timeout_secs == 0 || self.build_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        if self.labels.is_empty() {
            return Err(Error::Config(
                "at least one ownership label is required".to_string(),
            ));
        }
        if self.dockerfile.trim().is_empty() {
            return Err(Error::Config("dockerfile must not be empty".to_string()));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build timeout as a [`Duration`]
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// `host:port` authority for daemon URLs; IPv6 literals are bracketed
    pub fn authority(&self) -> String {
        match self.host.parse::<Ipv6Addr>() {
            Ok(_) => format!("[{}]:{}", self.host, self.port),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }

    /// Port key of the well-known service port, e.g. `3000/tcp`
    pub fn service_port_key(&self) -> String {
        format!("{}/tcp", self.service_port)
    }
}
