//! Daemon client construction and API version negotiation

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{NO_QUERY, Transport};
use serde::Deserialize;
use tracing::{debug, info};

/// Subset of the daemon's `/version` response used for negotiation
#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "ApiVersion", default)]
    api_version: String,
}

/// Client for a single daemon connection.
///
/// The versioned endpoint is fixed at construction; the client is immutable
/// afterwards and every operation is a blocking, independent call chain.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    endpoint: String,
    version: String,
    transport: Transport,
}

impl Client {
    /// Connect to the daemon at `host:port` with default settings
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::from_config(ClientConfig::new(host, port))
    }

    /// Connect to the daemon at `host:port`, panicking if it cannot be reached.
    ///
    /// Only for startup paths that cannot recover from a missing daemon.
    pub fn must_connect(host: &str, port: u16) -> Self {
        match Self::connect(host, port) {
            Ok(client) => client,
            Err(e) => panic!("cannot create daemon client: {}", e),
        }
    }

    /// Connect using a full configuration
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::connection(&config.host, config.port, e.to_string()))?;

        let version = negotiate_version(&config)?;
        let endpoint = format!("http://{}/v{}", config.authority(), version);
        let transport = Transport::new(endpoint.clone(), config.request_timeout())?;

        info!("Connected to daemon at {} (API v{})", endpoint, version);
        Ok(Self {
            config,
            endpoint,
            version,
            transport,
        })
    }

    /// Versioned base URL, e.g. `http://127.0.0.1:2375/v1.41`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Negotiated API version, e.g. `1.41`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport bound to the versioned endpoint
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

/// Ask the daemon for its API version
fn negotiate_version(config: &ClientConfig) -> Result<String> {
    let unversioned = Transport::new(
        format!("http://{}", config.authority()),
        config.request_timeout(),
    )
    .map_err(|e| Error::connection(&config.host, config.port, e.to_string()))?;

    let response: VersionResponse = unversioned
        .get("/version", NO_QUERY)
        .map_err(|e| Error::connection(&config.host, config.port, e.to_string()))?;

    let version = response.api_version.trim().trim_start_matches('v').to_string();
    if version.is_empty() {
        return Err(Error::connection(
            &config.host,
            config.port,
            "daemon did not report an API version",
        ));
    }

    debug!("Daemon at {}:{} reports API v{}", config.host, config.port, version);
    Ok(version)
}
