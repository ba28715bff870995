//! Service discovery: reconcile the daemon's container records into [`Service`]s.
//!
//! Two lookups exist. An exact lookup inspects one container by name and
//! resolves the binding of the well-known service port. The owned listing
//! asks the daemon for every container carrying the ownership labels, keeps
//! those whose name starts with a prefix and collapses them by image.

use crate::client::Client;
use crate::error::{Error, Result};
use crate::models::Service;
use crate::transport::NO_QUERY;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Container filter criteria, encoded as JSON into the `filters` query parameter
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerFilters {
    /// `key=value` label terms
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<String>,
    /// Container name terms
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<String>,
    /// Lifecycle status terms, e.g. `running`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
}

impl ContainerFilters {
    /// Filters matching all of `labels`
    pub fn labels(labels: Vec<String>) -> Self {
        Self {
            label: labels,
            ..Default::default()
        }
    }

    /// Query parameters carrying these filters
    pub fn to_query(&self) -> Result<ListQuery> {
        Ok(ListQuery {
            filters: serde_json::to_string(self)?,
        })
    }
}

/// Query parameters of `GET /containers/json`
#[derive(Debug, Clone, Serialize)]
pub struct ListQuery {
    /// JSON-encoded [`ContainerFilters`]
    pub filters: String,
}

/// One entry of the daemon's container listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Container identifier
    #[serde(rename = "Id", default)]
    pub id: String,
    /// Container names, each with a leading `/`
    #[serde(default)]
    pub names: Vec<String>,
    /// Image reference the container was created from
    #[serde(default)]
    pub image: String,
    /// Lifecycle state, e.g. `running`
    #[serde(default)]
    pub state: String,
    /// Port mappings
    #[serde(default)]
    pub ports: Vec<PortSummary>,
    /// Container labels
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Port mapping of a listed container
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortSummary {
    /// Host address the port is published on
    #[serde(rename = "IP", default)]
    pub ip: Option<String>,
    /// Port inside the container
    #[serde(rename = "PrivatePort", default)]
    pub private_port: u16,
    /// Published host port, absent when unpublished
    #[serde(rename = "PublicPort", default)]
    pub public_port: Option<u16>,
    /// Protocol, e.g. `tcp`
    #[serde(rename = "Type", default)]
    pub kind: String,
}

/// Subset of `GET /containers/{name}/json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    /// Container identifier
    #[serde(rename = "Id", default)]
    pub id: String,
    /// Image the container runs
    #[serde(default)]
    pub image: String,
    /// Lifecycle state
    #[serde(default)]
    pub state: InspectState,
    /// Host configuration
    #[serde(default)]
    pub host_config: InspectHostConfig,
}

/// Lifecycle state of an inspected container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectState {
    /// Status string, e.g. `running` or `exited`
    #[serde(default)]
    pub status: String,
}

/// Host configuration of an inspected container
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectHostConfig {
    /// Published bindings keyed by container port (`3000/tcp`)
    #[serde(default)]
    pub port_bindings: Option<HashMap<String, Option<Vec<PortBinding>>>>,
}

/// A single published host binding
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    /// Host address, empty for all interfaces
    #[serde(default)]
    pub host_ip: String,
    /// Host port as a decimal string
    #[serde(default)]
    pub host_port: String,
}

impl Client {
    /// List services.
    ///
    /// An empty `name` lists every owned service. A non-empty `name` is an
    /// exact lookup; when the daemon has no container by that name, it is
    /// used as a prefix over the owned listing instead.
    pub fn list(&self, name: &str) -> Result<Vec<Service>> {
        if name.is_empty() {
            return self.list_owned("");
        }

        match self.inspect_service(name) {
            Ok(service) => Ok(vec![service]),
            Err(e) if e.status() == Some(404) => {
                debug!("No container named '{}', listing by prefix", name);
                self.list_owned(name)
            }
            Err(e) => Err(e),
        }
    }

    /// Look up exactly one container by name.
    ///
    /// Fails with [`Error::PortBinding`] when the well-known service port has
    /// no published binding.
    pub fn inspect_service(&self, name: &str) -> Result<Service> {
        let info: ContainerInspect = self
            .transport()
            .get_segments(&["containers", name, "json"], NO_QUERY)?;

        let port_key = self.config().service_port_key();
        let binding = published_binding(&info, &port_key).ok_or_else(|| Error::PortBinding {
            container: name.to_string(),
            port: port_key.clone(),
            reason: "no published binding".to_string(),
        })?;

        let port = binding
            .host_port
            .parse::<u16>()
            .map_err(|e| Error::PortBinding {
                container: name.to_string(),
                port: port_key.clone(),
                reason: format!("invalid host port '{}': {}", binding.host_port, e),
            })?;

        let host = binding.host_ip.clone();

        Ok(Service {
            name: name.to_string(),
            image: info.image,
            state: Some(info.state.status),
            id: Some(info.id),
            host: Some(host),
            port: Some(port),
        })
    }

    /// List owned containers whose name starts with `prefix`, one service per image.
    ///
    /// When several containers share an image the last one enumerated wins.
    /// The result order is not meaningful.
    pub fn list_owned(&self, prefix: &str) -> Result<Vec<Service>> {
        let labels = &self.config().labels;
        let query = ContainerFilters::labels(labels.filter_terms()).to_query()?;
        let containers: Vec<ContainerSummary> =
            self.transport().get("/containers/json", &query)?;

        let mut by_image: IndexMap<String, Service> = IndexMap::new();
        for container in containers {
            if let Some(reported) = &container.labels {
                if !labels.matches(reported) {
                    warn!(
                        "Daemon returned container {} without the ownership labels, skipping",
                        container.id
                    );
                    continue;
                }
            }

            let Some(name) = primary_name(&container) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }

            let service =
                summary_to_service(name.to_string(), &container, self.config().service_port);
            by_image.insert(service.image.clone(), service);
        }

        info!(
            "Discovered {} services matching prefix '{}'",
            by_image.len(),
            prefix
        );
        Ok(by_image.into_values().collect())
    }
}

/// First published binding for `port_key`, if any
fn published_binding<'a>(info: &'a ContainerInspect, port_key: &str) -> Option<&'a PortBinding> {
    info.host_config
        .port_bindings
        .as_ref()?
        .get(port_key)?
        .as_ref()?
        .first()
}

/// Primary container name without the daemon's leading `/`
fn primary_name(container: &ContainerSummary) -> Option<&str> {
    container
        .names
        .first()
        .map(|n| n.strip_prefix('/').unwrap_or(n))
}

/// Published mapping of `service_port`, else the first published mapping
fn primary_published_port(container: &ContainerSummary, service_port: u16) -> Option<&PortSummary> {
    let published = || container.ports.iter().filter(|p| p.public_port.is_some());
    published()
        .find(|p| p.private_port == service_port)
        .or_else(|| published().next())
}

fn summary_to_service(name: String, container: &ContainerSummary, service_port: u16) -> Service {
    let primary = primary_published_port(container, service_port);
    Service {
        name,
        image: container.image.clone(),
        state: Some(container.state.clone()),
        id: Some(container.id.clone()),
        host: primary.and_then(|p| p.ip.clone()),
        port: primary.and_then(|p| p.public_port),
    }
}
