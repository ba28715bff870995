//! Data models shared by the build and discovery paths

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key marking resources created by this client
pub const OWNER_LABEL_KEY: &str = "belong-to";

/// Label value marking resources created by this client
pub const OWNER_LABEL_VALUE: &str = "fx";

/// A buildable project: a name plus the virtual files of its build context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Project name, reported back as the built service name
    pub name: String,

    /// Files of the build context, in the order they were added
    pub files: Vec<ProjectFile>,
}

impl Project {
    /// Create an empty project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
        }
    }

    /// Add a file to the project
    pub fn with_file(mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.files.push(ProjectFile::new(path, body));
        self
    }
}

/// A single virtual file in a [`Project`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Path relative to the build context root
    pub path: String,

    /// Raw file contents
    pub body: Vec<u8>,
}

impl ProjectFile {
    /// Create a file
    pub fn new(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// A workload known to the daemon, as seen by this client.
///
/// Built services only carry `name` and `image`; the runtime fields are
/// filled in by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name (container name without the daemon's leading `/`)
    pub name: String,

    /// Image reference
    pub image: String,

    /// Lifecycle state exactly as reported by the daemon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Daemon-assigned container identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Host address the service port is published on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Host port the service port is published on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Service {
    /// A freshly built service with no runtime information
    pub fn built(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Labels attached to every image this client builds.
///
/// Always contains the ownership marker unless constructed empty on purpose;
/// discovery filters on the same set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildLabels(BTreeMap<String, String>);

impl BuildLabels {
    /// Labels containing only the ownership marker
    pub fn ownership() -> Self {
        Self::empty().with(OWNER_LABEL_KEY, OWNER_LABEL_VALUE)
    }

    /// A label set with no entries
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Add or replace a label
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a label value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate labels in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Labels rendered as daemon filter terms (`key=value`)
    pub fn filter_terms(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Whether every label in this set is present with the same value in `other`
    pub fn matches(&self, other: &std::collections::HashMap<String, String>) -> bool {
        self.iter()
            .all(|(k, v)| other.get(k).map(String::as_str) == Some(v))
    }
}

impl Default for BuildLabels {
    fn default() -> Self {
        Self::ownership()
    }
}
