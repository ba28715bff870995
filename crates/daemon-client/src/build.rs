//! Image builds: package a project, submit it to the daemon and follow the
//! build progress stream to completion.

use crate::archive::ArchiveBuilder;
use crate::client::Client;
use crate::error::{Error, Result};
use crate::models::{BuildLabels, Project, Service};
use reqwest::StatusCode;
use reqwest::blocking::Body;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};
use uuid::Uuid;

/// Target for forwarded build output
pub const BUILD_LOG_TARGET: &str = "daemon_client::build_log";

const TAR_DIR_PREFIX: &str = "fx-tar";

/// Query parameters of `POST /build`
#[derive(Debug, Serialize)]
struct BuildQuery<'a> {
    t: &'a str,
    labels: String,
    dockerfile: &'a str,
}

/// One record of the newline-delimited build progress stream
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProgress {
    /// Build output text
    #[serde(default)]
    pub stream: Option<String>,
    /// Status text (pulls, pushes)
    #[serde(default)]
    pub status: Option<String>,
    /// Error message; present only on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Structured error detail
    #[serde(default)]
    pub error_detail: Option<ErrorDetail>,
    /// Auxiliary data, e.g. the built image id
    #[serde(default)]
    pub aux: Option<serde_json::Value>,
}

/// Structured error detail of a failed build record
#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    /// Error code, when the daemon supplies one
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message
    #[serde(default)]
    pub message: Option<String>,
}

impl BuildProgress {
    /// Failure message carried by this record, if any
    pub fn failure(&self) -> Option<String> {
        self.error.clone().or_else(|| {
            self.error_detail
                .as_ref()
                .and_then(|d| d.message.clone())
        })
    }

    /// Human-readable text of this record
    pub fn text(&self) -> Option<String> {
        self.stream
            .as_deref()
            .or(self.status.as_deref())
            .map(|s| s.trim_end().to_string())
            .filter(|s| !s.is_empty())
    }
}

impl Client {
    /// Build `project` into a new image tagged with a fresh random identifier.
    ///
    /// The returned [`Service`] carries only the project name and image tag.
    pub fn build(&self, project: &Project) -> Result<Service> {
        let tar_dir = self.build_dir()?;
        let image_id = Uuid::new_v4().to_string();
        let tar_path = tar_dir.path().join(format!("{}.tar", image_id));

        let mut archiver = ArchiveBuilder::new();
        if let Some(root) = &self.config().staging_dir {
            archiver = archiver.with_staging_root(root);
        }
        let summary = archiver.build(project, &tar_path)?;
        debug!(
            "Build context for '{}' has {} files",
            project.name,
            summary.entries.len()
        );

        self.build_image(&tar_path, &image_id, &self.config().labels)?;

        let tar_dir_path = tar_dir.path().to_path_buf();
        tar_dir
            .close()
            .map_err(|e| Error::filesystem(tar_dir_path, e))?;

        info!("Built image {} for project '{}'", image_id, project.name);
        Ok(Service::built(&project.name, image_id))
    }

    /// Submit the build context at `tar_path` to the daemon and wait for the build to finish.
    ///
    /// The progress stream is always read to the end. A record carrying an
    /// error fails the build with [`Error::BuildFailed`].
    pub fn build_image(&self, tar_path: &Path, tag: &str, labels: &BuildLabels) -> Result<()> {
        let context = File::open(tar_path).map_err(|e| Error::filesystem(tar_path, e))?;
        let length = context
            .metadata()
            .map_err(|e| Error::filesystem(tar_path, e))?
            .len();

        let query = BuildQuery {
            t: tag,
            labels: serde_json::to_string(labels)?,
            dockerfile: &self.config().dockerfile,
        };

        let request = self
            .transport()
            .post_request("/build")
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/x-tar")
            .timeout(self.config().build_timeout())
            .body(Body::sized(context, length));

        let (url, response) = self.transport().send(request, "POST", StatusCode::OK)?;
        consume_build_stream(
            BufReader::new(response),
            &url,
            tag,
            self.config().forward_build_logs,
        )
    }

    fn build_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TAR_DIR_PREFIX);
        match &self.config().staging_dir {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| Error::filesystem(root, e)),
            None => builder
                .tempdir()
                .map_err(|e| Error::filesystem(std::env::temp_dir(), e)),
        }
    }
}

/// Read a build progress stream to the end.
///
/// Lines are forwarded to [`BUILD_LOG_TARGET`] when `forward` is set and
/// dropped otherwise. The first error record seen fails the build once the
/// stream has been drained.
fn consume_build_stream<R: BufRead>(
    mut reader: R,
    url: &str,
    tag: &str,
    forward: bool,
) -> Result<()> {
    let mut failure = None;
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = reader
            .read_until(b'\n', &mut raw)
            .map_err(|source| Error::BuildStream {
                url: url.to_string(),
                source,
            })?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<BuildProgress>(line) {
            Ok(record) => {
                if let Some(message) = record.failure() {
                    failure.get_or_insert(message);
                }
                if forward {
                    if let Some(text) = record.text() {
                        info!(target: BUILD_LOG_TARGET, "{}", text);
                    }
                }
            }
            Err(_) if forward => info!(target: BUILD_LOG_TARGET, "{}", line),
            Err(_) => {}
        }
    }

    match failure {
        Some(message) => Err(Error::BuildFailed {
            tag: tag.to_string(),
            message,
        }),
        None => Ok(()),
    }
}
