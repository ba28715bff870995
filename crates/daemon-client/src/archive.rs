//! Build context packaging.
//!
//! A [`Project`]'s virtual files are written into a scoped staging directory
//! and that directory is packaged into a tar archive. The staging directory
//! is removed on every exit path, including a failure half-way through
//! writing files.

use crate::error::{Error, Result};
use crate::models::Project;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

const STAGING_PREFIX: &str = "fx-build-dir";

/// Result of packaging a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Path of the written archive
    pub path: PathBuf,
    /// Relative paths of the archived files, in archive order
    pub entries: Vec<PathBuf>,
}

/// Packages projects into tar build contexts
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    staging_root: Option<PathBuf>,
}

impl ArchiveBuilder {
    /// Builder that stages files under the system temp directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage files under `root` instead of the system temp directory
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Write `project` into a staging directory and package it at `output`
    pub fn build(&self, project: &Project, output: &Path) -> Result<ArchiveSummary> {
        let staging = self.staging_dir()?;
        debug!(
            "Staging {} files for '{}' in {:?}",
            project.files.len(),
            project.name,
            staging.path()
        );

        for file in &project.files {
            let relative = contained_path(&file.path)?;
            let target = staging.path().join(&relative);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
            }
            std::fs::write(&target, &file.body).map_err(|e| Error::filesystem(&target, e))?;
        }

        let entries = pack_dir(staging.path(), output)?;

        let staging_path = staging.path().to_path_buf();
        staging
            .close()
            .map_err(|e| Error::filesystem(staging_path, e))?;

        Ok(ArchiveSummary {
            path: output.to_path_buf(),
            entries,
        })
    }

    fn staging_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        match &self.staging_root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| Error::filesystem(root, e)),
            None => builder
                .tempdir()
                .map_err(|e| Error::filesystem(std::env::temp_dir(), e)),
        }
    }
}

/// Package `project` as a tar archive at `output`, staging in the system temp directory
pub fn make_tar(project: &Project, output: &Path) -> Result<ArchiveSummary> {
    ArchiveBuilder::new().build(project, output)
}

/// Normalise a virtual file path, rejecting anything that could leave the staging root
fn contained_path(raw: &str) -> Result<PathBuf> {
    let escape = || Error::PathEscape {
        path: raw.to_string(),
    };

    let mut normalised = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => normalised.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape());
            }
        }
    }

    if normalised.as_os_str().is_empty() {
        return Err(escape());
    }
    Ok(normalised)
}

/// Archive every regular file under `dir`, sorted by path, into `output`
fn pack_dir(dir: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |source: std::io::Error| Error::Archive {
        path: output.to_path_buf(),
        source,
    };

    let file = File::create(output).map_err(archive_err)?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_err(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| archive_err(std::io::Error::other(e)))?
            .to_path_buf();

        builder
            .append_path_with_name(entry.path(), &relative)
            .map_err(archive_err)?;
        entries.push(relative);
    }

    builder
        .into_inner()
        .and_then(|file| file.sync_all())
        .map_err(archive_err)?;

    debug!("Packaged {} entries into {:?}", entries.len(), output);
    Ok(entries)
}
