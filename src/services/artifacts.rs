// src/services/artifacts.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::graph::ArtifactRef;
use crate::services::{ArtifactStore, ServiceError, ServiceResult};

/// Artifact store backed by a local directory: artifact `digest` lives in
/// `<root>/<digest>/`, and every regular file below it is a result file
/// keyed by its `/`-separated relative path.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn files(&self, artifact: &ArtifactRef) -> ServiceResult<BTreeMap<String, String>> {
        if artifact.digest.is_empty() || artifact.digest.contains(['/', '\\']) || artifact.digest == ".." {
            return Err(ServiceError::InvalidResponse(format!(
                "invalid artifact digest '{}'",
                artifact.digest
            )));
        }
        let base = self.root.join(&artifact.digest);
        if !base.is_dir() {
            return Err(ServiceError::NotFound(format!("artifact {}", artifact.digest)));
        }

        let mut files = BTreeMap::new();
        collect_files(&base, &base, &mut files)
            .map_err(|e| ServiceError::Request(format!("reading artifact {}: {e}", artifact.digest)))?;
        debug!(digest = %artifact.digest, files = files.len(), "loaded artifact files");
        Ok(files)
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut BTreeMap<String, String>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if path.is_file() {
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.insert(rel, fs::read_to_string(&path)?);
        }
    }
    Ok(())
}
