//! Project layout, canonical serialization and zip packaging for artifacts.

use aipo_config::GenerationConfig;
use aipo_utils::canonicalization::{content_digest, emit_jcs};
use aipo_utils::error::GenerationError;
use aipo_utils::types::GenerationId;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::types::{ArtifactType, CodeArtifact};

const MANIFEST_NAME: &str = "manifest.json";

/// Directory names used by [`FileOrganizer::organize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizerLayout {
    pub tests_dir: String,
    pub services_dir: String,
    pub controllers_dir: String,
    pub interfaces_dir: String,
    pub models_dir: String,
}

impl Default for OrganizerLayout {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for OrganizerLayout {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            tests_dir: config.tests_dir().to_string(),
            services_dir: config.services_dir().to_string(),
            controllers_dir: "Controllers".to_string(),
            interfaces_dir: "Interfaces".to_string(),
            models_dir: "Models".to_string(),
        }
    }
}

impl OrganizerLayout {
    fn dir_for(&self, file_type: ArtifactType) -> &str {
        match file_type {
            ArtifactType::Test => &self.tests_dir,
            ArtifactType::Service | ArtifactType::Implementation => &self.services_dir,
            ArtifactType::Controller => &self.controllers_dir,
            ArtifactType::Interface => &self.interfaces_dir,
            ArtifactType::Model => &self.models_dir,
        }
    }
}

/// A packaged zip and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub bytes: Vec<u8>,
    /// BLAKE3 hex of `bytes`.
    pub digest: String,
    /// Entry names in archive order, manifest last.
    pub entries: Vec<String>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    generation_id: String,
    files: Vec<ManifestEntry<'a>>,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    path: &'a str,
    file_type: ArtifactType,
    blake3: String,
    bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FileOrganizer {
    layout: OrganizerLayout,
}

impl FileOrganizer {
    #[must_use]
    pub fn new(layout: OrganizerLayout) -> Self {
        Self { layout }
    }

    /// Assign `relative_path` by file type.
    ///
    /// Paths are a naming convention only; nothing touches the filesystem.
    /// A path already taken gets `_2`, `_3`, ... before the extension.
    #[must_use]
    pub fn organize(&self, artifacts: Vec<CodeArtifact>) -> Vec<CodeArtifact> {
        let mut taken = HashSet::new();
        artifacts
            .into_iter()
            .map(|mut artifact| {
                let dir = self.layout.dir_for(artifact.file_type);
                let path = unique_path(&mut taken, dir, &artifact.file_name);
                debug!(file_name = %artifact.file_name, path = %path, "Organized artifact");
                artifact.relative_path = Some(path);
                artifact
            })
            .collect()
    }

    /// Canonical JSON (JCS) of the artifact list.
    ///
    /// # Errors
    ///
    /// Returns `PackagingFailure` if serialization fails.
    pub fn serialize(&self, artifacts: &[CodeArtifact]) -> Result<String, GenerationError> {
        emit_jcs(&artifacts).map_err(|e| GenerationError::PackagingFailure {
            reason: format!("failed to serialize artifacts: {e}"),
        })
    }

    /// Zip implementation and test files under `<generation_id>/`.
    ///
    /// Entries are sorted by path and stamped 1980-01-01, so the same inputs
    /// always produce the same bytes. Unorganized artifacts are placed first.
    ///
    /// # Errors
    ///
    /// Returns `PackagingFailure` if the archive cannot be written.
    pub fn package_zip(
        &self,
        generation_id: GenerationId,
        implementation_files: &[CodeArtifact],
        test_files: &[CodeArtifact],
    ) -> Result<PackagedArchive, GenerationError> {
        let mut files: Vec<CodeArtifact> = implementation_files
            .iter()
            .chain(test_files)
            .cloned()
            .collect();
        if files.iter().any(|f| f.relative_path.is_none()) {
            files = self.organize(files);
        }
        files.sort_by(|a, b| a.path().cmp(b.path()));

        let root = generation_id.to_string();
        let manifest = Manifest {
            generation_id: root.clone(),
            files: files
                .iter()
                .map(|f| ManifestEntry {
                    path: f.path(),
                    file_type: f.file_type,
                    blake3: content_digest(f.content.as_bytes()),
                    bytes: f.content.len(),
                })
                .collect(),
        };
        let manifest_json = emit_jcs(&manifest).map_err(|e| packaging(format!("manifest: {e}")))?;

        let timestamp = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
            .map_err(|e| packaging(format!("timestamp: {e}")))?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(timestamp)
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut entries = Vec::with_capacity(files.len() + 1);
        let contents = files
            .iter()
            .map(|f| (format!("{root}/{}", f.path()), f.content.as_bytes()))
            .chain(std::iter::once((
                format!("{root}/{MANIFEST_NAME}"),
                manifest_json.as_bytes(),
            )));

        for (name, bytes) in contents {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| packaging(format!("{name}: {e}")))?;
            writer
                .write_all(bytes)
                .map_err(|e| packaging(format!("{name}: {e}")))?;
            entries.push(name);
        }

        let bytes = writer
            .finish()
            .map_err(|e| packaging(format!("finish: {e}")))?
            .into_inner();
        let digest = content_digest(&bytes);
        debug!(
            generation_id = %generation_id,
            entries = entries.len(),
            bytes = bytes.len(),
            digest = %digest,
            "Packaged artifacts"
        );

        Ok(PackagedArchive {
            bytes,
            digest,
            entries,
        })
    }
}

fn packaging(reason: String) -> GenerationError {
    GenerationError::PackagingFailure { reason }
}

fn unique_path(taken: &mut HashSet<String>, dir: &str, file_name: &str) -> String {
    let candidate = join(dir, file_name);
    if taken.insert(candidate.clone()) {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let mut n = 2usize;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = join(dir, &name);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn join(dir: &str, file_name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}
