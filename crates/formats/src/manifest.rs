use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: &str = "1.0";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Index of the files written for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputManifest {
    pub version: String,
    pub name: Option<String>,
    /// blake3 of the input payload, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// blake3 over the ordered entry hashes; identifies the whole output set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub entries: Vec<OutputEntry>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    MeshChunk,
    Polylines,
    InstanceBatch,
    Placements,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputEntry {
    pub id: String,
    pub kind: OutputKind,
    pub path: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<[u32; 2]>,
    /// Vertices for meshes/polylines, transforms for instance data.
    pub element_count: u32,
}

#[derive(Debug)]
pub enum ManifestError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    UnsupportedVersion { found: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Io(err) => write!(f, "I/O error: {err}"),
            ManifestError::Parse(err) => write!(f, "Manifest parse error: {err}"),
            ManifestError::UnsupportedVersion { found } => {
                write!(f, "Unsupported manifest version: {found}")
            }
        }
    }
}

impl std::error::Error for ManifestError {}

impl OutputManifest {
    pub fn new(name: Option<String>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            name,
            source_hash: None,
            content_hash: None,
            entries: Vec::new(),
        }
    }

    /// Hash a payload and register it; returns the hex content hash.
    pub fn push(
        &mut self,
        id: impl Into<String>,
        kind: OutputKind,
        path: impl Into<String>,
        payload: &[u8],
        cell: Option<[u32; 2]>,
        element_count: u32,
    ) -> String {
        let content_hash = blake3::hash(payload).to_hex().to_string();
        self.entries.push(OutputEntry {
            id: id.into(),
            kind,
            path: path.into(),
            content_hash: content_hash.clone(),
            cell,
            element_count,
        });
        content_hash
    }

    pub fn compute_identity(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for entry in &self.entries {
            hasher.update(entry.path.as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.content_hash.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn compute_and_set_identity(&mut self) {
        self.content_hash = Some(self.compute_identity());
    }

    pub fn count_kind(&self, kind: OutputKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn write(&self, dir: impl AsRef<Path>) -> Result<(), ManifestError> {
        let payload = serde_json::to_string_pretty(self).map_err(ManifestError::Parse)?;
        fs::write(dir.as_ref().join(MANIFEST_FILE_NAME), payload).map_err(ManifestError::Io)
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let payload = fs::read_to_string(dir.as_ref().join(MANIFEST_FILE_NAME))
            .map_err(ManifestError::Io)?;
        let manifest: OutputManifest =
            serde_json::from_str(&payload).map_err(ManifestError::Parse)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion {
                found: manifest.version,
            });
        }
        Ok(manifest)
    }
}
