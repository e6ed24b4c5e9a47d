//! Image manifest model and version resolution.
//!
//! A manifest document maps component keys to concrete image coordinates for
//! one product version. The resolver matches a requested version exactly
//! first, then falls back to the highest loaded patch release compatible
//! with the requested `major.minor`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
    #[error("no image manifest satisfies version {0}")]
    UnsupportedVersion(String),
    #[error("no image {key:?} in the manifest matched for version {version}")]
    NotFound { key: String, version: String },
    #[error("failed to read image manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse image manifest {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One manifest file: a product version and its component images.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ManifestDocument {
    pub version: String,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    /// Component key, e.g. `search_collector`.
    pub key: String,
    /// Registry and org, e.g. `quay.io/stolostron`.
    pub repository: String,
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub digest: String,
}

impl ImageEntry {
    /// Full image reference. A digest pin wins over a tag when both exist.
    pub fn reference(&self) -> String {
        self.reference_in(&self.repository)
    }

    /// Reference with the registry/org replaced, for mirror registries.
    pub fn reference_in(&self, repository: &str) -> String {
        if !self.digest.is_empty() {
            format!("{}/{}@{}", repository, self.name, self.digest)
        } else if !self.tag.is_empty() {
            format!("{}/{}:{}", repository, self.name, self.tag)
        } else {
            format!("{}/{}", repository, self.name)
        }
    }
}

/// The loaded manifest set, keyed by parsed version so iteration order is
/// deterministic and ascending.
#[derive(Clone, Debug, Default)]
pub struct ImageManifests {
    manifests: BTreeMap<Version, BTreeMap<String, ImageEntry>>,
}

impl ImageManifests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the set from already-parsed documents. A duplicate version
    /// replaces the earlier document, so the caller's ordering decides.
    pub fn from_documents<I>(docs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = ManifestDocument>,
    {
        let mut manifests: BTreeMap<Version, BTreeMap<String, ImageEntry>> = BTreeMap::new();
        for doc in docs {
            let version = Version::parse(&doc.version).map_err(|source| Error::InvalidVersion {
                version: doc.version.clone(),
                source,
            })?;
            let images = doc
                .images
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect();
            manifests.insert(version, images);
        }
        Ok(Self { manifests })
    }

    /// Load every `*.json` manifest under `dir`, in sorted filename order.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| Error::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.display().to_string(),
                source,
            })?;
            let doc: ManifestDocument =
                serde_json::from_str(&raw).map_err(|source| Error::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            debug!(path = %path.display(), version = %doc.version, "loaded image manifest");
            docs.push(doc);
        }
        Self::from_documents(docs)
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.manifests.keys()
    }

    /// The manifest serving the requested version: an exact hit, or the
    /// highest loaded patch release within the requested `major.minor`.
    fn matched(&self, version: &str) -> Result<&BTreeMap<String, ImageEntry>, Error> {
        let requested = Version::parse(version).map_err(|source| Error::InvalidVersion {
            version: version.to_string(),
            source,
        })?;
        if let Some(images) = self.manifests.get(&requested) {
            return Ok(images);
        }

        // Compatible patch releases only: a neighbouring minor may carry
        // different defaults, so it is never substituted silently.
        let req =
            VersionReq::parse(&format!("~{version}")).map_err(|source| Error::InvalidVersion {
                version: version.to_string(),
                source,
            })?;
        self.manifests
            .iter()
            .filter(|(v, _)| req.matches(v))
            .next_back()
            .map(|(_, images)| images)
            .ok_or_else(|| Error::UnsupportedVersion(version.to_string()))
    }

    /// Whether some loaded manifest serves the requested version.
    pub fn supports(&self, version: &str) -> bool {
        self.matched(version).is_ok()
    }

    pub fn resolve_entry(&self, key: &str, version: &str) -> Result<&ImageEntry, Error> {
        self.matched(version)?.get(key).ok_or_else(|| Error::NotFound {
            key: key.to_string(),
            version: version.to_string(),
        })
    }

    /// Full image reference for a component at the requested version.
    pub fn resolve(&self, key: &str, version: &str) -> Result<String, Error> {
        Ok(self.resolve_entry(key, version)?.reference())
    }
}
