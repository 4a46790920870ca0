//! Resolved releases of plugins and of the host application

use anyhow::Result;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::ContentSource;
use crate::coordinates::ArtifactCoordinates;
use crate::manifest::Manifest;
use crate::version::{VersionError, VersionNumber};

/// Content digests of an artifact, hex encoded as the repository reports them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

impl Checksums {
    pub fn sha1_base64(&self) -> Option<String> {
        self.sha1.as_deref().and_then(hex_to_base64)
    }

    pub fn sha256_base64(&self) -> Option<String> {
        self.sha256.as_deref().and_then(hex_to_base64)
    }
}

fn hex_to_base64(digest: &str) -> Option<String> {
    hex::decode(digest)
        .ok()
        .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// A plugin (HPI) or host (WAR) release
///
/// Cloning is cheap; clones share the compute-once manifest and checksum
/// cells, which are filled on first access and never invalidated.
#[derive(Clone)]
pub struct Release {
    inner: Arc<ReleaseInner>,
}

struct ReleaseInner {
    coordinates: ArtifactCoordinates,
    version: VersionNumber,
    /// Name of the owning plugin series, `None` for host releases
    plugin: Option<String>,
    source: Arc<dyn ContentSource>,
    manifest: OnceCell<Option<Manifest>>,
    checksums: OnceCell<Option<Checksums>>,
}

impl Release {
    /// Create a plugin release. Fails if the version does not parse.
    pub fn plugin(
        coordinates: ArtifactCoordinates,
        source: Arc<dyn ContentSource>,
    ) -> Result<Self, VersionError> {
        let plugin = Some(coordinates.artifact_id.clone());
        Self::build(coordinates, plugin, source)
    }

    /// Create a host application release. Fails if the version does not parse.
    pub fn host(
        coordinates: ArtifactCoordinates,
        source: Arc<dyn ContentSource>,
    ) -> Result<Self, VersionError> {
        Self::build(coordinates, None, source)
    }

    fn build(
        coordinates: ArtifactCoordinates,
        plugin: Option<String>,
        source: Arc<dyn ContentSource>,
    ) -> Result<Self, VersionError> {
        let version = VersionNumber::parse(&coordinates.version)?;
        Ok(Self {
            inner: Arc::new(ReleaseInner {
                coordinates,
                version,
                plugin,
                source,
                manifest: OnceCell::new(),
                checksums: OnceCell::new(),
            }),
        })
    }

    /// Seed the checksum cell with values already known from the index
    pub fn with_checksums(self, checksums: Checksums) -> Self {
        // Only possible before the release is shared
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.checksums = OnceCell::new_with(Some(Some(checksums)));
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => Self { inner },
        }
    }

    pub fn coordinates(&self) -> &ArtifactCoordinates {
        &self.inner.coordinates
    }

    pub fn version(&self) -> &VersionNumber {
        &self.inner.version
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.inner.plugin.as_deref()
    }

    pub fn is_host(&self) -> bool {
        self.inner.plugin.is_none()
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.inner.coordinates.timestamp()
    }

    pub fn release_date(&self) -> Option<DateTime<Utc>> {
        self.timestamp().and_then(DateTime::from_timestamp_millis)
    }

    /// The archive manifest, fetched once from the content source
    pub async fn manifest(&self) -> Result<Option<&Manifest>> {
        let manifest = self
            .inner
            .manifest
            .get_or_try_init(|| self.inner.source.manifest(&self.inner.coordinates))
            .await?;
        Ok(manifest.as_ref())
    }

    /// Declared minimum host version from the manifest
    pub async fn required_core(&self) -> Result<Option<VersionNumber>> {
        match self.manifest().await? {
            Some(manifest) => manifest.required_core(),
            None => Ok(None),
        }
    }

    /// Content digests, from the index or fetched once from the content source
    pub async fn checksums(&self) -> Result<Option<&Checksums>> {
        let checksums = self
            .inner
            .checksums
            .get_or_try_init(|| self.inner.source.checksums(&self.inner.coordinates))
            .await?;
        Ok(checksums.as_ref())
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("coordinates", &self.inner.coordinates)
            .field("plugin", &self.inner.plugin)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.coordinates, f)
    }
}
