//! Artifact repository access
//!
//! A [`Repository`] enumerates every plugin and host release known to an
//! artifact repository; a [`ContentSource`] resolves the content of a single
//! artifact on demand. Releases keep a handle to the content source that
//! produced them, so manifests and checksums are only fetched when needed.
//!
//! # Architecture
//!
//! ```text
//! ArtifactoryRepository / MemoryRepository   (base source)
//!            │
//!            ▼
//!     FilteredRepository                      (ordered filter stages)
//!            │
//!            ▼
//!  PluginMap + host PluginSeries              (resolved histories)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::coordinates::ArtifactCoordinates;
use crate::manifest::Manifest;

pub mod artifactory;
pub mod cache;
mod error;
pub mod filter;
pub mod memory;
mod release;
mod series;

pub use artifactory::{ArtifactoryConfig, ArtifactoryRepository};
pub use cache::ResponseCache;
pub use error::RepositoryError;
pub use filter::{FilteredRepository, RepositoryFilter};
pub use memory::{MemoryContent, MemoryRepository};
pub use release::{Checksums, Release};
pub use series::{ArtifactIgnores, HistoryResolver, Insertion, PluginSeries, ReleaseCandidate};

/// All plugin histories, keyed by plugin name
pub type PluginMap = BTreeMap<String, PluginSeries>;

/// Resolves the content of individual artifacts
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Main-section manifest attributes of the artifact, `None` if it has none
    async fn manifest(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Manifest>>;

    /// Content digests of the artifact, `None` if unknown
    async fn checksums(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Checksums>>;
}

/// Enumerates plugin and host releases
///
/// Implementations must return freshly resolved histories on every call;
/// callers are free to mutate what they get back.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Every plugin with at least one release
    async fn plugins(&self) -> Result<PluginMap>;

    /// The host application release history
    async fn host_releases(&self) -> Result<PluginSeries>;

    /// The content source releases of this repository resolve against
    fn content(&self) -> Arc<dyn ContentSource>;

    /// Identifier for logging/debugging
    fn describe(&self) -> String;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn plugins(&self) -> Result<PluginMap> {
        (**self).plugins().await
    }

    async fn host_releases(&self) -> Result<PluginSeries> {
        (**self).host_releases().await
    }

    fn content(&self) -> Arc<dyn ContentSource> {
        (**self).content()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
