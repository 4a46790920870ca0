//! In-memory repository for fixtures and tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{
    ArtifactIgnores, Checksums, ContentSource, HistoryResolver, PluginMap, PluginSeries,
    ReleaseCandidate, Repository,
};
use crate::coordinates::ArtifactCoordinates;
use crate::manifest::Manifest;

/// Manifests and checksums held in memory
#[derive(Default)]
pub struct MemoryContent {
    manifests: RwLock<HashMap<ArtifactCoordinates, Manifest>>,
    checksums: RwLock<HashMap<ArtifactCoordinates, Checksums>>,
    manifest_requests: AtomicUsize,
}

impl MemoryContent {
    pub fn insert_manifest(&self, coordinates: ArtifactCoordinates, manifest: Manifest) {
        if let Ok(mut manifests) = self.manifests.write() {
            manifests.insert(coordinates, manifest);
        }
    }

    pub fn insert_checksums(&self, coordinates: ArtifactCoordinates, checksums: Checksums) {
        if let Ok(mut map) = self.checksums.write() {
            map.insert(coordinates, checksums);
        }
    }

    /// Number of manifest lookups served so far
    pub fn manifest_requests(&self) -> usize {
        self.manifest_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn manifest(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Manifest>> {
        self.manifest_requests.fetch_add(1, Ordering::SeqCst);
        let manifests = self
            .manifests
            .read()
            .map_err(|_| anyhow::anyhow!("Manifest store lock poisoned"))?;
        Ok(manifests.get(coordinates).cloned())
    }

    async fn checksums(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Checksums>> {
        let checksums = self
            .checksums
            .read()
            .map_err(|_| anyhow::anyhow!("Checksum store lock poisoned"))?;
        Ok(checksums.get(coordinates).cloned())
    }
}

/// A repository whose releases are registered up front
///
/// Histories are resolved from the registered candidates, in registration
/// order, on every call, exactly as a remote repository resolves its index.
pub struct MemoryRepository {
    host_artifact_id: String,
    plugin_candidates: Vec<ReleaseCandidate>,
    host_candidates: Vec<ReleaseCandidate>,
    ignores: ArtifactIgnores,
    content: Arc<MemoryContent>,
}

impl MemoryRepository {
    pub fn new(host_artifact_id: impl Into<String>) -> Self {
        Self {
            host_artifact_id: host_artifact_id.into(),
            plugin_candidates: Vec::new(),
            host_candidates: Vec::new(),
            ignores: ArtifactIgnores::default(),
            content: Arc::new(MemoryContent::default()),
        }
    }

    pub fn with_ignores(mut self, ignores: ArtifactIgnores) -> Self {
        self.ignores = ignores;
        self
    }

    /// Register a plugin release and its manifest
    pub fn add_plugin(&mut self, coordinates: ArtifactCoordinates, manifest: Manifest) -> &mut Self {
        self.content.insert_manifest(coordinates.clone(), manifest);
        self.plugin_candidates.push(coordinates.into());
        self
    }

    /// Register a host application release
    pub fn add_host(&mut self, coordinates: ArtifactCoordinates) -> &mut Self {
        self.host_candidates.push(coordinates.into());
        self
    }

    pub fn memory_content(&self) -> &Arc<MemoryContent> {
        &self.content
    }

    fn resolver(&self) -> HistoryResolver {
        HistoryResolver::new(self.content.clone(), self.ignores.clone())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn plugins(&self) -> Result<PluginMap> {
        Ok(self
            .resolver()
            .resolve_plugins(self.plugin_candidates.iter().cloned()))
    }

    async fn host_releases(&self) -> Result<PluginSeries> {
        Ok(self
            .resolver()
            .resolve_host(&self.host_artifact_id, self.host_candidates.iter().cloned()))
    }

    fn content(&self) -> Arc<dyn ContentSource> {
        self.content.clone()
    }

    fn describe(&self) -> String {
        format!(
            "memory ({} plugin releases, {} host releases)",
            self.plugin_candidates.len(),
            self.host_candidates.len()
        )
    }
}
