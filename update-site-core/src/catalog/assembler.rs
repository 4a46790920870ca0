//! Builds the update center document from resolved histories

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{
    CatalogSettings, CoreDescriptor, PluginDescriptor, UpdateCenter, UPDATE_CENTER_VERSION,
};
use crate::repository::{Checksums, PluginMap, PluginSeries, Release};

/// Read the security warnings array published verbatim with the catalog
pub fn load_warnings(path: &Path) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read warnings: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Warnings file is not a JSON array: {}", path.display()))
}

fn build_date(release: &Release) -> Option<String> {
    release
        .release_date()
        .map(|date| date.format("%b %d, %Y").to_string())
}

async fn require_checksums(release: &Release) -> Result<(Checksums, String)> {
    let checksums = release
        .checksums()
        .await?
        .cloned()
        .with_context(|| format!("No checksums for {release}"))?;
    let sha1 = checksums
        .sha1_base64()
        .with_context(|| format!("No valid SHA-1 checksum for {release}"))?;
    Ok((checksums, sha1))
}

/// Turns plugin histories and host releases into an [`UpdateCenter`]
pub struct CatalogAssembler {
    settings: CatalogSettings,
    warnings: Vec<serde_json::Value>,
    generated_at: DateTime<Utc>,
}

impl CatalogAssembler {
    pub fn new(settings: CatalogSettings) -> Self {
        Self {
            settings,
            warnings: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<serde_json::Value>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    fn base(&self) -> &str {
        self.settings.download_base_url.trim_end_matches('/')
    }

    pub fn plugin_url(&self, release: &Release) -> String {
        let c = release.coordinates();
        format!(
            "{}/plugins/{}/{}/{}.hpi",
            self.base(),
            c.artifact_id,
            c.version,
            c.artifact_id
        )
    }

    pub fn core_url(&self, release: &Release) -> String {
        format!("{}/war/{}/jenkins.war", self.base(), release.coordinates().version)
    }

    /// Descriptor of one plugin release; fails if its manifest or checksums are unusable
    pub async fn plugin_descriptor(&self, release: &Release) -> Result<PluginDescriptor> {
        let manifest = release
            .manifest()
            .await?
            .with_context(|| format!("No manifest for {release}"))?;
        let (checksums, sha1) = require_checksums(release).await?;
        let coordinates = release.coordinates();

        let name = manifest
            .short_name()
            .unwrap_or(&coordinates.artifact_id)
            .to_string();
        let title = manifest.long_name().unwrap_or(&name).to_string();

        Ok(PluginDescriptor {
            title,
            version: coordinates.version.clone(),
            url: self.plugin_url(release),
            sha1,
            sha256: checksums.sha256_base64(),
            size: checksums.size,
            required_core: manifest.required_core()?.map(|v| v.raw().to_string()),
            compatible_since_version: manifest.compatible_since_version().map(str::to_string),
            minimum_java_version: manifest.minimum_java_version().map(str::to_string),
            dependencies: manifest.dependencies()?,
            developers: manifest.developers(),
            labels: Vec::new(),
            excerpt: manifest.excerpt().map(str::to_string),
            gav: coordinates.gav(),
            release_timestamp: release
                .release_date()
                .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            build_date: build_date(release),
            wiki: manifest.url().map(str::to_string),
            name,
        })
    }

    pub async fn core_descriptor(&self, release: &Release) -> Result<CoreDescriptor> {
        let (checksums, sha1) = require_checksums(release).await?;
        Ok(CoreDescriptor {
            name: "core".to_string(),
            version: release.coordinates().version.clone(),
            url: self.core_url(release),
            sha1,
            sha256: checksums.sha256_base64(),
            build_date: build_date(release),
        })
    }

    /// Descriptor of the newest release that yields one
    async fn newest_plugin_descriptor(&self, series: &PluginSeries) -> Option<PluginDescriptor> {
        for release in series.releases() {
            match self.plugin_descriptor(release).await {
                Ok(descriptor) => return Some(descriptor),
                Err(e) => warn!("Skipping {}: {:#}", release, e),
            }
        }
        None
    }

    pub async fn assemble(&self, plugins: &PluginMap, host: &PluginSeries) -> Result<UpdateCenter> {
        let mut descriptors = BTreeMap::new();
        for (name, series) in plugins {
            match self.newest_plugin_descriptor(series).await {
                Some(descriptor) => {
                    debug!("Publishing {} {}", name, descriptor.version);
                    descriptors.insert(name.clone(), descriptor);
                }
                None => warn!("No publishable release of {}", name),
            }
        }

        let mut core = None;
        for release in host.releases() {
            match self.core_descriptor(release).await {
                Ok(descriptor) => {
                    core = Some(descriptor);
                    break;
                }
                Err(e) => warn!("Skipping {}: {:#}", release, e),
            }
        }
        if core.is_none() {
            warn!("No publishable host release; the catalog has no core entry");
        }

        info!(
            plugins = descriptors.len(),
            warnings = self.warnings.len(),
            core = core.as_ref().map(|c| c.version.as_str()).unwrap_or("none"),
            "Assembled update center"
        );

        Ok(UpdateCenter {
            update_center_version: UPDATE_CENTER_VERSION.to_string(),
            id: self.settings.id.clone(),
            connection_check_url: self.settings.connection_check_url.clone(),
            core,
            plugins: descriptors,
            warnings: self.warnings.clone(),
            generation_timestamp: self
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            signature: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::ArtifactCoordinates;
    use crate::manifest::Manifest;
    use crate::repository::{MemoryRepository, Repository};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    fn checksums() -> Checksums {
        Checksums {
            sha1: Some(EMPTY_SHA1.to_string()),
            sha256: None,
            size: Some(2048),
        }
    }

    fn git_manifest() -> Manifest {
        Manifest::from_attributes([
            ("Short-Name", "git"),
            ("Long-Name", "Git plugin"),
            ("Jenkins-Version", "2.401.3"),
            ("Plugin-Dependencies", "credentials:1311.vcf0a_900b_37c2;resolution:=optional,scm-api:676.v886669a_199a_a"),
            ("Plugin-Developers", "Mark Waite:markewaite:mark.earl.waite@gmail.com"),
            ("Url", "https://github.com/jenkinsci/git-plugin"),
            ("Minimum-Java-Version", "11"),
        ])
    }

    #[tokio::test]
    async fn test_plugin_descriptor() {
        let coordinates = ArtifactCoordinates::new("org.jenkins-ci.plugins", "git", "5.2.1", "hpi")
            .with_timestamp(Utc.with_ymd_and_hms(2023, 11, 3, 14, 25, 51).unwrap().timestamp_millis());
        let mut repository = MemoryRepository::new("jenkins-war");
        repository.add_plugin(coordinates.clone(), git_manifest());
        repository
            .memory_content()
            .insert_checksums(coordinates, checksums());

        let plugins = repository.plugins().await.unwrap();
        let release = plugins["git"].latest().unwrap();
        let descriptor = CatalogAssembler::new(CatalogSettings::default())
            .plugin_descriptor(release)
            .await
            .unwrap();

        assert_eq!(descriptor.name, "git");
        assert_eq!(descriptor.title, "Git plugin");
        assert_eq!(
            descriptor.url,
            "https://updates.jenkins.io/download/plugins/git/5.2.1/git.hpi"
        );
        assert_eq!(descriptor.sha1, "2jmj7l5rSw0yVb/vlWAYkK/YBwk=");
        assert_eq!(descriptor.size, Some(2048));
        assert_eq!(descriptor.required_core.as_deref(), Some("2.401.3"));
        assert_eq!(descriptor.dependencies.len(), 2);
        assert!(descriptor.dependencies[0].optional);
        assert_eq!(descriptor.developers[0].developer_id.as_deref(), Some("markewaite"));
        assert_eq!(descriptor.gav, "org.jenkins-ci.plugins:git:5.2.1");
        assert_eq!(
            descriptor.release_timestamp.as_deref(),
            Some("2023-11-03T14:25:51.000Z")
        );
        assert_eq!(descriptor.build_date.as_deref(), Some("Nov 03, 2023"));
        assert!(descriptor.labels.is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_to_older_release() {
        let mut repository = MemoryRepository::new("jenkins-war");
        let good = ArtifactCoordinates::new("g", "git", "5.2.0", "hpi");
        let broken = ArtifactCoordinates::new("g", "git", "5.2.1", "hpi");
        repository
            .add_plugin(good.clone(), git_manifest())
            .add_plugin(
                broken.clone(),
                Manifest::from_attributes([("Jenkins-Version", "not a version")]),
            );
        repository.memory_content().insert_checksums(good, checksums());
        repository.memory_content().insert_checksums(broken, checksums());

        let update_center = CatalogAssembler::new(CatalogSettings::default())
            .assemble(
                &repository.plugins().await.unwrap(),
                &repository.host_releases().await.unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(update_center.plugins["git"].version, "5.2.0");
        assert!(update_center.core.is_none());
    }

    #[tokio::test]
    async fn test_missing_checksums_drop_plugin() {
        let mut repository = MemoryRepository::new("jenkins-war");
        repository.add_plugin(ArtifactCoordinates::new("g", "git", "5.2.0", "hpi"), git_manifest());

        let update_center = CatalogAssembler::new(CatalogSettings::default())
            .assemble(
                &repository.plugins().await.unwrap(),
                &repository.host_releases().await.unwrap(),
            )
            .await
            .unwrap();
        assert!(update_center.plugins.is_empty());
    }

    #[tokio::test]
    async fn test_core_descriptor() {
        let war = ArtifactCoordinates::new("org.jenkins-ci.main", "jenkins-war", "2.426.1", "war");
        let mut repository = MemoryRepository::new("jenkins-war");
        repository.add_host(war.clone());
        repository.memory_content().insert_checksums(war, checksums());

        let generated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let update_center = CatalogAssembler::new(CatalogSettings {
            download_base_url: "https://mirror.example.org/".to_string(),
            ..Default::default()
        })
        .with_warnings(vec![serde_json::json!({"id": "SECURITY-1", "type": "plugin"})])
        .generated_at(generated)
        .assemble(&PluginMap::new(), &repository.host_releases().await.unwrap())
        .await
        .unwrap();

        let core = update_center.core.unwrap();
        assert_eq!(core.name, "core");
        assert_eq!(core.url, "https://mirror.example.org/war/2.426.1/jenkins.war");
        assert_eq!(update_center.warnings.len(), 1);
        assert_eq!(update_center.generation_timestamp, "2024-01-01T00:00:00Z");
    }
}
