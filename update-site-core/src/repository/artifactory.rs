//! Artifactory-backed repository source
//!
//! The whole release index is fetched with a single AQL search per run.
//! Manifests are read straight out of the archives through Artifactory's
//! archive browsing (`<file>!/META-INF/MANIFEST.MF`) and go through the
//! [`ResponseCache`], so repeated runs only download what is new.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{
    ArtifactIgnores, Checksums, ContentSource, HistoryResolver, PluginMap, PluginSeries,
    ReleaseCandidate, Repository, RepositoryError, ResponseCache,
};
use crate::coordinates::ArtifactCoordinates;
use crate::manifest::Manifest;

pub const DEFAULT_BASE_URL: &str = "https://repo.jenkins-ci.org";
pub const DEFAULT_REPOSITORY: &str = "releases";
pub const DEFAULT_HOST_GROUP_ID: &str = "org.jenkins-ci.main";
pub const DEFAULT_HOST_ARTIFACT_ID: &str = "jenkins-war";

/// Packaging of host application releases
pub const HOST_PACKAGING: &str = "war";

/// Packagings recognized as plugin releases
pub const PLUGIN_PACKAGINGS: &[&str] = &["hpi", "jpi"];

pub const USERNAME_ENV: &str = "ARTIFACTORY_USERNAME";
pub const PASSWORD_ENV: &str = "ARTIFACTORY_PASSWORD";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an Artifactory instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactoryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Repository key searched for releases
    #[serde(default = "default_repository")]
    pub repository: String,

    #[serde(default = "default_host_group_id")]
    pub host_group_id: String,

    #[serde(default = "default_host_artifact_id")]
    pub host_artifact_id: String,

    /// Credentials are never read from configuration files
    #[serde(skip)]
    pub username: Option<String>,

    #[serde(skip)]
    pub password: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_host_group_id() -> String {
    DEFAULT_HOST_GROUP_ID.to_string()
}

fn default_host_artifact_id() -> String {
    DEFAULT_HOST_ARTIFACT_ID.to_string()
}

impl Default for ArtifactoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            repository: default_repository(),
            host_group_id: default_host_group_id(),
            host_artifact_id: default_host_artifact_id(),
            username: None,
            password: None,
        }
    }
}

impl ArtifactoryConfig {
    /// Pick up credentials from `ARTIFACTORY_USERNAME` / `ARTIFACTORY_PASSWORD`
    pub fn with_credentials_from_env(mut self) -> Self {
        self.username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty());
        self.password = std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty());
        self
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn search_url(&self) -> String {
        format!("{}/api/search/aql", self.base())
    }

    fn artifact_url(&self, coordinates: &ArtifactCoordinates) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base(),
            self.repository,
            coordinates.directory(),
            coordinates.file_name()
        )
    }

    fn manifest_url(&self, coordinates: &ArtifactCoordinates) -> String {
        format!("{}!/META-INF/MANIFEST.MF", self.artifact_url(coordinates))
    }

    fn storage_url(&self, coordinates: &ArtifactCoordinates) -> String {
        format!(
            "{}/api/storage/{}/{}/{}",
            self.base(),
            self.repository,
            coordinates.directory(),
            coordinates.file_name()
        )
    }

    /// AQL selecting every plugin and host archive in the repository
    pub fn search_query(&self) -> String {
        let criteria = serde_json::json!({
            "repo": { "$eq": self.repository },
            "$or": [
                { "name": { "$match": "*.hpi" } },
                { "name": { "$match": "*.jpi" } },
                { "name": { "$match": "*.war" } },
            ],
        });
        format!(
            "items.find({criteria}).include(\"repo\",\"path\",\"name\",\"modified\",\"created\",\"actual_sha1\",\"sha256\",\"size\")"
        )
    }
}

/// One item of an AQL search result
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRecord {
    pub repo: String,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub actual_sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchRecord>,
}

impl SearchRecord {
    fn invalid(&self, reason: impl Into<String>) -> RepositoryError {
        RepositoryError::InvalidRecord {
            path: self.path.clone(),
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Creation time in epoch milliseconds, `0` when absent or unparseable
    pub fn created_millis(&self) -> i64 {
        self.created
            .as_deref()
            .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
            .map(|created| created.timestamp_millis())
            .unwrap_or(0)
    }

    pub fn checksums(&self) -> Checksums {
        Checksums {
            sha1: self.actual_sha1.clone(),
            sha256: self.sha256.clone(),
            size: self.size,
        }
    }

    /// Derive coordinates from `path` (`group/as/path/artifactId/version`) and `name`
    ///
    /// `name` must be exactly `artifactId-version.extension` and both fields
    /// must be printable ASCII without spaces.
    pub fn coordinates(&self) -> Result<ArtifactCoordinates, RepositoryError> {
        let printable = |s: &str| s.bytes().all(|b| (0x21..=0x7E).contains(&b));
        if !printable(&self.path) || !printable(&self.name) {
            return Err(self.invalid("contains characters outside printable ASCII"));
        }

        let (_, extension) = self
            .name
            .rsplit_once('.')
            .ok_or_else(|| self.invalid("file name has no extension"))?;

        let segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        let [group @ .., artifact_id, version] = segments.as_slice() else {
            return Err(self.invalid("path is not group/artifactId/version"));
        };
        if group.is_empty() {
            return Err(self.invalid("path has no group segments"));
        }

        let expected = format!("{artifact_id}-{version}.{extension}");
        if self.name != expected {
            return Err(self.invalid(format!("expected file name '{expected}'")));
        }

        Ok(
            ArtifactCoordinates::new(group.join("."), *artifact_id, *version, extension)
                .with_timestamp(self.created_millis()),
        )
    }
}

/// Split search records into plugin and host candidates
fn partition_records(
    config: &ArtifactoryConfig,
    records: Vec<SearchRecord>,
) -> (Vec<ReleaseCandidate>, Vec<ReleaseCandidate>) {
    let mut plugins = Vec::new();
    let mut host = Vec::new();

    for record in records {
        let coordinates = match record.coordinates() {
            Ok(coordinates) => coordinates,
            Err(e) => {
                debug!("Skipping search result: {}", e);
                continue;
            }
        };
        // Records without a SHA-1 resolve checksums through the storage API
        let candidate = ReleaseCandidate {
            checksums: record.actual_sha1.is_some().then(|| record.checksums()),
            coordinates,
        };
        let c = &candidate.coordinates;

        if c.packaging == HOST_PACKAGING {
            if c.group_id == config.host_group_id && c.artifact_id == config.host_artifact_id {
                host.push(candidate);
            }
        } else if PLUGIN_PACKAGINGS.contains(&c.packaging.as_str()) {
            plugins.push(candidate);
        }
    }

    (plugins, host)
}

/// Fetches manifests and checksums of individual archives
pub struct ArtifactoryContent {
    client: reqwest::Client,
    config: ArtifactoryConfig,
    cache: Arc<ResponseCache>,
}

#[derive(Debug, Deserialize)]
struct StorageInfo {
    #[serde(default)]
    checksums: StorageChecksums,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageChecksums {
    sha1: Option<String>,
    sha256: Option<String>,
}

impl ArtifactoryContent {
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    /// GET a URL; `Ok(None)` on 404
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("HTTP {} from {}", response.status(), url);
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;
        Ok(Some(body.to_vec()))
    }

    async fn cached(&self, url: &str) -> Result<Option<Arc<Vec<u8>>>> {
        self.cache.get_or_fetch(url, || self.fetch(url)).await
    }
}

#[async_trait]
impl ContentSource for ArtifactoryContent {
    async fn manifest(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Manifest>> {
        let url = self.config.manifest_url(coordinates);
        match self.cached(&url).await? {
            Some(body) => Manifest::from_bytes(&body)
                .map(Some)
                .with_context(|| format!("Invalid manifest in {coordinates}")),
            None => Ok(None),
        }
    }

    async fn checksums(&self, coordinates: &ArtifactCoordinates) -> Result<Option<Checksums>> {
        let url = self.config.storage_url(coordinates);
        let Some(body) = self.cached(&url).await? else {
            return Ok(None);
        };
        let info: StorageInfo = serde_json::from_slice(&body)
            .with_context(|| format!("Invalid storage info for {coordinates}"))?;
        Ok(Some(Checksums {
            sha1: info.checksums.sha1,
            sha256: info.checksums.sha256,
            size: info.size.and_then(|size| size.parse().ok()),
        }))
    }
}

struct ArtifactIndex {
    plugins: Vec<ReleaseCandidate>,
    host: Vec<ReleaseCandidate>,
}

/// Repository source answering from one bulk AQL search
pub struct ArtifactoryRepository {
    content: Arc<ArtifactoryContent>,
    ignores: ArtifactIgnores,
    index: OnceCell<ArtifactIndex>,
}

impl ArtifactoryRepository {
    pub fn new(config: ArtifactoryConfig, cache: Arc<ResponseCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("update-site/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            content: Arc::new(ArtifactoryContent {
                client,
                config,
                cache,
            }),
            ignores: ArtifactIgnores::default(),
            index: OnceCell::new(),
        })
    }

    pub fn with_ignores(mut self, ignores: ArtifactIgnores) -> Self {
        self.ignores = ignores;
        self
    }

    fn config(&self) -> &ArtifactoryConfig {
        &self.content.config
    }

    /// Fetch the release index
    ///
    /// Lookups initialize the index on first use; calling this after the
    /// index is populated is an error.
    pub async fn initialize(&self) -> Result<()> {
        if self.index.initialized() {
            return Err(RepositoryError::AlreadyInitialized(self.describe()).into());
        }
        let index = self.search().await?;
        self.index
            .set(index)
            .map_err(|_| RepositoryError::AlreadyInitialized(self.describe()))?;
        Ok(())
    }

    async fn index(&self) -> Result<&ArtifactIndex> {
        self.index.get_or_try_init(|| self.search()).await
    }

    async fn search(&self) -> Result<ArtifactIndex> {
        let config = self.config();
        let url = config.search_url();
        info!("Querying {} for all releases in '{}'", url, config.repository);

        let response = self
            .content
            .authorize(self.content.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(config.search_query())
            .send()
            .await
            .with_context(|| format!("Failed to query {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::SearchFailed {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let response: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;
        let total = response.results.len();
        let (plugins, host) = partition_records(config, response.results);

        info!(
            total,
            plugins = plugins.len(),
            host = host.len(),
            "Indexed repository releases"
        );
        if host.is_empty() {
            warn!(
                "No host releases found for {}:{}",
                config.host_group_id, config.host_artifact_id
            );
        }

        Ok(ArtifactIndex { plugins, host })
    }

    fn resolver(&self) -> HistoryResolver {
        HistoryResolver::new(self.content.clone(), self.ignores.clone())
    }
}

#[async_trait]
impl Repository for ArtifactoryRepository {
    async fn plugins(&self) -> Result<PluginMap> {
        let index = self.index().await?;
        Ok(self.resolver().resolve_plugins(index.plugins.iter().cloned()))
    }

    async fn host_releases(&self) -> Result<PluginSeries> {
        let index = self.index().await?;
        Ok(self
            .resolver()
            .resolve_host(&self.config().host_artifact_id, index.host.iter().cloned()))
    }

    fn content(&self) -> Arc<dyn ContentSource> {
        self.content.clone()
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.config().base(), self.config().repository)
    }
}
