//! Repository filter chain
//!
//! Each [`RepositoryFilter`] applies one policy to the histories produced by
//! everything before it. A [`FilteredRepository`] wraps a base repository
//! with an ordered list of filters and itself implements [`Repository`], so
//! downstream code never needs to know whether it is looking at a filtered
//! view. Filters are read-only: they run on every call and cache nothing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ContentSource, PluginMap, PluginSeries, Repository};
use crate::version::VersionNumber;

/// One stage of the filter chain
#[async_trait]
pub trait RepositoryFilter: Send + Sync {
    /// Filter identifier for logging/debugging
    fn name(&self) -> &'static str;

    async fn filter_plugins(&self, plugins: PluginMap) -> Result<PluginMap> {
        Ok(plugins)
    }

    async fn filter_host(&self, host: PluginSeries) -> Result<PluginSeries> {
        Ok(host)
    }
}

/// A base repository viewed through an ordered list of filters
///
/// Filters run in insertion order; each observes the output of the ones
/// added before it. Plugins left without releases are removed after every
/// stage.
pub struct FilteredRepository {
    base: Arc<dyn Repository>,
    filters: Vec<Box<dyn RepositoryFilter>>,
}

impl FilteredRepository {
    pub fn new(base: Arc<dyn Repository>) -> Self {
        Self {
            base,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl RepositoryFilter + 'static) -> Self {
        self.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn RepositoryFilter>) {
        debug!("Adding repository filter '{}'", filter.name());
        self.filters.push(filter);
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

#[async_trait]
impl Repository for FilteredRepository {
    async fn plugins(&self) -> Result<PluginMap> {
        let mut plugins = self.base.plugins().await?;
        for filter in &self.filters {
            plugins = filter
                .filter_plugins(plugins)
                .await
                .with_context(|| format!("Repository filter '{}' failed", filter.name()))?;
            plugins.retain(|_, series| !series.is_empty());
        }
        Ok(plugins)
    }

    async fn host_releases(&self) -> Result<PluginSeries> {
        let mut host = self.base.host_releases().await?;
        for filter in &self.filters {
            host = filter
                .filter_host(host)
                .await
                .with_context(|| format!("Repository filter '{}' failed", filter.name()))?;
        }
        Ok(host)
    }

    fn content(&self) -> Arc<dyn ContentSource> {
        self.base.content()
    }

    fn describe(&self) -> String {
        format!(
            "{} filtered by [{}]",
            self.base.describe(),
            self.filter_names().join(", ")
        )
    }
}

/// Versions allowed for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedVersions {
    Any,
    Only(BTreeSet<String>),
}

impl AllowedVersions {
    fn allows(&self, version: &str) -> bool {
        match self {
            AllowedVersions::Any => true,
            AllowedVersions::Only(versions) => versions.contains(version),
        }
    }
}

/// Keeps only explicitly allowed plugins and versions
///
/// The host series is only narrowed when the allow-list names the host
/// artifact id.
#[derive(Debug, Clone, Default)]
pub struct AllowListFilter {
    allowed: BTreeMap<String, AllowedVersions>,
}

impl AllowListFilter {
    /// Parse `artifactId = 1.0 1.1` / `artifactId = *` lines
    pub fn parse(content: &str) -> Result<Self> {
        let mut allowed = BTreeMap::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (artifact, versions) = line
                .split_once(['=', ':'])
                .with_context(|| format!("Malformed allow-list line {}: '{}'", number + 1, line))?;
            let versions: BTreeSet<String> =
                versions.split_whitespace().map(str::to_string).collect();
            let entry = if versions.contains("*") {
                AllowedVersions::Any
            } else {
                AllowedVersions::Only(versions)
            };
            allowed.insert(artifact.trim().to_string(), entry);
        }
        Ok(Self { allowed })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read allow-list: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse allow-list: {}", path.display()))
    }

    fn narrow(&self, series: &mut PluginSeries, allowed: &AllowedVersions) {
        series.retain(|release| {
            let keep = allowed.allows(&release.coordinates().version);
            if !keep {
                debug!("Allow-list excludes {}", release);
            }
            keep
        });
    }
}

#[async_trait]
impl RepositoryFilter for AllowListFilter {
    fn name(&self) -> &'static str {
        "allow-list"
    }

    async fn filter_plugins(&self, plugins: PluginMap) -> Result<PluginMap> {
        Ok(plugins
            .into_iter()
            .filter_map(|(name, mut series)| {
                let allowed = self.allowed.get(&name)?;
                self.narrow(&mut series, allowed);
                Some((name, series))
            })
            .collect())
    }

    async fn filter_host(&self, mut host: PluginSeries) -> Result<PluginSeries> {
        if let Some(allowed) = self.allowed.get(host.name()) {
            self.narrow(&mut host, allowed);
        }
        Ok(host)
    }
}

/// Keeps the first `max` plugins by name; used for small test catalogs
#[derive(Debug, Clone)]
pub struct TruncateFilter {
    max: usize,
}

impl TruncateFilter {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

#[async_trait]
impl RepositoryFilter for TruncateFilter {
    fn name(&self) -> &'static str {
        "truncate"
    }

    async fn filter_plugins(&self, plugins: PluginMap) -> Result<PluginMap> {
        Ok(plugins.into_iter().take(self.max).collect())
    }
}

/// Which side of the alpha/beta divide to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maturity {
    ExperimentalOnly,
    NoExperimental,
}

/// Keeps or rejects alpha/beta releases
#[derive(Debug, Clone)]
pub struct MaturityFilter {
    maturity: Maturity,
}

impl MaturityFilter {
    pub fn new(maturity: Maturity) -> Self {
        Self { maturity }
    }

    /// Plain substring match on the version string
    pub fn is_experimental(version: &str) -> bool {
        version.contains("alpha") || version.contains("beta")
    }
}

#[async_trait]
impl RepositoryFilter for MaturityFilter {
    fn name(&self) -> &'static str {
        match self.maturity {
            Maturity::ExperimentalOnly => "experimental-only",
            Maturity::NoExperimental => "no-experimental",
        }
    }

    async fn filter_plugins(&self, mut plugins: PluginMap) -> Result<PluginMap> {
        let want_experimental = self.maturity == Maturity::ExperimentalOnly;
        for series in plugins.values_mut() {
            series.retain(|release| {
                Self::is_experimental(&release.coordinates().version) == want_experimental
            });
        }
        Ok(plugins)
    }
}

/// Keeps only host releases with at least three numeric components
#[derive(Debug, Clone, Default)]
pub struct StableCoreFilter;

#[async_trait]
impl RepositoryFilter for StableCoreFilter {
    fn name(&self) -> &'static str {
        "stable-core"
    }

    async fn filter_host(&self, mut host: PluginSeries) -> Result<PluginSeries> {
        host.retain(|release| release.version().numeric_components().len() >= 3);
        Ok(host)
    }
}

/// Number of releases kept per plugin under a plugin cap
pub const CAPPED_RELEASES_PER_PLUGIN: usize = 2;

/// Caps plugins by their declared minimum host version and the host series by version
#[derive(Debug, Clone, Default)]
pub struct VersionCapFilter {
    plugin_cap: Option<VersionNumber>,
    core_cap: Option<VersionNumber>,
}

impl VersionCapFilter {
    pub fn new(plugin_cap: Option<VersionNumber>, core_cap: Option<VersionNumber>) -> Self {
        Self {
            plugin_cap,
            core_cap,
        }
    }
}

#[async_trait]
impl RepositoryFilter for VersionCapFilter {
    fn name(&self) -> &'static str {
        "version-cap"
    }

    async fn filter_plugins(&self, mut plugins: PluginMap) -> Result<PluginMap> {
        let Some(cap) = &self.plugin_cap else {
            return Ok(plugins);
        };

        for series in plugins.values_mut() {
            let mut kept = BTreeSet::new();
            for release in series.releases() {
                if kept.len() == CAPPED_RELEASES_PER_PLUGIN {
                    break;
                }
                match release.required_core().await {
                    Ok(Some(required)) if required > *cap => {
                        debug!("{} requires {} > cap {}", release, required, cap);
                    }
                    Ok(_) => {
                        kept.insert(release.version().clone());
                    }
                    Err(e) => {
                        warn!("Dropping {}: {:#}", release, e);
                    }
                }
            }
            series.retain(|release| kept.contains(release.version()));
        }

        info!("Capped plugins to releases requiring at most {}", cap);
        Ok(plugins)
    }

    async fn filter_host(&self, mut host: PluginSeries) -> Result<PluginSeries> {
        if let Some(cap) = &self.core_cap {
            host.retain(|release| release.version() <= cap);
        }
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::ArtifactCoordinates;
    use crate::manifest::Manifest;
    use crate::repository::MemoryRepository;
    use pretty_assertions::assert_eq;

    fn fixture() -> Arc<dyn Repository> {
        let mut repository = MemoryRepository::new("jenkins-war");
        let plugins = [
            ("alpha-plugin", "1.0", "2.200"),
            ("alpha-plugin", "1.1-beta-1", "2.250"),
            ("alpha-plugin", "1.1", "2.300"),
            ("alpha-plugin", "1.2", "2.400"),
            ("beta-plugin", "2.0", "2.100"),
            ("beta-plugin", "3.0-alpha-2", "2.380"),
            ("gamma-plugin", "0.9", "2.390"),
        ];
        for (name, version, core) in plugins {
            repository.add_plugin(
                ArtifactCoordinates::new("org.example", name, version, "hpi"),
                Manifest::from_attributes([("Jenkins-Version", core)]),
            );
        }
        for core in ["2.200", "2.300", "2.303.1", "2.400", "2.401.2"] {
            repository.add_host(ArtifactCoordinates::new(
                "org.jenkins-ci.main",
                "jenkins-war",
                core,
                "war",
            ));
        }
        Arc::new(repository)
    }

    async fn versions(repository: &dyn Repository) -> BTreeMap<String, Vec<String>> {
        repository
            .plugins()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, series)| {
                let versions = series
                    .releases()
                    .map(|r| r.coordinates().version.clone())
                    .collect();
                (name, versions)
            })
            .collect()
    }

    async fn host_versions(repository: &dyn Repository) -> Vec<String> {
        repository
            .host_releases()
            .await
            .unwrap()
            .releases()
            .map(|r| r.coordinates().version.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_allow_list() {
        let allow = AllowListFilter::parse(
            "# pinned\nalpha-plugin = 1.0 1.1\ngamma-plugin = *\nmissing-plugin = 1.0\n",
        )
        .unwrap();
        let repository = FilteredRepository::new(fixture()).with_filter(allow);

        let result = versions(&repository).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result["alpha-plugin"], vec!["1.1", "1.0"]);
        assert_eq!(result["gamma-plugin"], vec!["0.9"]);
        assert_eq!(host_versions(&repository).await.len(), 5);
    }

    #[tokio::test]
    async fn test_allow_list_is_idempotent() {
        let allow = AllowListFilter::parse("alpha-plugin = 1.0 1.2\nbeta-plugin = *").unwrap();
        let once = FilteredRepository::new(fixture()).with_filter(allow.clone());
        let twice = FilteredRepository::new(fixture())
            .with_filter(allow.clone())
            .with_filter(allow);

        assert_eq!(versions(&once).await, versions(&twice).await);
    }

    #[tokio::test]
    async fn test_allow_list_narrows_named_host() {
        let allow = AllowListFilter::parse("jenkins-war = 2.400\nalpha-plugin = *").unwrap();
        let repository = FilteredRepository::new(fixture()).with_filter(allow);
        assert_eq!(host_versions(&repository).await, vec!["2.400"]);
    }

    #[test]
    fn test_allow_list_rejects_malformed_lines() {
        assert!(AllowListFilter::parse("alpha-plugin 1.0").is_err());
    }

    #[tokio::test]
    async fn test_truncate() {
        let repository = FilteredRepository::new(fixture()).with_filter(TruncateFilter::new(2));
        let result = versions(&repository).await;
        assert_eq!(
            result.keys().cloned().collect::<Vec<_>>(),
            vec!["alpha-plugin", "beta-plugin"]
        );
    }

    #[tokio::test]
    async fn test_experimental_only_drops_empty_plugins() {
        let repository = FilteredRepository::new(fixture())
            .with_filter(MaturityFilter::new(Maturity::ExperimentalOnly));
        let result = versions(&repository).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result["alpha-plugin"], vec!["1.1-beta-1"]);
        assert_eq!(result["beta-plugin"], vec!["3.0-alpha-2"]);
    }

    #[test]
    fn test_experimental_match_is_case_sensitive() {
        assert!(MaturityFilter::is_experimental("1.0-beta-1"));
        assert!(MaturityFilter::is_experimental("2.0alpha3"));
        assert!(!MaturityFilter::is_experimental("1.0-BETA-1"));
        assert!(!MaturityFilter::is_experimental("1.0-Alpha"));
        assert!(!MaturityFilter::is_experimental("1.0.1"));
    }

    #[tokio::test]
    async fn test_no_experimental() {
        let repository = FilteredRepository::new(fixture())
            .with_filter(MaturityFilter::new(Maturity::NoExperimental));
        let result = versions(&repository).await;
        assert_eq!(result["alpha-plugin"], vec!["1.2", "1.1", "1.0"]);
        assert_eq!(result["beta-plugin"], vec!["2.0"]);
    }

    #[tokio::test]
    async fn test_stable_core() {
        let repository = FilteredRepository::new(fixture()).with_filter(StableCoreFilter);
        assert_eq!(host_versions(&repository).await, vec!["2.401.2", "2.303.1"]);
        assert_eq!(versions(&repository).await.len(), 3);
    }

    #[tokio::test]
    async fn test_version_cap() {
        let cap = VersionNumber::parse("2.300").unwrap();
        let filter = VersionCapFilter::new(Some(cap.clone()), Some(cap.clone()));
        let repository = FilteredRepository::new(fixture()).with_filter(filter);

        let result = versions(&repository).await;
        assert_eq!(result["alpha-plugin"], vec!["1.1", "1.1-beta-1"]);
        assert_eq!(result["beta-plugin"], vec!["2.0"]);
        assert!(!result.contains_key("gamma-plugin"));
        assert_eq!(host_versions(&repository).await, vec!["2.300", "2.200"]);
    }

    #[tokio::test]
    async fn test_version_cap_is_monotonic() {
        let uncapped = fixture().plugins().await.unwrap();

        for cap in ["2.100", "2.250", "2.300", "2.390", "2.500"] {
            let cap = VersionNumber::parse(cap).unwrap();
            let repository = FilteredRepository::new(fixture())
                .with_filter(VersionCapFilter::new(Some(cap.clone()), None));

            for (name, series) in repository.plugins().await.unwrap() {
                for release in series.releases() {
                    assert!(uncapped[&name].get(release.version()).is_some());
                    let required = release.required_core().await.unwrap().unwrap();
                    assert!(required <= cap, "{release} requires {required} > {cap}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_filters_compose_in_order() {
        // Truncating first keeps alpha/beta before the maturity filter drops releases
        let repository = FilteredRepository::new(fixture())
            .with_filter(TruncateFilter::new(1))
            .with_filter(MaturityFilter::new(Maturity::ExperimentalOnly));
        assert_eq!(
            versions(&repository).await.keys().cloned().collect::<Vec<_>>(),
            vec!["alpha-plugin"]
        );

        let repository = FilteredRepository::new(fixture())
            .with_filter(MaturityFilter::new(Maturity::NoExperimental))
            .with_filter(TruncateFilter::new(1));
        assert_eq!(repository.filter_names(), vec!["no-experimental", "truncate"]);
    }
}
