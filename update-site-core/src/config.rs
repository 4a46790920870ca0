//! Site generation configuration
//!
//! Loaded from an optional YAML file; the CLI overrides individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::CatalogSettings;
use crate::repository::filter::{
    AllowListFilter, Maturity, MaturityFilter, StableCoreFilter, TruncateFilter, VersionCapFilter,
};
use crate::repository::{
    ArtifactIgnores, ArtifactoryConfig, FilteredRepository, Repository, RepositoryFilter,
};
use crate::signing::SigningConfig;
use crate::version::VersionNumber;

pub const DEFAULT_OUTPUT_DIR: &str = "www";

/// Everything a generation run can be configured with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    /// Only offer plugin releases requiring at most this host version
    pub plugin_cap: Option<VersionNumber>,

    /// Only consider host releases up to this version
    pub core_cap: Option<VersionNumber>,

    /// Only consider host releases with three numeric components
    pub stable_core: bool,

    pub experimental_only: bool,

    pub no_experimental: bool,

    /// `artifactId = versions...` allow-list file
    pub allow_list: Option<PathBuf>,

    /// Keep only this many plugins (test catalogs)
    pub max_plugins: Option<usize>,

    /// Blacklisted plugins and releases
    pub artifact_ignores: Option<PathBuf>,

    /// JSON array of security warnings to publish
    pub warnings: Option<PathBuf>,

    pub cache_dir: Option<PathBuf>,

    pub output_dir: Option<PathBuf>,

    pub artifactory: ArtifactoryConfig,

    pub catalog: CatalogSettings,

    pub signing: SigningConfig,
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: SiteConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject combinations that cannot be honoured
    pub fn validate(&self) -> Result<()> {
        if self.experimental_only && self.no_experimental {
            anyhow::bail!("experimentalOnly and noExperimental are mutually exclusive");
        }
        if self.max_plugins == Some(0) {
            anyhow::bail!("maxPlugins must be at least 1");
        }
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Configured cache directory, or the platform default
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }

    pub fn ignores(&self) -> Result<ArtifactIgnores> {
        match &self.artifact_ignores {
            Some(path) => ArtifactIgnores::load(path),
            None => Ok(ArtifactIgnores::default()),
        }
    }

    /// Filter stages in application order
    pub fn filters(&self) -> Result<Vec<Box<dyn RepositoryFilter>>> {
        let mut filters: Vec<Box<dyn RepositoryFilter>> = Vec::new();

        if let Some(path) = &self.allow_list {
            filters.push(Box::new(AllowListFilter::load(path)?));
        }
        if let Some(max) = self.max_plugins {
            filters.push(Box::new(TruncateFilter::new(max)));
        }
        if self.experimental_only {
            filters.push(Box::new(MaturityFilter::new(Maturity::ExperimentalOnly)));
        }
        if self.no_experimental {
            filters.push(Box::new(MaturityFilter::new(Maturity::NoExperimental)));
        }
        if self.stable_core {
            filters.push(Box::new(StableCoreFilter));
        }
        if self.plugin_cap.is_some() || self.core_cap.is_some() {
            filters.push(Box::new(VersionCapFilter::new(
                self.plugin_cap.clone(),
                self.core_cap.clone(),
            )));
        }

        Ok(filters)
    }

    /// Wrap `base` in the configured filter chain
    pub fn filtered(&self, base: Arc<dyn Repository>) -> Result<FilteredRepository> {
        self.validate()?;
        let mut repository = FilteredRepository::new(base);
        for filter in self.filters()? {
            repository.push(filter);
        }
        Ok(repository)
    }
}

/// Platform cache directory for repository responses
pub fn default_cache_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("io", "jenkins", "update-site")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|d| d.join("update-site")))
        .context("Could not determine cache directory")
}
