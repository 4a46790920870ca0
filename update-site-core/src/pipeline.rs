//! One generation run, from repository to signed documents

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::catalog::{load_warnings, CatalogAssembler, UpdateCenter};
use crate::config::SiteConfig;
use crate::repository::{
    ArtifactoryRepository, PluginMap, PluginSeries, Repository, ResponseCache,
};
use crate::signing::Signer;
use crate::tiers::{CompatibilityTiers, TierResolver};

/// Resolved histories of one run
pub struct ResolvedSite {
    pub plugins: PluginMap,
    pub host: PluginSeries,
    pub tiers: CompatibilityTiers,
}

/// The documents produced by one run
pub struct GeneratedSite {
    pub update_center: UpdateCenter,
    pub tiers: CompatibilityTiers,
}

/// The production repository described by `config`
pub fn artifactory_repository(config: &SiteConfig) -> Result<Arc<dyn Repository>> {
    let cache_dir = config.cache_dir()?;
    info!("Using response cache in {}", cache_dir.display());
    let cache = Arc::new(ResponseCache::new(cache_dir)?);
    let repository = ArtifactoryRepository::new(
        config.artifactory.clone().with_credentials_from_env(),
        cache,
    )?
    .with_ignores(config.ignores()?);
    Ok(Arc::new(repository))
}

/// Apply the configured filters to `base` and resolve histories and tiers
pub async fn resolve(
    config: &SiteConfig,
    base: Arc<dyn Repository>,
    tiers: &TierResolver,
) -> Result<ResolvedSite> {
    let repository = config.filtered(base)?;
    info!("Resolving releases from {}", repository.describe());

    let plugins = repository.plugins().await?;
    let host = repository.host_releases().await?;
    info!(
        plugins = plugins.len(),
        host_releases = host.len(),
        "Resolved release histories"
    );

    let tiers = tiers.resolve_plugins(&plugins, &host).await?;
    Ok(ResolvedSite {
        plugins,
        host,
        tiers,
    })
}

/// Resolve, assemble and sign
pub async fn generate(
    config: &SiteConfig,
    base: Arc<dyn Repository>,
    tiers: &TierResolver,
) -> Result<GeneratedSite> {
    // Fail on signing misconfiguration before touching the repository
    let signer = Signer::from_config(&config.signing).context("Invalid signing configuration")?;

    let warnings = match &config.warnings {
        Some(path) => load_warnings(path)?,
        None => Vec::new(),
    };

    let resolved = resolve(config, base, tiers).await?;
    let update_center = CatalogAssembler::new(config.catalog.clone())
        .with_warnings(warnings)
        .assemble(&resolved.plugins, &resolved.host)
        .await?
        .sign(signer)?;

    Ok(GeneratedSite {
        update_center,
        tiers: resolved.tiers,
    })
}
