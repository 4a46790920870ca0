//! Flags shared by the site commands and how they override the config file

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use update_site_core::config::SiteConfig;
use update_site_core::version::VersionNumber;

#[derive(Args, Debug, Default, Clone)]
pub struct SiteArgs {
    /// YAML configuration file; flags override its values
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Only offer plugin releases requiring at most this core version
    #[clap(long)]
    pub cap: Option<VersionNumber>,

    /// Only consider core releases up to this version
    #[clap(long)]
    pub cap_core: Option<VersionNumber>,

    /// Only consider core releases with three version components
    #[clap(long)]
    pub stable_core: bool,

    /// Only include alpha/beta plugin releases
    #[clap(long, conflicts_with = "no_experimental")]
    pub experimental_only: bool,

    /// Exclude alpha/beta plugin releases
    #[clap(long)]
    pub no_experimental: bool,

    /// Allow-list file (`artifactId = versions...` per line)
    #[clap(long)]
    pub allowed_artifacts: Option<PathBuf>,

    /// Keep only the first N plugins
    #[clap(long)]
    pub max_plugins: Option<usize>,

    /// Blacklisted plugins and releases, one per line
    #[clap(long)]
    pub artifact_ignores: Option<PathBuf>,

    /// Artifactory base URL
    #[clap(long)]
    pub repository_url: Option<String>,

    /// Artifactory repository key
    #[clap(long)]
    pub repository_name: Option<String>,

    /// Directory for cached repository responses
    #[clap(long)]
    pub cache_dir: Option<PathBuf>,
}

impl SiteArgs {
    /// Load the config file (if any) and apply flag overrides
    pub fn load(&self) -> Result<SiteConfig> {
        let mut config = match &self.config {
            Some(path) => SiteConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => SiteConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut SiteConfig) {
        if self.cap.is_some() {
            config.plugin_cap = self.cap.clone();
        }
        if self.cap_core.is_some() {
            config.core_cap = self.cap_core.clone();
        }
        config.stable_core |= self.stable_core;
        config.experimental_only |= self.experimental_only;
        config.no_experimental |= self.no_experimental;
        if let Some(path) = &self.allowed_artifacts {
            config.allow_list = Some(path.clone());
        }
        if self.max_plugins.is_some() {
            config.max_plugins = self.max_plugins;
        }
        if let Some(path) = &self.artifact_ignores {
            config.artifact_ignores = Some(path.clone());
        }
        if let Some(url) = &self.repository_url {
            config.artifactory.base_url = url.clone();
        }
        if let Some(name) = &self.repository_name {
            config.artifactory.repository = name.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
    }
}

/// Flags only meaningful when writing and signing a catalog
#[derive(Args, Debug, Default, Clone)]
pub struct OutputArgs {
    /// Output directory for the generated documents
    #[clap(long, short = 'o')]
    pub www_dir: Option<PathBuf>,

    /// Update site id published in the catalog
    #[clap(long)]
    pub id: Option<String>,

    /// Base URL plugin and core download links point to
    #[clap(long)]
    pub download_base_url: Option<String>,

    /// JSON array of security warnings to publish
    #[clap(long)]
    pub warnings: Option<PathBuf>,

    /// PEM private key used to sign the catalog
    #[clap(long)]
    pub key: Option<PathBuf>,

    /// Certificate for the signing key; repeat for intermediates
    #[clap(long = "certificate")]
    pub certificates: Vec<PathBuf>,

    /// Trust anchor the certificate chain is checked against; repeatable
    #[clap(long = "root-certificate")]
    pub root_certificates: Vec<PathBuf>,
}

impl OutputArgs {
    pub fn apply(&self, config: &mut SiteConfig) {
        if let Some(dir) = &self.www_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(id) = &self.id {
            config.catalog.id = id.clone();
        }
        if let Some(url) = &self.download_base_url {
            config.catalog.download_base_url = url.clone();
        }
        if let Some(path) = &self.warnings {
            config.warnings = Some(path.clone());
        }
        if let Some(key) = &self.key {
            config.signing.private_key = Some(key.clone());
        }
        if !self.certificates.is_empty() {
            config.signing.certificates = self.certificates.clone();
        }
        if !self.root_certificates.is_empty() {
            config.signing.root_certificates = self.root_certificates.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[clap(flatten)]
        site: SiteArgs,
        #[clap(flatten)]
        output: OutputArgs,
    }

    #[test]
    fn test_flags_override_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("site.yaml");
        std::fs::write(
            &path,
            "pluginCap: \"2.300\"\nmaxPlugins: 3\nartifactory:\n  repository: releases\n",
        )
        .unwrap();

        let cli = TestCli::parse_from([
            "update-site",
            "--config",
            path.to_str().unwrap(),
            "--cap",
            "2.401.3",
            "--repository-name",
            "incrementals",
            "--key",
            "site.key",
            "--certificate",
            "site.crt",
            "--certificate",
            "intermediate.crt",
        ]);
        let mut config = cli.site.load().unwrap();
        cli.output.apply(&mut config);

        assert_eq!(config.plugin_cap.unwrap().raw(), "2.401.3");
        assert_eq!(config.max_plugins, Some(3));
        assert_eq!(config.artifactory.repository, "incrementals");
        assert_eq!(config.signing.certificates.len(), 2);
        assert_eq!(config.signing.private_key, Some(PathBuf::from("site.key")));
    }

    #[test]
    fn test_maturity_flags_conflict() {
        let result = TestCli::try_parse_from([
            "update-site",
            "--experimental-only",
            "--no-experimental",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_cap_is_rejected() {
        assert!(TestCli::try_parse_from(["update-site", "--cap", "latest"]).is_err());
    }
}
