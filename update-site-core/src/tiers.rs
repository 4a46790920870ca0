//! Tiered compatibility resolution
//!
//! Derives the smallest sets of host versions (the weekly and stable tiers)
//! for which separate update sites must be generated so that every declared
//! plugin requirement can be served by a host of the matching tier.
//!
//! Declared requirements are walked newest first. Each tier accepts host
//! versions until it meets one released more than [`STABLE_RECENCY_DAYS`]
//! days ago; that release is still included, then the tier closes.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::repository::{PluginMap, PluginSeries, Release};
use crate::version::VersionNumber;

/// Age after which a host release no longer opens new tier entries
pub const STABLE_RECENCY_DAYS: i64 = 400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    /// A three-component host version does not have the `major.minor.patch` shape
    #[error("Stable host version '{0}' does not match major.minor.patch")]
    UnexpectedStableVersion(String),
}

/// Host versions to generate update sites for, each list newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityTiers {
    pub stable_cores: Vec<VersionNumber>,
    pub weekly_cores: Vec<VersionNumber>,
}

impl CompatibilityTiers {
    /// Whether some tier version is at least `required`
    pub fn satisfies(&self, required: &VersionNumber) -> bool {
        self.stable_cores
            .iter()
            .chain(&self.weekly_cores)
            .any(|core| core >= required)
    }
}

fn stable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("valid stable-version pattern")
    })
}

/// The weekly release numbered right after a stable baseline: `major.(minor+1)`
pub fn weekly_after_stable(stable: &VersionNumber) -> Result<VersionNumber, TierError> {
    let error = || TierError::UnexpectedStableVersion(stable.raw().to_string());
    let captures = stable_pattern().captures(stable.raw()).ok_or_else(error)?;
    let major: u64 = captures[1].parse().map_err(|_| error())?;
    let minor: u64 = captures[2].parse().map_err(|_| error())?;
    let next = minor.checked_add(1).ok_or_else(error)?;
    VersionNumber::parse(&format!("{major}.{next}")).map_err(|_| error())
}

/// Every distinct host version declared as a requirement by any release
///
/// Releases whose manifest cannot be read are logged and skipped.
pub async fn declared_required_cores(plugins: &PluginMap) -> BTreeSet<VersionNumber> {
    let mut cores = BTreeSet::new();
    for series in plugins.values() {
        for release in series.releases() {
            match release.required_core().await {
                Ok(Some(core)) => {
                    cores.insert(core);
                }
                Ok(None) => debug!("{} declares no required core", release),
                Err(e) => warn!("Ignoring requirement of {}: {:#}", release, e),
            }
        }
    }
    cores
}

#[derive(Default)]
struct Tier {
    versions: BTreeSet<VersionNumber>,
    closed: bool,
}

impl Tier {
    fn add(&mut self, version: VersionNumber) {
        if !self.closed {
            self.versions.insert(version);
        }
    }

    fn into_descending(self) -> Vec<VersionNumber> {
        self.versions.into_iter().rev().collect()
    }
}

/// Computes [`CompatibilityTiers`] relative to a fixed point in time
#[derive(Debug, Clone)]
pub struct TierResolver {
    now: DateTime<Utc>,
    recency: Duration,
}

impl Default for TierResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TierResolver {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Resolve as if the current time were `now`
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            recency: Duration::days(STABLE_RECENCY_DAYS),
        }
    }

    /// Releases without a publication date count as recent
    fn is_too_old(&self, release: &Release) -> bool {
        release
            .release_date()
            .is_some_and(|date| date < self.now - self.recency)
    }

    pub fn resolve(
        &self,
        required_cores: &BTreeSet<VersionNumber>,
        host: &PluginSeries,
    ) -> Result<CompatibilityTiers, TierError> {
        let stable_hosts: Vec<&VersionNumber> = host
            .releases()
            .rev()
            .map(Release::version)
            .filter(|v| v.is_stable())
            .collect();

        let mut stable = Tier::default();
        let mut weekly = Tier::default();

        for required in required_cores.iter().rev() {
            if stable.closed && weekly.closed {
                break;
            }
            let Some(release) = host.get(required) else {
                warn!("No host release matches required core {}", required);
                continue;
            };
            let version = release.version().clone();
            let too_old = self.is_too_old(release);

            if version.is_stable() {
                if stable.closed {
                    continue;
                }
                weekly.add(weekly_after_stable(&version)?);
                stable.add(version);
                stable.closed = too_old;
            } else {
                if weekly.closed {
                    continue;
                }
                if let Some(next_stable) = stable_hosts.iter().find(|s| ***s > version) {
                    stable.add((*next_stable).clone());
                }
                weekly.add(version);
                weekly.closed = too_old;
            }
        }

        let tiers = CompatibilityTiers {
            stable_cores: stable.into_descending(),
            weekly_cores: weekly.into_descending(),
        };
        info!(
            stable = tiers.stable_cores.len(),
            weekly = tiers.weekly_cores.len(),
            "Computed compatibility tiers"
        );
        Ok(tiers)
    }

    /// Collect declared requirements from `plugins` and resolve against `host`
    pub async fn resolve_plugins(
        &self,
        plugins: &PluginMap,
        host: &PluginSeries,
    ) -> Result<CompatibilityTiers, TierError> {
        let required = declared_required_cores(plugins).await;
        debug!("{} distinct required cores declared", required.len());
        self.resolve(&required, host)
    }
}
