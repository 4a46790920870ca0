//! Per-plugin release histories and duplicate resolution
//!
//! Repositories occasionally contain re-uploads of one logical release
//! under a cosmetically different version string (`1.0` vs `1.0.0`).
//! [`PluginSeries::add`] decides deterministically which one survives,
//! and prefers dropping both over an arbitrary pick.

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Checksums, ContentSource, PluginMap, Release};
use crate::coordinates::ArtifactCoordinates;
use crate::version::VersionNumber;

/// Outcome of offering a release to a [`PluginSeries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// No release existed for this version
    Inserted,
    /// The existing release was replaced by the incoming one
    Replaced { previous: String },
    /// The existing release was kept, the incoming one discarded
    KeptExisting { existing: String },
    /// Neither release could be established as canonical; both are gone
    DroppedBoth { existing: String },
}

/// The deduplicated, version-ordered release history of one plugin
#[derive(Debug, Clone)]
pub struct PluginSeries {
    name: String,
    releases: BTreeMap<VersionNumber, Release>,
}

impl PluginSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            releases: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Releases, newest first
    pub fn releases(&self) -> impl DoubleEndedIterator<Item = &Release> + ExactSizeIterator {
        self.releases.values().rev()
    }

    pub fn latest(&self) -> Option<&Release> {
        self.releases.values().next_back()
    }

    pub fn get(&self, version: &VersionNumber) -> Option<&Release> {
        self.releases.get(version)
    }

    /// Keep only releases matching the predicate
    pub fn retain(&mut self, mut keep: impl FnMut(&Release) -> bool) {
        self.releases.retain(|_, release| keep(release));
    }

    /// Offer a release to the history
    ///
    /// A release whose raw version string differs from an existing release
    /// of equal version is a non-canonical duplicate:
    /// - neither has a timestamp: both are discarded
    /// - only one has a timestamp: that one is kept
    /// - both have timestamps: the older one is kept; on equal timestamps
    ///   the shorter (then lexically smaller) version string is kept
    ///
    /// A release with the exact same version string as an existing one
    /// (e.g. published under another group) does not displace it.
    pub fn add(&mut self, release: Release) -> Insertion {
        let Some(existing) = self.releases.get(release.version()) else {
            self.releases.insert(release.version().clone(), release);
            return Insertion::Inserted;
        };

        let existing_raw = existing.coordinates().version.clone();
        let incoming_raw = release.coordinates().version.clone();

        if existing_raw == incoming_raw {
            debug!(
                plugin = %self.name,
                existing = %existing.coordinates(),
                incoming = %release.coordinates(),
                "Ignoring duplicate release with identical version string"
            );
            return Insertion::KeptExisting {
                existing: existing_raw,
            };
        }

        let replace = match (existing.timestamp(), release.timestamp()) {
            (None, None) => {
                warn!(
                    plugin = %self.name,
                    existing = %existing_raw,
                    incoming = %incoming_raw,
                    "Non-canonical duplicate versions without timestamps; dropping both"
                );
                self.releases.remove(release.version());
                return Insertion::DroppedBoth {
                    existing: existing_raw,
                };
            }
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(existing_ts), Some(incoming_ts)) => match incoming_ts.cmp(&existing_ts) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => {
                    (incoming_raw.len(), incoming_raw.as_str())
                        < (existing_raw.len(), existing_raw.as_str())
                }
            },
        };

        if replace {
            info!(
                plugin = %self.name,
                kept = %incoming_raw,
                discarded = %existing_raw,
                "Resolved non-canonical duplicate version"
            );
            // Re-key so the map key carries the surviving raw version
            self.releases.remove(release.version());
            self.releases.insert(release.version().clone(), release);
            Insertion::Replaced {
                previous: existing_raw,
            }
        } else {
            info!(
                plugin = %self.name,
                kept = %existing_raw,
                discarded = %incoming_raw,
                "Resolved non-canonical duplicate version"
            );
            Insertion::KeptExisting {
                existing: existing_raw,
            }
        }
    }
}

/// Plugins and individual releases excluded from every history
///
/// Each entry is either an artifact id (the whole plugin) or
/// `artifactId-version` (a single release).
#[derive(Debug, Clone, Default)]
pub struct ArtifactIgnores {
    entries: HashSet<String>,
}

impl ArtifactIgnores {
    pub fn parse(content: &str) -> Self {
        Self {
            entries: content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact ignores: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn is_ignored(&self, coordinates: &ArtifactCoordinates) -> bool {
        self.entries.contains(&coordinates.artifact_id)
            || self.entries.contains(&format!(
                "{}-{}",
                coordinates.artifact_id, coordinates.version
            ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A release as discovered in the repository, before validation
#[derive(Debug, Clone)]
pub struct ReleaseCandidate {
    pub coordinates: ArtifactCoordinates,
    pub checksums: Option<Checksums>,
}

impl From<ArtifactCoordinates> for ReleaseCandidate {
    fn from(coordinates: ArtifactCoordinates) -> Self {
        Self {
            coordinates,
            checksums: None,
        }
    }
}

/// Builds release histories from candidates in discovery order
pub struct HistoryResolver {
    ignores: ArtifactIgnores,
    source: Arc<dyn ContentSource>,
}

impl HistoryResolver {
    pub fn new(source: Arc<dyn ContentSource>, ignores: ArtifactIgnores) -> Self {
        Self { ignores, source }
    }

    fn release(&self, candidate: ReleaseCandidate, host: bool) -> Option<Release> {
        let ReleaseCandidate {
            coordinates,
            checksums,
        } = candidate;

        if self.ignores.is_ignored(&coordinates) {
            debug!("Ignoring blacklisted artifact {}", coordinates);
            return None;
        }

        let coordinates_display = coordinates.to_string();
        let release = if host {
            Release::host(coordinates, self.source.clone())
        } else {
            Release::plugin(coordinates, self.source.clone())
        };

        match release {
            Ok(release) => Some(match checksums {
                Some(checksums) => release.with_checksums(checksums),
                None => release,
            }),
            Err(e) => {
                warn!("Discarding {}: {}", coordinates_display, e);
                None
            }
        }
    }

    /// Group plugin candidates by artifact id into deduplicated histories
    pub fn resolve_plugins<I>(&self, candidates: I) -> PluginMap
    where
        I: IntoIterator<Item = ReleaseCandidate>,
    {
        let mut plugins = PluginMap::new();
        for candidate in candidates {
            let Some(release) = self.release(candidate, false) else {
                continue;
            };
            let name = release.coordinates().artifact_id.clone();
            plugins
                .entry(name.clone())
                .or_insert_with(|| PluginSeries::new(name))
                .add(release);
        }
        plugins.retain(|_, series| !series.is_empty());
        plugins
    }

    /// Build the host application history
    pub fn resolve_host<I>(&self, name: &str, candidates: I) -> PluginSeries
    where
        I: IntoIterator<Item = ReleaseCandidate>,
    {
        let mut series = PluginSeries::new(name);
        for candidate in candidates {
            if let Some(release) = self.release(candidate, true) {
                series.add(release);
            }
        }
        series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::MemoryContent;

    fn resolver() -> HistoryResolver {
        HistoryResolver::new(Arc::new(MemoryContent::default()), ArtifactIgnores::default())
    }

    fn release(group: &str, version: &str, timestamp: i64) -> Release {
        let coordinates =
            ArtifactCoordinates::new(group, "foo", version, "hpi").with_timestamp(timestamp);
        Release::plugin(coordinates, Arc::new(MemoryContent::default())).unwrap()
    }

    fn survivors(series: &PluginSeries) -> Vec<String> {
        series.releases().map(|r| r.coordinates().to_string()).collect()
    }

    #[test]
    fn test_no_timestamp_duplicates_are_dropped() {
        let mut series = PluginSeries::new("foo");
        assert_eq!(series.add(release("g", "1.0", 0)), Insertion::Inserted);
        assert_eq!(
            series.add(release("g", "1.0.0", 0)),
            Insertion::DroppedBoth {
                existing: "1.0".to_string()
            }
        );
        assert!(series.is_empty());
    }

    #[test]
    fn test_older_timestamp_wins() {
        let mut series = PluginSeries::new("foo");
        series.add(release("g", "1.0", 4));
        series.add(release("g", "1.0.0", 3));
        series.add(release("g", "1.0.0.0", 2));
        series.add(release("other-group", "1.0", 1));

        assert_eq!(series.len(), 1);
        let survivor = series.latest().unwrap();
        assert_eq!(survivor.timestamp(), Some(1));
        assert_eq!(survivor.coordinates().group_id, "other-group");
    }

    #[test]
    fn test_timestamped_supersedes_untimestamped() {
        let mut series = PluginSeries::new("foo");
        series.add(release("the-group", "1.0", 0));
        series.add(release("the-group", "1.0.0", 42));
        series.add(release("the-group", "1.0.0.0", 42));
        series.add(release("the-other-group", "1.0", 0));

        assert_eq!(survivors(&series), vec!["the-group:foo:1.0.0:hpi"]);
    }

    #[test]
    fn test_service_pack_does_not_hide_duplicates() {
        let mut series = PluginSeries::new("foo");
        assert_eq!(series.add(release("g", "1.0-sp", 0)), Insertion::Inserted);
        assert_eq!(series.add(release("g", "1.0.0", 0)), Insertion::Inserted);
        assert_eq!(
            series.add(release("g", "1.0", 0)),
            Insertion::DroppedBoth {
                existing: "1.0.0".to_string()
            }
        );
        assert_eq!(survivors(&series), vec!["g:foo:1.0-sp:hpi"]);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let pairs = [
            (("1.0", 0), ("1.0.0", 0)),
            (("1.0", 7), ("1.0.0", 7)),
            (("1.0", 7), ("1.0.0", 3)),
            (("1.0", 0), ("1.0.0", 3)),
        ];
        for ((a, ta), (b, tb)) in pairs {
            let mut forward = PluginSeries::new("foo");
            forward.add(release("g", a, ta));
            forward.add(release("g", b, tb));

            let mut backward = PluginSeries::new("foo");
            backward.add(release("g", b, tb));
            backward.add(release("g", a, ta));

            assert_eq!(survivors(&forward), survivors(&backward), "{a}/{b}");
        }
    }

    #[test]
    fn test_identical_version_string_keeps_first() {
        let mut series = PluginSeries::new("foo");
        series.add(release("first", "2.0", 10));
        let outcome = series.add(release("second", "2.0", 1));
        assert!(matches!(outcome, Insertion::KeptExisting { .. }));
        assert_eq!(series.latest().unwrap().coordinates().group_id, "first");
    }

    #[test]
    fn test_releases_are_newest_first() {
        let mut series = PluginSeries::new("foo");
        for v in ["1.2", "1.10", "1.9", "2.0-beta-1"] {
            series.add(release("g", v, 0));
        }
        let versions: Vec<_> = series
            .releases()
            .map(|r| r.coordinates().version.clone())
            .collect();
        assert_eq!(versions, vec!["2.0-beta-1", "1.10", "1.9", "1.2"]);
    }

    #[test]
    fn test_resolver_groups_and_discards_invalid() {
        let candidates = vec![
            ArtifactCoordinates::new("g", "foo", "1.0", "hpi"),
            ArtifactCoordinates::new("g", "bar", "not-a-version", "hpi"),
            ArtifactCoordinates::new("g", "bar", "", "hpi"),
            ArtifactCoordinates::new("g", "foo", "1.1", "hpi"),
        ];
        let plugins = resolver().resolve_plugins(candidates.into_iter().map(Into::into));

        assert_eq!(plugins.keys().collect::<Vec<_>>(), vec!["foo"]);
        assert_eq!(plugins["foo"].len(), 2);
    }

    #[test]
    fn test_ignores_short_circuit() {
        let ignores = ArtifactIgnores::parse("# comment\nbar\nfoo-1.1\n\n");
        assert_eq!(ignores.len(), 2);

        let resolver = HistoryResolver::new(Arc::new(MemoryContent::default()), ignores);
        let candidates = vec![
            ArtifactCoordinates::new("g", "foo", "1.0", "hpi"),
            ArtifactCoordinates::new("g", "foo", "1.1", "hpi"),
            ArtifactCoordinates::new("g", "bar", "1.0", "hpi"),
        ];
        let plugins = resolver.resolve_plugins(candidates.into_iter().map(Into::into));
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins["foo"].latest().unwrap().version().raw(), "1.0");
    }

    #[test]
    fn test_resolve_host() {
        let candidates = vec![
            ArtifactCoordinates::new("org.jenkins-ci.main", "jenkins-war", "2.303.1", "war"),
            ArtifactCoordinates::new("org.jenkins-ci.main", "jenkins-war", "2.304", "war"),
        ];
        let host = resolver().resolve_host("jenkins-war", candidates.into_iter().map(Into::into));
        assert_eq!(host.len(), 2);
        assert!(host.releases().all(Release::is_host));
        assert_eq!(host.latest().unwrap().version().raw(), "2.304");
    }
}
