//! Artifact coordinates
//!
//! Identity of a single published file in the artifact repository.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a published artifact plus its optional publication time
///
/// Equality and hashing cover the full identity tuple including the
/// classifier. The timestamp is metadata and takes no part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    /// Raw version string, not yet validated
    pub version: String,
    pub packaging: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Publication time in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

impl ArtifactCoordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        packaging: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            packaging: packaging.into(),
            classifier: None,
            timestamp: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Attach a publication timestamp. Zero means "unknown" and is dropped.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = (timestamp != 0).then_some(timestamp);
        self
    }

    /// Authoritative publication time in epoch milliseconds, if known
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// File name as stored in the repository: `artifactId-version[-classifier].packaging`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, classifier, self.packaging
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging),
        }
    }

    /// Repository-relative directory: `group/as/path/artifactId/version`
    pub fn directory(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version
        )
    }

    /// Maven GAV string `group:artifact:version`
    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl PartialEq for ArtifactCoordinates {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.version == other.version
            && self.packaging == other.packaging
            && self.classifier == other.classifier
    }
}

impl Eq for ArtifactCoordinates {}

impl std::hash::Hash for ArtifactCoordinates {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.group_id.hash(state);
        self.artifact_id.hash(state);
        self.version.hash(state);
        self.packaging.hash(state);
        self.classifier.hash(state);
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.group_id, self.artifact_id, self.version, self.packaging
        )?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}
