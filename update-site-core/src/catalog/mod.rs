//! Update site catalog documents
//!
//! The catalog is the published view of the resolved repository: one
//! descriptor per plugin (its newest usable release), one for the host
//! application, operator-supplied security warnings and an optional
//! signature over the canonical JSON form of everything else.
//!
//! # Outputs
//!
//! ```text
//! <output>/update-center.json         ← JSONP, updateCenter.post(...);
//! <output>/update-center.actual.json  ← the same document as plain JSON
//! <output>/tiers.json                 ← stableCores / weeklyCores
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::manifest::{Dependency, Developer};
use crate::signing::{SignatureBlock, Signer};

mod assembler;
mod output;

pub use assembler::{load_warnings, CatalogAssembler};
pub use output::{
    jsonp, CatalogWriter, ACTUAL_JSON_FILE, TIERS_JSON_FILE, UPDATE_CENTER_JSON_FILE,
};

/// Format version of the update center document
pub const UPDATE_CENTER_VERSION: &str = "1";

pub const DEFAULT_UPDATE_SITE_ID: &str = "default";

pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://updates.jenkins.io/download";

pub const DEFAULT_CONNECTION_CHECK_URL: &str = "https://www.google.com/";

/// Site-wide values that end up in the published document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSettings {
    #[serde(default = "default_id")]
    pub id: String,

    /// Download URLs are `<base>/plugins/<name>/<version>/<name>.hpi`
    #[serde(default = "default_download_base_url")]
    pub download_base_url: String,

    #[serde(default = "default_connection_check_url")]
    pub connection_check_url: Option<String>,
}

fn default_id() -> String {
    DEFAULT_UPDATE_SITE_ID.to_string()
}

fn default_download_base_url() -> String {
    DEFAULT_DOWNLOAD_BASE_URL.to_string()
}

fn default_connection_check_url() -> Option<String> {
    Some(DEFAULT_CONNECTION_CHECK_URL.to_string())
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            id: default_id(),
            download_base_url: default_download_base_url(),
            connection_check_url: default_connection_check_url(),
        }
    }
}

/// The host application release offered by the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreDescriptor {
    pub name: String,
    pub version: String,
    pub url: String,
    /// Base64 SHA-1 of the archive
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
}

/// One plugin as offered by the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub title: String,
    pub version: String,
    pub url: String,
    /// Base64 SHA-1 of the archive
    pub sha1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_core: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatible_since_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_java_version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub developers: Vec<Developer>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub gav: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki: Option<String>,
}

/// The complete update center document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCenter {
    pub update_center_version: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_check_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<CoreDescriptor>,
    pub plugins: BTreeMap<String, PluginDescriptor>,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
    pub generation_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl UpdateCenter {
    /// RFC 8785 canonical JSON of the document without its signature
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = UpdateCenter {
            signature: None,
            ..self.clone()
        };
        serde_json_canonicalizer::to_vec(&unsigned).context("Failed to canonicalize update center")
    }

    /// Attach a signature over [`canonical_bytes`](Self::canonical_bytes)
    ///
    /// An unconfigured signer leaves the document unsigned.
    pub fn sign(mut self, signer: Signer) -> Result<Self> {
        let payload = self.canonical_bytes()?;
        self.signature = signer
            .sign(&payload)
            .context("Failed to sign update center")?
            .map(|document| document.signature_block());
        Ok(self)
    }

    /// Check the attached signature against the document contents
    pub fn verify_signature(&self) -> Result<()> {
        let signature = self
            .signature
            .as_ref()
            .context("Update center is not signed")?;
        signature
            .verify(&self.canonical_bytes()?)
            .context("Update center signature does not match its contents")
    }
}
