//! Plugin archive manifest parsing (META-INF/MANIFEST.MF)
//!
//! Only the main section is read. Attribute names are matched exactly,
//! continuation lines (starting with a single space) are joined.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::version::VersionNumber;

/// Attribute carrying the minimum host version a plugin was built against
pub const REQUIRED_CORE_ATTRIBUTE: &str = "Jenkins-Version";

/// Older spelling of [`REQUIRED_CORE_ATTRIBUTE`]
pub const LEGACY_REQUIRED_CORE_ATTRIBUTE: &str = "Hudson-Version";

/// Main-section attributes of a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    attributes: BTreeMap<String, String>,
}

/// A dependency declared in `Plugin-Dependencies`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Plugin artifact id
    pub name: String,

    /// Minimum version of the dependency
    pub version: String,

    /// Whether the dependency is declared `resolution:=optional`
    pub optional: bool,
}

/// A developer declared in `Plugin-Developers`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Developer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Manifest {
    /// Parse the main section of a manifest file
    pub fn parse(content: &str) -> Result<Self> {
        Self::from_bytes(content.as_bytes())
    }

    /// Parse raw manifest bytes
    ///
    /// Continuation lines are joined before decoding, since archivers wrap
    /// at 72 bytes even inside a multibyte character. Attributes that are
    /// still not valid UTF-8 are decoded lossily.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // (line number, joined bytes)
        let mut logical: Vec<(usize, Vec<u8>)> = Vec::new();

        for (number, line) in bytes.split(|b| *b == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            // The main section ends at the first blank line
            if line.is_empty() {
                break;
            }

            if let Some(continuation) = line.strip_prefix(b" ") {
                let (_, last) = logical
                    .last_mut()
                    .with_context(|| format!("Continuation without attribute at line {}", number + 1))?;
                last.extend_from_slice(continuation);
                continue;
            }
            logical.push((number, line.to_vec()));
        }

        let mut attributes = BTreeMap::new();
        for (number, raw) in logical {
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Manifest line {} is not valid UTF-8; decoding lossily", number + 1);
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            let (key, value) = line
                .split_once(':')
                .with_context(|| format!("Malformed manifest line {}: '{}'", number + 1, line))?;
            let key = key.trim().to_string();
            if key.is_empty() {
                anyhow::bail!("Empty attribute name at line {}", number + 1);
            }
            attributes.insert(key, value.strip_prefix(' ').unwrap_or(value).to_string());
        }

        Ok(Self { attributes })
    }

    /// Build a manifest from attribute pairs
    pub fn from_attributes<K, V>(attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn short_name(&self) -> Option<&str> {
        self.get("Short-Name")
    }

    pub fn long_name(&self) -> Option<&str> {
        self.get("Long-Name")
    }

    pub fn url(&self) -> Option<&str> {
        self.get("Url")
    }

    /// One-line description of the plugin
    pub fn excerpt(&self) -> Option<&str> {
        self.get("Specification-Title")
    }

    pub fn compatible_since_version(&self) -> Option<&str> {
        self.get("Compatible-Since-Version")
    }

    pub fn minimum_java_version(&self) -> Option<&str> {
        self.get("Minimum-Java-Version")
    }

    /// Declared minimum host version
    ///
    /// Errors when the attribute is present but not a parseable version.
    pub fn required_core(&self) -> Result<Option<VersionNumber>> {
        let Some(raw) = self
            .get(REQUIRED_CORE_ATTRIBUTE)
            .or_else(|| self.get(LEGACY_REQUIRED_CORE_ATTRIBUTE))
        else {
            return Ok(None);
        };
        let version = VersionNumber::parse(raw)
            .with_context(|| format!("Invalid {REQUIRED_CORE_ATTRIBUTE} attribute"))?;
        Ok(Some(version))
    }

    /// Dependencies from `Plugin-Dependencies`, e.g. `a:1.0;resolution:=optional,b:2.0`
    pub fn dependencies(&self) -> Result<Vec<Dependency>> {
        let Some(raw) = self.get("Plugin-Dependencies") else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut parts = entry.split(';');
                let coordinate = parts.next().unwrap_or_default();
                let optional = parts.any(|p| p.trim() == "resolution:=optional");
                let (name, version) = coordinate
                    .split_once(':')
                    .with_context(|| format!("Malformed plugin dependency '{entry}'"))?;
                Ok(Dependency {
                    name: name.trim().to_string(),
                    version: version.trim().to_string(),
                    optional,
                })
            })
            .collect()
    }

    /// Developers from `Plugin-Developers`, e.g. `Jane Doe:jdoe:jane@example.org,...`
    pub fn developers(&self) -> Vec<Developer> {
        let Some(raw) = self.get("Plugin-Developers") else {
            return Vec::new();
        };

        let non_empty = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        raw.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| {
                let mut fields = entry.split(':');
                Developer {
                    name: non_empty(fields.next()),
                    developer_id: non_empty(fields.next()),
                    email: non_empty(fields.next()),
                }
            })
            .filter(|d| d.name.is_some() || d.developer_id.is_some() || d.email.is_some())
            .collect()
    }
}
