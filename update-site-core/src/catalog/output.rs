//! Writes catalog documents to the output directory

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::UpdateCenter;
use crate::tiers::CompatibilityTiers;

pub const UPDATE_CENTER_JSON_FILE: &str = "update-center.json";
pub const ACTUAL_JSON_FILE: &str = "update-center.actual.json";
pub const TIERS_JSON_FILE: &str = "tiers.json";

/// Wrap a JSON document for `updateCenter.post` consumers
pub fn jsonp(json: &str) -> String {
    format!("updateCenter.post(\n{json}\n);")
}

pub struct CatalogWriter {
    dir: PathBuf,
}

impl CatalogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
        Ok(path)
    }

    /// Write every catalog file, returning the paths written
    pub fn write(
        &self,
        update_center: &UpdateCenter,
        tiers: &CompatibilityTiers,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory: {}", self.dir.display()))?;

        let json = serde_json::to_string(update_center)
            .context("Failed to serialize update center")?;
        let pretty = serde_json::to_string_pretty(update_center)
            .context("Failed to serialize update center")?;
        let tiers = serde_json::to_string_pretty(tiers).context("Failed to serialize tiers")?;

        Ok(vec![
            self.write_file(UPDATE_CENTER_JSON_FILE, &jsonp(&json))?,
            self.write_file(ACTUAL_JSON_FILE, &pretty)?,
            self.write_file(TIERS_JSON_FILE, &tiers)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UPDATE_CENTER_VERSION;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_writes_all_documents() {
        let temp_dir = TempDir::new().unwrap();
        let writer = CatalogWriter::new(temp_dir.path().join("site"));
        let update_center = UpdateCenter {
            update_center_version: UPDATE_CENTER_VERSION.to_string(),
            id: "default".to_string(),
            connection_check_url: None,
            core: None,
            plugins: BTreeMap::new(),
            warnings: Vec::new(),
            generation_timestamp: "2024-01-01T00:00:00Z".to_string(),
            signature: None,
        };

        let written = writer
            .write(&update_center, &CompatibilityTiers::default())
            .unwrap();
        assert_eq!(written.len(), 3);

        let jsonp = std::fs::read_to_string(writer.dir().join(UPDATE_CENTER_JSON_FILE)).unwrap();
        assert!(jsonp.starts_with("updateCenter.post(\n{"));
        assert!(jsonp.ends_with("}\n);"));

        let actual = std::fs::read_to_string(writer.dir().join(ACTUAL_JSON_FILE)).unwrap();
        let parsed: UpdateCenter = serde_json::from_str(&actual).unwrap();
        assert_eq!(parsed, update_center);

        let tiers = std::fs::read_to_string(writer.dir().join(TIERS_JSON_FILE)).unwrap();
        assert!(tiers.contains("\"stableCores\": []"));
    }
}
