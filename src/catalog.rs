use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A product as stored in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: u64,
    pub name: String,
    /// Grams.
    pub weight: f64,
    /// In `[0, 1]`.
    pub popularity_score: f64,
    /// Color variant -> image URL.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Any other field in the file, passed through to responses as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The immutable product list, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw).context("malformed JSON")?;
        Self::new(entries)
    }

    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        for e in &entries {
            if !(e.weight.is_finite() && e.weight > 0.0) {
                bail!("product {} ({}) has non-positive weight {}", e.id, e.name, e.weight);
            }
            if !(0.0..=1.0).contains(&e.popularity_score) {
                bail!(
                    "product {} ({}) has popularityScore {} outside [0, 1]",
                    e.id,
                    e.name,
                    e.popularity_score
                );
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
      {"id": 1, "name": "Ring", "weight": 2, "popularityScore": 0.5,
       "images": {"yellow": "https://cdn.example/ring-y.jpg", "rose": "https://cdn.example/ring-r.jpg"}},
      {"id": 2, "name": "Bangle", "weight": 3.4, "popularityScore": 0.8, "collection": "classic"}
    ]"#;

    #[test]
    fn test_load_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        let ring = &catalog.entries()[0];
        assert_eq!(ring.name, "Ring");
        assert_eq!(ring.images["rose"], "https://cdn.example/ring-r.jpg");
        assert!(catalog.entries()[1].images.is_empty());
    }

    #[test]
    fn test_extra_fields_survive_round_trip() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let json = serde_json::to_value(&catalog.entries()[1]).unwrap();
        assert_eq!(json["collection"], "classic");
        assert_eq!(json["popularityScore"], 0.8);
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let bad_weight = r#"[{"id": 1, "name": "Ghost", "weight": 0, "popularityScore": 0.5}]"#;
        assert!(Catalog::from_json(bad_weight).is_err());

        let bad_score = r#"[{"id": 1, "name": "Hype", "weight": 1, "popularityScore": 1.2}]"#;
        let err = Catalog::from_json(bad_score).unwrap_err();
        assert!(format!("{err:#}").contains("outside [0, 1]"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Catalog::load(Path::new("/nonexistent/products.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/products.json"));
    }
}
