//! Keyword → image lookup for pose visualizations.
//!
//! The index is a JSON object mapping keywords to image paths. Matching is
//! first-hit over the object's key order as written in the file, so the
//! file is read through an order-preserving visitor rather than a map type.

use anyhow::{Context, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// One keyword → image path mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIndexEntry {
    pub keyword: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImageRetriever {
    entries: Vec<ImageIndexEntry>,
}

impl ImageRetriever {
    pub fn new(entries: Vec<ImageIndexEntry>) -> Self {
        Self { entries }
    }

    /// Loads the keyword index from a JSON object file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read image index: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse image index: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let ordered: OrderedEntries = serde_json::from_str(content)?;
        Ok(Self::new(ordered.0))
    }

    /// First image whose keyword occurs in the query, case-insensitively.
    pub fn find(&self, query: &str) -> Option<&str> {
        let query = query.to_lowercase();
        let hit = self
            .entries
            .iter()
            .find(|e| query.contains(&e.keyword.to_lowercase()));
        match hit {
            Some(entry) => {
                tracing::debug!(keyword = %entry.keyword, path = %entry.path, "image match");
                Some(entry.path.as_str())
            }
            None => {
                tracing::debug!("no image match");
                None
            }
        }
    }

    pub fn entries(&self) -> &[ImageIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct OrderedEntries(Vec<ImageIndexEntry>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object mapping keywords to image paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((keyword, path)) = map.next_entry::<String, String>()? {
                    entries.push(ImageIndexEntry { keyword, path });
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_order_preserved() {
        let r = ImageRetriever::from_json(r#"{"zumba": "z.jpg", "yoga": "y.jpg", "abs": "a.jpg"}"#)
            .unwrap();
        let keys: Vec<&str> = r.entries().iter().map(|e| e.keyword.as_str()).collect();
        assert_eq!(keys, vec!["zumba", "yoga", "abs"]);
    }

    #[test]
    fn test_first_match_wins() {
        let r = ImageRetriever::from_json(
            r#"{"plank": "plank.jpg", "side plank": "side.jpg"}"#,
        )
        .unwrap();
        assert_eq!(r.find("show me a side plank"), Some("plank.jpg"));
    }

    #[test]
    fn test_case_insensitive() {
        let r = ImageRetriever::from_json(r#"{"Yoga": "yoga.jpg"}"#).unwrap();
        assert_eq!(r.find("SHOW ME THE YOGA POSE"), Some("yoga.jpg"));
        assert_eq!(r.find("swimming"), None);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(ImageRetriever::from_json(r#"["yoga"]"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("images_db.json");
        std::fs::write(&path, r#"{"squat": "poses/squat.png"}"#).unwrap();
        let r = ImageRetriever::load(&path).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.find("how to squat"), Some("poses/squat.png"));
    }
}
