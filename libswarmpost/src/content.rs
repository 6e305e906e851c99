//! Content group loading
//!
//! Each account references a named group; a group is one JSON file of
//! content units under the configured content directory. The core only
//! needs an ordered, loadable list; a missing or broken group degrades to
//! an empty list so the owning account is skipped, not the whole run.

use std::path::PathBuf;

use tracing::warn;

use crate::types::ContentUnit;

pub struct ContentLibrary {
    dir: PathBuf,
}

impl ContentLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the units of `<dir>/<group>.json`, tolerantly.
    pub fn load_group(&self, group: &str) -> Vec<ContentUnit> {
        let path = self.dir.join(format!("{}.json", group));
        if !path.exists() {
            warn!("Content group {:?} has no file, skipping", group);
            return Vec::new();
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read content group {:?}: {}", path, e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(units) => units,
            Err(e) => {
                warn!("Content group {:?} is unparsable, skipping: {}", path, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_group() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("promo.json"),
            r#"[
                {"caption": "first"},
                {"caption": "second", "media": ["a.jpg", "b.jpg"], "delay_min": 5, "delay_max": 9},
                {"caption": "dormant", "active": false}
            ]"#,
        )
        .unwrap();

        let library = ContentLibrary::new(dir.path());
        let units = library.load_group("promo");

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].caption, "first");
        assert!(units[0].media.is_empty());
        assert!(units[0].active);
        assert_eq!(units[1].media.len(), 2);
        assert_eq!(units[1].delay_min, Some(5));
        assert!(!units[2].active);
    }

    #[test]
    fn test_missing_group_is_empty() {
        let dir = TempDir::new().unwrap();
        let library = ContentLibrary::new(dir.path());
        assert!(library.load_group("ghost").is_empty());
    }

    #[test]
    fn test_corrupt_group_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "not json at all").unwrap();

        let library = ContentLibrary::new(dir.path());
        assert!(library.load_group("bad").is_empty());
    }
}
