//! Resource descriptors and the static weight-location table

pub mod resolver;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::ResourcesConfig;

/// A place a weight artifact may be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Http(String),
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Location::Http(raw.to_string())
        } else {
            Location::Local(PathBuf::from(raw))
        }
    }
}

/// Immutable identity for a loadable unit: a name plus its candidate
/// locations in preference order (fast cache first).
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub name: String,
    pub candidates: Vec<Location>,
}

impl ResourceDescriptor {
    fn new(kind: &str, name: &str, cache_dir: &PathBuf, configured: &[String]) -> Self {
        let cache_path = cache_dir.join(format!("{}-{}.safetensors", kind, name));
        let mut candidates = vec![Location::Local(cache_path)];
        candidates.extend(configured.iter().map(|raw| Location::parse(raw)));
        Self {
            name: format!("{}/{}", kind, name),
            candidates,
        }
    }

    /// The fast-cache path resolved artifacts are copied into
    pub fn cache_path(&self) -> Option<&PathBuf> {
        match self.candidates.first() {
            Some(Location::Local(path)) => Some(path),
            _ => None,
        }
    }
}

/// Descriptor table built once from configuration; never mutated at runtime
#[derive(Debug, Clone)]
pub struct ResourceTable {
    engines: HashMap<String, ResourceDescriptor>,
    modifiers: HashMap<String, ResourceDescriptor>,
}

impl ResourceTable {
    pub fn from_config(config: &ResourcesConfig) -> Self {
        let cache_dir = PathBuf::from(&config.cache_dir);

        let engines = config
            .engines
            .iter()
            .map(|(name, locs)| {
                let desc = ResourceDescriptor::new("engine", name, &cache_dir, &locs.locations);
                (name.clone(), desc)
            })
            .collect();

        let modifiers = config
            .modifiers
            .iter()
            .map(|(name, locs)| {
                let desc = ResourceDescriptor::new("modifier", name, &cache_dir, &locs.locations);
                (name.clone(), desc)
            })
            .collect();

        Self { engines, modifiers }
    }

    pub fn engine(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.engines.get(name)
    }

    /// `None` means the style has no configured modifier and falls back to
    /// prompt-only styling.
    pub fn modifier(&self, style_key: &str) -> Option<&ResourceDescriptor> {
        self.modifiers.get(style_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourcesConfig;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            Location::parse("https://registry.example.com/a.safetensors"),
            Location::Http("https://registry.example.com/a.safetensors".to_string())
        );
        assert_eq!(
            Location::parse("/gcs/models/primary"),
            Location::Local(PathBuf::from("/gcs/models/primary"))
        );
    }

    #[test]
    fn test_cache_path_is_first_candidate() {
        let table = ResourceTable::from_config(&ResourcesConfig::default());
        let desc = table.engine("primary_identity").unwrap();
        let cache = desc.cache_path().unwrap();
        assert!(cache.starts_with("/tmp/stylize/weights"));
        assert!(desc.candidates.len() >= 2);
    }

    #[test]
    fn test_unmapped_style_has_no_modifier() {
        let table = ResourceTable::from_config(&ResourcesConfig::default());
        assert!(table.modifier("anime").is_some());
        assert!(table.modifier("natural").is_none());
    }
}
