//! URL rewriting for resources referenced from inside a model

use std::collections::HashMap;

use crate::archive::ResourceMap;
use crate::file::bare_name;

/// Maps URIs found in a model onto blob URLs from an archive
///
/// Lookup order: exact key, key without a leading `./`, bare file name. URIs
/// that match nothing are returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct UrlResolver {
    map: HashMap<String, String>,
}

impl UrlResolver {
    pub fn from_resource_map(map: &ResourceMap) -> Self {
        Self {
            map: map
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn resolve(&self, url: &str) -> String {
        if let Some(hit) = self.map.get(url) {
            return hit.clone();
        }
        if let Some(hit) = url.strip_prefix("./").and_then(|u| self.map.get(u)) {
            return hit.clone();
        }
        if let Some(hit) = self.map.get(bare_name(url)) {
            return hit.clone();
        }
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> UrlResolver {
        let mut map = ResourceMap::new();
        map.insert("textures/wood.png", "blob:wood".to_string());
        map.insert("robot.bin", "blob:bin".to_string());
        UrlResolver::from_resource_map(&map)
    }

    #[test]
    fn test_exact_then_bare_then_passthrough() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("textures/wood.png"), "blob:wood");
        assert_eq!(resolver.resolve("./robot.bin"), "blob:bin");
        assert_eq!(resolver.resolve("../other/dir/wood.png"), "blob:wood");
        assert_eq!(
            resolver.resolve("https://cdn.test/metal.png"),
            "https://cdn.test/metal.png"
        );
    }
}
