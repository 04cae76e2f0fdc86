use std::{collections::BTreeMap, path::Path};

use log::{debug, warn};

use crate::model::{FetchDescriptor, Manifest, ResolvedModule};

/// Descriptors from the previous run, keyed by import path.
///
/// Read-only once built, so it can be shared between fetch workers as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCache {
    entries: BTreeMap<String, FetchDescriptor>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the previous manifest. A missing or unreadable manifest only
    /// means that every module has to be fetched again.
    pub fn load(path: &Path) -> FetchCache {
        if !path.exists() {
            debug!(
                "No previous manifest at {}, starting with an empty cache",
                path.display()
            );
            return FetchCache::new();
        }
        match Manifest::from_file(path) {
            Ok(manifest) => {
                let cache = FetchCache::from(manifest);
                debug!(
                    "Loaded {} cached descriptors from {}",
                    cache.len(),
                    path.display()
                );
                cache
            }
            Err(err) => {
                warn!(
                    "Ignoring previous manifest {}: {}",
                    path.display(),
                    err
                );
                FetchCache::new()
            }
        }
    }

    /// Returns the cached descriptor for the module if it is still on the same revision.
    pub fn lookup(&self, module: &ResolvedModule) -> Option<&FetchDescriptor> {
        self.entries
            .get(&module.import_path)
            .filter(|descriptor| descriptor.is_current_for(module))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<FetchDescriptor> for FetchCache {
    fn from_iter<T: IntoIterator<Item = FetchDescriptor>>(iter: T) -> Self {
        FetchCache {
            entries: iter
                .into_iter()
                .map(|descriptor| (descriptor.import_path.clone(), descriptor))
                .collect(),
        }
    }
}

impl From<Manifest> for FetchCache {
    fn from(manifest: Manifest) -> Self {
        manifest.dependencies.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn descriptor(import_path: &str, rev: &str) -> FetchDescriptor {
        FetchDescriptor {
            import_path: import_path.to_owned(),
            url: format!("https://{import_path}"),
            rev: rev.to_owned(),
            sha256: format!("sha-{rev}"),
        }
    }

    #[test]
    fn hit_on_same_revision() {
        let cache: FetchCache = [descriptor("github.com/a/b", "v1.0.0")].into_iter().collect();
        assert_eq!(
            cache.lookup(&ResolvedModule::new("github.com/a/b", "v1.0.0")),
            Some(&descriptor("github.com/a/b", "v1.0.0"))
        );
    }

    #[test]
    fn miss_on_changed_revision() {
        let cache: FetchCache = [descriptor("github.com/a/b", "v1.0.0")].into_iter().collect();
        assert_eq!(
            cache.lookup(&ResolvedModule::new("github.com/a/b", "v1.1.0")),
            None
        );
    }

    #[test]
    fn miss_on_unknown_path() {
        let cache = FetchCache::new();
        assert!(cache.is_empty());
        assert_eq!(
            cache.lookup(&ResolvedModule::new("github.com/a/b", "v1.0.0")),
            None
        );
    }

    #[test]
    fn load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FetchCache::load(&dir.path().join("deps.nix")).is_empty());
    }

    #[test]
    fn load_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.nix");
        std::fs::write(&path, "rev = \"orphan\";\n").unwrap();
        assert!(FetchCache::load(&path).is_empty());
    }

    #[test]
    fn load_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.nix");
        let manifest = Manifest::new(vec![
            descriptor("github.com/a/b", "v1.0.0"),
            descriptor("golang.org/x/text", "v0.3.2"),
        ]);
        std::fs::write(&path, manifest.to_string()).unwrap();

        let cache = FetchCache::load(&path);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache, FetchCache::from(manifest));
    }
}
