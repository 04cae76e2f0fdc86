use std::fmt::Display;

/// A module from the dependency graph after its version has been turned into a
/// source-control revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ResolvedModule {
    pub import_path: String,
    pub revision: String,
}

impl ResolvedModule {
    pub fn new(import_path: impl Into<String>, revision: impl Into<String>) -> Self {
        ResolvedModule {
            import_path: import_path.into(),
            revision: revision.into(),
        }
    }
}

impl Display for ResolvedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.import_path, self.revision)
    }
}

/// Everything needed to fetch the exact sources of a module without a Go toolchain.
///
/// This is the unit stored in the manifest, and the unit reused across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct FetchDescriptor {
    pub import_path: String,
    pub url: String,
    pub rev: String,
    pub sha256: String,
}

impl FetchDescriptor {
    /// A descriptor can be reused only while the module stays on the same revision.
    pub fn is_current_for(&self, module: &ResolvedModule) -> bool {
        self.import_path == module.import_path && self.rev == module.revision
    }
}
