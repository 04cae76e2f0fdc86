mod go_get;
mod static_hosts;

use std::time::Duration;

use dashmap::DashMap;
use log::{debug, trace};
use thiserror::Error;

pub use go_get::{parse_meta_imports, select_meta_import, GoGetDiscovery, MetaImport};

/// Where the sources of an import path live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    /// Import path prefix corresponding to the repository root.
    pub root: String,
    pub vcs: String,
    pub repo: String,
}

#[derive(Error, Debug)]
pub enum RepoRootError {
    #[error("Invalid import path {import_path}: {reason}")]
    InvalidImportPath { import_path: String, reason: String },
    #[error("Could not create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Error while fetching {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[error("No go-import meta tag found for {import_path}")]
    NoGoImport { import_path: String },
    #[error("Multiple go-import meta tags match {import_path}: {first} and {second}")]
    AmbiguousGoImport {
        import_path: String,
        first: String,
        second: String,
    },
    #[error("Repository {repo} uses {vcs}, only git repositories can be fetched")]
    UnsupportedVcs { repo: String, vcs: String },
}

/// Maps an import path to the repository holding its sources.
pub trait RepoRootResolver: Send + Sync {
    fn repo_root(&self, import_path: &str) -> Result<RepoRoot, RepoRootError>;
}

/// Resolves well-known hosts statically and everything else through `go-get`
/// discovery, like the go command does.
pub struct VcsRepoRootResolver {
    discovery: GoGetDiscovery,
    /// Discovered roots keyed by their import path prefix.
    discovered: DashMap<String, RepoRoot>,
}

impl VcsRepoRootResolver {
    pub fn new(http_timeout: Duration) -> Result<Self, RepoRootError> {
        Ok(VcsRepoRootResolver {
            discovery: GoGetDiscovery::new(http_timeout)?,
            discovered: DashMap::new(),
        })
    }

    fn lookup_discovered(&self, import_path: &str) -> Option<RepoRoot> {
        self.discovered
            .iter()
            .find(|entry| {
                import_path
                    .strip_prefix(entry.key().as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .map(|entry| entry.value().clone())
    }

    fn discover(&self, import_path: &str) -> Result<RepoRoot, RepoRootError> {
        if let Some(root) = self.lookup_discovered(import_path) {
            trace!("Reusing discovered root {} for {}", root.root, import_path);
            return Ok(root);
        }
        let root = self.discovery.discover(import_path)?;
        self.discovered.insert(root.root.clone(), root.clone());
        Ok(root)
    }
}

impl RepoRootResolver for VcsRepoRootResolver {
    fn repo_root(&self, import_path: &str) -> Result<RepoRoot, RepoRootError> {
        check_import_path(import_path)?;

        let root = match static_hosts::resolve(import_path) {
            Some(root) => root?,
            None => self.discover(import_path)?,
        };
        debug!("Import path {} is served by {}", import_path, root.repo);

        if root.vcs != "git" {
            return Err(RepoRootError::UnsupportedVcs {
                repo: root.repo,
                vcs: root.vcs,
            });
        }
        Ok(root)
    }
}

fn check_import_path(import_path: &str) -> Result<(), RepoRootError> {
    let invalid = |reason: &str| RepoRootError::InvalidImportPath {
        import_path: import_path.to_owned(),
        reason: reason.to_owned(),
    };
    if import_path.contains("..") || import_path.contains("://") {
        return Err(invalid("invalid path elements"));
    }
    let host = import_path.split('/').next().unwrap_or_default();
    if !host.contains('.') {
        return Err(invalid("import path does not begin with hostname"));
    }
    Ok(())
}
