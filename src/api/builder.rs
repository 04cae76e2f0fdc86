use std::{env, path::PathBuf, sync::Arc, time::Duration};

use crate::{
    config::GomodfetchConfig, lister::GoModuleLister, prefetch::NixPrefetchGit,
    repo_root::VcsRepoRootResolver, Gomodfetch,
};

const DEFAULT_MANIFEST_FILE_NAME: &str = "deps.nix";
const DEFAULT_JOBS: usize = 20;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct GomodfetchBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    input_file_name: Option<PathBuf>,
    output_file_name: Option<PathBuf>,
    jobs: Option<usize>,
    keep_going: bool,
    go_binary: Option<PathBuf>,
    prefetcher: Option<PathBuf>,
    go_env: Vec<(String, String)>,
}

impl GomodfetchBuilder {
    /// Go project directory, the one containing `go.mod`.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Manifest from a previous run whose hashes can be reused.
    ///
    /// Defaults to `deps.nix`.
    pub fn input_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_file_name = Some(path.into());
        self
    }

    /// Defaults to `deps.nix`.
    pub fn output_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file_name = Some(path.into());
        self
    }

    /// Number of modules fetched in parallel.
    ///
    /// Defaults to the configured value, or 20.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Leave modules that cannot be fetched out of the manifest instead of failing.
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn go_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.go_binary = Some(path.into());
        self
    }

    pub fn prefetcher(mut self, path: impl Into<PathBuf>) -> Self {
        self.prefetcher = Some(path.into());
        self
    }

    /// Extra environment variable for the go command.
    pub fn go_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.go_env.push((key.into(), value.into()));
        self
    }

    pub fn try_build(self) -> anyhow::Result<Gomodfetch> {
        let Self {
            root,
            input_file_name,
            output_file_name,
            jobs,
            keep_going,
            go_binary,
            prefetcher,
            go_env,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let config = GomodfetchConfig::load(&root)?;

        let input_file_name =
            input_file_name.unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_FILE_NAME));
        let output_file_name =
            output_file_name.unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_FILE_NAME));
        let jobs = jobs.or(config.jobs).unwrap_or(DEFAULT_JOBS);

        let go_binary = go_binary
            .or(config.go_binary)
            .unwrap_or_else(|| PathBuf::from("go"));
        let lister = go_env.into_iter().fold(
            GoModuleLister::new(go_binary, &root),
            |lister, (key, value)| lister.env(key, value),
        );

        let prefetcher = prefetcher
            .or(config.prefetcher)
            .map(NixPrefetchGit::new)
            .unwrap_or_default();

        let resolver =
            VcsRepoRootResolver::new(config.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;

        Ok(Gomodfetch {
            lister,
            resolver: Arc::new(resolver),
            prefetcher: Arc::new(prefetcher),
            root,
            input_file_name,
            output_file_name,
            jobs,
            keep_going,
        })
    }
}
