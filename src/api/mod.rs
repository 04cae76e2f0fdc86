use std::{path::PathBuf, sync::Arc};

use crate::{
    cli::command_handlers::{do_lock, LockOptions},
    lister::GoModuleLister,
    prefetch::NixPrefetchGit,
    repo_root::VcsRepoRootResolver,
};

mod builder;

pub use builder::GomodfetchBuilder;

pub struct Gomodfetch {
    lister: GoModuleLister,
    resolver: Arc<VcsRepoRootResolver>,
    prefetcher: Arc<NixPrefetchGit>,
    root: PathBuf,
    input_file_name: PathBuf,
    output_file_name: PathBuf,
    jobs: usize,
    keep_going: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LockMode {
    /// Verify that the manifest is up to date without writing it. This mode
    /// should be normally used on CI.
    Locked,
    /// Reuse hashes from the previous manifest for unchanged revisions.
    #[default]
    Update,
    /// Fetch every module again, ignoring the previous manifest.
    Recreate,
}

impl Gomodfetch {
    pub fn builder() -> GomodfetchBuilder {
        GomodfetchBuilder::default()
    }

    /// Generates, updates or verifies the dependency manifest of the project.
    pub fn lock(&self, lock_mode: LockMode) -> anyhow::Result<()> {
        let options = LockOptions {
            lock_mode,
            jobs: self.jobs,
            keep_going: self.keep_going,
        };
        do_lock(
            options,
            &self.lister,
            self.resolver.clone(),
            self.prefetcher.clone(),
            &self.root,
            &self.input_file_name,
            &self.output_file_name,
        )?;
        Ok(())
    }
}
