use std::{path::Path, sync::Arc};

use anyhow::bail;
use log::{debug, info};

use crate::{
    aggregate::Aggregator,
    api::LockMode,
    cache::FetchCache,
    fetch::{FetchCoordinator, FetchOutcome},
    flock::FileLock,
    lister::{enumerate, ModuleLister},
    model::Manifest,
    prefetch::Prefetcher,
    repo_root::RepoRootResolver,
};

const RUN_LOCK_FILE_NAME: &str = ".gomodfetch.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub lock_mode: LockMode,
    pub jobs: usize,
    pub keep_going: bool,
}

/// What a lock run produced.
#[derive(Debug)]
pub struct LockReport {
    pub manifest: Manifest,
    /// Import paths left out of the manifest, only when keeping going.
    pub failed: Vec<String>,
}

/// Handler to lock command
/// Lists the modules of the project, fetches the ones whose revision changed
/// since the previous manifest and writes the new manifest.
pub fn do_lock<L, R, P>(
    options: LockOptions,
    lister: &L,
    resolver: Arc<R>,
    prefetcher: Arc<P>,
    root: &Path,
    input_file_name: &Path,
    output_file_name: &Path,
) -> anyhow::Result<LockReport>
where
    L: ModuleLister + ?Sized,
    R: RepoRootResolver + ?Sized + 'static,
    P: Prefetcher + ?Sized + 'static,
{
    let LockOptions {
        lock_mode,
        jobs,
        keep_going,
    } = options;

    // Concurrent runs would race on the output manifest.
    let _run_lock = match lock_mode {
        LockMode::Locked => None,
        LockMode::Update | LockMode::Recreate => {
            Some(FileLock::new(&root.join(RUN_LOCK_FILE_NAME))?)
        }
    };

    let cache = match lock_mode {
        LockMode::Recreate => {
            debug!("Ignoring previous manifest");
            FetchCache::new()
        }
        LockMode::Update | LockMode::Locked => FetchCache::load(&root.join(input_file_name)),
    };

    let enumeration = enumerate(lister)?;
    info!(
        "Resolving {} modules ({} cached descriptors)",
        enumeration.modules.len(),
        cache.len()
    );

    let mut aggregator = Aggregator::new(keep_going);
    for replacement in enumeration.local_replacements {
        aggregator.push(FetchOutcome::from(replacement))?;
    }

    let coordinator = FetchCoordinator::new(cache, resolver, prefetcher, jobs);
    let runtime = tokio::runtime::Builder::new_multi_thread().build()?;
    let aggregator = runtime.block_on(coordinator.resolve_into(enumeration.modules, aggregator));
    // Waits for fetches still in flight after an early failure.
    drop(runtime);
    let aggregator = aggregator?;
    let failed = aggregator.failed().to_vec();
    let manifest = Manifest::new(aggregator.finish());

    let output_path = root.join(output_file_name);
    let generated = manifest.to_string();
    let existing = match std::fs::read_to_string(&output_path) {
        Ok(existing) => Some(existing),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => return Err(err.into()),
    };
    let up_to_date = existing.as_deref() == Some(generated.as_str());

    match lock_mode {
        LockMode::Locked if !up_to_date => {
            bail!("Manifest {} is not up to date", output_path.display())
        }
        _ if up_to_date => info!("Manifest {} is up to date", output_path.display()),
        _ => {
            std::fs::write(&output_path, generated)?;
            info!("Wrote {}", output_path.display());
        }
    }

    Ok(LockReport { manifest, failed })
}
