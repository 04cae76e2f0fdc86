use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

use crate::{
    aggregate::{AggregationError, Aggregator},
    cache::FetchCache,
    lister::LocalReplacement,
    model::{FetchDescriptor, ResolvedModule},
    prefetch::{FetchError, Prefetcher, SENTINEL_HASH},
    repo_root::{RepoRootError, RepoRootResolver},
};

#[derive(Error, Debug)]
#[error("Error processing import path \"{import_path}\": {kind}")]
pub struct ModuleError {
    pub import_path: String,
    #[source]
    pub kind: ModuleErrorKind,
}

impl ModuleError {
    pub fn new(import_path: impl Into<String>, kind: ModuleErrorKind) -> Self {
        ModuleError {
            import_path: import_path.into(),
            kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum ModuleErrorKind {
    #[error("Could not determine repository: {0}")]
    RepositoryResolution(#[from] RepoRootError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Fetch task did not complete: {0}")]
    Aborted(String),
    #[error("Replaced by local directory {dir}, which cannot be fetched")]
    LocalReplacement { dir: String },
}

/// The terminal state of one module.
#[derive(Debug)]
pub struct FetchOutcome {
    pub import_path: String,
    pub result: Result<FetchDescriptor, ModuleError>,
}

impl FetchOutcome {
    pub fn new(
        import_path: impl Into<String>,
        result: Result<FetchDescriptor, ModuleError>,
    ) -> Self {
        FetchOutcome {
            import_path: import_path.into(),
            result,
        }
    }
}

impl From<LocalReplacement> for FetchOutcome {
    fn from(replacement: LocalReplacement) -> Self {
        let kind = ModuleErrorKind::LocalReplacement {
            dir: replacement.dir,
        };
        let error = ModuleError::new(replacement.import_path.clone(), kind);
        FetchOutcome::new(replacement.import_path, Err(error))
    }
}

/// Turns resolved modules into fetch descriptors on a bounded pool of blocking
/// workers, reusing descriptors from the previous run where possible.
pub struct FetchCoordinator<R: ?Sized, P: ?Sized> {
    cache: Arc<FetchCache>,
    resolver: Arc<R>,
    prefetcher: Arc<P>,
    jobs: usize,
}

impl<R, P> FetchCoordinator<R, P>
where
    R: RepoRootResolver + ?Sized + 'static,
    P: Prefetcher + ?Sized + 'static,
{
    pub fn new(cache: FetchCache, resolver: Arc<R>, prefetcher: Arc<P>, jobs: usize) -> Self {
        FetchCoordinator {
            cache: Arc::new(cache),
            resolver,
            prefetcher,
            jobs: jobs.max(1),
        }
    }

    /// Starts work on every module and returns the channel their outcomes
    /// arrive on, in completion order. Exactly one outcome is sent per module.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_all(&self, modules: Vec<ResolvedModule>) -> mpsc::Receiver<FetchOutcome> {
        let (sender, receiver) = mpsc::channel(modules.len().max(1));
        let workers = self.jobs.min(modules.len()).max(1);
        debug!("Fetching {} modules with {} workers", modules.len(), workers);
        let permits = Arc::new(Semaphore::new(workers));

        for module in modules {
            let sender = sender.clone();
            let permits = permits.clone();
            let cache = self.cache.clone();
            let resolver = self.resolver.clone();
            let prefetcher = self.prefetcher.clone();

            tokio::spawn(async move {
                let import_path = module.import_path.clone();
                let result = match permits.acquire_owned().await {
                    Ok(permit) => tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        process_module(&module, &cache, resolver.as_ref(), prefetcher.as_ref())
                    })
                    .await
                    .unwrap_or_else(|err| Err(ModuleErrorKind::Aborted(err.to_string()))),
                    Err(err) => Err(ModuleErrorKind::Aborted(err.to_string())),
                };
                let result = result.map_err(|kind| ModuleError::new(import_path.clone(), kind));
                // The receiver is gone once the run has been aborted.
                let _ = sender.send(FetchOutcome::new(import_path, result)).await;
            });
        }

        receiver
    }

    /// Fetches every module and aggregates the outcomes as they arrive.
    ///
    /// Without `keep_going` the first failure is returned right away; workers
    /// already running are not interrupted.
    pub async fn resolve_all(
        &self,
        modules: Vec<ResolvedModule>,
        keep_going: bool,
    ) -> Result<Vec<FetchDescriptor>, AggregationError> {
        let aggregator = self
            .resolve_into(modules, Aggregator::new(keep_going))
            .await?;
        Ok(aggregator.finish())
    }

    /// Like [`resolve_all`](Self::resolve_all), adding the outcomes to an
    /// aggregator that may already hold some.
    pub async fn resolve_into(
        &self,
        modules: Vec<ResolvedModule>,
        mut aggregator: Aggregator,
    ) -> Result<Aggregator, AggregationError> {
        let expected = modules.len();
        let mut outcomes = self.spawn_all(modules);

        for _ in 0..expected {
            match outcomes.recv().await {
                Some(outcome) => aggregator.push(outcome)?,
                None => break,
            }
        }

        Ok(aggregator)
    }
}

fn process_module<R, P>(
    module: &ResolvedModule,
    cache: &FetchCache,
    resolver: &R,
    prefetcher: &P,
) -> Result<FetchDescriptor, ModuleErrorKind>
where
    R: RepoRootResolver + ?Sized,
    P: Prefetcher + ?Sized,
{
    if let Some(cached) = cache.lookup(module) {
        debug!("Reusing cached hash for {}", module);
        return Ok(cached.clone());
    }

    let root = resolver.repo_root(&module.import_path)?;

    info!("Fetching {}", module);
    let sha256 = prefetcher.prefetch(&root.repo, &module.revision)?;
    info!("Finished fetching {}", module);

    if sha256 == SENTINEL_HASH {
        return Err(FetchError::SentinelHash {
            url: root.repo,
            rev: module.revision.clone(),
        }
        .into());
    }

    Ok(FetchDescriptor {
        import_path: module.import_path.clone(),
        url: root.repo,
        rev: module.revision.clone(),
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use super::*;
    use crate::repo_root::RepoRoot;

    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeResolver {
        unknown: HashSet<String>,
    }

    impl RepoRootResolver for FakeResolver {
        fn repo_root(&self, import_path: &str) -> Result<RepoRoot, RepoRootError> {
            if self.unknown.contains(import_path) {
                return Err(RepoRootError::NoGoImport {
                    import_path: import_path.to_owned(),
                });
            }
            Ok(RepoRoot {
                root: import_path.to_owned(),
                vcs: "git".to_owned(),
                repo: format!("https://{import_path}"),
            })
        }
    }

    #[derive(Default)]
    struct FakePrefetcher {
        /// Hashes to return per url, `hash-<rev>` otherwise.
        hashes: HashMap<String, String>,
        failing: HashSet<String>,
        calls: Mutex<Vec<(String, String)>>,
        delay: Duration,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl FakePrefetcher {
        fn calls(&self) -> Vec<(String, String)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    impl Prefetcher for FakePrefetcher {
        fn prefetch(&self, url: &str, rev: &str) -> Result<String, FetchError> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((url.to_owned(), rev.to_owned()));
            std::thread::sleep(self.delay);
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(url) {
                return Err(FetchError::SentinelHash {
                    url: url.to_owned(),
                    rev: rev.to_owned(),
                });
            }
            Ok(self
                .hashes
                .get(url)
                .cloned()
                .unwrap_or_else(|| format!("hash-{rev}")))
        }
    }

    fn coordinator(
        cache: FetchCache,
        resolver: FakeResolver,
        prefetcher: Arc<FakePrefetcher>,
        jobs: usize,
    ) -> FetchCoordinator<FakeResolver, FakePrefetcher> {
        FetchCoordinator::new(cache, Arc::new(resolver), prefetcher, jobs)
    }

    fn descriptor(import_path: &str, rev: &str, sha256: &str) -> FetchDescriptor {
        FetchDescriptor {
            import_path: import_path.to_owned(),
            url: format!("https://{import_path}"),
            rev: rev.to_owned(),
            sha256: sha256.to_owned(),
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_fetcher() {
        let cached = descriptor("github.com/a/b", "v1.0.0", "cached-hash");
        let cache: FetchCache = [cached.clone()].into_iter().collect();
        let prefetcher = Arc::new(FakePrefetcher::default());

        let result = coordinator(cache, FakeResolver::default(), prefetcher.clone(), 4)
            .resolve_all(vec![ResolvedModule::new("github.com/a/b", "v1.0.0")], false)
            .await
            .unwrap();

        assert_eq!(result, vec![cached]);
        assert_eq!(prefetcher.calls(), vec![]);
    }

    #[tokio::test]
    async fn stale_cache_entry_is_refetched() {
        let cache: FetchCache = [descriptor("github.com/a/b", "v1.0.0", "old-hash")]
            .into_iter()
            .collect();
        let prefetcher = Arc::new(FakePrefetcher::default());

        let result = coordinator(cache, FakeResolver::default(), prefetcher.clone(), 4)
            .resolve_all(vec![ResolvedModule::new("github.com/a/b", "v1.1.0")], false)
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![descriptor("github.com/a/b", "v1.1.0", "hash-v1.1.0")]
        );
        assert_eq!(
            prefetcher.calls(),
            vec![("https://github.com/a/b".to_owned(), "v1.1.0".to_owned())]
        );
    }

    #[tokio::test]
    async fn sentinel_hash_is_an_error() {
        let prefetcher = Arc::new(FakePrefetcher {
            hashes: HashMap::from([(
                "https://github.com/a/b".to_owned(),
                SENTINEL_HASH.to_owned(),
            )]),
            ..Default::default()
        });

        let err = coordinator(FetchCache::new(), FakeResolver::default(), prefetcher, 4)
            .resolve_all(vec![ResolvedModule::new("github.com/a/b", "v1.0.0")], false)
            .await
            .expect_err("sentinel hash must be rejected");

        let module_error = err.module_error();
        assert_eq!(module_error.import_path, "github.com/a/b");
        assert!(matches!(
            module_error.kind,
            ModuleErrorKind::Fetch(FetchError::SentinelHash { .. })
        ));
    }

    fn three_modules() -> Vec<ResolvedModule> {
        vec![
            ResolvedModule::new("github.com/c/ok", "v3.0.0"),
            ResolvedModule::new("github.com/b/broken", "v2.0.0"),
            ResolvedModule::new("github.com/a/ok", "v1.0.0"),
        ]
    }

    fn broken_prefetcher() -> Arc<FakePrefetcher> {
        Arc::new(FakePrefetcher {
            failing: HashSet::from(["https://github.com/b/broken".to_owned()]),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn fail_fast_aborts_with_module_error() {
        let err = coordinator(
            FetchCache::new(),
            FakeResolver::default(),
            broken_prefetcher(),
            2,
        )
        .resolve_all(three_modules(), false)
        .await
        .expect_err("one module fails");

        assert_eq!(err.module_error().import_path, "github.com/b/broken");
    }

    #[tokio::test]
    async fn keep_going_drops_failed_modules() {
        let result = coordinator(
            FetchCache::new(),
            FakeResolver::default(),
            broken_prefetcher(),
            2,
        )
        .resolve_all(three_modules(), true)
        .await
        .unwrap();

        assert_eq!(
            result,
            vec![
                descriptor("github.com/a/ok", "v1.0.0", "hash-v1.0.0"),
                descriptor("github.com/c/ok", "v3.0.0", "hash-v3.0.0"),
            ]
        );
    }

    #[tokio::test]
    async fn repository_resolution_failure_is_per_module() {
        let resolver = FakeResolver {
            unknown: HashSet::from(["github.com/b/broken".to_owned()]),
        };
        let prefetcher = Arc::new(FakePrefetcher::default());

        let result = coordinator(FetchCache::new(), resolver, prefetcher.clone(), 2)
            .resolve_all(three_modules(), true)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert!(prefetcher
            .calls()
            .iter()
            .all(|(url, _)| url != "https://github.com/b/broken"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_module_yields_exactly_one_outcome() {
        let prefetcher = Arc::new(FakePrefetcher {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let modules: Vec<_> = (0..20)
            .map(|i| ResolvedModule::new(format!("github.com/org/repo{i}"), "v1.0.0"))
            .collect();

        let mut outcomes = coordinator(
            FetchCache::new(),
            FakeResolver::default(),
            prefetcher.clone(),
            3,
        )
        .spawn_all(modules.clone());

        let mut seen = Vec::new();
        while let Some(outcome) = outcomes.recv().await {
            assert!(outcome.result.is_ok());
            seen.push(outcome.import_path);
        }
        seen.sort();
        let mut expected: Vec<_> = modules.into_iter().map(|m| m.import_path).collect();
        expected.sort();

        assert_eq!(seen, expected);
        assert_eq!(prefetcher.calls().len(), 20);
        assert!(prefetcher.max_running.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn resolve_into_keeps_earlier_failures() {
        let mut aggregator = Aggregator::new(true);
        aggregator
            .push(FetchOutcome::from(LocalReplacement {
                import_path: "github.com/b/local".to_owned(),
                dir: "../local".to_owned(),
            }))
            .unwrap();

        let aggregator = coordinator(
            FetchCache::new(),
            FakeResolver::default(),
            Arc::new(FakePrefetcher::default()),
            2,
        )
        .resolve_into(vec![ResolvedModule::new("github.com/a/ok", "v1.0.0")], aggregator)
        .await
        .unwrap();

        assert_eq!(aggregator.failed().to_vec(), vec!["github.com/b/local".to_owned()]);
        assert_eq!(
            aggregator.finish(),
            vec![descriptor("github.com/a/ok", "v1.0.0", "hash-v1.0.0")]
        );
    }

    #[test]
    fn local_replacement_outcome_is_an_error() {
        let outcome = FetchOutcome::from(LocalReplacement {
            import_path: "github.com/b/local".to_owned(),
            dir: "../local".to_owned(),
        });
        let err = outcome.result.expect_err("local replacements are not fetchable");
        assert_eq!(
            err.to_string(),
            "Error processing import path \"github.com/b/local\": \
             Replaced by local directory ../local, which cannot be fetched"
        );
    }

    #[tokio::test]
    async fn no_modules() {
        let result = coordinator(
            FetchCache::new(),
            FakeResolver::default(),
            Arc::new(FakePrefetcher::default()),
            4,
        )
        .resolve_all(Vec::new(), false)
        .await
        .unwrap();
        assert_eq!(result, vec![]);
    }
}
