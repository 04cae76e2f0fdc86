use std::{
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};

use log::trace;
use serde::Deserialize;
use thiserror::Error;

/// Hash reported by `nix-prefetch-git` when nothing could be fetched: the hash
/// of an empty directory. Never a valid result.
pub const SENTINEL_HASH: &str = "0sjjj9z1dhilhpc8pq4154czrb79z9cm044jvn75kxcjv6v5l2m5";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Error executing cmd [{command}]: {status}\nStderr:\n{stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("Error while decoding prefetch output: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Bad SHA256 for repo {url} with rev {rev}")]
    SentinelHash { url: String, rev: String },
}

/// Fetches a repository at a revision and hashes the resulting tree.
pub trait Prefetcher: Send + Sync {
    fn prefetch(&self, url: &str, rev: &str) -> Result<String, FetchError>;
}

/// The JSON document printed by `nix-prefetch-git`. Only the hash is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrefetchOutput {
    pub sha256: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
}

impl PrefetchOutput {
    pub fn from_slice(output: &[u8]) -> Result<PrefetchOutput, FetchError> {
        Ok(serde_json::from_slice(output)?)
    }
}

/// Runs `nix-prefetch-git` with the options `fetchgit` uses, so that the hash
/// matches what Nix computes at build time.
#[derive(Debug, Clone)]
pub struct NixPrefetchGit {
    program: PathBuf,
}

impl NixPrefetchGit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        NixPrefetchGit {
            program: program.into(),
        }
    }

    fn command(&self, url: &str, rev: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["--quiet", "--fetch-submodules", "--url", url, "--rev", rev])
            .stdin(Stdio::null());
        command
    }

    fn display(&self, url: &str, rev: &str) -> String {
        format!(
            "{} --quiet --fetch-submodules --url {} --rev {}",
            self.program.display(),
            url,
            rev
        )
    }
}

impl Default for NixPrefetchGit {
    fn default() -> Self {
        NixPrefetchGit::new("nix-prefetch-git")
    }
}

impl Prefetcher for NixPrefetchGit {
    fn prefetch(&self, url: &str, rev: &str) -> Result<String, FetchError> {
        trace!("Running {}", self.display(url, rev));
        let output = self
            .command(url, rev)
            .output()
            .map_err(|source| FetchError::Spawn {
                command: self.display(url, rev),
                source,
            })?;
        if !output.status.success() {
            return Err(FetchError::Failed {
                command: self.display(url, rev),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(PrefetchOutput::from_slice(&output.stdout)?.sha256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn decode_output() {
        let output = br#"{
  "url": "https://github.com/pkg/errors",
  "rev": "ba968bfe8b2f7e042a574c888954fccecfa385b4",
  "date": "2019-01-03T19:07:39+01:00",
  "path": "/nix/store/3mdgyx3c3bz7d8cf3rnql3ahs5frc7pi-errors",
  "sha256": "0g5qcb4d4fd96midz0zdk8b9kz8xkzwfa8kr1cliqbg8sxsy5vd1",
  "fetchSubmodules": true,
  "deepClone": false,
  "leaveDotGit": false
}"#;
        assert_eq!(
            PrefetchOutput::from_slice(output).unwrap(),
            PrefetchOutput {
                sha256: "0g5qcb4d4fd96midz0zdk8b9kz8xkzwfa8kr1cliqbg8sxsy5vd1".to_owned(),
                url: Some("https://github.com/pkg/errors".to_owned()),
                rev: Some("ba968bfe8b2f7e042a574c888954fccecfa385b4".to_owned()),
            }
        );
    }

    #[test]
    fn decode_output_without_hash() {
        assert!(matches!(
            PrefetchOutput::from_slice(br#"{"url": "https://example.com"}"#),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn decode_output_with_wrong_type() {
        assert!(matches!(
            PrefetchOutput::from_slice(br#"{"sha256": 42}"#),
            Err(FetchError::Decode(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn prefetch_passes_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-prefetch");
        // Echoes the arguments back as the hash.
        std::fs::write(&script, "#!/bin/sh\nprintf '{\"sha256\": \"%s\"}' \"$*\"\n").unwrap();
        make_executable(&script);

        let hash = NixPrefetchGit::new(&script)
            .prefetch("https://github.com/a/b", "v1.0.0")
            .unwrap();
        assert_eq!(
            hash,
            "--quiet --fetch-submodules --url https://github.com/a/b --rev v1.0.0"
        );
    }

    #[cfg(unix)]
    #[test]
    fn prefetch_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-prefetch");
        std::fs::write(&script, "#!/bin/sh\necho 'fatal: repository not found' >&2\nexit 128\n")
            .unwrap();
        make_executable(&script);

        let err = NixPrefetchGit::new(&script)
            .prefetch("https://github.com/a/missing", "v1.0.0")
            .expect_err("fetcher exits non-zero");
        assert!(err.to_string().contains("fatal: repository not found"));
        assert!(matches!(err, FetchError::Failed { .. }));
    }

    #[cfg(unix)]
    fn make_executable(path: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
