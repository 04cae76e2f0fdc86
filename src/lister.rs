use std::{
    ffi::OsString,
    io::{BufReader, Read},
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
};

use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::{model::ResolvedModule, revision::normalize};

#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Error while decoding module record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("'{command}' failed with {status}:\n{stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// One module of the build list, as reported by `go list -json -m`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleRecord {
    pub path: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub replace: Option<Replacement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Replacement {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub version: Option<String>,
}

pub trait ModuleLister {
    fn list(&self) -> Result<Vec<ModuleRecord>, EnumerationError>;
}

/// Lists the build list of the module in `project_dir` with the go command.
#[derive(Debug, Clone)]
pub struct GoModuleLister {
    program: PathBuf,
    project_dir: PathBuf,
    env: Vec<(OsString, OsString)>,
}

impl GoModuleLister {
    pub fn new(program: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        GoModuleLister {
            program: program.into(),
            project_dir: project_dir.into(),
            env: vec![("GO111MODULE".into(), "on".into())],
        }
    }

    /// Adds a variable to the environment of the go command, on top of the
    /// inherited one.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["list", "-json", "-m", "all"])
            .current_dir(&self.project_dir)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    fn display(&self) -> String {
        format!("{} list -json -m all", self.program.display())
    }
}

impl ModuleLister for GoModuleLister {
    fn list(&self) -> Result<Vec<ModuleRecord>, EnumerationError> {
        debug!(
            "Running {} in {}",
            self.display(),
            self.project_dir.display()
        );
        let mut child = self
            .command()
            .spawn()
            .map_err(|source| EnumerationError::Spawn {
                command: self.display(),
                source,
            })?;

        // Drained on its own thread so a chatty go command cannot fill the pipe
        // while stdout is being decoded.
        let stderr = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buffer = String::new();
                let _ = stderr.read_to_string(&mut buffer);
                buffer
            })
        });

        let decoded = match child.stdout.take() {
            Some(stdout) => decode_records(BufReader::new(stdout)),
            None => Ok(Vec::new()),
        };

        if decoded.is_err() {
            let _ = child.kill();
        }
        let status = child.wait().map_err(|source| EnumerationError::Spawn {
            command: self.display(),
            source,
        })?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        let records = decoded?;
        if !status.success() {
            return Err(EnumerationError::Failed {
                command: self.display(),
                status,
                stderr,
            });
        }
        Ok(records)
    }
}

/// Decodes a stream of concatenated JSON objects until the input is exhausted.
pub fn decode_records<R: Read>(reader: R) -> Result<Vec<ModuleRecord>, EnumerationError> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<ModuleRecord>()
        .map(|record| record.map_err(EnumerationError::from))
        .collect()
}

/// A dependency replaced by a directory on disk, which has no revision to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReplacement {
    pub import_path: String,
    pub dir: String,
}

/// The dependencies of the main module.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// In the order the lister reported them.
    pub modules: Vec<ResolvedModule>,
    pub local_replacements: Vec<LocalReplacement>,
}

/// Lists the dependencies of the main module and derives the revision of each.
pub fn enumerate<L: ModuleLister + ?Sized>(lister: &L) -> Result<Enumeration, EnumerationError> {
    let mut enumeration = Enumeration::default();
    for record in lister.list()? {
        if record.main {
            continue;
        }
        let version = match record.replace {
            None => record.version,
            Some(Replacement {
                version: Some(version),
                ..
            }) => version,
            Some(Replacement {
                path: dir,
                version: None,
            }) => {
                warn!("{} is replaced by local directory {}", record.path, dir);
                enumeration.local_replacements.push(LocalReplacement {
                    import_path: record.path,
                    dir,
                });
                continue;
            }
        };

        let revision = normalize(&record.path, &version);
        info!("goPackagePath {} has rev {}", record.path, revision);
        enumeration
            .modules
            .push(ResolvedModule::new(record.path, revision));
    }
    Ok(enumeration)
}
