use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "gomodfetch.toml";

/// Settings that can be provided through `gomodfetch.toml` in the project
/// directory or `GOMODFETCH_*` environment variables. Command line flags win
/// over both.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GomodfetchConfig {
    pub jobs: Option<usize>,
    pub prefetcher: Option<PathBuf>,
    pub go_binary: Option<PathBuf>,
    pub http_timeout: Option<Duration>,
}

impl GomodfetchConfig {
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(Some(&project_dir.join(CONFIG_FILE_NAME)), None)?;
        Ok(raw_config.into())
    }
}

impl From<RawConfig> for GomodfetchConfig {
    fn from(raw: RawConfig) -> Self {
        GomodfetchConfig {
            jobs: raw.fetch.jobs,
            prefetcher: raw.fetch.prefetcher,
            go_binary: raw.go.binary,
            http_timeout: raw.http.timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    fetch: FetchConfig,
    #[serde(default)]
    go: GoConfig,
    #[serde(default)]
    http: HttpConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct FetchConfig {
    jobs: Option<usize>,
    prefetcher: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GoConfig {
    binary: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct HttpConfig {
    /// Seconds.
    timeout: Option<u64>,
}

impl RawConfig {
    fn load(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("GOMODFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
