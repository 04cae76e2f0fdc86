use clap::Parser;

use crate::LockMode;

/// Generates a content-addressed Nix dependency manifest from a Go module graph.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    /// Go project directory, the one containing go.mod
    #[clap(short, long, default_value = ".")]
    pub dir: String,
    /// Manifest to write, relative to the project directory
    #[clap(short, long, default_value = "deps.nix")]
    pub outfile: String,
    /// Previous manifest whose hashes are reused, relative to the project directory
    #[clap(short, long, default_value = "deps.nix")]
    pub infile: String,
    /// Number of modules fetched in parallel [default: 20]
    #[clap(short, long)]
    pub jobs: Option<usize>,
    /// Leave modules that cannot be fetched out of the manifest instead of failing
    #[clap(short, long)]
    pub keep_going: bool,
    /// Fail if the manifest is not up to date instead of writing it
    #[clap(long, conflicts_with = "recreate")]
    pub locked: bool,
    /// Fetch every module again, ignoring the previous manifest
    #[clap(long)]
    pub recreate: bool,
    /// Extra environment variable for the go command, as KEY=VALUE
    #[clap(long, value_parser = parse_key_value)]
    pub go_env: Vec<(String, String)>,
}

fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got `{arg}`")),
    }
}

impl CliArgs {
    pub fn lock_mode(&self) -> LockMode {
        if self.locked {
            LockMode::Locked
        } else if self.recreate {
            LockMode::Recreate
        } else {
            LockMode::Update
        }
    }
}
