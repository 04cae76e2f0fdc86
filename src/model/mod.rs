use thiserror::Error;

pub mod manifest;
pub mod module;

pub use manifest::Manifest;
pub use module::{FetchDescriptor, ResolvedModule};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading manifest: {0}")]
    IO(#[from] std::io::Error),
    #[error("Missing key `{key}` in manifest entry {entry}")]
    MissingKey { key: String, entry: usize },
    #[error("Unsupported fetch type `{kind}` for {import_path}")]
    UnsupportedFetchType { kind: String, import_path: String },
    #[error("Unexpected content in manifest: `{0}`")]
    Unexpected(String),
}
