pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod flock;
pub mod lister;
pub mod model;
pub mod prefetch;
pub mod repo_root;
pub mod revision;

mod api;

pub use api::{Gomodfetch, GomodfetchBuilder, LockMode};
