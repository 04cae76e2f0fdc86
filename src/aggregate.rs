use std::collections::BTreeMap;

use log::{error, warn};
use thiserror::Error;

use crate::{
    fetch::{FetchOutcome, ModuleError},
    model::FetchDescriptor,
};

/// The first module failure of a run that does not keep going.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct AggregationError(#[from] ModuleError);

impl AggregationError {
    pub fn module_error(&self) -> &ModuleError {
        &self.0
    }
}

/// Collects fetch outcomes as they arrive, in any order.
#[derive(Debug)]
pub struct Aggregator {
    keep_going: bool,
    resolved: BTreeMap<String, FetchDescriptor>,
    failed: Vec<String>,
}

impl Aggregator {
    pub fn new(keep_going: bool) -> Self {
        Aggregator {
            keep_going,
            resolved: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    /// Records one outcome. Fails on the first error unless keeping going, in
    /// which case the module is left out of the result.
    pub fn push(&mut self, outcome: FetchOutcome) -> Result<(), AggregationError> {
        match outcome.result {
            Ok(descriptor) => {
                self.resolved.insert(outcome.import_path, descriptor);
                Ok(())
            }
            Err(err) if self.keep_going => {
                error!("Encountered error: {}", err);
                self.failed.push(outcome.import_path);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Descriptors ordered by import path, so that unchanged inputs always
    /// produce the same manifest.
    pub fn finish(self) -> Vec<FetchDescriptor> {
        if !self.failed.is_empty() {
            warn!(
                "{} modules could not be resolved and were left out: {}",
                self.failed.len(),
                self.failed.join(", ")
            );
        }
        self.resolved.into_values().collect()
    }
}

pub fn aggregate(
    outcomes: impl IntoIterator<Item = FetchOutcome>,
    keep_going: bool,
) -> Result<Vec<FetchDescriptor>, AggregationError> {
    let mut aggregator = Aggregator::new(keep_going);
    for outcome in outcomes {
        aggregator.push(outcome)?;
    }
    Ok(aggregator.finish())
}
