//! Runner configuration.

use std::convert::TryFrom;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The stages of a run, in the order they execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Replay buffers saved by earlier runs.
    Reuse,
    /// Generate fresh examples.
    Generate,
    /// Shrink the failures found.
    Shrink,
}

impl Phase {
    pub fn all() -> Vec<Phase> {
        vec![Phase::Reuse, Phase::Generate, Phase::Shrink]
    }
}

impl TryFrom<&str> for Phase {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "reuse" => Ok(Phase::Reuse),
            "generate" => Ok(Phase::Generate),
            "shrink" => Ok(Phase::Shrink),
            _ => Err(format!(
                "cannot convert {} to phase; options are reuse, generate, shrink",
                value
            )),
        }
    }
}

/// Configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Stop generating after this many valid examples.
    pub max_valid_examples: u64,

    /// Stop generating after this many attempts of any outcome.
    pub max_total_attempts: u64,

    /// A run that finds no failure and fewer valid examples than this is
    /// reported as unsatisfiable.
    pub min_valid_examples: u64,

    /// Hard ceiling on the bytes a single execution may consume.
    pub max_buffer_bytes: usize,

    /// Soft wall-clock budget for generation, checked between executions.
    pub time_budget: Option<Duration>,

    /// Executions shared by all shrink tracks of a run.
    pub max_shrink_attempts: u64,

    /// Soft wall-clock budget for shrinking, checked between executions.
    pub shrink_time_budget: Option<Duration>,

    /// Seed for the generator; a run is deterministic given the seed and
    /// the contents of the example store.
    pub seed: u64,

    pub phases: Vec<Phase>,

    /// Largest number of entries kept in a key's secondary corpus.
    pub max_secondary_corpus: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            max_valid_examples: 100,
            max_total_attempts: 1000,
            min_valid_examples: 1,
            max_buffer_bytes: 8192,
            time_budget: None,
            max_shrink_attempts: 10000,
            shrink_time_budget: None,
            seed: 0,
            phases: Phase::all(),
            max_secondary_corpus: 64,
        }
    }
}

impl RunnerConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: RunnerConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_buffer_bytes == 0 {
            return Err(EngineError::InvalidConfig(
                "max_buffer_bytes must be positive".to_string(),
            ));
        }
        if self.max_total_attempts < self.max_valid_examples {
            return Err(EngineError::InvalidConfig(format!(
                "max_total_attempts ({}) is smaller than max_valid_examples ({})",
                self.max_total_attempts, self.max_valid_examples
            )));
        }
        if self.min_valid_examples > self.max_valid_examples {
            return Err(EngineError::InvalidConfig(format!(
                "min_valid_examples ({}) exceeds max_valid_examples ({})",
                self.min_valid_examples, self.max_valid_examples
            )));
        }
        Ok(())
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    /// How many entries reuse tries to have in the primary corpus before it
    /// tops up from the secondary one.
    pub fn desired_reuse_size(&self) -> usize {
        let tenth = (self.max_valid_examples as f64 * 0.1).ceil() as usize;
        tenth.max(2)
    }
}
