//! Configuration of [`MultiStepReplayBuffer`](super::MultiStepReplayBuffer).
use crate::error::ReplayBufferError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`MultiStepReplayBuffer`](super::MultiStepReplayBuffer).
///
/// # Examples
///
/// ```rust
/// use border_core::multistep_replay_buffer::MultiStepReplayBufferConfig;
///
/// let config = MultiStepReplayBufferConfig::default()
///     .capacity(50_000)
///     .multistep_k(5)
///     .gamma(0.99)
///     .seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MultiStepReplayBufferConfig {
    /// Maximum number of k-step records.
    pub capacity: usize,

    /// Number of slots of the staging ring.
    pub staging_capacity: usize,

    /// Maximum number of raw steps merged into a record.
    pub multistep_k: usize,

    /// Discount factor applied inside a window.
    pub gamma: f32,

    /// Random seed for sampling.
    pub seed: u64,
}

impl Default for MultiStepReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            staging_capacity: 100_000,
            multistep_k: 1,
            gamma: 0.99,
            seed: 42,
        }
    }
}

impl MultiStepReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the capacity of the staging ring.
    pub fn staging_capacity(mut self, staging_capacity: usize) -> Self {
        self.staging_capacity = staging_capacity;
        self
    }

    /// Sets the number of steps in a window.
    pub fn multistep_k(mut self, multistep_k: usize) -> Self {
        self.multistep_k = multistep_k;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks that the buffer can be built with this configuration.
    pub fn validate(&self) -> Result<(), ReplayBufferError> {
        if self.capacity == 0 {
            return Err(ReplayBufferError::InvalidConfig(
                "capacity must be positive".into(),
            ));
        }
        if self.multistep_k == 0 {
            return Err(ReplayBufferError::InvalidConfig(
                "multistep_k must be positive".into(),
            ));
        }
        if self.staging_capacity < self.multistep_k {
            return Err(ReplayBufferError::InvalidConfig(format!(
                "staging_capacity ({}) must not be smaller than multistep_k ({})",
                self.staging_capacity, self.multistep_k
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ReplayBufferError::InvalidConfig(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        Ok(())
    }

    /// Loads [`MultiStepReplayBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MultiStepReplayBufferConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
