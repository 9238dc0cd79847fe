//! Agent.
use super::{Env, Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;
use std::path::Path;

/// Represents a trainable policy on an environment.
pub trait Agent<E: Env, R: ReplayBufferBase>: Policy<E> {
    /// Set the policy to training mode.
    fn train(&mut self);

    /// Set the policy to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step.
    ///
    /// Returns `false` if the agent skipped the step, for example because
    /// the buffer does not hold enough records yet.
    fn opt(&mut self, buffer: &mut R) -> Result<bool> {
        Ok(self.opt_with_record(buffer)?.is_some())
    }

    /// Performs an optimization step and returns some information.
    ///
    /// `Ok(None)` means that the step was skipped.
    /// Numerical failures during the update are returned as errors.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Option<Record>>;

    /// Save the parameters of the agent in the given directory.
    /// This method commonly creates a number of files consisting the agent
    /// in the directory. For example, the SAC agent in `border_candle_agent` crate saves
    /// the policy, the Q-networks and their target networks.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Load the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
