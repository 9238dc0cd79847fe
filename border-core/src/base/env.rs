//! Environment.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// Represents an environment, typically an MDP.
///
/// An episode ends either by reaching a terminal state, signalled with
/// [`Step::is_terminated`], or by a time limit, signalled with
/// [`Step::is_truncated`]. The two are treated differently when building
/// multi-step transitions, so implementations must not conflate them.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Performes an environment step.
    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Resets the environment with a given index.
    ///
    /// The index is used in an arbitrary way. For example, it can be used as a random seed,
    /// which is useful when evaluation of a trained agent. Actually, this method is called
    /// in [`DefaultEvaluator`] for evaluation.
    ///
    /// [`DefaultEvaluator`]: crate::DefaultEvaluator
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs>;

    /// Samples an action uniformly from the action space.
    ///
    /// [`Trainer`](crate::Trainer) uses this during the warmup period.
    fn random_act(&mut self) -> Self::Act;

    /// The maximum number of steps in an episode, if the environment declares one.
    fn max_episode_steps(&self) -> Option<usize> {
        None
    }
}
