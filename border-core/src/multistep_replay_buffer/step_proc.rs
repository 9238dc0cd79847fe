//! Conversion of environment steps into items of the multi-step replay buffer.
use super::{BatchBase, MultiStepTransition, Transition};
use crate::{Env, Step, StepProcessor};
use anyhow::{anyhow, Result};
use std::marker::PhantomData;

/// Configuration of [`MultiStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct MultiStepProcessorConfig {}

/// Builds [`MultiStepTransition`]s from [`Step`]s of a non-vectorized environment.
///
/// The processor keeps the previous observation to form `(o_t, a_t, o_t+1)`.
/// Only the terminal flag of the step is stored; truncation is conveyed by the
/// episode position, see
/// [`MultiStepReplayBuffer::store`](super::MultiStepReplayBuffer::store).
pub struct MultiStepProcessor<E, O, A> {
    prev_obs: Option<O>,
    phantom: PhantomData<(E, A)>,
}

impl<E, O, A> StepProcessor<E> for MultiStepProcessor<E, O, A>
where
    E: Env,
    O: BatchBase + From<E::Obs>,
    A: BatchBase + From<E::Act>,
{
    type Config = MultiStepProcessorConfig;
    type Output = MultiStepTransition<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    fn reset(&mut self, init_obs: E::Obs) {
        self.prev_obs = Some(init_obs.into());
    }

    fn process(
        &mut self,
        step: Step<E>,
        episode_len: usize,
        max_episode_len: usize,
    ) -> Result<Self::Output> {
        let next_obs = step.obs.clone().into();
        let obs = self
            .prev_obs
            .replace(step.obs.into())
            .ok_or_else(|| anyhow!("prev_obs is not set. Forgot to call reset()?"))?;

        Ok(MultiStepTransition {
            transition: Transition {
                obs,
                act: step.act.into(),
                next_obs,
                reward: step.reward,
                is_terminated: step.is_terminated,
            },
            episode_len,
            max_episode_len,
        })
    }
}
