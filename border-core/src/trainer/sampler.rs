//! Interaction with the training environment.
use crate::{
    record::{Record, RecordValue},
    Env, ExperienceBufferBase, Policy, StepProcessor,
};
use anyhow::Result;
use log::trace;

/// Runs the training environment one step at a time and feeds a buffer.
///
/// The sampler owns the environment and keeps track of the running episode.
/// When the episode reaches the horizon it is treated as a truncation: the terminal
/// flag of the step is cleared, since the episode was cut off rather than finished.
/// The horizon is the smaller of the configured one and the one declared by the
/// environment.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
    max_episode_steps: usize,
    episode_len: usize,
    episode_return: f32,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a new sampler.
    pub fn new(env: E, step_processor: P, max_episode_steps: usize) -> Self {
        let max_episode_steps = match env.max_episode_steps() {
            Some(n) => n.min(max_episode_steps),
            None => max_episode_steps,
        };
        Self {
            env,
            prev_obs: None,
            step_processor,
            max_episode_steps,
            episode_len: 0,
            episode_return: 0.0,
        }
    }

    /// The horizon of episodes.
    pub fn max_episode_steps(&self) -> usize {
        self.max_episode_steps
    }

    /// Takes an action, steps the environment and pushes the transition into `buffer`.
    ///
    /// If `random` is `true`, the action is drawn with [`Env::random_act`] instead of
    /// the policy. When an episode ends, the returned record contains
    /// `episode_return` and `episode_length`, and the environment is reset before the
    /// next step.
    pub fn sample_and_push<A, R>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        random: bool,
    ) -> Result<Record>
    where
        A: Policy<E>,
        R: ExperienceBufferBase<Item = P::Output>,
    {
        let obs = match self.prev_obs.take() {
            Some(obs) => obs,
            None => {
                let obs = self.env.reset()?;
                self.step_processor.reset(obs.clone());
                self.episode_len = 0;
                self.episode_return = 0.0;
                obs
            }
        };

        let act = match random {
            true => self.env.random_act(),
            false => agent.sample(&obs)?,
        };
        let (mut step, mut record) = self.env.step(&act);
        self.episode_len += 1;
        self.episode_return += step.reward;

        if self.episode_len >= self.max_episode_steps {
            step.is_terminated = false;
            step.is_truncated = true;
        }
        let max_episode_len = match step.is_truncated {
            true => self.episode_len,
            false => self.max_episode_steps,
        };

        let is_done = step.is_done();
        let next_obs = step.obs.clone();
        let item = self
            .step_processor
            .process(step, self.episode_len, max_episode_len)?;
        buffer.push(item)?;

        if is_done {
            trace!(
                "Episode ended: length = {}, return = {}",
                self.episode_len,
                self.episode_return
            );
            record.insert("episode_return", RecordValue::Scalar(self.episode_return));
            record.insert("episode_length", RecordValue::Scalar(self.episode_len as f32));
        } else {
            self.prev_obs = Some(next_obs);
        }

        Ok(record)
    }
}
