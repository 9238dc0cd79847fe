//! Default implementation of the [`Evaluator`] trait.
use super::Evaluator;
use crate::{
    record::{Record, RecordValue},
    Env, Policy,
};
use anyhow::Result;

/// Runs a fixed number of episodes and reports the average return and length.
///
/// Each episode starts with [`Env::reset_with_index`] and runs until the episode
/// terminates, is truncated by the environment, or reaches the horizon. The
/// horizon is the smaller of the one given with
/// [`DefaultEvaluator::max_episode_steps`] and the one declared by the environment.
///
/// The results are recorded as `eval_return` and `eval_length`.
///
/// # Examples
///
/// ```ignore
/// let mut evaluator = DefaultEvaluator::new(&env_config, 42, 1)?.max_episode_steps(1000);
/// let record = evaluator.evaluate(&mut agent)?;
/// println!("Average return: {}", record.get_scalar("eval_return")?);
/// ```
pub struct DefaultEvaluator<E: Env> {
    n_episodes: usize,
    max_episode_steps: Option<usize>,
    env: E,
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`].
    ///
    /// * `config` - Configuration for the environment
    /// * `seed` - Random seed for environment initialization
    /// * `n_episodes` - Number of episodes to run during evaluation
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        Ok(Self {
            n_episodes,
            max_episode_steps: None,
            env: E::build(config, seed)?,
        })
    }

    /// Sets the maximum number of steps in an episode.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = Some(v);
        self
    }

    fn horizon(&self) -> usize {
        match (self.max_episode_steps, self.env.max_episode_steps()) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => usize::MAX,
        }
    }
}

impl<E, P> Evaluator<E, P> for DefaultEvaluator<E>
where
    E: Env,
    P: Policy<E>,
{
    fn evaluate(&mut self, policy: &mut P) -> Result<Record> {
        let horizon = self.horizon();
        let mut r_total = 0f32;
        let mut len_total = 0usize;

        for ix in 0..self.n_episodes {
            let mut prev_obs = self.env.reset_with_index(ix)?;
            let mut episode_len = 0;

            loop {
                let act = policy.sample(&prev_obs)?;
                let (step, _) = self.env.step(&act);
                r_total += step.reward;
                episode_len += 1;
                if step.is_done() || episode_len >= horizon {
                    break;
                }
                prev_obs = step.obs;
            }
            len_total += episode_len;
        }

        let n = self.n_episodes.max(1) as f32;
        Ok(Record::from_slice(&[
            ("eval_return", RecordValue::Scalar(r_total / n)),
            ("eval_length", RecordValue::Scalar(len_total as f32 / n)),
        ]))
    }
}
