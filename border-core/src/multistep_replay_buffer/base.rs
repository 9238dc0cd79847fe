//! Multi-step replay buffer.
use super::{
    discounted_sum, BatchBase, MultiStepBatch, MultiStepReplayBufferConfig, MultiStepTransition,
    StagedWindow, StagingRing, Transition,
};
use crate::{error::ReplayBufferError, ExperienceBufferBase, ReplayBufferBase};
use anyhow::Result;
use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A replay buffer of discounted k-step transitions.
///
/// Single-step transitions are first written into a [`StagingRing`]. Depending on
/// the position of the step in its episode, [`MultiStepReplayBuffer::store`]
/// promotes zero, one or several windows of the staging ring into the final storage,
/// which is a circular array with FIFO eviction.
///
/// A record consists of the observation and action of the first step in the window,
/// the discounted sum of rewards in the window, and the next observation and terminal
/// flag of the last step in the window.
///
/// # Type Parameters
///
/// * `O` - Storage of observations, must implement [`BatchBase`]
/// * `A` - Storage of actions, must implement [`BatchBase`]
pub struct MultiStepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Maximum number of records.
    capacity: usize,

    /// Next slot to be written.
    i: usize,

    /// Number of valid records.
    size: usize,

    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    n_steps: Vec<usize>,

    /// Raw transitions of the running episode.
    staging: StagingRing<O, A>,

    multistep_k: usize,
    gamma: f32,
    rng: StdRng,
}

impl<O, A> MultiStepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates an empty buffer.
    ///
    /// Fails if the configuration does not pass
    /// [`MultiStepReplayBufferConfig::validate`].
    pub fn new(config: &MultiStepReplayBufferConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity;

        Ok(Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            n_steps: vec![0; capacity],
            staging: StagingRing::new(config.staging_capacity),
            multistep_k: config.multistep_k,
            gamma: config.gamma,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Stores a single-step transition and promotes the windows that became complete.
    ///
    /// `episode_len` is the length of the episode including this transition and
    /// `max_episode_len` is the horizon of the episode. Returns the number of
    /// records promoted into the buffer.
    ///
    /// The rules are checked in this order:
    ///
    /// 1. `episode_len == max_episode_len`: the episode was cut off by the time limit,
    ///    nothing is promoted even if the transition is terminal.
    /// 2. `is_terminated`: the `min(k, episode_len)` windows ending at this step are
    ///    promoted, longest first.
    /// 3. `episode_len >= k`: the window of the last `k` steps is promoted.
    /// 4. Otherwise the episode is too short yet and nothing is promoted.
    pub fn store(
        &mut self,
        tr: Transition<O, A>,
        episode_len: usize,
        max_episode_len: usize,
    ) -> Result<usize> {
        let is_terminated = tr.is_terminated;
        self.staging.push(tr)?;

        if episode_len == max_episode_len {
            trace!("Episode truncated at {} steps", episode_len);
            Ok(0)
        } else if is_terminated {
            let m = self.multistep_k.min(episode_len);
            for n_steps in (1..=m).rev() {
                let window = self.staging.window(n_steps)?;
                self.promote(window)?;
            }
            debug!("Episode terminated at {} steps, flushed {} records", episode_len, m);
            Ok(m)
        } else if episode_len >= self.multistep_k {
            let window = self.staging.window(self.multistep_k)?;
            self.promote(window)?;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn promote(&mut self, window: StagedWindow<O, A>) -> Result<()> {
        let StagedWindow {
            obs,
            act,
            rewards,
            next_obs,
            is_terminated,
        } = window;

        self.obs.push(self.i, obs)?;
        self.act.push(self.i, act)?;
        self.next_obs.push(self.i, next_obs)?;
        self.reward[self.i] = discounted_sum(&rewards, self.gamma);
        self.is_terminated[self.i] = is_terminated as i8;
        self.n_steps[self.i] = rewards.len();

        self.i = (self.i + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    /// Samples `batch_size` records uniformly with replacement.
    pub fn sample_batch(&mut self, batch_size: usize) -> Result<MultiStepBatch<O, A>> {
        if self.size == 0 {
            return Err(ReplayBufferError::Empty.into());
        }
        let ixs = (0..batch_size)
            .map(|_| self.rng.gen_range(0..self.size))
            .collect::<Vec<_>>();
        self.sample_with_indices(&ixs)
    }

    /// Returns the records at the given indices.
    ///
    /// Every index must be smaller than [`MultiStepReplayBuffer::len`].
    pub fn sample_with_indices(&self, ixs: &[usize]) -> Result<MultiStepBatch<O, A>> {
        if let Some(&index) = ixs.iter().find(|&&ix| ix >= self.size) {
            return Err(ReplayBufferError::IndexOutOfRange {
                index,
                size: self.size,
            }
            .into());
        }

        Ok(MultiStepBatch {
            obs: self.obs.sample(ixs)?,
            act: self.act.sample(ixs)?,
            next_obs: self.next_obs.sample(ixs)?,
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_terminated: ixs.iter().map(|&ix| self.is_terminated[ix]).collect(),
            n_steps: ixs.iter().map(|&ix| self.n_steps[ix]).collect(),
            ix_sample: Some(ixs.to_vec()),
        })
    }

    /// Returns all valid records, oldest first.
    pub fn snapshot_all(&self) -> Result<MultiStepBatch<O, A>> {
        let ixs: Vec<usize> = if self.size < self.capacity {
            (0..self.size).collect()
        } else {
            (self.i..self.capacity).chain(0..self.i).collect()
        };
        if ixs.is_empty() {
            return Ok(MultiStepBatch {
                obs: O::new(0),
                act: A::new(0),
                next_obs: O::new(0),
                reward: vec![],
                is_terminated: vec![],
                n_steps: vec![],
                ix_sample: None,
            });
        }
        self.sample_with_indices(&ixs)
    }

    /// Capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum number of raw steps in a record.
    pub fn multistep_k(&self) -> usize {
        self.multistep_k
    }

    /// Discount factor used for the rewards in a window.
    pub fn discount_factor(&self) -> f32 {
        self.gamma
    }

    /// The staging ring.
    pub fn staging(&self) -> &StagingRing<O, A> {
        &self.staging
    }
}

impl<O, A> ExperienceBufferBase for MultiStepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = MultiStepTransition<O, A>;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let MultiStepTransition {
            transition,
            episode_len,
            max_episode_len,
        } = tr;
        self.store(transition, episode_len, max_episode_len)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl<O, A> ReplayBufferBase for MultiStepReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = MultiStepReplayBufferConfig;
    type Batch = MultiStepBatch<O, A>;

    fn build(config: &Self::Config) -> Result<Self> {
        Self::new(config)
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        self.sample_batch(size)
    }
}
