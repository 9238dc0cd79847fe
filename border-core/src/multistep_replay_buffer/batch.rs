//! Rows stored in and sampled from the multi-step replay buffer.
use crate::TransitionBatch;
use anyhow::Result;

/// Storage of rows of observations or actions.
///
/// An implementation is a fixed-capacity array of rows, like a tensor whose first
/// dimension is the capacity. A value holding a few rows, typically one, is pushed
/// into the storage or sampled from it.
///
/// # Examples
///
/// ```ignore
/// struct Rows(Vec<Vec<f32>>);
///
/// impl BatchBase for Rows {
///     fn new(capacity: usize) -> Self {
///         Self(vec![vec![]; capacity])
///     }
///
///     fn push(&mut self, ix: usize, data: Self) -> Result<()> {
///         for (j, row) in data.0.into_iter().enumerate() {
///             let len = self.0.len();
///             self.0[(ix + j) % len] = row;
///         }
///         Ok(())
///     }
///
///     fn sample(&self, ixs: &[usize]) -> Result<Self> {
///         Ok(Self(ixs.iter().map(|&ix| self.0[ix].clone()).collect()))
///     }
/// }
/// ```
pub trait BatchBase {
    /// Creates a storage of `capacity` rows.
    fn new(capacity: usize) -> Self;

    /// Writes the rows in `data` starting at `ix`, wrapping at the capacity.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Gathers the rows at `ixs`.
    fn sample(&self, ixs: &[usize]) -> Result<Self>
    where
        Self: Sized;
}

/// A single-step transition `(o_t, a_t, o_t+1, r_t, d_t)`.
///
/// `obs`, `act` and `next_obs` hold exactly one row.
#[derive(Clone, Debug)]
pub struct Transition<O, A> {
    /// Observation before the action.
    pub obs: O,

    /// Action.
    pub act: A,

    /// Observation after the action.
    pub next_obs: O,

    /// Reward.
    pub reward: f32,

    /// If the episode reached a terminal state at this step.
    pub is_terminated: bool,
}

/// A transition together with the position of the step in its episode.
///
/// This is the item pushed into
/// [`MultiStepReplayBuffer`](super::MultiStepReplayBuffer) through
/// [`ExperienceBufferBase::push`](crate::ExperienceBufferBase::push).
#[derive(Clone, Debug)]
pub struct MultiStepTransition<O, A> {
    /// The transition.
    pub transition: Transition<O, A>,

    /// Length of the episode including this step.
    pub episode_len: usize,

    /// Horizon of the episode.
    pub max_episode_len: usize,
}

/// A batch of k-step transitions.
#[derive(Debug)]
pub struct MultiStepBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations at the first step of each window.
    pub obs: O,

    /// Actions at the first step of each window.
    pub act: A,

    /// Observations after the last step of each window.
    pub next_obs: O,

    /// Discounted sums of rewards in each window.
    pub reward: Vec<f32>,

    /// `1` if the episode terminated inside the window.
    pub is_terminated: Vec<i8>,

    /// Number of raw steps in each window.
    pub n_steps: Vec<usize>,

    /// Indices of sampled records.
    pub ix_sample: Option<Vec<usize>>,
}

impl<O, A> TransitionBatch for MultiStepBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<usize>,
        Option<Vec<usize>>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.n_steps,
            self.ix_sample,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Self::ActBatch {
        &self.act
    }
}
