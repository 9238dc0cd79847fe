//! Small types used in tests and doc examples.
use crate::{
    multistep_replay_buffer::{BatchBase, MultiStepReplayBuffer},
    record::{Record, RecordValue},
    Act, Agent, Env, Obs, Policy, ReplayBufferBase, Step, ExperienceBufferBase,
};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::Path;

/// Rows of `f32` vectors implementing [`BatchBase`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VecBatch {
    rows: Vec<Vec<f32>>,
}

impl VecBatch {
    /// A batch of a single row.
    pub fn row(v: Vec<f32>) -> Self {
        Self { rows: vec![v] }
    }

    /// Rows in the batch.
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }
}

impl BatchBase for VecBatch {
    fn new(capacity: usize) -> Self {
        Self {
            rows: vec![vec![]; capacity],
        }
    }

    fn push(&mut self, ix: usize, data: Self) -> Result<()> {
        let capacity = self.rows.len();
        for (j, row) in data.rows.into_iter().enumerate() {
            self.rows[(ix + j) % capacity] = row;
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        Ok(Self {
            rows: ixs.iter().map(|&ix| self.rows[ix].clone()).collect(),
        })
    }
}

/// Observation of [`DummyEnv`], the number of steps taken in the episode.
#[derive(Clone, Debug, PartialEq)]
pub struct DummyObs(pub f32);

impl Obs for DummyObs {}

impl From<DummyObs> for VecBatch {
    fn from(obs: DummyObs) -> Self {
        VecBatch::row(vec![obs.0])
    }
}

/// Action of [`DummyEnv`].
#[derive(Clone, Debug, PartialEq)]
pub struct DummyAct(pub f32);

impl Act for DummyAct {}

impl From<DummyAct> for VecBatch {
    fn from(act: DummyAct) -> Self {
        VecBatch::row(vec![act.0])
    }
}

/// Configuration of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    /// Number of steps after which an episode ends.
    pub episode_len: usize,

    /// If `true` episodes end with a terminal state, otherwise with a time limit.
    pub terminates: bool,

    /// Horizon declared by the environment.
    pub max_episode_steps: Option<usize>,
}

/// A chain environment whose reward equals the action.
pub struct DummyEnv {
    config: DummyEnvConfig,
    t: usize,
    rng: StdRng,
}

impl Env for DummyEnv {
    type Config = DummyEnvConfig;
    type Obs = DummyObs;
    type Act = DummyAct;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            t: 0,
            rng: StdRng::seed_from_u64(seed as _),
        })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.t += 1;
        let is_end = self.t >= self.config.episode_len;
        let step = Step::new(
            DummyObs(self.t as f32),
            a.clone(),
            a.0,
            is_end && self.config.terminates,
            is_end && !self.config.terminates,
            (),
        );
        (step, Record::empty())
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.t = 0;
        Ok(DummyObs(0.0))
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset()
    }

    fn random_act(&mut self) -> Self::Act {
        DummyAct(self.rng.gen_range(-1.0..1.0))
    }

    fn max_episode_steps(&self) -> Option<usize> {
        self.config.max_episode_steps
    }
}

/// An agent that always takes action `1.0` and counts optimization steps.
pub struct DummyAgent {
    /// Number of records required before optimizing.
    pub batch_size: usize,

    /// Number of optimization steps done.
    pub n_opts: usize,

    train: bool,
}

impl DummyAgent {
    /// Creates the agent.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            n_opts: 0,
            train: true,
        }
    }
}

impl Policy<DummyEnv> for DummyAgent {
    fn sample(&mut self, _obs: &DummyObs) -> Result<DummyAct> {
        Ok(DummyAct(1.0))
    }
}

impl Agent<DummyEnv, MultiStepReplayBuffer<VecBatch, VecBatch>> for DummyAgent {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(
        &mut self,
        buffer: &mut MultiStepReplayBuffer<VecBatch, VecBatch>,
    ) -> Result<Option<Record>> {
        if buffer.len() < self.batch_size {
            return Ok(None);
        }
        let batch = buffer.batch(self.batch_size)?;
        self.n_opts += 1;
        let mean_reward = batch.reward.iter().sum::<f32>() / batch.reward.len() as f32;
        Ok(Some(Record::from_slice(&[
            ("mean_reward", RecordValue::Scalar(mean_reward)),
            ("n_opts", RecordValue::Scalar(self.n_opts as f32)),
        ])))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        std::fs::write(path.join("n_opts.txt"), self.n_opts.to_string())?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.n_opts = std::fs::read_to_string(path.join("n_opts.txt"))?
            .trim()
            .parse()?;
        Ok(())
    }
}
