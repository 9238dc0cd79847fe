//! Estimation of the bias of the action-value functions.
use super::Sac;
use crate::{
    model::{SubModel1, SubModel2},
    util::OutDim,
    TensorBatch,
};
use anyhow::Result;
use border_core::{
    multistep_replay_buffer::BatchBase,
    record::{Record, RecordValue},
    Env, Evaluator,
};
use candle_core::Tensor;
use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Estimates how much the critic overestimates returns.
///
/// It runs an episode with the stochastic policy and compares, for the first
/// `fraction` of its steps, the action value `Q(s_t, a_t)` with the discounted
/// Monte-Carlo return `sum_i gamma^i r_(t+i)` to the end of the episode. The
/// last steps are skipped because their returns are cut by the horizon. The
/// mean of the differences is recorded as `q_bias`.
pub struct QBiasEvaluator<E: Env> {
    env: E,
    gamma: f64,
    fraction: f64,
    max_episode_steps: Option<usize>,
}

impl<E: Env> QBiasEvaluator<E> {
    /// Constructs an evaluator on a dedicated environment.
    pub fn new(config: &E::Config, seed: i64, gamma: f64) -> Result<Self> {
        Ok(Self {
            env: E::build(config, seed)?,
            gamma,
            fraction: 0.8,
            max_episode_steps: None,
        })
    }

    /// Sets the fraction of the steps of the episode used for the estimate.
    pub fn fraction(mut self, v: f64) -> Self {
        self.fraction = v;
        self
    }

    /// Sets the horizon of the episode. The one of the environment wins if it is shorter.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = Some(v);
        self
    }

    fn horizon(&self) -> usize {
        match (self.max_episode_steps, self.env.max_episode_steps()) {
            (Some(n1), Some(n2)) => n1.min(n2),
            (Some(n), None) | (None, Some(n)) => n,
            (None, None) => usize::MAX,
        }
    }
}

/// Returns the discounted return from each step to the end.
pub(crate) fn discounted_returns(rewards: &[f32], gamma: f64) -> Vec<f64> {
    let mut returns = vec![0f64; rewards.len()];
    let mut acc = 0f64;
    for (i, r) in rewards.iter().enumerate().rev() {
        acc = *r as f64 + gamma * acc;
        returns[i] = acc;
    }
    returns
}

impl<E, Q, P, R> Evaluator<E, Sac<E, Q, P, R>> for QBiasEvaluator<E>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    E::Obs: Into<TensorBatch>,
    E::Act: Into<TensorBatch> + From<Vec<f32>>,
{
    fn evaluate(&mut self, agent: &mut Sac<E, Q, P, R>) -> Result<Record> {
        let horizon = self.horizon();
        let mut trajectory = vec![];
        let mut prev_obs = self.env.reset()?;

        loop {
            let act = agent.sample_action(&prev_obs, true)?;
            let (step, _) = self.env.step(&act);
            let done = step.is_done();
            trajectory.push((prev_obs, act, step.reward));
            prev_obs = step.obs;
            if done || trajectory.len() >= horizon {
                break;
            }
        }

        let n = (trajectory.len() as f64 * self.fraction) as usize;
        if n == 0 {
            warn!("Episode of {} steps is too short for q_bias", trajectory.len());
            return Ok(Record::empty());
        }

        let rewards = trajectory.iter().map(|t| t.2).collect::<Vec<_>>();
        let returns = discounted_returns(&rewards, self.gamma);

        let mut obs = TensorBatch::new(n);
        let mut act = TensorBatch::new(n);
        for (i, (o, a, _)) in trajectory.into_iter().take(n).enumerate() {
            obs.push(i, o.into())?;
            act.push(i, a.into())?;
        }
        let qs = agent.action_values(&obs, &act)?;

        let bias = qs
            .iter()
            .zip(returns.iter())
            .map(|(q, g)| *q as f64 - g)
            .sum::<f64>()
            / n as f64;
        info!("q_bias = {} over {} steps", bias, n);

        Ok(Record::from_scalar("q_bias", bias as f32))
    }
}
