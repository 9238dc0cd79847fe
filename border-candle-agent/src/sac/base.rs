use super::{check_step_counts, multistep_target, EntCoef, SacConfig, SacError};
use crate::{
    model::{SubModel1, SubModel2},
    util::{
        actor::GaussianActor,
        critic::{Critic, CriticMode},
        insert_stats, not_terminated, reward, OutDim,
    },
    TensorBatch,
};
use anyhow::{Context, Result};
use border_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};
use candle_core::{Device, Tensor};
use candle_nn::loss::mse;
use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use std::{convert::TryFrom, fmt::Debug, fs, marker::PhantomData, path::Path};

type ActionValue = Tensor;
type ActMean = Tensor;
type ActLogStd = Tensor;

/// Returns the value of a scalar loss, or an error if it is not finite.
fn checked(name: &'static str, loss: &Tensor) -> Result<f32> {
    let value = loss.to_scalar::<f32>()?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SacError::NonFiniteLoss { name, value }.into())
    }
}

/// Multi-step soft actor critic (SAC) agent.
///
/// An update consumes a batch of k-step transitions and runs, in this order:
///
/// 1. the target `y` without gradient,
/// 2. a step on `Q1` with `mse(Q1(s, a), y)`,
/// 3. a step on `Q2` with `mse(Q2(s, a), y)`,
/// 4. a step on the policy with `mean(alpha * log pi(a~|s) - Q(s, a~))`,
/// 5. a step on `log(alpha)` if it is tuned automatically,
/// 6. polyak averaging of the target networks.
///
/// A loss that is not finite aborts the update with [`SacError::NonFiniteLoss`].
/// A batch whose records were built with another number of steps is rejected
/// with [`SacError::StepCountMismatch`]; use [`SacConfig::replay_buffer_config`]
/// to configure the buffer consistently.
pub struct Sac<E, Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActLogStd)>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    critic: Critic<Q>,
    actor: GaussianActor<P>,
    gamma: f64,
    multistep_k: usize,
    ent_coef: EntCoef,
    critic_mode: CriticMode,
    batch_size: usize,
    train: bool,
    n_opts: usize,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActLogStd)>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    E::Obs: Into<TensorBatch>,
    E::Act: Into<TensorBatch> + From<Vec<f32>>,
{
    /// Discount factor.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Number of steps of the transitions the agent learns from.
    pub fn multistep_k(&self) -> usize {
        self.multistep_k
    }

    /// Number of updates so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Samples an action, from the squashed Gaussian if `stochastic` is `true`
    /// or as `limit * tanh(mean)` otherwise.
    pub fn sample_action(&self, obs: &E::Obs, stochastic: bool) -> Result<E::Act> {
        let obs: TensorBatch = obs.clone().into();
        let obs = obs.to_tensor(&self.device)?;
        let act = match stochastic {
            true => self.actor.sample(&obs)?.0,
            false => self.actor.deterministic_action(&obs)?,
        };
        let row = act
            .to_vec2::<f32>()?
            .into_iter()
            .next()
            .context("The actor returned no action")?;
        Ok(row.into())
    }

    /// Returns the action values of the online critic for rows of observations
    /// and actions, combined as in the policy loss.
    pub fn action_values(&self, obs: &TensorBatch, act: &TensorBatch) -> Result<Vec<f32>> {
        let obs = obs.to_tensor(&self.device)?;
        let act = act.to_tensor(&self.device)?;
        let q = self.critic.qval(&obs, &act, self.critic_mode)?;
        Ok(q.to_vec1::<f32>()?)
    }

    /// Runs an update on a batch of k-step transitions.
    fn update<B>(&mut self, batch: B) -> Result<Record>
    where
        B: TransitionBatch<ObsBatch = TensorBatch, ActBatch = TensorBatch>,
    {
        let (obs, act, next_obs, reward_k, is_terminated, n_steps, _) = batch.unpack();
        check_step_counts(&n_steps, &is_terminated, self.multistep_k)?;
        let obs = obs.to_tensor(&self.device)?;
        let act = act.to_tensor(&self.device)?;
        let next_obs = next_obs.to_tensor(&self.device)?;
        let reward_k = reward(&reward_k, &self.device)?;
        let not_done = not_terminated(&is_terminated, &self.device)?;
        let alpha = self.ent_coef.alpha_value()? as f64;

        trace!("Target");
        let tgt = {
            let (next_act, next_logp) = self.actor.sample(&next_obs)?;
            let next_q = self
                .critic
                .qval_tgt(&next_obs, &next_act, self.critic_mode)?;
            multistep_target(
                &reward_k,
                &not_done,
                &next_q,
                &next_logp,
                alpha,
                self.gamma,
                self.multistep_k,
            )?
        };

        trace!("Action-value functions");
        let qs = self.critic.qvals(&obs, &act)?;
        let names = ["loss_q1", "loss_q2"];
        let mut loss_qs = vec![];
        for (ix, q) in qs.iter().enumerate() {
            let loss = mse(q, &tgt)?;
            loss_qs.push(checked(names[ix], &loss)?);
            self.critic.backward_step(ix, &loss)?;
        }

        trace!("Policy");
        let (act_new, logp) = self.actor.sample(&obs)?;
        let loss_policy = {
            let q = self.critic.qval(&obs, &act_new, self.critic_mode)?;
            ((logp.clone() * alpha)? - q)?.mean_all()?
        };
        let loss_policy_value = checked("loss_policy", &loss_policy)?;
        self.actor.backward_step(&loss_policy)?;

        trace!("Entropy coefficient");
        let loss_alpha = match self.ent_coef.loss(&logp)? {
            Some(loss) => {
                let value = checked("loss_alpha", &loss)?;
                self.ent_coef.backward_step(&loss)?;
                value
            }
            None => 0.0,
        };

        trace!("Target networks");
        self.critic.soft_update()?;

        let mut record = Record::from_slice(&[
            ("loss_policy", RecordValue::Scalar(loss_policy_value)),
            ("loss_q1", RecordValue::Scalar(loss_qs[0])),
            ("loss_q2", RecordValue::Scalar(loss_qs[1])),
            ("loss_alpha", RecordValue::Scalar(loss_alpha)),
            ("alpha", RecordValue::Scalar(self.ent_coef.alpha_value()?)),
        ]);
        insert_stats(&mut record, "q1", &qs[0])?;
        insert_stats(&mut record, "q2", &qs[1])?;
        insert_stats(&mut record, "logp", &logp)?;

        Ok(record)
    }
}

impl<E, Q, P, R> Policy<E> for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActLogStd)>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    E::Obs: Into<TensorBatch>,
    E::Act: Into<TensorBatch> + From<Vec<f32>>,
{
    /// Samples a stochastic action in training mode, the deterministic one otherwise.
    fn sample(&mut self, obs: &E::Obs) -> Result<E::Act> {
        self.sample_action(obs, self.train)
    }
}

impl<E, Q, P, R> Configurable<E> for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActLogStd)>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    type Config = SacConfig<Q, P>;

    /// Constructs [`Sac`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device = candle_core::Device::try_from(
            config
                .device
                .context("No device is given for SAC agent")?,
        )?;
        let mut actor = GaussianActor::build(config.actor_config, device.clone())?;
        let mut critic = Critic::build(config.critic_config, device.clone())?;
        let mut ent_coef = EntCoef::new(config.ent_coef_mode, actor.out_dim(), device.clone())?;
        actor.set_grad_clip(config.grad_clip);
        critic.set_grad_clip(config.grad_clip);
        ent_coef.set_grad_clip(config.grad_clip);

        Ok(Sac {
            critic,
            actor,
            gamma: config.gamma,
            multistep_k: config.multistep_k,
            ent_coef,
            critic_mode: config.critic_mode,
            batch_size: config.batch_size,
            train: false,
            n_opts: 0,
            device,
            phantom: PhantomData,
        })
    }
}

impl<E, Q, P, R> Agent<E, R> for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActLogStd)>,
    R: ReplayBufferBase + ExperienceBufferBase,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    E::Obs: Into<TensorBatch>,
    E::Act: Into<TensorBatch> + From<Vec<f32>>,
    R::Batch: TransitionBatch<ObsBatch = TensorBatch, ActBatch = TensorBatch>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Option<Record>> {
        if buffer.len() < self.batch_size {
            return Ok(None);
        }
        let batch = buffer.batch(self.batch_size)?;
        let record = self.update(batch)?;
        self.n_opts += 1;
        Ok(Some(record))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.actor.save(path.join("actor"))?;
        self.critic.save(path)?;
        self.ent_coef.save(path.join("ent_coef.safetensors"))?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor.load(path.join("actor"))?;
        self.critic.load(path)?;
        self.ent_coef.load(path.join("ent_coef.safetensors"))?;
        Ok(())
    }
}
