//! Configuration of SAC agent.
use crate::{
    model::{SubModel1, SubModel2},
    sac::ent_coef::EntCoefMode,
    util::{
        actor::GaussianActorConfig,
        critic::{CriticConfig, CriticMode},
        OutDim,
    },
    Device,
};
use anyhow::Result;
use border_core::multistep_replay_buffer::MultiStepReplayBufferConfig;
use candle_core::Tensor;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Sac`](super::Sac).
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(bound(
    serialize = "Q::Config: Serialize, P::Config: Serialize",
    deserialize = "Q::Config: DeserializeOwned, P::Config: DeserializeOwned"
))]
pub struct SacConfig<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    /// Configuration of the actor model.
    pub actor_config: GaussianActorConfig<P::Config>,

    /// Configuration of the critic model.
    pub critic_config: CriticConfig<Q::Config>,

    /// Discount factor.
    pub gamma: f64,

    /// Number of steps of the transitions in the replay buffer.
    pub multistep_k: usize,

    /// How to update entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// How the two action values are combined.
    pub critic_mode: CriticMode,

    /// Batch size for training. Updates are skipped until the replay buffer
    /// holds this many records.
    pub batch_size: usize,

    /// Maximum L2 norm of the gradients of each network and of `log(alpha)`.
    /// No clipping if `None`.
    #[serde(default)]
    pub grad_clip: Option<f64>,

    /// Device for actor/critic models.
    pub device: Option<Device>,
}

impl<Q, P> Clone for SacConfig<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            actor_config: self.actor_config.clone(),
            critic_config: self.critic_config.clone(),
            gamma: self.gamma,
            multistep_k: self.multistep_k,
            ent_coef_mode: self.ent_coef_mode.clone(),
            critic_mode: self.critic_mode,
            batch_size: self.batch_size,
            grad_clip: self.grad_clip,
            device: self.device,
        }
    }
}

impl<Q, P> Default for SacConfig<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            multistep_k: 1,
            ent_coef_mode: EntCoefMode::default(),
            critic_mode: CriticMode::Double,
            batch_size: 256,
            grad_clip: None,
            device: None,
        }
    }
}

impl<Q, P> SacConfig<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Number of steps of the transitions.
    pub fn multistep_k(mut self, v: usize) -> Self {
        self.multistep_k = v;
        self
    }

    /// SAC-alpha.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Single or double action-value estimate.
    pub fn critic_mode(mut self, v: CriticMode) -> Self {
        self.critic_mode = v;
        self
    }

    /// Configuration of actor.
    pub fn actor_config(mut self, actor_config: GaussianActorConfig<P::Config>) -> Self {
        self.actor_config = actor_config;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, critic_config: CriticConfig<Q::Config>) -> Self {
        self.critic_config = critic_config;
        self
    }

    /// Clips the norm of the gradients at `v`.
    pub fn grad_clip(mut self, v: f64) -> Self {
        self.grad_clip = Some(v);
        self
    }

    /// Returns a configuration of the replay buffer with the same number of steps
    /// and discount factor as the agent.
    pub fn replay_buffer_config(&self) -> MultiStepReplayBufferConfig {
        MultiStepReplayBufferConfig::default()
            .multistep_k(self.multistep_k)
            .gamma(self.gamma as f32)
    }

    /// Device.
    pub fn device(mut self, device: candle_core::Device) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Constructs [`SacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of SAC agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`SacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of SAC agent into {:?}", path_);
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp, Mlp2, MlpConfig};
    use tempdir::TempDir;

    #[test]
    fn test_serde_sac_config() -> Result<()> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(3, vec![256, 256], 1, false))
            .action_limit(2.0);
        let critic_config = CriticConfig::default()
            .q_config(MlpConfig::new(4, vec![256, 256], 1, false))
            .polyak(0.99);
        let config = SacConfig::<Mlp, Mlp2>::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .multistep_k(3)
            .critic_mode(CriticMode::Single)
            .ent_coef_mode(EntCoefMode::Fix(0.2))
            .grad_clip(1.0)
            .device(candle_core::Device::Cpu);

        let dir = TempDir::new("sac_config")?;
        let path = dir.path().join("sac_config.yaml");
        config.save(&path)?;
        let config_ = SacConfig::<Mlp, Mlp2>::load(&path)?;
        assert_eq!(config_.multistep_k, 3);
        assert_eq!(config_.critic_mode, CriticMode::Single);
        assert_eq!(config_.grad_clip, Some(1.0));
        assert_eq!(config_.actor_config, config.actor_config);
        assert_eq!(config_.critic_config, config.critic_config);
        assert_eq!(
            serde_yaml::to_string(&config)?,
            serde_yaml::to_string(&config_)?
        );
        Ok(())
    }

    #[test]
    fn test_replay_buffer_config_follows_agent() {
        let config = SacConfig::<Mlp, Mlp2>::default()
            .multistep_k(4)
            .discount_factor(0.95);
        let buffer_config = config.replay_buffer_config().capacity(1000);
        assert_eq!(buffer_config.multistep_k, 4);
        assert_eq!(buffer_config.gamma, 0.95f32);
        assert_eq!(buffer_config.capacity, 1000);
        assert!(buffer_config.validate().is_ok());
        assert_eq!(SacConfig::<Mlp, Mlp2>::default().grad_clip, None);
    }
}
