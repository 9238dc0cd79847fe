//! Actor with tanh-squashed Gaussian policy.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::OutDim,
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// `0.5 * ln(2 * pi)`.
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

/// Added inside the log of the tanh Jacobian.
const EPS_JACOBIAN: f64 = 1e-6;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`].
pub struct GaussianActorConfig<P: OutDim> {
    /// Configuration of the policy network.
    pub policy_config: Option<P>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Lower bound of the log standard deviation.
    pub min_log_std: f64,

    /// Upper bound of the log standard deviation.
    pub max_log_std: f64,

    /// Actions are scaled into `[-action_limit, action_limit]`.
    pub action_limit: f64,
}

impl<P: OutDim> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            policy_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            min_log_std: -20.0,
            max_log_std: 2.0,
            action_limit: 1.0,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    /// Sets the bound of actions.
    pub fn action_limit(mut self, v: f64) -> Self {
        self.action_limit = v;
        self
    }

    /// Sets configurations for policy function.
    pub fn policy_config(mut self, v: P) -> Self {
        self.policy_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: usize) -> Self {
        if let Some(policy_config) = &mut self.policy_config {
            policy_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Loads [`GaussianActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Actor with tanh-squashed Gaussian policy.
///
/// Given an observation, the policy network outputs the mean `mu` and the log
/// standard deviation of a Gaussian. An action is `limit * tanh(u)` with
/// `u ~ N(mu, std)`, and its log density is
///
/// ```text
/// log pi(a|s) = sum_j [ log N(u_j; mu_j, std_j) - ln(1 - tanh(u_j)^2 + 1e-6) ]
/// ```
///
/// The constant `ln(limit)` of the scaling is not included.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,

    // Dimension of the action vector.
    out_dim: usize,

    policy: P,
    opt: Optimizer,

    min_log_std: f64,
    max_log_std: f64,
    action_limit: f64,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: Device) -> Result<Self> {
        let policy_config = config.policy_config.context("policy_config is not set.")?;
        let out_dim = policy_config.get_out_dim();
        let varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("actor");
            P::build(vb, policy_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            out_dim,
            policy,
            opt,
            min_log_std: config.min_log_std,
            max_log_std: config.max_log_std,
            action_limit: config.action_limit,
        })
    }

    /// Sets the maximum norm of the gradients of the policy.
    pub fn set_grad_clip(&mut self, max_norm: Option<f64>) {
        self.opt.set_grad_clip(max_norm);
    }

    /// Dimension of actions.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Returns the mean and the clamped log standard deviation given observations.
    ///
    /// The shape of the both tensors is `(batch_size, action_dimension)`.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.policy.forward(obs)?;
        debug_assert_eq!(mean.dims().len(), 2);
        debug_assert_eq!(mean.dims()[1], self.out_dim);
        let log_std = log_std.clamp(self.min_log_std, self.max_log_std)?;
        Ok((mean, log_std))
    }

    /// Samples actions with the reparameterization trick.
    ///
    /// Returns actions of shape `(batch_size, action_dimension)` and their log
    /// densities of shape `(batch_size,)`. Gradients flow through both.
    pub fn sample(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, log_std) = self.forward(obs)?;
        let eps = mean.randn_like(0., 1.)?;
        let u = ((log_std.exp()? * &eps)? + &mean)?;
        let tanh_u = u.tanh()?;

        let logp_gauss = (eps.sqr()?.affine(-0.5, -HALF_LN_2PI)? - &log_std)?.sum(D::Minus1)?;
        let log_jacobian = tanh_u
            .sqr()?
            .affine(-1.0, 1.0 + EPS_JACOBIAN)?
            .log()?
            .sum(D::Minus1)?;
        let logp = (logp_gauss - log_jacobian)?;
        let act = (tanh_u * self.action_limit)?;

        Ok((act, logp))
    }

    /// Returns `limit * tanh(mu)`, the action used for evaluation.
    pub fn deterministic_action(&self, obs: &Tensor) -> Result<Tensor> {
        let (mean, _) = self.forward(obs)?;
        Ok((mean.tanh()? * self.action_limit)?)
    }

    /// Applies an optimization step given a loss.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Saves variables to `prefix` + ".safetensors".
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("safetensors");
        self.varmap.save(&path)?;
        info!("Save actor parameters to {:?}", path);
        Ok(path)
    }

    /// Loads variables from `prefix` + ".safetensors".
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("safetensors");
        self.varmap.load(&path)?;
        info!("Load actor parameters from {:?}", path);
        Ok(())
    }

    /// Device of the policy network.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
