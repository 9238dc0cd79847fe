//! Twin action-value functions with their target networks.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::track,
};
use anyhow::{Context, Result};
use candle_core::{DType::F32, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// How the two action-value estimates are combined in the target and the
/// policy loss.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum CriticMode {
    /// Elementwise minimum of both estimates (clipped double-Q).
    Double,

    /// The first estimate only.
    Single,
}

impl Default for CriticMode {
    fn default() -> Self {
        Self::Double
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Critic`].
pub struct CriticConfig<Q> {
    /// Configuration of action-value functions.
    pub q_config: Option<Q>,

    /// Configuration of the optimizers, one per action-value function.
    pub opt_config: OptimizerConfig,

    /// Polyak coefficient of the target networks.
    ///
    /// `target <- polyak * target + (1 - polyak) * online`.
    pub polyak: f64,
}

impl<Q> Default for CriticConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            polyak: 0.995,
        }
    }
}

impl<Q> CriticConfig<Q>
where
    Q: DeserializeOwned + Serialize,
{
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the polyak coefficient.
    pub fn polyak(mut self, v: f64) -> Self {
        self.polyak = v;
        self
    }

    /// Constructs [`CriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CriticConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A network with its own [`VarMap`], so that it can be optimized and tracked
/// independently.
struct Net<Q> {
    varmap: VarMap,
    q: Q,
}

impl<Q> Net<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: Clone,
{
    fn build(q_config: &Q::Config, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, F32, device).set_prefix("q");
        let q = Q::build(vb, q_config.clone())?;
        Ok(Self { varmap, q })
    }

    /// Returns action values of shape `(batch_size,)`.
    fn forward(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Ok(self.q.forward(obs, act)?.squeeze(D::Minus1)?)
    }
}

/// Critic of multi-step SAC.
///
/// Two action-value functions `Q1`, `Q2`, each with its own optimizer, and
/// their target networks. The target networks are never optimized; they follow
/// the online networks by polyak averaging.
pub struct Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    polyak: f64,
    qs: Vec<Net<Q>>,
    qs_tgt: Vec<Net<Q>>,
    opts: Vec<Optimizer>,
}

impl<Q> Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`Critic`]. The target networks start as copies of the online networks.
    pub fn build(config: CriticConfig<Q::Config>, device: Device) -> Result<Self> {
        let q_config = config.q_config.context("q_config is not set.")?;

        let mut qs = vec![];
        let mut qs_tgt = vec![];
        let mut opts = vec![];
        for _ in 0..2 {
            let q = Net::<Q>::build(&q_config, &device)?;
            let q_tgt = Net::<Q>::build(&q_config, &device)?;
            track(&q_tgt.varmap, &q.varmap, 1.0)?;
            opts.push(config.opt_config.build(q.varmap.all_vars())?);
            qs.push(q);
            qs_tgt.push(q_tgt);
        }

        Ok(Self {
            polyak: config.polyak,
            qs,
            qs_tgt,
            opts,
        })
    }

    /// Sets the maximum norm of the gradients of each action-value function.
    pub fn set_grad_clip(&mut self, max_norm: Option<f64>) {
        for opt in self.opts.iter_mut() {
            opt.set_grad_clip(max_norm);
        }
    }

    /// Returns the action values `[Q1(s, a), Q2(s, a)]` of the online networks.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        self.qs.iter().map(|q| q.forward(obs, act)).collect()
    }

    /// Returns the combined action value of the online networks.
    pub fn qval(&self, obs: &Tensor, act: &Tensor, mode: CriticMode) -> Result<Tensor> {
        combine(&self.qs, obs, act, mode)
    }

    /// Returns the combined action value of the target networks.
    pub fn qval_tgt(&self, obs: &Tensor, act: &Tensor, mode: CriticMode) -> Result<Tensor> {
        combine(&self.qs_tgt, obs, act, mode)
    }

    /// Applies an optimization step on the `ix`-th action-value function.
    pub fn backward_step(&mut self, ix: usize, loss: &Tensor) -> Result<()> {
        let opt = self
            .opts
            .get_mut(ix)
            .with_context(|| format!("No action-value function {}", ix))?;
        opt.backward_step(loss)
    }

    /// Moves the target networks toward the online networks.
    pub fn soft_update(&mut self) -> Result<()> {
        for (q, q_tgt) in self.qs.iter().zip(self.qs_tgt.iter()) {
            track(&q_tgt.varmap, &q.varmap, 1.0 - self.polyak)?;
        }
        Ok(())
    }

    /// Saves `q1`, `q2`, `q1_tgt` and `q2_tgt` as safetensors files in `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let mut paths = vec![];
        for (name, net) in self.named_nets() {
            let path = dir.as_ref().join(format!("{}.safetensors", name));
            net.varmap.save(&path)?;
            paths.push(path);
        }
        info!("Save critics to {:?}", dir.as_ref());
        Ok(paths)
    }

    /// Loads the files written by [`Critic::save`].
    pub fn load(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let names = ["q1", "q2", "q1_tgt", "q2_tgt"];
        for (name, net) in names
            .iter()
            .zip(self.qs.iter_mut().chain(self.qs_tgt.iter_mut()))
        {
            net.varmap
                .load(dir.as_ref().join(format!("{}.safetensors", name)))?;
        }
        info!("Load critics from {:?}", dir.as_ref());
        Ok(())
    }

    fn named_nets(&self) -> impl Iterator<Item = (&'static str, &Net<Q>)> {
        ["q1", "q2", "q1_tgt", "q2_tgt"]
            .iter()
            .copied()
            .zip(self.qs.iter().chain(self.qs_tgt.iter()))
    }
}

fn combine<Q>(nets: &[Net<Q>], obs: &Tensor, act: &Tensor, mode: CriticMode) -> Result<Tensor>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: Clone,
{
    let q1 = nets[0].forward(obs, act)?;
    match mode {
        CriticMode::Single => Ok(q1),
        CriticMode::Double => Ok(q1.minimum(&nets[1].forward(obs, act)?)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mlp::Mlp, mlp::MlpConfig, util::same_values};
    use tempdir::TempDir;

    fn critic(polyak: f64) -> Result<Critic<Mlp>> {
        let config = CriticConfig::default()
            .q_config(MlpConfig::new(4, vec![8, 8], 1, false))
            .polyak(polyak);
        Critic::build(config, Device::Cpu)
    }

    fn inputs() -> Result<(Tensor, Tensor)> {
        let obs = Tensor::randn(0f32, 1., (6, 3), &Device::Cpu)?;
        let act = Tensor::randn(0f32, 1., (6, 1), &Device::Cpu)?;
        Ok((obs, act))
    }

    #[test]
    fn test_targets_start_as_copies() -> Result<()> {
        let critic = critic(0.995)?;
        for (q, q_tgt) in critic.qs.iter().zip(critic.qs_tgt.iter()) {
            assert!(same_values(&q.varmap, &q_tgt.varmap, 0.0)?);
        }
        // Two independently initialized networks
        assert!(!same_values(&critic.qs[0].varmap, &critic.qs[1].varmap, 0.0)?);
        Ok(())
    }

    #[test]
    fn test_combined_values() -> Result<()> {
        let critic = critic(0.995)?;
        let (obs, act) = inputs()?;
        let qs = critic.qvals(&obs, &act)?;
        assert_eq!(qs[0].dims(), &[6]);

        let q1 = qs[0].to_vec1::<f32>()?;
        let q2 = qs[1].to_vec1::<f32>()?;
        let single = critic.qval(&obs, &act, CriticMode::Single)?.to_vec1::<f32>()?;
        let double = critic.qval(&obs, &act, CriticMode::Double)?.to_vec1::<f32>()?;
        assert_eq!(single, q1);
        for i in 0..6 {
            assert_eq!(double[i], q1[i].min(q2[i]));
        }

        // Target networks are copies right after construction.
        let tgt = critic.qval_tgt(&obs, &act, CriticMode::Double)?.to_vec1::<f32>()?;
        assert_eq!(tgt, double);
        Ok(())
    }

    #[test]
    fn test_soft_update() -> Result<()> {
        let polyak = 0.9;
        let mut critic = critic(polyak)?;

        // Move the online network away from the target.
        let (obs, act) = inputs()?;
        let loss = critic.qvals(&obs, &act)?[0].sqr()?.mean_all()?;
        critic.backward_step(0, &loss)?;
        assert!(!same_values(&critic.qs[0].varmap, &critic.qs_tgt[0].varmap, 0.0)?);

        let snapshot = |vm: &VarMap| -> Result<Vec<f32>> {
            let mut v = vec![];
            let data = vm.data().lock().map_err(|_| anyhow::anyhow!("lock"))?;
            let mut keys: Vec<_> = data.keys().cloned().collect();
            keys.sort();
            for k in keys {
                v.extend(data[&k].as_tensor().flatten_all()?.to_vec1::<f32>()?);
            }
            Ok(v)
        };
        let online = snapshot(&critic.qs[0].varmap)?;
        let target = snapshot(&critic.qs_tgt[0].varmap)?;

        critic.soft_update()?;
        let updated = snapshot(&critic.qs_tgt[0].varmap)?;
        for i in 0..online.len() {
            let expected = polyak as f32 * target[i] + (1.0 - polyak as f32) * online[i];
            assert!((updated[i] - expected).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("critic")?;
        let critic1 = critic(0.995)?;
        let mut critic2 = critic(0.995)?;
        let paths = critic1.save(dir.path())?;
        assert_eq!(paths.len(), 4);
        critic2.load(dir.path())?;

        let (obs, act) = inputs()?;
        let q1 = critic1.qval(&obs, &act, CriticMode::Double)?.to_vec1::<f32>()?;
        let q2 = critic2.qval(&obs, &act, CriticMode::Double)?.to_vec1::<f32>()?;
        assert_eq!(q1, q2);
        Ok(())
    }
}
