use super::{create_hidden_layers, hidden_forward, MlpConfig};
use crate::model::SubModel1;
use anyhow::{bail, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Multilayer perceptron that outputs two tensors of the same size.
///
/// It is used as the policy network of a Gaussian actor: the outputs are the
/// mean and the log standard deviation of the pre-squashing distribution.
pub struct Mlp2 {
    device: Device,
    layers: Vec<Linear>,
    head_mean: Linear,
    head_log_std: Linear,
}

impl SubModel1 for Mlp2 {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, xs: &Self::Input) -> Result<Self::Output> {
        let xs = hidden_forward(&xs.to_device(&self.device)?, &self.layers)?;
        let mean = self.head_mean.forward(&xs)?;
        let log_std = self.head_log_std.forward(&xs)?;
        Ok((mean, log_std))
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let in_dim = match config.units.last() {
            Some(&n) => n,
            None => bail!("Mlp2 requires at least one hidden layer"),
        };
        let device = vb.device().clone();
        let layers = create_hidden_layers(&vb.pp("mlp"), &config)?;
        let head_mean = linear(in_dim, config.out_dim, vb.pp("mean"))?;
        let head_log_std = linear(in_dim, config.out_dim, vb.pp("log_std"))?;

        Ok(Self {
            device,
            layers,
            head_mean,
            head_log_std,
        })
    }
}
