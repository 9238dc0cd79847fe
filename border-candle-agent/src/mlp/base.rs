use super::{create_hidden_layers, hidden_forward, MlpConfig};
use crate::model::{SubModel1, SubModel2};
use anyhow::Result;
use candle_core::{Device, Module, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};

/// Multilayer perceptron with ReLU activation function.
///
/// As a [`SubModel2`], observations and actions are concatenated before the
/// first layer, which is how action-value functions are built.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Linear>,
    head: Linear,
}

impl Mlp {
    fn build_(vb: VarBuilder, config: MlpConfig) -> Result<Self> {
        let device = vb.device().clone();
        let vb = vb.pp("mlp");
        let layers = create_hidden_layers(&vb, &config)?;
        let in_dim = config.units.last().copied().unwrap_or(config.in_dim);
        let head = linear(in_dim, config.out_dim, vb.pp(format!("ln{}", layers.len())))?;

        Ok(Self {
            config,
            device,
            layers,
            head,
        })
    }

    fn forward_(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = hidden_forward(&xs.to_device(&self.device)?, &self.layers)?;
        let xs = self.head.forward(&xs)?;

        match self.config.activation_out {
            false => Ok(xs),
            true => Ok(xs.relu()?),
        }
    }
}

impl SubModel1 for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        self.forward_(xs)
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::build_(vb, config)
    }
}

impl SubModel2 for Mlp {
    type Config = MlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Result<Tensor> {
        let input1 = input1.to_device(&self.device)?;
        let input2 = input2.to_device(&self.device)?;
        let input = Tensor::cat(&[input1, input2], D::Minus1)?;
        self.forward_(&input)
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Self::build_(vb, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_q_function_shape() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let q = <Mlp as SubModel2>::build(vb, MlpConfig::new(4, vec![8, 8], 1, false))?;

        let obs = Tensor::zeros((5, 3), DType::F32, &Device::Cpu)?;
        let act = Tensor::zeros((5, 1), DType::F32, &Device::Cpu)?;
        let out = SubModel2::forward(&q, &obs, &act)?;
        assert_eq!(out.dims(), &[5, 1]);

        // 3 weights and 3 biases
        assert_eq!(varmap.all_vars().len(), 6);
        Ok(())
    }
}
