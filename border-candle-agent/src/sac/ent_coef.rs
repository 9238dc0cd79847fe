//! Entropy coefficient of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),

    /// Automatic tuning of `log(alpha)`, starting from `alpha = 1`.
    Auto {
        /// Target entropy. `-action_dimension` if not given.
        target_entropy: Option<f64>,

        /// Learning rate.
        lr: f64,
    },
}

impl Default for EntCoefMode {
    fn default() -> Self {
        Self::Auto {
            target_entropy: None,
            lr: 3e-4,
        }
    }
}

/// The entropy coefficient of SAC.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    ///
    /// `act_dim` gives the default target entropy of the automatic tuning.
    pub fn new(mode: EntCoefMode, act_dim: usize, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let log_alpha = vb.get_with_hints(1, "log_alpha", Init::Const(alpha.ln()))?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto { target_entropy, lr } => {
                let log_alpha = vb.get_with_hints(1, "log_alpha", Init::Const(0.0))?;
                let target_entropy = target_entropy.unwrap_or(-(act_dim as f64));
                let opt = OptimizerConfig::Adam { lr }.build(varmap.all_vars())?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            target_entropy,
            opt,
        })
    }

    /// Returns the entropy coefficient, detached from the graph.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn alpha_value(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Target entropy, `None` if alpha is fixed.
    pub fn target_entropy(&self) -> Option<f64> {
        self.target_entropy
    }

    /// Returns the loss `mean(-log(alpha) * (logp + target_entropy))` if alpha
    /// is tuned automatically. `logp` is detached.
    pub fn loss(&self, logp: &Tensor) -> Result<Option<Tensor>> {
        match self.target_entropy {
            None => Ok(None),
            Some(target_entropy) => {
                let logp = (logp.detach() + target_entropy)?;
                let loss = (self.log_alpha.broadcast_mul(&logp)? * -1f64)?.mean_all()?;
                Ok(Some(loss))
            }
        }
    }

    /// Applies an optimization step given the loss from [`EntCoef::loss`].
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        if let Some(opt) = &mut self.opt {
            opt.backward_step(loss)?;
        }
        Ok(())
    }

    /// Sets the maximum norm of the gradient of `log(alpha)`.
    pub fn set_grad_clip(&mut self, max_norm: Option<f64>) {
        if let Some(opt) = &mut self.opt {
            opt.set_grad_clip(max_norm);
        }
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_alpha() -> Result<()> {
        let ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), 1, Device::Cpu)?;
        assert!((ent_coef.alpha_value()? - 0.2).abs() < 1e-6);
        assert_eq!(ent_coef.target_entropy(), None);

        let logp = Tensor::from_slice(&[-1f32, 0.5], (2,), &Device::Cpu)?;
        assert!(ent_coef.loss(&logp)?.is_none());
        Ok(())
    }

    #[test]
    fn test_auto_alpha_stays_positive() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::default(), 3, Device::Cpu)?;
        assert_eq!(ent_coef.target_entropy(), Some(-3.0));
        assert!((ent_coef.alpha_value()? - 1.0).abs() < 1e-6);

        // Entropy above the target (logp well below -H) drives alpha down.
        let logp = Tensor::from_slice(&[-10f32, -12.0, -8.0], (3,), &Device::Cpu)?;
        for _ in 0..100 {
            let loss = ent_coef.loss(&logp)?.ok_or_else(|| anyhow::anyhow!("auto"))?;
            ent_coef.backward_step(&loss)?;
        }
        let alpha = ent_coef.alpha_value()?;
        assert!(alpha > 0.0);
        assert!(alpha < 1.0);
        Ok(())
    }
}
