//! Multi-step soft actor-critic (SAC) agent.
//!
//! The agent learns from k-step transitions of
//! [`MultiStepReplayBuffer`](border_core::multistep_replay_buffer::MultiStepReplayBuffer).
//! The target of the action-value functions is
//!
//! ```text
//! y = R + gamma^k (1 - d) minQ_tgt(s', a') - (gamma + ... + gamma^k) (1 - d) alpha log pi(a'|s')
//! ```
//!
//! where `R` is the discounted sum of the rewards in the window, `s'` the
//! observation at its end, and `a' ~ pi(.|s')`. The entropy term spreads the
//! bonus of the bootstrap state over the `k` steps of the window. This is a
//! heuristic; the entropy bonuses of the intermediate states are not observed.
mod base;
mod config;
mod ent_coef;
mod q_bias;
pub use base::Sac;
pub use config::SacConfig;
pub use ent_coef::{EntCoef, EntCoefMode};
pub use q_bias::QBiasEvaluator;
use anyhow::Result;
use candle_core::Tensor;
use thiserror::Error;

/// Errors in updating [`Sac`].
#[derive(Debug, Error, PartialEq)]
pub enum SacError {
    /// A loss became NaN or infinite.
    #[error("Non-finite loss: {name} = {value}")]
    NonFiniteLoss {
        /// Name of the loss.
        name: &'static str,
        /// Value of the loss.
        value: f32,
    },

    /// A record of the batch was not built with the number of steps of the agent.
    #[error("Record of {n_steps} steps (terminated: {is_terminated}) does not match k = {multistep_k}")]
    StepCountMismatch {
        /// Number of raw steps in the record.
        n_steps: usize,
        /// Whether the record ends at a terminal state.
        is_terminated: bool,
        /// Number of steps the agent bootstraps over.
        multistep_k: usize,
    },
}

/// Checks that every record spans `multistep_k` steps, or fewer if it ends at
/// a terminal state.
pub fn check_step_counts(
    n_steps: &[usize],
    is_terminated: &[i8],
    multistep_k: usize,
) -> Result<(), SacError> {
    for (&n, &d) in n_steps.iter().zip(is_terminated.iter()) {
        let is_terminated = d != 0;
        if n == 0 || n > multistep_k || (!is_terminated && n != multistep_k) {
            return Err(SacError::StepCountMismatch {
                n_steps: n,
                is_terminated,
                multistep_k,
            });
        }
    }
    Ok(())
}

/// Returns `gamma + gamma^2 + ... + gamma^k`.
pub fn entropy_discount(gamma: f64, k: usize) -> f64 {
    (1..=k).map(|i| gamma.powi(i as i32)).sum()
}

/// Computes the target of the action-value functions, detached from the graph.
///
/// `reward_k`, `not_done`, `next_q` and `next_logp` have shape `(batch_size,)`.
/// `next_q` comes from the target networks at `(s', a')`.
pub fn multistep_target(
    reward_k: &Tensor,
    not_done: &Tensor,
    next_q: &Tensor,
    next_logp: &Tensor,
    alpha: f64,
    gamma: f64,
    k: usize,
) -> Result<Tensor> {
    let bootstrap = ((next_q * gamma.powi(k as i32))? * not_done)?;
    let entropy = ((next_logp * (entropy_discount(gamma, k) * alpha))? * not_done)?;
    Ok(((reward_k + bootstrap)? - entropy)?.detach())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn t(v: &[f32]) -> Tensor {
        Tensor::from_slice(v, (v.len(),), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_multistep_target() -> Result<()> {
        // gamma = 0.5, k = 2, alpha = 0.2
        // ongoing:  1 + 0.25 * 4 - (0.5 + 0.25) * 0.2 * (-1) = 2.15
        // terminal: 2
        let y = multistep_target(
            &t(&[1.0, 2.0]),
            &t(&[1.0, 0.0]),
            &t(&[4.0, 4.0]),
            &t(&[-1.0, -1.0]),
            0.2,
            0.5,
            2,
        )?
        .to_vec1::<f32>()?;
        assert!((y[0] - 2.15).abs() < 1e-6);
        assert!((y[1] - 2.0).abs() < 1e-6);

        // k = 1: 1 + 0.5 * 4 + 0.5 * 0.2 * 1 = 3.1
        let y = multistep_target(&t(&[1.0]), &t(&[1.0]), &t(&[4.0]), &t(&[-1.0]), 0.2, 0.5, 1)?
            .to_vec1::<f32>()?;
        assert!((y[0] - 3.1).abs() < 1e-6);

        // k = 3, gamma = 0.9, no entropy: 2.71 + 0.729 * 10
        let y = multistep_target(&t(&[2.71]), &t(&[1.0]), &t(&[10.0]), &t(&[5.0]), 0.0, 0.9, 3)?
            .to_vec1::<f32>()?;
        assert!((y[0] - 10.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_check_step_counts() {
        assert!(check_step_counts(&[3, 3, 2, 1], &[0, 1, 1, 1], 3).is_ok());
        assert_eq!(
            check_step_counts(&[3, 1], &[0, 0], 3),
            Err(SacError::StepCountMismatch {
                n_steps: 1,
                is_terminated: false,
                multistep_k: 3
            })
        );
        assert!(check_step_counts(&[3], &[1], 1).is_err());
        assert!(check_step_counts(&[0], &[1], 1).is_err());
    }

    #[test]
    fn test_entropy_discount() {
        assert_eq!(entropy_discount(0.9, 0), 0.0);
        assert!((entropy_discount(0.9, 1) - 0.9).abs() < 1e-12);
        assert!((entropy_discount(0.9, 3) - (0.9 + 0.81 + 0.729)).abs() < 1e-12);
        assert!((entropy_discount(1.0, 5) - 5.0).abs() < 1e-12);
    }
}
