//! Multi-step replay buffer.
//!
//! Transitions pass through two circular buffers before an agent can see them.
//!
//! * [`StagingRing`] holds raw single-step transitions of the running episodes.
//!   It is never sampled.
//! * [`MultiStepReplayBuffer`] owns the staging ring. Each time a transition is
//!   stored, it decides which windows of the staging ring are complete and
//!   promotes them as discounted k-step records, which are then sampled
//!   uniformly.
//!
//! The promotion rule depends on how the episode is going:
//!
//! | condition                               | promoted windows              |
//! |-----------------------------------------|-------------------------------|
//! | `episode_len == max_episode_len`        | none                          |
//! | terminated                              | `n = m, m-1, .., 1`, `m = min(k, episode_len)` |
//! | ongoing, `episode_len >= k`             | one window of length `k`      |
//! | ongoing, `episode_len < k`              | none                          |
//!
//! Rows rely on the [`BatchBase`] trait, so the buffer works with any
//! storage of observations and actions, for example tensors of a deep learning
//! backend.
//!
//! ```rust
//! use border_core::multistep_replay_buffer::{
//!     MultiStepReplayBuffer, MultiStepReplayBufferConfig, Transition,
//! };
//! use border_core::{dummy::VecBatch, ExperienceBufferBase};
//!
//! let config = MultiStepReplayBufferConfig::default()
//!     .capacity(100)
//!     .multistep_k(3)
//!     .gamma(0.9);
//! let mut buffer = MultiStepReplayBuffer::<VecBatch, VecBatch>::new(&config).unwrap();
//!
//! for t in 1..=5 {
//!     let tr = Transition {
//!         obs: VecBatch::row(vec![t as f32]),
//!         act: VecBatch::row(vec![0.0]),
//!         next_obs: VecBatch::row(vec![t as f32 + 1.0]),
//!         reward: 1.0,
//!         is_terminated: t == 5,
//!     };
//!     buffer.store(tr, t, 1000).unwrap();
//! }
//! assert_eq!(buffer.len(), 5);
//! ```
mod base;
mod batch;
mod config;
mod staging;
mod step_proc;
pub use base::MultiStepReplayBuffer;
pub use batch::{BatchBase, MultiStepBatch, MultiStepTransition, Transition};
pub use config::MultiStepReplayBufferConfig;
pub use staging::{StagedWindow, StagingRing};
pub use step_proc::{MultiStepProcessor, MultiStepProcessorConfig};

/// Returns `r_0 + gamma * r_1 + ... + gamma^(n-1) * r_(n-1)`.
pub fn discounted_sum(rewards: &[f32], gamma: f32) -> f32 {
    rewards
        .iter()
        .rev()
        .fold(0f32, |acc, r| r + gamma * acc)
}

#[cfg(test)]
mod tests {
    use super::discounted_sum;

    #[test]
    fn test_discounted_sum() {
        assert_eq!(discounted_sum(&[], 0.9), 0.0);
        assert_eq!(discounted_sum(&[2.0], 0.5), 2.0);
        assert!((discounted_sum(&[1.0, 1.0, 1.0], 0.9) - 2.71).abs() < 1e-6);
        assert!((discounted_sum(&[1.0, -2.0, 4.0], 0.5) - 1.0).abs() < 1e-6);
    }
}
