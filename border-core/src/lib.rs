#![warn(missing_docs)]
//! Core components of multi-step off-policy reinforcement learning.
//!
//! * Traits of environments, policies, agents and replay buffers
//! * [`multistep_replay_buffer`], converting single-step transitions into
//!   discounted k-step transitions
//! * [`Trainer`], the training loop feeding the buffer and updating the agent
//! * [`record`], recording and aggregating training metrics
pub mod dummy;
pub mod error;
mod evaluator;
pub mod multistep_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase,
    Step, StepProcessor, TransitionBatch,
};

mod trainer;
pub use evaluator::{DefaultEvaluator, Evaluator};
pub use trainer::{Sampler, Trainer, TrainerConfig};
