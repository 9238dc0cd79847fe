//! Core functionalities.
mod agent;
mod batch;
mod env;
mod policy;
mod replay_buffer;
mod step;
pub use agent::Agent;
pub use batch::TransitionBatch;
pub use env::Env;
pub use policy::{Configurable, Policy};
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
use std::fmt::Debug;
pub use step::{Info, Step, StepProcessor};

/// An observation of an environment.
///
/// Environments in this library are not vectorized, so a value of this type
/// always holds the observation of a single environment state.
pub trait Obs: Clone + Debug {}

/// An action applied to an environment.
pub trait Act: Clone + Debug {}
