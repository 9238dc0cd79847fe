//! Multi-step soft actor-critic in Rust.
//!
//! This crate collects the crates of the workspace:
//!
//! * [`border_core`] provides traits of environments and agents, the multi-step
//!   replay buffer and the trainer driving the interaction with an environment.
//! * [`border_candle_agent`] implements the multi-step SAC agent with
//!   [candle](https://crates.io/crates/candle-core).
//! * [`border_tensorboard`] writes training records to TensorBoard.
//!
//! [`pendulum`] is a pure-Rust inverted pendulum used by the `sac_pendulum` example.
pub use border_candle_agent;
pub use border_core;
pub use border_tensorboard;

pub mod pendulum;
