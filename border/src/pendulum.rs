//! Inverted pendulum swing-up task.
//!
//! The dynamics and the reward follow the classic control task: the pole starts
//! at a random angle and the agent applies a torque to keep it upright. Episodes
//! are truncated after `max_episode_steps`; the task never terminates.
use anyhow::Result;
use border_candle_agent::TensorBatch;
use border_core::{record::Record, Act, Env, Obs, Step};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    f32::consts::PI,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const MASS: f32 = 1.0;
const LENGTH: f32 = 1.0;

/// Observation `[cos(theta), sin(theta), theta_dot]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PendulumObs(pub [f32; 3]);

impl Obs for PendulumObs {}

impl From<PendulumObs> for TensorBatch {
    fn from(obs: PendulumObs) -> Self {
        TensorBatch::from_row(obs.0.to_vec())
    }
}

/// Torque applied to the pole, clipped to `[-2, 2]` by the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct PendulumAct(pub f32);

impl Act for PendulumAct {}

impl From<PendulumAct> for TensorBatch {
    fn from(act: PendulumAct) -> Self {
        TensorBatch::from_row(vec![act.0])
    }
}

impl From<Vec<f32>> for PendulumAct {
    fn from(v: Vec<f32>) -> Self {
        Self(v.first().copied().unwrap_or(0.0))
    }
}

/// Configuration of [`Pendulum`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct PendulumConfig {
    /// Gravitational acceleration.
    pub gravity: f32,

    /// Length of an episode.
    pub max_episode_steps: usize,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            gravity: 10.0,
            max_episode_steps: 200,
        }
    }
}

impl PendulumConfig {
    /// Sets the gravitational acceleration.
    pub fn gravity(mut self, v: f32) -> Self {
        self.gravity = v;
        self
    }

    /// Sets the length of an episode.
    pub fn max_episode_steps(mut self, v: usize) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Constructs [`PendulumConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PendulumConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

/// Inverted pendulum.
pub struct Pendulum {
    config: PendulumConfig,
    rng: StdRng,
    theta: f32,
    theta_dot: f32,
    t: usize,
}

impl Pendulum {
    fn obs(&self) -> PendulumObs {
        PendulumObs([self.theta.cos(), self.theta.sin(), self.theta_dot])
    }

    /// Sets the state of the pole.
    pub fn set_state(&mut self, theta: f32, theta_dot: f32) {
        self.theta = theta;
        self.theta_dot = theta_dot;
    }
}

impl Env for Pendulum {
    type Config = PendulumConfig;
    type Obs = PendulumObs;
    type Act = PendulumAct;
    type Info = ();

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        info!("Build pendulum with seed {}", seed);
        Ok(Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed as u64),
            theta: 0.0,
            theta_dot: 0.0,
            t: 0,
        })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let u = a.0.clamp(-MAX_TORQUE, MAX_TORQUE);
        let (th, thdot) = (self.theta, self.theta_dot);
        let cost = angle_normalize(th).powi(2) + 0.1 * thdot.powi(2) + 0.001 * u.powi(2);

        let g = self.config.gravity;
        let thdot = thdot
            + (3.0 * g / (2.0 * LENGTH) * th.sin() + 3.0 / (MASS * LENGTH.powi(2)) * u) * DT;
        let thdot = thdot.clamp(-MAX_SPEED, MAX_SPEED);
        self.theta = th + thdot * DT;
        self.theta_dot = thdot;
        self.t += 1;

        let is_truncated = self.t >= self.config.max_episode_steps;
        let step = Step::new(self.obs(), a.clone(), -cost, false, is_truncated, ());
        (step, Record::empty())
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.t = 0;
        Ok(self.obs())
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        self.rng = StdRng::seed_from_u64(ix as u64);
        self.reset()
    }

    fn random_act(&mut self) -> Self::Act {
        PendulumAct(self.rng.gen_range(-MAX_TORQUE..MAX_TORQUE))
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(self.config.max_episode_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(0.5) - 0.5).abs() < 1e-6);
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-PI - 0.5) - (PI - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_upright_is_stable() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        env.reset()?;
        env.set_state(0.0, 0.0);
        let (step, _) = env.step(&PendulumAct(0.0));
        assert_eq!(step.obs, PendulumObs([1.0, 0.0, 0.0]));
        assert_eq!(step.reward, 0.0);
        Ok(())
    }

    #[test]
    fn test_torque_is_clipped() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        env.reset()?;
        env.set_state(0.0, 0.0);
        let (step, _) = env.step(&PendulumAct(10.0));
        // 3 / (m l^2) * 2 * dt
        assert!((step.obs.0[2] - 0.3).abs() < 1e-6);
        assert!((step.reward + 0.004).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_episode_is_truncated() -> Result<()> {
        let config = PendulumConfig::default().max_episode_steps(5);
        let mut env = Pendulum::build(&config, 1)?;
        env.reset()?;
        for t in 1..=5 {
            let act = env.random_act();
            assert!(act.0.abs() <= MAX_TORQUE);
            let (step, _) = env.step(&act);
            assert!(!step.is_terminated);
            assert_eq!(step.is_truncated, t == 5);
            assert!(step.reward <= 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_reset_with_index_is_reproducible() -> Result<()> {
        let mut env = Pendulum::build(&PendulumConfig::default(), 0)?;
        let obs1 = env.reset_with_index(3)?;
        env.reset()?;
        let obs2 = env.reset_with_index(3)?;
        assert_eq!(obs1, obs2);
        Ok(())
    }
}
