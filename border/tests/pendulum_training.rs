use anyhow::Result;
use border::pendulum::{Pendulum, PendulumAct, PendulumConfig, PendulumObs};
use border_candle_agent::TensorBatch;
use border_core::{
    multistep_replay_buffer::{
        MultiStepProcessor, MultiStepProcessorConfig, MultiStepReplayBuffer,
        MultiStepReplayBufferConfig,
    },
    Env, ExperienceBufferBase, Policy, Sampler, StepProcessor,
};
use tempdir::TempDir;

type ReplayBuffer = MultiStepReplayBuffer<TensorBatch, TensorBatch>;
type StepProc = MultiStepProcessor<Pendulum, TensorBatch, TensorBatch>;

/// Applies no torque.
struct Idle;

impl Policy<Pendulum> for Idle {
    fn sample(&mut self, _obs: &PendulumObs) -> Result<PendulumAct> {
        Ok(PendulumAct(0.0))
    }
}

#[test]
fn test_config_yaml() -> Result<()> {
    let dir = TempDir::new("pendulum_config")?;
    let path = dir.path().join("pendulum.yaml");
    let config = PendulumConfig::default().gravity(9.8).max_episode_steps(50);
    config.save(&path)?;
    assert_eq!(PendulumConfig::load(&path)?, config);
    Ok(())
}

#[test]
fn test_truncated_episodes_fill_buffer() -> Result<()> {
    let k = 3;
    let config = PendulumConfig::default().max_episode_steps(10);
    let mut buffer = ReplayBuffer::new(
        &MultiStepReplayBufferConfig::default()
            .capacity(100)
            .staging_capacity(100)
            .multistep_k(k),
    )?;
    let env = Pendulum::build(&config, 0)?;
    let step_proc = StepProc::build(&MultiStepProcessorConfig::default());
    let mut sampler = Sampler::new(env, step_proc, 1000);
    assert_eq!(sampler.max_episode_steps(), 10);

    let mut n_episodes = 0;
    for t in 0..20 {
        let record = sampler.sample_and_push(&mut Idle, &mut buffer, t % 2 == 0)?;
        if record.get_scalar("episode_length").is_ok() {
            assert_eq!(record.get_scalar("episode_length")?, 10.0);
            assert!(record.get_scalar("episode_return")? <= 0.0);
            n_episodes += 1;
        }
    }
    assert_eq!(n_episodes, 2);

    // Steps k..9 of each episode promote a k-step record; truncation promotes none.
    assert_eq!(buffer.len(), 2 * (10 - k));
    Ok(())
}
