use anyhow::Result;
use border_candle_agent::{
    mlp::{Mlp, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    sac::{EntCoefMode, QBiasEvaluator, Sac, SacConfig, SacError},
    util::{
        actor::GaussianActorConfig,
        critic::{CriticConfig, CriticMode},
    },
    TensorBatch,
};
use border_core::{
    multistep_replay_buffer::{
        MultiStepProcessor, MultiStepProcessorConfig, MultiStepReplayBuffer,
        MultiStepReplayBufferConfig, Transition,
    },
    record::{BufferedRecorder, Record},
    Agent, Configurable, DefaultEvaluator, Env, Evaluator, Policy, Step, Trainer, TrainerConfig,
};
use candle_core::Device;
use tempdir::TempDir;

/// A point on a line, pushed by the action and rewarded for staying near the origin.
#[derive(Clone, Debug)]
struct LineObs(f32);

impl border_core::Obs for LineObs {}

impl From<LineObs> for TensorBatch {
    fn from(obs: LineObs) -> Self {
        TensorBatch::from_row(vec![obs.0, 1.0])
    }
}

#[derive(Clone, Debug)]
struct LineAct(f32);

impl border_core::Act for LineAct {}

impl From<LineAct> for TensorBatch {
    fn from(act: LineAct) -> Self {
        TensorBatch::from_row(vec![act.0])
    }
}

impl From<Vec<f32>> for LineAct {
    fn from(v: Vec<f32>) -> Self {
        Self(v[0])
    }
}

struct LineEnv {
    x: f32,
    t: usize,
}

impl Env for LineEnv {
    type Config = ();
    type Obs = LineObs;
    type Act = LineAct;
    type Info = ();

    fn build(_config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self { x: 0.5, t: 0 })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.t += 1;
        self.x += 0.1 * a.0;
        let reward = -self.x * self.x;
        let is_terminated = self.x.abs() > 1.0;
        let is_truncated = self.t >= 15;
        let step = Step::new(
            LineObs(self.x),
            a.clone(),
            reward,
            is_terminated,
            is_truncated,
            (),
        );
        (step, Record::empty())
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.x = 0.5;
        self.t = 0;
        Ok(LineObs(self.x))
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset()
    }

    fn random_act(&mut self) -> Self::Act {
        LineAct(if self.t % 2 == 0 { 0.5 } else { -0.5 })
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(15)
    }
}

type Buffer = MultiStepReplayBuffer<TensorBatch, TensorBatch>;
type Agent_ = Sac<LineEnv, Mlp, Mlp2, Buffer>;

fn sac_config(k: usize, critic_mode: CriticMode, batch_size: usize) -> SacConfig<Mlp, Mlp2> {
    let actor_config = GaussianActorConfig::default()
        .opt_config(OptimizerConfig::Adam { lr: 1e-3 })
        .policy_config(MlpConfig::new(2, vec![16, 16], 1, false));
    let critic_config = CriticConfig::default()
        .opt_config(OptimizerConfig::Adam { lr: 1e-3 })
        .q_config(MlpConfig::new(3, vec![16, 16], 1, false));
    SacConfig::default()
        .actor_config(actor_config)
        .critic_config(critic_config)
        .discount_factor(0.9)
        .multistep_k(k)
        .critic_mode(critic_mode)
        .batch_size(batch_size)
        .device(Device::Cpu)
}

fn buffer_config(k: usize) -> MultiStepReplayBufferConfig {
    sac_config(k, CriticMode::Double, 1)
        .replay_buffer_config()
        .capacity(500)
        .staging_capacity(50)
}

fn fill(buffer: &mut Buffer, n_steps: usize) -> Result<()> {
    fill_with(buffer, n_steps, |x| -x * x)
}

fn fill_with(buffer: &mut Buffer, n_steps: usize, reward: impl Fn(f32) -> f32) -> Result<()> {
    let mut x = 0.5f32;
    for t in 1..=n_steps {
        let a = if t % 2 == 0 { 0.3 } else { -0.2 };
        let next_x = x + 0.1 * a;
        let tr = Transition {
            obs: LineObs(x).into(),
            act: LineAct(a).into(),
            next_obs: LineObs(next_x).into(),
            reward: reward(next_x),
            is_terminated: false,
        };
        buffer.store(tr, t, 1000)?;
        x = next_x;
    }
    Ok(())
}

#[test]
fn test_update_is_gated_by_batch_size() -> Result<()> {
    let mut agent = Agent_::build(sac_config(3, CriticMode::Double, 8))?;
    let mut buffer = Buffer::new(&buffer_config(3))?;

    // 9 steps with k = 3 promote 7 records.
    fill(&mut buffer, 9)?;
    assert!(agent.opt_with_record(&mut buffer)?.is_none());
    assert_eq!(agent.n_opts(), 0);

    fill(&mut buffer, 4)?;
    let record = agent
        .opt_with_record(&mut buffer)?
        .expect("an update should run");
    assert_eq!(agent.n_opts(), 1);

    for key in [
        "loss_policy",
        "loss_q1",
        "loss_q2",
        "loss_alpha",
        "alpha",
        "q1_mean",
        "q1_min",
        "q1_max",
        "q2_mean",
        "q2_min",
        "q2_max",
        "logp_mean",
        "logp_min",
        "logp_max",
    ]
    .iter()
    {
        let v = record.get_scalar(key)?;
        assert!(v.is_finite(), "{} = {}", key, v);
    }
    assert!(record.get_scalar("q1_min")? <= record.get_scalar("q1_max")?);
    assert!(record.get_scalar("alpha")? > 0.0);

    Ok(())
}

#[test]
fn test_single_estimator_with_fixed_alpha() -> Result<()> {
    let config = sac_config(2, CriticMode::Single, 4).ent_coef_mode(EntCoefMode::Fix(0.2));
    let mut agent = Agent_::build(config)?;
    let mut buffer = Buffer::new(&buffer_config(2))?;
    fill(&mut buffer, 20)?;

    for _ in 0..5 {
        let record = agent
            .opt_with_record(&mut buffer)?
            .expect("an update should run");
        assert_eq!(record.get_scalar("loss_alpha")?, 0.0);
        assert!((record.get_scalar("alpha")? - 0.2).abs() < 1e-6);
    }
    assert!(agent.opt(&mut buffer)?);
    assert_eq!(agent.n_opts(), 6);
    Ok(())
}

#[test]
fn test_batch_of_other_step_count_is_rejected() -> Result<()> {
    let mut agent = Agent_::build(sac_config(1, CriticMode::Double, 4))?;
    let mut buffer = Buffer::new(&buffer_config(3))?;
    fill(&mut buffer, 10)?;

    let err = agent
        .opt_with_record(&mut buffer)
        .expect_err("3-step records must not be used by a 1-step agent");
    assert_eq!(
        err.downcast_ref::<SacError>(),
        Some(&SacError::StepCountMismatch {
            n_steps: 3,
            is_terminated: false,
            multistep_k: 1,
        })
    );
    assert_eq!(agent.n_opts(), 0);
    Ok(())
}

#[test]
fn test_nan_reward_is_fatal() -> Result<()> {
    let mut agent = Agent_::build(sac_config(2, CriticMode::Double, 4))?;
    let mut buffer = Buffer::new(&buffer_config(2))?;
    fill_with(&mut buffer, 10, |_| f32::NAN)?;

    let err = agent
        .opt_with_record(&mut buffer)
        .expect_err("a NaN target must abort the update");
    match err.downcast_ref::<SacError>() {
        Some(SacError::NonFiniteLoss { name, value }) => {
            assert_eq!(*name, "loss_q1");
            assert!(value.is_nan());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}

#[test]
fn test_update_with_grad_clip() -> Result<()> {
    let config = sac_config(3, CriticMode::Double, 8).grad_clip(0.5);
    let mut agent = Agent_::build(config)?;
    let mut buffer = Buffer::new(&buffer_config(3))?;
    fill(&mut buffer, 30)?;

    for _ in 0..5 {
        let record = agent
            .opt_with_record(&mut buffer)?
            .expect("an update should run");
        assert!(record.get_scalar("loss_q1")?.is_finite());
        assert!(record.get_scalar("alpha")? > 0.0);
    }
    assert_eq!(agent.n_opts(), 5);
    Ok(())
}

#[test]
fn test_deterministic_action_and_params_round_trip() -> Result<()> {
    let dir = TempDir::new("sac_params")?;
    let mut agent1 = Agent_::build(sac_config(1, CriticMode::Double, 4))?;
    let mut agent2 = Agent_::build(sac_config(1, CriticMode::Double, 4))?;
    let mut buffer = Buffer::new(&buffer_config(1))?;
    fill(&mut buffer, 10)?;
    agent1.opt(&mut buffer)?;

    agent1.save_params(dir.path())?;
    for name in [
        "actor.safetensors",
        "q1.safetensors",
        "q2.safetensors",
        "q1_tgt.safetensors",
        "q2_tgt.safetensors",
        "ent_coef.safetensors",
    ]
    .iter()
    {
        assert!(dir.path().join(name).exists(), "{} is missing", name);
    }
    agent2.load_params(dir.path())?;

    // Evaluation mode takes the deterministic action.
    agent1.eval();
    agent2.eval();
    let obs = LineObs(0.3);
    let a1 = agent1.sample(&obs)?;
    let a2 = agent2.sample(&obs)?;
    assert_eq!(a1.0, a2.0);
    assert_eq!(agent1.sample(&obs)?.0, a1.0);
    assert!(a1.0.abs() <= 1.0);
    Ok(())
}

#[test]
fn test_train_with_evaluators() -> Result<()> {
    let model_dir = TempDir::new("sac_train")?;
    let config = TrainerConfig::default()
        .max_env_steps(60)
        .warmup_period(20)
        .eval_interval(30)
        .record_agent_info_interval(10)
        .flush_record_interval(30)
        .max_episode_steps(100)
        .model_dir(model_dir.path().to_string_lossy());
    let mut trainer = Trainer::<
        LineEnv,
        MultiStepProcessor<LineEnv, TensorBatch, TensorBatch>,
        Buffer,
    >::build(config, (), MultiStepProcessorConfig::default(), buffer_config(3))?;
    let mut agent = Agent_::build(sac_config(3, CriticMode::Double, 16))?;
    let mut recorder = BufferedRecorder::new();
    let mut evaluator = (
        DefaultEvaluator::<LineEnv>::new(&(), 0, 1)?,
        QBiasEvaluator::<LineEnv>::new(&(), 1, 0.9)?,
    );

    trainer.train(&mut agent, &mut recorder, &mut evaluator)?;

    assert_eq!(trainer.env_steps(), 60);
    assert!(agent.n_opts() > 0);
    assert!(model_dir.path().join("best").join("actor.safetensors").exists());
    assert!(model_dir.path().join("final").join("q1.safetensors").exists());

    let q_biases: Vec<f32> = recorder
        .iter()
        .filter_map(|r| r.get_scalar("q_bias").ok())
        .collect();
    assert_eq!(q_biases.len(), 2);
    assert!(q_biases.iter().all(|b| b.is_finite()));

    // Episode scalars are summarized when several episodes end between flushes.
    assert!(recorder
        .iter()
        .any(|r| r.keys().any(|k| k.starts_with("episode_length"))));
    Ok(())
}

#[test]
fn test_q_bias_on_untrained_agent() -> Result<()> {
    let mut agent = Agent_::build(sac_config(1, CriticMode::Double, 4))?;
    let mut evaluator = QBiasEvaluator::<LineEnv>::new(&(), 0, 0.9)?.fraction(0.5);
    let record = evaluator.evaluate(&mut agent)?;
    assert!(record.get_scalar("q_bias")?.is_finite());
    Ok(())
}
