use anyhow::Result;
use border::pendulum::{Pendulum, PendulumConfig};
use border_candle_agent::{
    mlp::{Mlp, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    sac::{EntCoefMode, QBiasEvaluator, Sac, SacConfig},
    util::{
        actor::GaussianActorConfig,
        critic::{CriticConfig, CriticMode},
    },
    TensorBatch,
};
use border_core::{
    multistep_replay_buffer::{
        MultiStepProcessor, MultiStepProcessorConfig, MultiStepReplayBuffer,
    },
    record::AggregateRecorder,
    Agent, Configurable, DefaultEvaluator, Evaluator as _, Trainer, TrainerConfig,
};
use border_tensorboard::TensorboardRecorder;
use candle_core::Device;
use clap::Parser;
use std::path::Path;

const DIM_OBS: usize = 3;
const DIM_ACT: usize = 1;
const ACTION_LIMIT: f64 = 2.0;
const LR_ACTOR: f64 = 3e-4;
const LR_CRITIC: f64 = 3e-4;
const GAMMA: f64 = 0.99;
const BATCH_SIZE: usize = 128;
const WARMUP_PERIOD: usize = 1000;
const MAX_ENV_STEPS: usize = 40_000;
const EVAL_INTERVAL: usize = 2_000;
const REPLAY_BUFFER_CAPACITY: usize = 100_000;
const N_EPISODES_PER_EVAL: usize = 5;
const MODEL_DIR: &str = "./border/examples/model/sac_pendulum";

type Env = Pendulum;
type StepProc = MultiStepProcessor<Env, TensorBatch, TensorBatch>;
type ReplayBuffer = MultiStepReplayBuffer<TensorBatch, TensorBatch>;
type SacAgent = Sac<Env, Mlp, Mlp2, ReplayBuffer>;

/// Train/eval multi-step SAC agent in pendulum environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Train SAC agent, not evaluate
    #[arg(short, long, default_value_t = false)]
    train: bool,

    /// Evaluate SAC agent, not train
    #[arg(short, long, default_value_t = false)]
    eval: bool,

    /// Number of steps of the transitions
    #[arg(short = 'k', long, default_value_t = 3)]
    multistep_k: usize,

    /// Use a single action-value estimate instead of the minimum of two
    #[arg(long, default_value_t = false)]
    single_critic: bool,

    /// Fixed entropy coefficient, tuned automatically if not given
    #[arg(long)]
    alpha: Option<f64>,

    /// Maximum norm of the gradients, no clipping if not given
    #[arg(long)]
    grad_clip: Option<f64>,

    /// Directory of the model and the logs
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,
}

fn sac_config(args: &Args) -> Result<SacConfig<Mlp, Mlp2>> {
    let device = Device::cuda_if_available(0)?;
    let actor_config = GaussianActorConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_ACTOR))
        .action_limit(ACTION_LIMIT)
        .policy_config(MlpConfig::new(DIM_OBS, vec![64, 64], DIM_ACT, false));
    let critic_config = CriticConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_CRITIC))
        .q_config(MlpConfig::new(DIM_OBS + DIM_ACT, vec![64, 64], 1, false));
    let ent_coef_mode = match args.alpha {
        Some(alpha) => EntCoefMode::Fix(alpha),
        None => EntCoefMode::default(),
    };
    let critic_mode = match args.single_critic {
        true => CriticMode::Single,
        false => CriticMode::Double,
    };
    let mut config = SacConfig::default()
        .batch_size(BATCH_SIZE)
        .discount_factor(GAMMA)
        .multistep_k(args.multistep_k)
        .ent_coef_mode(ent_coef_mode)
        .critic_mode(critic_mode)
        .actor_config(actor_config)
        .critic_config(critic_config)
        .device(device);
    if let Some(v) = args.grad_clip {
        config = config.grad_clip(v);
    }
    Ok(config)
}

fn create_agent(args: &Args) -> Result<SacAgent> {
    SacAgent::build(sac_config(args)?)
}

fn train(args: &Args, max_env_steps: usize, eval_interval: usize) -> Result<()> {
    let env_config = PendulumConfig::default();
    let sac_config = sac_config(args)?;
    let buffer_config = sac_config
        .replay_buffer_config()
        .capacity(REPLAY_BUFFER_CAPACITY);
    let config = TrainerConfig::default()
        .max_env_steps(max_env_steps)
        .warmup_period(WARMUP_PERIOD.min(max_env_steps / 2))
        .eval_interval(eval_interval)
        .record_agent_info_interval(eval_interval)
        .flush_record_interval(eval_interval)
        .max_episode_steps(env_config.max_episode_steps)
        .model_dir(args.model_dir.as_str());
    let mut trainer = Trainer::<Env, StepProc, ReplayBuffer>::build(
        config,
        env_config.clone(),
        MultiStepProcessorConfig::default(),
        buffer_config,
    )?;
    let mut agent = SacAgent::build(sac_config)?;
    let mut recorder: Box<dyn AggregateRecorder> =
        Box::new(TensorboardRecorder::new(&args.model_dir));
    let mut evaluator = (
        DefaultEvaluator::<Env>::new(&env_config, 0, N_EPISODES_PER_EVAL)?,
        QBiasEvaluator::<Env>::new(&env_config, 1, GAMMA)?,
    );

    trainer.train(&mut agent, recorder.as_mut(), &mut evaluator)?;

    Ok(())
}

fn eval(args: &Args, n_episodes: usize) -> Result<()> {
    let env_config = PendulumConfig::default();
    let mut agent = {
        let mut agent = create_agent(args)?;
        agent.load_params(&Path::new(&args.model_dir).join("best"))?;
        agent.eval();
        agent
    };
    let record = DefaultEvaluator::<Env>::new(&env_config, 0, n_episodes)?.evaluate(&mut agent)?;
    println!("{:?}", record);

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.train {
        train(&args, MAX_ENV_STEPS, EVAL_INTERVAL)?;
    } else if args.eval {
        eval(&args, 5)?;
    } else {
        train(&args, MAX_ENV_STEPS, EVAL_INTERVAL)?;
        eval(&args, 5)?;
    }

    Ok(())
}
