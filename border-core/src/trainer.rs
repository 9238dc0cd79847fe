//! Train [`Agent`].
mod config;
mod sampler;
use crate::{
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    Agent, Env, Evaluator, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::info;
pub use sampler::Sampler;
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages training loop and related objects.
///
/// The trainer owns the replay buffer. The agent and the evaluator are passed to
/// [`Trainer::train`] by mutable reference.
///
/// # Training loop
///
/// 1. Do an environment step with [`Sampler`] and push the transition into the replay
///    buffer. During the first `warmup_period` steps actions are drawn uniformly
///    with [`Env::random_act`].
/// 2. `env_steps += 1`
/// 3. If `env_steps % opt_interval == 0`, do an optimization step. The agent skips it
///    while the buffer does not hold a full batch. Every `record_agent_info_interval`
///    optimization steps, the record returned by the agent is kept.
/// 4. If `env_steps % eval_interval == 0`, evaluate the agent. If `eval_return` is the
///    best so far, the parameters are saved in `(model_dir)/best`.
/// 5. If `env_steps % save_interval == 0`, the parameters are saved in
///    `(model_dir)/(env_steps)`.
/// 6. Store the record and flush the recorder every `flush_record_interval` steps.
/// 7. Back to 1 until `env_steps == max_env_steps`. The final parameters are saved in
///    `(model_dir)/final`.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Env::Act|B[Env]
///     B -->|Env::Obs|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|ExperienceBufferBase::Item|D[ReplayBuffer]
///     D -->|ReplayBufferBase::Batch|A
/// ```
pub struct Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    config: TrainerConfig,

    /// Configuration of the environment for training.
    env_config_train: E::Config,

    /// Configuration of the transition producer.
    step_proc_config: P::Config,

    buffer: R,

    env_steps: usize,

    opt_steps: usize,

    /// Optimization steps for computing optimization steps per second.
    opt_steps_for_ops: usize,

    /// Timer for computing for optimization steps per second.
    timer_for_ops: Duration,
}

impl<E, P, R> Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    /// Constructs a trainer and its replay buffer.
    pub fn build(
        config: TrainerConfig,
        env_config_train: E::Config,
        step_proc_config: P::Config,
        replay_buffer_config: R::Config,
    ) -> Result<Self> {
        Ok(Self {
            config,
            env_config_train,
            step_proc_config,
            buffer: R::build(&replay_buffer_config)?,
            env_steps: 0,
            opt_steps: 0,
            opt_steps_for_ops: 0,
            timer_for_ops: Duration::new(0, 0),
        })
    }

    /// The replay buffer.
    pub fn buffer(&self) -> &R {
        &self.buffer
    }

    /// Number of environment steps done.
    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    /// Number of optimization steps done.
    pub fn opt_steps(&self) -> usize {
        self.opt_steps
    }

    fn save_model<A: Agent<E, R>>(agent: &A, path: PathBuf) {
        match agent.save_params(&path) {
            Ok(()) => info!("Saved the model in {:?}.", &path),
            Err(e) => info!("Failed to save model in {:?}: {}", &path, e),
        }
    }

    fn model_path(&self, name: impl AsRef<Path>) -> Option<PathBuf> {
        self.config
            .model_dir
            .as_ref()
            .map(|dir| Path::new(dir).join(name))
    }

    /// Returns optimization steps per second, then reset the internal counter.
    fn opt_steps_per_sec(&mut self) -> f32 {
        let osps = self.opt_steps_for_ops as f32 / self.timer_for_ops.as_secs_f32().max(1e-6);
        self.opt_steps_for_ops = 0;
        self.timer_for_ops = Duration::new(0, 0);
        osps
    }

    /// Performs a training step.
    ///
    /// First, it performes an environment step once and pushes a transition
    /// into the buffer with [`Sampler`]. Then, if the number of environment steps
    /// reaches the optimization interval `opt_interval`, performes an optimization
    /// step.
    ///
    /// The second return value in the tuple is if an optimization step is done (`true`).
    pub fn train_step<A>(
        &mut self,
        agent: &mut A,
        sampler: &mut Sampler<E, P>,
    ) -> Result<(Record, bool)>
    where
        A: Agent<E, R>,
    {
        let random = self.env_steps < self.config.warmup_period;
        let mut record = sampler.sample_and_push(agent, &mut self.buffer, random)?;
        self.env_steps += 1;

        if self.env_steps % self.config.opt_interval != 0 {
            return Ok((record, false));
        }

        let timer = SystemTime::now();
        let is_opt = if (self.opt_steps + 1) % self.config.record_agent_info_interval == 0 {
            match agent.opt_with_record(&mut self.buffer)? {
                Some(record_agent) => {
                    record.merge_inplace(record_agent);
                    true
                }
                None => false,
            }
        } else {
            agent.opt(&mut self.buffer)?
        };

        if is_opt {
            self.opt_steps += 1;
            self.opt_steps_for_ops += 1;
            self.timer_for_ops += timer.elapsed()?;
        }
        Ok((record, is_opt))
    }

    /// Train the agent.
    pub fn train<A, D>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut D,
    ) -> Result<()>
    where
        A: Agent<E, R>,
        D: Evaluator<E, A>,
    {
        let env = E::build(&self.env_config_train, self.config.seed)?;
        let step_proc = P::build(&self.step_proc_config);
        let mut sampler = Sampler::new(env, step_proc, self.config.max_episode_steps);
        let mut max_eval_return = f32::MIN;
        info!(
            "Start training: {} env steps, horizon {}",
            self.config.max_env_steps,
            sampler.max_episode_steps()
        );
        agent.train();

        while self.env_steps < self.config.max_env_steps {
            let (mut record, _) = self.train_step(agent, &mut sampler)?;
            let env_steps = self.env_steps;

            if self.config.eval_interval > 0 && env_steps % self.config.eval_interval == 0 {
                agent.eval();
                let record_eval = evaluator.evaluate(agent)?;
                agent.train();
                let eval_return = record_eval.get_scalar("eval_return").ok();
                info!("Evaluation at {} env steps: {:?}", env_steps, eval_return);
                record.merge_inplace(record_eval);
                record.insert("opt_steps", Scalar(self.opt_steps as f32));
                record.insert("opt_steps_per_sec", Scalar(self.opt_steps_per_sec()));

                // Save the best model up to the current iteration
                if let Some(eval_return) = eval_return {
                    if eval_return > max_eval_return {
                        max_eval_return = eval_return;
                        if let Some(path) = self.model_path("best") {
                            Self::save_model(agent, path);
                        }
                    }
                }
            }

            if self.config.save_interval > 0 && env_steps % self.config.save_interval == 0 {
                if let Some(path) = self.model_path(format!("{}", env_steps)) {
                    Self::save_model(agent, path);
                }
            }

            if !record.is_empty() {
                recorder.store(record);
            }

            if env_steps % self.config.flush_record_interval == 0 {
                recorder.flush(env_steps as _);
            }
        }

        recorder.flush(self.env_steps as _);
        if let Some(path) = self.model_path("final") {
            Self::save_model(agent, path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv, DummyEnvConfig, VecBatch},
        multistep_replay_buffer::{
            MultiStepProcessor, MultiStepProcessorConfig, MultiStepReplayBuffer,
            MultiStepReplayBufferConfig,
        },
        record::BufferedRecorder,
        DefaultEvaluator,
    };
    use tempdir::TempDir;

    type StepProc = MultiStepProcessor<DummyEnv, VecBatch, VecBatch>;
    type Buffer = MultiStepReplayBuffer<VecBatch, VecBatch>;

    fn env_config(terminates: bool, max_episode_steps: Option<usize>) -> DummyEnvConfig {
        DummyEnvConfig {
            episode_len: 10,
            terminates,
            max_episode_steps,
        }
    }

    fn buffer_config() -> MultiStepReplayBufferConfig {
        MultiStepReplayBufferConfig::default()
            .capacity(1000)
            .staging_capacity(100)
            .multistep_k(2)
            .gamma(0.9)
    }

    #[test]
    fn test_train_loop() -> Result<()> {
        let model_dir = TempDir::new("trainer")?;
        let config = TrainerConfig::default()
            .max_env_steps(50)
            .warmup_period(5)
            .eval_interval(25)
            .record_agent_info_interval(1)
            .flush_record_interval(10)
            .model_dir(model_dir.path().to_string_lossy());
        let env_config = env_config(true, None);
        let mut trainer = Trainer::<DummyEnv, StepProc, Buffer>::build(
            config,
            env_config.clone(),
            MultiStepProcessorConfig::default(),
            buffer_config(),
        )?;
        let mut agent = DummyAgent::new(4);
        let mut recorder = BufferedRecorder::new();
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&env_config, 0, 1)?;

        trainer.train(&mut agent, &mut recorder, &mut evaluator)?;

        // each episode of 10 steps yields 10 records with k = 2
        assert_eq!(trainer.env_steps(), 50);
        assert_eq!(trainer.buffer().len(), 50);
        // the buffer holds a batch from the 5th step on
        assert_eq!(trainer.opt_steps(), 46);
        assert_eq!(agent.n_opts, 46);

        let eval_returns: Vec<f32> = recorder
            .iter()
            .filter_map(|r| r.get_scalar("eval_return").ok())
            .collect();
        assert_eq!(eval_returns, vec![10.0, 10.0]);
        assert!(recorder
            .iter()
            .any(|r| r.get_scalar("episode_return").is_ok()
                || r.get_scalar("episode_return_mean").is_ok()));

        assert!(model_dir.path().join("best").join("n_opts.txt").exists());
        assert!(model_dir.path().join("final").join("n_opts.txt").exists());
        Ok(())
    }

    #[test]
    fn test_horizon_truncates_episodes() -> Result<()> {
        let config = TrainerConfig::default()
            .max_env_steps(30)
            .warmup_period(0)
            .eval_interval(0)
            .max_episode_steps(6);
        let mut trainer = Trainer::<DummyEnv, StepProc, Buffer>::build(
            config,
            env_config(true, None),
            MultiStepProcessorConfig::default(),
            buffer_config(),
        )?;
        let mut agent = DummyAgent::new(1000);
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&env_config(true, None), 0, 1)?;
        trainer.train(&mut agent, &mut BufferedRecorder::new(), &mut evaluator)?;

        // steps 2 to 5 of each of the 5 episodes are promoted
        assert_eq!(trainer.buffer().len(), 20);
        let batch = trainer.buffer().snapshot_all()?;
        assert!(batch.is_terminated.iter().all(|&d| d == 0));
        assert!(batch.reward.iter().all(|&r| (r - 1.9).abs() < 1e-5));
        assert_eq!(agent.n_opts, 0);
        Ok(())
    }

    #[test]
    fn test_env_declared_horizon_wins() -> Result<()> {
        let config = TrainerConfig::default()
            .max_env_steps(20)
            .warmup_period(0)
            .eval_interval(0)
            .max_episode_steps(6);
        let env_config = env_config(false, Some(4));
        let mut trainer = Trainer::<DummyEnv, StepProc, Buffer>::build(
            config,
            env_config.clone(),
            MultiStepProcessorConfig::default(),
            buffer_config(),
        )?;
        let mut agent = DummyAgent::new(1000);
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&env_config, 0, 1)?;
        trainer.train(&mut agent, &mut BufferedRecorder::new(), &mut evaluator)?;

        assert_eq!(trainer.buffer().len(), 10);
        Ok(())
    }
}
