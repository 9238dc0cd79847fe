//! Evaluate [`Agent`](crate::Agent).
use crate::{record::Record, Env};
use anyhow::Result;
mod default_evaluator;
pub use default_evaluator::DefaultEvaluator;

/// Evaluates an agent.
///
/// The caller of this method needs to handle the internal state of `agent`,
/// like training/evaluation mode.
pub trait Evaluator<E: Env, A> {
    /// Runs the evaluation and returns its results.
    fn evaluate(&mut self, agent: &mut A) -> Result<Record>;
}

/// Runs both evaluators and merges their records.
impl<E, A, D1, D2> Evaluator<E, A> for (D1, D2)
where
    E: Env,
    D1: Evaluator<E, A>,
    D2: Evaluator<E, A>,
{
    fn evaluate(&mut self, agent: &mut A) -> Result<Record> {
        let record = self.0.evaluate(agent)?;
        Ok(record.merge(self.1.evaluate(agent)?))
    }
}
