//! Default implementation of the [`Evaluator`] trait.
use super::Evaluator;
use crate::{error::ForestFireError, record::Record, Env, Policy};
use anyhow::Result;
use log::debug;

/// Runs a fixed number of episodes and reports the average return
/// under the key `"Episode return"`.
///
/// ```ignore
/// let mut evaluator = DefaultEvaluator::<FireEnv>::new(&config, 42, 10)?;
/// agent.eval();
/// let record = evaluator.evaluate(&mut agent)?;
/// println!("{}", record.get_scalar("Episode return")?);
/// ```
pub struct DefaultEvaluator<E: Env> {
    n_episodes: usize,
    env: E,
}

impl<E: Env> Evaluator<E> for DefaultEvaluator<E> {
    fn evaluate<P: Policy<E>>(&mut self, policy: &mut P) -> Result<Record> {
        let mut r_total = 0f32;

        for ix in 0..self.n_episodes {
            let mut prev_obs = self.env.reset_with_index(ix)?;
            let mut r_episode = 0f32;

            loop {
                let act = policy.sample(&prev_obs);
                let (step, _) = self.env.step(&act);
                r_episode += step.reward[0];
                if step.is_done() {
                    break;
                }
                prev_obs = step.obs;
            }

            debug!("Episode {}: return = {}", ix, r_episode);
            r_total += r_episode;
        }

        Ok(Record::from_scalar(
            "Episode return",
            r_total / self.n_episodes as f32,
        ))
    }
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`].
    ///
    /// * `config` - Configuration of the environment.
    /// * `seed` - Random seed for environment initialization.
    /// * `n_episodes` - Number of episodes to run in an evaluation, at least one.
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        if n_episodes == 0 {
            return Err(ForestFireError::InvalidConfig(
                "n_episodes of the evaluator must be positive".to_string(),
            )
            .into());
        }

        Ok(Self {
            n_episodes,
            env: E::build(config, seed)?,
        })
    }
}
