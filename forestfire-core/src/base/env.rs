//! Environment interface.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// An episodic environment the agents interact with.
///
/// Observations and actions are converted to and from tensors by the agents,
/// see the `E::Obs: Into<Tensor>` bounds of the TD3 and BCQ agents.
pub trait Env {
    /// Configuration passed to [`Env::build`].
    type Config: Clone;

    /// Observation given to the policy.
    type Obs: Obs;

    /// Action taken by the policy.
    type Act: Act;

    /// Extra data returned with each [`Step`].
    type Info: Info;

    /// Creates the environment; `seed` makes its randomness reproducible.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Applies an action and returns its outcome with a record of
    /// environment-specific values.
    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record)
    where
        Self: Sized;

    /// Starts a new episode and returns its first observation.
    ///
    /// With `Some(is_done)`, the environment is reset only if `is_done[0] == 1`.
    fn reset(&mut self, is_done: Option<&Vec<i8>>) -> Result<Self::Obs>;

    /// Starts the `ix`-th evaluation episode.
    ///
    /// [`DefaultEvaluator`](crate::DefaultEvaluator) calls this with the episode
    /// number so that an evaluation runs the same episodes every time.
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs>;
}
