//! Outcome of one environment step.
use super::Env;

/// Environment-specific data attached to a [`Step`], `()` when there is none.
pub trait Info {}

impl Info for () {}

/// What [`Env::step`] returns for the action `a_t`: the next observation
/// `o_t+1`, the reward `r_t` and the end-of-episode flags.
///
/// Vectors hold one entry per environment; the environments of this crate
/// are not vectorized, so they have a single entry.
pub struct Step<E: Env> {
    /// The action taken.
    pub act: E::Act,

    /// Observation after the action.
    pub obs: E::Obs,

    /// `r_t`.
    pub reward: Vec<f32>,

    /// `1` if the episode reached a terminal state, such as a fire burning out.
    pub is_terminated: Vec<i8>,

    /// `1` if the episode was cut by a step limit.
    pub is_truncated: Vec<i8>,

    /// See [`Info`].
    pub info: E::Info,

    /// First observation of the next episode, for environments resetting themselves.
    pub init_obs: Option<E::Obs>,
}

impl<E: Env> Step<E> {
    /// Bundles the outcome of a step.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
        is_truncated: Vec<i8>,
        info: E::Info,
        init_obs: Option<E::Obs>,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
            init_obs,
        }
    }

    /// Whether the episode ended, by termination or truncation.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.is_terminated[0] == 1 || self.is_truncated[0] == 1
    }
}
