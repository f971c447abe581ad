#![warn(missing_docs)]
//! Core traits and records for the forestfire reinforcement learning agents.
//!
//! Environments and replay buffers are supplied by the user through [`Env`],
//! [`ExperienceBufferBase`] and [`ReplayBufferBase`]. Agents implement [`Agent`],
//! which adds optimization and persistence to [`Policy`].
pub mod error;
pub mod record;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase,
    Step, TransitionBatch,
};

mod evaluator;
pub use evaluator::{DefaultEvaluator, Evaluator};
