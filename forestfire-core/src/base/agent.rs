//! Learning agents.
use super::{Env, Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// A [`Policy`] that learns from the transitions of a replay buffer.
///
/// TD3 fills the buffer with its own noisy actions; BCQ is given a buffer
/// holding a fixed dataset.
pub trait Agent<E: Env, R: ReplayBufferBase>: Policy<E> {
    /// Switches to training mode, where a policy may add exploration noise.
    fn train(&mut self);

    /// Switches to evaluation mode, where actions are deterministic.
    fn eval(&mut self);

    /// `true` in training mode.
    fn is_train(&self) -> bool;

    /// Runs [`Agent::opt_with_record`] and drops the losses.
    fn opt(&mut self, buffer: &mut R) {
        let _ = self.opt_with_record(buffer);
    }

    /// Runs the gradient iterations of one optimization step on batches taken
    /// from `buffer` and returns the averaged losses.
    ///
    /// The record is empty if no iteration ran, for instance while the buffer
    /// holds fewer transitions than the warm-up size.
    fn opt_with_record(&mut self, buffer: &mut R) -> Record;

    /// Writes the networks and the training state to files named
    /// `{prefix}_<part>`, like `{prefix}_actor.pt`, and returns their paths.
    fn save_params(&self, prefix: &Path) -> Result<Vec<PathBuf>>;

    /// Reads the files written by [`Agent::save_params`] with the same prefix.
    fn load_params(&mut self, prefix: &Path) -> Result<()>;
}
