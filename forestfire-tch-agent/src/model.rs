//! Traits shared by the networks of the agents.
//!
//! A network of TD3 or BCQ is split in two layers. A [`SubModel`] or
//! [`SubModel2`] only defines layers and the forward pass on a [`VarStore`] it
//! is given. A wrapper such as [`Actor`](crate::actor::Actor),
//! [`Critic`](crate::critic::Critic) or [`Vae`](crate::bcq::Vae) owns that
//! [`VarStore`] together with an optimizer and implements [`ModelBase`].
use anyhow::Result;
use std::path::Path;
use tch::{nn::VarStore, Tensor};

/// A network owning its parameters and its optimizer.
///
/// Soft updates of target networks go through the var stores, see
/// [`track`](crate::util::track).
pub trait ModelBase {
    /// Takes one optimizer step minimizing `loss`.
    fn backward_step(&mut self, loss: &Tensor);

    fn get_var_store_mut(&mut self) -> &mut VarStore;

    fn get_var_store(&self) -> &VarStore;

    /// Writes the parameters to `path` in the libtorch format.
    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()>;

    /// Reads parameters written by [`ModelBase::save`].
    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()>;
}

/// Layers fed with a single tensor, like the deterministic policy of TD3.
pub trait SubModel {
    /// Serializable description of the layers.
    type Config;

    type Input;

    type Output;

    /// Creates the layers as variables of `var_store`.
    fn build(var_store: &VarStore, config: Self::Config) -> Self;

    /// Creates the same layers on another store; the values of the variables
    /// are not copied. Target networks start this way.
    fn clone_with_var_store(&self, var_store: &VarStore) -> Self;

    fn forward(&self, input: &Self::Input) -> Self::Output;
}

/// Layers fed with an observation and an action.
///
/// Implemented by the twin Q network and the perturbation network of BCQ.
pub trait SubModel2 {
    /// Serializable description of the layers.
    type Config;

    type Input1;

    type Input2;

    type Output;

    /// Creates the layers as variables of `var_store`.
    fn build(var_store: &VarStore, config: Self::Config) -> Self;

    /// See [`SubModel::clone_with_var_store`].
    fn clone_with_var_store(&self, var_store: &VarStore) -> Self;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Self::Output;
}
