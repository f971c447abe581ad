//! Twin critic with its optimizer.
use crate::{
    model::{ModelBase, SubModel2},
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::{Context, Result};
use log::{info, trace};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use tch::{nn, Device, Tensor};

/// Configuration of [`Critic`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CriticConfig<Q> {
    pub(crate) q_config: Option<Q>,
    pub(crate) opt_config: OptimizerConfig,
}

impl<Q> Default for CriticConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::Adam { lr: 3e-4 },
        }
    }
}

impl<Q> CriticConfig<Q>
where
    Q: DeserializeOwned + Serialize,
{
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// A pair of action-value functions `(Q1, Q2)` trained with a single optimizer.
///
/// Since the loss is the sum of the losses of the two heads, one optimizer
/// over the shared [`nn::VarStore`] updates both.
pub struct Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize,
{
    device: Device,
    var_store: nn::VarStore,
    q: Q,
    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<Q> Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize,
{
    /// Constructs [`Critic`].
    pub fn build(config: CriticConfig<Q::Config>, device: Device) -> Result<Critic<Q>> {
        let q_config = config.q_config.context("q_config is not set.")?;
        let var_store = nn::VarStore::new(device);
        let q = Q::build(&var_store, q_config);

        Critic::_build(device, config.opt_config, q, var_store, None)
    }

    fn _build(
        device: Device,
        opt_config: OptimizerConfig,
        q: Q,
        mut var_store: nn::VarStore,
        var_store_src: Option<&nn::VarStore>,
    ) -> Result<Self> {
        let opt = opt_config.build(&var_store)?;

        if let Some(var_store_src) = var_store_src {
            var_store.copy(var_store_src)?;
        }

        Ok(Self {
            device,
            var_store,
            q,
            opt_config,
            opt,
        })
    }

    /// Returns a copy of this critic with its own parameters and a fresh optimizer.
    pub fn try_clone(&self) -> Result<Self> {
        let var_store = nn::VarStore::new(self.device);
        let q = self.q.clone_with_var_store(&var_store);

        Self::_build(
            self.device,
            self.opt_config.clone(),
            q,
            var_store,
            Some(&self.var_store),
        )
    }

    /// Overwrites the parameters with those of `src`.
    pub fn copy_from(&mut self, src: &Self) -> Result<()> {
        self.var_store.copy(&src.var_store)?;
        Ok(())
    }

    /// Returns `(Q1(s, a), Q2(s, a))`, each of shape `[batch, 1]`.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> (Tensor, Tensor) {
        self.q.forward(obs, act)
    }

    /// Returns the optimizer configuration.
    pub fn opt_config(&self) -> &OptimizerConfig {
        &self.opt_config
    }
}

impl<Q> ModelBase for Critic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize,
{
    fn backward_step(&mut self, loss: &Tensor) {
        self.opt.backward_step(loss);
    }

    fn get_var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    fn get_var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.var_store.save(&path)?;
        info!("Save critic to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load critic from {:?}", path.as_ref());
        Ok(())
    }
}
