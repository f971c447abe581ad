//! Actor of TD3, a deterministic policy with its optimizer.
use crate::{
    model::{ModelBase, SubModel},
    opt::{Optimizer, OptimizerConfig},
    util::OutDim,
};
use anyhow::{Context, Result};
use log::{info, trace};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use tch::{nn, Device, Tensor};

/// Configuration of [`Actor`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActorConfig<P> {
    pub(crate) pi_config: Option<P>,
    pub(crate) opt_config: OptimizerConfig,
}

impl<P> Default for ActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::Adam { lr: 3e-4 },
        }
    }
}

impl<P> ActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations for the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// A deterministic policy network with its own [`nn::VarStore`] and optimizer.
pub struct Actor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    device: Device,
    var_store: nn::VarStore,

    // Dimension of the action vector.
    out_dim: i64,

    pi: P,

    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<P> Actor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    /// Constructs [`Actor`].
    pub fn build(config: ActorConfig<P::Config>, device: Device) -> Result<Actor<P>> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let out_dim = pi_config.get_out_dim();
        let var_store = nn::VarStore::new(device);
        let pi = P::build(&var_store, pi_config);

        Actor::_build(device, out_dim, config.opt_config, pi, var_store, None)
    }

    fn _build(
        device: Device,
        out_dim: i64,
        opt_config: OptimizerConfig,
        pi: P,
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
            out_dim,
            pi,
            opt_config,
            opt,
        })
    }

    /// Returns a copy of this actor with its own parameters and a fresh optimizer.
    pub fn try_clone(&self) -> Result<Self> {
        let var_store = nn::VarStore::new(self.device);
        let pi = self.pi.clone_with_var_store(&var_store);

        Self::_build(
            self.device,
            self.out_dim,
            self.opt_config.clone(),
            pi,
            var_store,
            Some(&self.var_store),
        )
    }

    /// Overwrites the parameters with those of `src`.
    pub fn copy_from(&mut self, src: &Self) -> Result<()> {
        self.var_store.copy(&src.var_store)?;
        Ok(())
    }

    /// Outputs actions given observations.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        let act = self.pi.forward(obs);
        debug_assert_eq!(act.size().as_slice()[1], self.out_dim);
        act
    }

    /// Returns the optimizer configuration.
    pub fn opt_config(&self) -> &OptimizerConfig {
        &self.opt_config
    }
}

impl<P> ModelBase for Actor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim,
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
        info!("Save actor to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load actor from {:?}", path.as_ref());
        Ok(())
    }
}
