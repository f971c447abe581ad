//! Perturbation model of BCQ.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::{ModelBase, SubModel2},
    opt::{Optimizer, OptimizerConfig},
    util::{ActionBound, OutDim},
};
use anyhow::{Context, Result};
use log::{info, trace};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};

fn default_units() -> Vec<i64> {
    vec![400, 300]
}

/// Configuration of [`PerturbationNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerturbationNetConfig {
    /// Dimension of the (flattened) observation.
    pub state_dim: i64,

    /// Dimension of the action vector.
    pub action_dim: i64,

    /// Actions are in `[-max_action, max_action]`.
    pub max_action: f64,

    /// The perturbation is in `[-phi * max_action, phi * max_action]`.
    pub phi: f64,

    /// Hidden units.
    #[serde(default = "default_units")]
    pub units: Vec<i64>,
}

impl PerturbationNetConfig {
    /// Creates the configuration with hidden units `[400, 300]`.
    pub fn new(state_dim: i64, action_dim: i64, max_action: f64, phi: f64) -> Self {
        Self {
            state_dim,
            action_dim,
            max_action,
            phi,
            units: default_units(),
        }
    }
}

impl OutDim for PerturbationNetConfig {
    fn get_out_dim(&self) -> i64 {
        self.action_dim
    }

    fn set_out_dim(&mut self, v: i64) {
        self.action_dim = v;
    }
}

impl ActionBound for PerturbationNetConfig {
    fn get_max_action(&self) -> f64 {
        self.max_action
    }
}

/// Shifts an action by at most `phi * max_action` per dimension.
///
/// `a' = clamp(a + phi * max_action * tanh(f(s, a)), -max_action, max_action)`
pub struct PerturbationNet {
    config: PerturbationNetConfig,
    device: Device,
    mlp: Mlp,
}

impl SubModel2 for PerturbationNet {
    type Config = PerturbationNetConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let mlp_config = MlpConfig::new(
            config.state_dim + config.action_dim,
            config.units.clone(),
            config.action_dim,
            false,
        );
        let mlp = Mlp::build_with_path(&(var_store.root() / "mlp"), mlp_config);

        Self {
            config,
            device: var_store.device(),
            mlp,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }

    fn forward(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let max_action = self.config.max_action;
        let obs = obs
            .to(self.device)
            .to_kind(Kind::Float)
            .reshape(&[-1, self.config.state_dim]);
        let act = act.to(self.device).to_kind(Kind::Float);
        let perturbation = self.mlp.forward2(&obs, &act).tanh() * (self.config.phi * max_action);
        (act + perturbation).clamp(-max_action, max_action)
    }
}

/// Configuration of [`PerturbActor`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerturbActorConfig<P> {
    pub(crate) pi_config: Option<P>,
    pub(crate) opt_config: OptimizerConfig,
}

impl<P> Default for PerturbActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::Adam { lr: 1e-3 },
        }
    }
}

impl<P> PerturbActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations for the perturbation network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }
}

/// The actor of BCQ: a perturbation network with its own [`nn::VarStore`] and optimizer.
pub struct PerturbActor<P>
where
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    device: Device,
    var_store: nn::VarStore,
    out_dim: i64,
    pi: P,
    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<P> PerturbActor<P>
where
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    /// Constructs [`PerturbActor`].
    pub fn build(config: PerturbActorConfig<P::Config>, device: Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let out_dim = pi_config.get_out_dim();
        let var_store = nn::VarStore::new(device);
        let pi = P::build(&var_store, pi_config);

        Self::_build(device, out_dim, config.opt_config, pi, var_store, None)
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

    /// Perturbs the given actions.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let act = self.pi.forward(obs, act);
        debug_assert_eq!(act.size().as_slice()[1], self.out_dim);
        act
    }

    /// Dimension of the action vector.
    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }

    /// Returns the optimizer configuration.
    pub fn opt_config(&self) -> &OptimizerConfig {
        &self.opt_config
    }
}

impl<P> ModelBase for PerturbActor<P>
where
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
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
        info!("Save perturbation actor to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load perturbation actor from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    /// The output stays within `phi * max_action` of the input action and within the bounds.
    fn test_perturbation_bounded() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = PerturbationNetConfig::new(3, 2, 2.0, 0.05);
        let net = PerturbationNet::build(&vs, config);

        let obs = Tensor::randn(&[32, 3], tch::kind::FLOAT_CPU) * 10.0;
        let act = Tensor::rand(&[32, 2], tch::kind::FLOAT_CPU) * 4.0 - 2.0;
        let act_ = net.forward(&obs, &act);

        assert_eq!(act_.size(), vec![32, 2]);
        assert!((&act_ - &act).abs().max().double_value(&[]) <= 0.1 + 1e-6);
        assert!(act_.abs().max().double_value(&[]) <= 2.0);
    }

    #[test]
    fn test_perturb_actor_clone() -> Result<()> {
        let config =
            PerturbActorConfig::default().pi_config(PerturbationNetConfig::new(3, 1, 1.0, 0.05));
        let actor = PerturbActor::<PerturbationNet>::build(config, Device::Cpu)?;
        let actor_tgt = actor.try_clone()?;

        let obs = Tensor::rand(&[4, 3], tch::kind::FLOAT_CPU);
        let act = Tensor::rand(&[4, 1], tch::kind::FLOAT_CPU);
        assert!(actor
            .forward(&obs, &act)
            .allclose(&actor_tgt.forward(&obs, &act), 1e-6, 1e-6, false));
        Ok(())
    }
}
