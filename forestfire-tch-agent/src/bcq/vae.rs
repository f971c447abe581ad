//! Conditional variational auto-encoder of the actions in a batch.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::ModelBase,
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::Result;
use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::{nn, nn::Module, Device, Kind, Reduction, Tensor};

fn default_hidden_dim() -> i64 {
    750
}

fn default_opt_config() -> OptimizerConfig {
    OptimizerConfig::Adam { lr: 1e-3 }
}

/// Configuration of [`Vae`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct VaeConfig {
    /// Dimension of the (flattened) observation.
    pub state_dim: i64,

    /// Dimension of the action vector.
    pub action_dim: i64,

    /// Dimension of the latent variable, `2 * action_dim` if not given.
    #[serde(default)]
    pub latent_dim: Option<i64>,

    /// Actions are in `[-max_action, max_action]`.
    pub max_action: f64,

    /// Units of the two hidden layers of both the encoder and the decoder.
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: i64,

    /// Optimizer.
    #[serde(default = "default_opt_config")]
    pub opt_config: OptimizerConfig,
}

impl VaeConfig {
    /// Creates the configuration with 750 hidden units and Adam with learning rate `1e-3`.
    pub fn new(state_dim: i64, action_dim: i64, max_action: f64) -> Self {
        Self {
            state_dim,
            action_dim,
            latent_dim: None,
            max_action,
            hidden_dim: default_hidden_dim(),
            opt_config: default_opt_config(),
        }
    }

    /// Sets the dimension of the latent variable.
    pub fn latent_dim(mut self, v: i64) -> Self {
        self.latent_dim = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    fn get_latent_dim(&self) -> i64 {
        self.latent_dim.unwrap_or(2 * self.action_dim)
    }
}

/// KL divergence of `N(mean, std^2)` from `N(0, 1)`, averaged over all elements.
pub fn kl_divergence(mean: &Tensor, std: &Tensor) -> Tensor {
    let var = std.square();
    (var.log() + 1.0 - mean.square() - var).mean(Kind::Float) * -0.5
}

/// Generative model of actions conditioned on observations.
///
/// The encoder maps `(s, a)` to the mean and the log standard deviation of the
/// latent variable; the decoder maps `(s, z)` to an action in
/// `[-max_action, max_action]`.
pub struct Vae {
    config: VaeConfig,
    device: Device,
    var_store: nn::VarStore,
    latent_dim: i64,
    enc: Mlp,
    mean: nn::Linear,
    log_std: nn::Linear,
    dec: Mlp,
    opt: Optimizer,
}

impl Vae {
    /// Constructs [`Vae`] on its own [`nn::VarStore`].
    pub fn build(config: VaeConfig, device: Device) -> Result<Self> {
        let var_store = nn::VarStore::new(device);
        let h = config.hidden_dim;
        let latent_dim = config.get_latent_dim();

        let (enc, mean, log_std, dec) = {
            let p = &var_store.root();
            let enc = Mlp::build_with_path(
                &(p / "enc"),
                MlpConfig::new(config.state_dim + config.action_dim, vec![h], h, true),
            );
            let mean = nn::linear(p / "mean", h, latent_dim, Default::default());
            let log_std = nn::linear(p / "log_std", h, latent_dim, Default::default());
            let dec = Mlp::build_with_path(
                &(p / "dec"),
                MlpConfig::new(
                    config.state_dim + latent_dim,
                    vec![h, h],
                    config.action_dim,
                    false,
                ),
            );
            (enc, mean, log_std, dec)
        };
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            config,
            device,
            var_store,
            latent_dim,
            enc,
            mean,
            log_std,
            dec,
            opt,
        })
    }

    fn flatten(&self, obs: &Tensor) -> Tensor {
        obs.to(self.device)
            .to_kind(Kind::Float)
            .reshape(&[-1, self.config.state_dim])
    }

    /// Returns the reconstructed action with the mean and the standard deviation
    /// of the latent variable.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> (Tensor, Tensor, Tensor) {
        let obs = self.flatten(obs);
        let act = act.to(self.device).to_kind(Kind::Float);
        let h = self.enc.forward2(&obs, &act);
        let mean = self.mean.forward(&h);
        let std = self.log_std.forward(&h).clamp(-4.0, 15.0).exp();
        let z = &mean + &std * std.randn_like();
        let recon = self.decode_(&obs, &z);
        (recon, mean, std)
    }

    /// Decodes actions for observations.
    ///
    /// Without `z`, the latent variable is sampled from the standard normal
    /// distribution clipped to `[-0.5, 0.5]`.
    pub fn decode(&self, obs: &Tensor, z: Option<&Tensor>) -> Tensor {
        let obs = self.flatten(obs);
        match z {
            Some(z) => self.decode_(&obs, &z.to(self.device)),
            None => {
                let n = obs.size()[0];
                let z = Tensor::randn(&[n, self.latent_dim], (Kind::Float, self.device))
                    .clamp(-0.5, 0.5);
                self.decode_(&obs, &z)
            }
        }
    }

    fn decode_(&self, obs: &Tensor, z: &Tensor) -> Tensor {
        self.dec.forward2(obs, z).tanh() * self.config.max_action
    }

    /// Reconstruction error plus half the KL divergence.
    pub fn loss(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let act = act.to(self.device).to_kind(Kind::Float);
        let (recon, mean, std) = self.forward(obs, &act);
        let recon_loss = recon.mse_loss(&act, Reduction::Mean);
        recon_loss + 0.5 * kl_divergence(&mean, &std)
    }

    /// Dimension of the (flattened) observation.
    pub fn state_dim(&self) -> i64 {
        self.config.state_dim
    }

    /// Dimension of the latent variable.
    pub fn latent_dim(&self) -> i64 {
        self.latent_dim
    }

    /// Returns the optimizer configuration.
    pub fn opt_config(&self) -> &OptimizerConfig {
        &self.config.opt_config
    }
}

impl ModelBase for Vae {
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
        info!("Save vae to {:?}", path.as_ref());
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.var_store.load(&path)?;
        info!("Load vae from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::scalar;

    #[test]
    fn test_kl_divergence() {
        let mean = Tensor::zeros(&[4, 2], tch::kind::FLOAT_CPU);
        let std = Tensor::ones(&[4, 2], tch::kind::FLOAT_CPU);
        assert!(scalar(&kl_divergence(&mean, &std)).abs() < 1e-6);

        // 0.5 * mean^2 when std = 1
        let mean = Tensor::ones(&[4, 2], tch::kind::FLOAT_CPU);
        assert!((scalar(&kl_divergence(&mean, &std)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_vae_shapes() -> Result<()> {
        let vae = Vae::build(VaeConfig::new(3, 2, 2.0), Device::Cpu)?;
        assert_eq!(vae.latent_dim(), 4);

        let obs = Tensor::rand(&[8, 3], tch::kind::FLOAT_CPU);
        let act = Tensor::rand(&[8, 2], tch::kind::FLOAT_CPU);
        let (recon, mean, std) = vae.forward(&obs, &act);
        assert_eq!(recon.size(), vec![8, 2]);
        assert_eq!(mean.size(), vec![8, 4]);
        assert!(std.min().double_value(&[]) >= (-4f64).exp() - 1e-6);

        let act = vae.decode(&obs, None);
        assert_eq!(act.size(), vec![8, 2]);
        assert!(act.abs().max().double_value(&[]) <= 2.0);

        let z = Tensor::zeros(&[8, 4], tch::kind::FLOAT_CPU);
        assert_eq!(vae.decode(&obs, Some(&z)).size(), vec![8, 2]);
        Ok(())
    }

    #[test]
    /// Images are flattened to `state_dim`.
    fn test_vae_image_obs() -> Result<()> {
        let vae = Vae::build(VaeConfig::new(16, 1, 1.0).latent_dim(3), Device::Cpu)?;
        let obs = Tensor::rand(&[5, 4, 4], tch::kind::FLOAT_CPU);
        assert_eq!(vae.decode(&obs, None).size(), vec![5, 1]);
        Ok(())
    }

    #[test]
    fn test_vae_training_reduces_loss() -> Result<()> {
        tch::manual_seed(42);
        let mut vae = Vae::build(VaeConfig::new(2, 1, 1.0), Device::Cpu)?;
        let obs = Tensor::rand(&[64, 2], tch::kind::FLOAT_CPU);
        let act = Tensor::full(&[64, 1], 0.5, tch::kind::FLOAT_CPU);

        let loss_init = scalar(&vae.loss(&obs, &act));
        for _ in 0..200 {
            let loss = vae.loss(&obs, &act);
            vae.backward_step(&loss);
        }
        let loss_last = scalar(&vae.loss(&obs, &act));

        assert!(loss_last < loss_init);
        Ok(())
    }
}
