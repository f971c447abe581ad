//! Configuration of BCQ agent.
use super::{PerturbActorConfig, VaeConfig};
use crate::{critic::CriticConfig, util::OutDim, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Constructs [`Bcq`](super::Bcq).
///
/// `Q` and `P` are the configurations of the critic and the perturbation networks.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct BcqConfig<Q, P> {
    pub(super) actor_config: PerturbActorConfig<P>,
    pub(super) critic_config: CriticConfig<Q>,
    pub(super) vae_config: Option<VaeConfig>,
    pub(super) discount: f64,
    pub(super) tau: f64,
    pub(super) lmbda: f64,
    pub(super) max_action: f64,
    pub(super) n_target_samples: i64,
    pub(super) n_select_samples: i64,
    pub(super) batch_size: usize,
    pub(super) n_updates_per_opt: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) train: bool,
    pub(super) seed: Option<i64>,
    pub device: Option<Device>,
}

impl<Q, P> Default for BcqConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: CriticConfig {
                q_config: None,
                opt_config: crate::opt::OptimizerConfig::Adam { lr: 1e-3 },
            },
            vae_config: None,
            discount: 0.99,
            tau: 0.005,
            lmbda: 0.75,
            max_action: 1.0,
            n_target_samples: 10,
            n_select_samples: 100,
            batch_size: 100,
            n_updates_per_opt: 1,
            min_transitions_warmup: 1,
            train: false,
            seed: None,
            device: None,
        }
    }
}

impl<Q, P> BcqConfig<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Configuration of the perturbation actor.
    pub fn actor_config(mut self, v: PerturbActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
        self
    }

    /// Configuration of the generative model of actions.
    pub fn vae_config(mut self, v: VaeConfig) -> Self {
        self.vae_config = Some(v);
        self
    }

    /// Discount factor.
    pub fn discount(mut self, v: f64) -> Self {
        self.discount = v;
        self
    }

    /// Sets soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Weight of the minimum of the two target values in the soft clipped target.
    pub fn lmbda(mut self, v: f64) -> Self {
        self.lmbda = v;
        self
    }

    /// Bound of the action.
    ///
    /// The VAE and the perturbation network must be configured with the same bound.
    pub fn max_action(mut self, v: f64) -> Self {
        self.max_action = v;
        self
    }

    /// The number of candidate actions per next observation in the critic target.
    pub fn n_target_samples(mut self, v: i64) -> Self {
        self.n_target_samples = v;
        self
    }

    /// The number of candidate actions per observation in action selection.
    pub fn n_select_samples(mut self, v: i64) -> Self {
        self.n_select_samples = v;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of gradient iterations per optimization step.
    pub fn n_updates_per_opt(mut self, v: usize) -> Self {
        self.n_updates_per_opt = v;
        self
    }

    /// Optimization is skipped while the buffer has fewer transitions.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Starts in training mode.
    pub fn train(mut self, v: bool) -> Self {
        self.train = v;
        self
    }

    /// Random seed.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Constructs [`BcqConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of BCQ agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`BcqConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of BCQ agent into {:?}", path_);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        bcq::PerturbationNetConfig, net::TwinQNetConfig, EncoderConfig,
    };
    use tempdir::TempDir;

    #[test]
    fn test_serde_bcq_config() -> Result<()> {
        let encoder = EncoderConfig::from_state_dim(3, false, false);
        let config = BcqConfig::default()
            .actor_config(
                PerturbActorConfig::default()
                    .pi_config(PerturbationNetConfig::new(3, 1, 2.0, 0.05)),
            )
            .critic_config(CriticConfig::default().q_config(TwinQNetConfig::new(encoder, 1)))
            .vae_config(VaeConfig::new(3, 1, 2.0))
            .max_action(2.0)
            .lmbda(0.5);

        let dir = TempDir::new("bcq_config")?;
        let path = dir.path().join("bcq.yaml");
        config.save(&path)?;
        let config_ = BcqConfig::load(&path)?;

        assert_eq!(config, config_);
        Ok(())
    }
}
