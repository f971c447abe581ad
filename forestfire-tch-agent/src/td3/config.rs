//! Configuration of TD3 agent.
use crate::{actor::ActorConfig, critic::CriticConfig, util::OutDim, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Constructs [`Td3`](super::Td3).
///
/// `Q` and `P` are the configurations of the critic and the actor networks.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Td3Config<Q, P> {
    pub(super) actor_config: ActorConfig<P>,
    pub(super) critic_config: CriticConfig<Q>,
    pub(super) discount: f64,
    pub(super) tau: f64,
    pub(super) policy_noise: f64,
    pub(super) noise_clip: f64,
    pub(super) policy_freq: usize,
    pub(super) max_action: f64,
    pub(super) expl_noise: f64,
    pub(super) batch_size: usize,
    pub(super) n_updates_per_opt: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) train: bool,
    pub(super) seed: Option<i64>,
    pub device: Option<Device>,
}

impl<Q, P> Default for Td3Config<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            discount: 0.99,
            tau: 0.005,
            policy_noise: 0.2,
            noise_clip: 0.5,
            policy_freq: 2,
            max_action: 1.0,
            expl_noise: 0.1,
            batch_size: 100,
            n_updates_per_opt: 1,
            min_transitions_warmup: 1,
            train: false,
            seed: None,
            device: None,
        }
    }
}

impl<Q, P> Td3Config<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Configuration of actor.
    pub fn actor_config(mut self, v: ActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
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

    /// Standard deviation of the noise added to target actions.
    pub fn policy_noise(mut self, v: f64) -> Self {
        self.policy_noise = v;
        self
    }

    /// The target action noise is clipped to `[-v, v]`.
    pub fn noise_clip(mut self, v: f64) -> Self {
        self.noise_clip = v;
        self
    }

    /// The actor and the target networks are updated every `v` critic updates.
    pub fn policy_freq(mut self, v: usize) -> Self {
        self.policy_freq = v;
        self
    }

    /// Bound of the action, used to clip noisy actions.
    ///
    /// The actor network must be configured with the same bound.
    pub fn max_action(mut self, v: f64) -> Self {
        self.max_action = v;
        self
    }

    /// Standard deviation of exploration noise in training mode, relative to `max_action`.
    pub fn expl_noise(mut self, v: f64) -> Self {
        self.expl_noise = v;
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

    /// Constructs [`Td3Config`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of TD3 agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`Td3Config`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of TD3 agent into {:?}", path_);
        Ok(())
    }
}
