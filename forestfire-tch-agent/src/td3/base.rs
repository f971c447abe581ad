use super::Td3Config;
use crate::{
    actor::Actor,
    critic::Critic,
    model::{ModelBase, SubModel, SubModel2},
    util::{
        self, check_max_action, create_parent_dir, prefixed_path, scalar, track, ActionBound,
        OutDim, TrainState,
    },
};
use anyhow::Result;
use forestfire_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, Policy, ReplayBufferBase, TransitionBatch,
};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tch::{no_grad, Device, Kind, Reduction, Tensor};

/// Clipped double Q target, `reward + not_done * discount * min(q1_tgt, q2_tgt)`.
///
/// All tensors have shape `[batch, 1]`.
fn critic_target(
    reward: &Tensor,
    not_done: &Tensor,
    discount: f64,
    q1_tgt: &Tensor,
    q2_tgt: &Tensor,
) -> Tensor {
    reward + not_done * discount * q1_tgt.minimum(q2_tgt)
}

/// Twin delayed deep deterministic policy gradient (TD3) agent.
pub struct Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    critic: Critic<Q>,
    critic_tgt: Critic<Q>,
    actor: Actor<P>,
    actor_tgt: Actor<P>,
    discount: f64,
    tau: f64,
    policy_noise: f64,
    noise_clip: f64,
    policy_freq: usize,
    max_action: f64,
    expl_noise: f64,
    batch_size: usize,
    n_updates_per_opt: usize,
    min_transitions_warmup: usize,
    train: bool,
    total_it: usize,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update_critic(
        &mut self,
        obs: &Tensor,
        act: &Tensor,
        next_obs: &Tensor,
        reward: &Tensor,
        not_done: &Tensor,
    ) -> f32 {
        let tgt = no_grad(|| {
            // Target policy smoothing
            let noise = (act.randn_like() * self.policy_noise)
                .clamp(-self.noise_clip, self.noise_clip);
            let next_act = (self.actor_tgt.forward(next_obs) + noise)
                .clamp(-self.max_action, self.max_action);

            let (q1_tgt, q2_tgt) = self.critic_tgt.forward(next_obs, &next_act);
            critic_target(reward, not_done, self.discount, &q1_tgt, &q2_tgt)
        });

        let (q1, q2) = self.critic.forward(obs, act);
        debug_assert_eq!(q1.size(), tgt.size());

        let loss = q1.mse_loss(&tgt, Reduction::Mean) + q2.mse_loss(&tgt, Reduction::Mean);
        self.critic.backward_step(&loss);

        scalar(&loss)
    }

    fn update_actor(&mut self, obs: &Tensor) -> f32 {
        let act = self.actor.forward(obs);
        let (q1, _) = self.critic.forward(obs, &act);
        let loss = -q1.mean(Kind::Float);
        self.actor.backward_step(&loss);

        scalar(&loss)
    }

    fn soft_update(&mut self) {
        track(&mut self.critic_tgt, &self.critic, self.tau);
        track(&mut self.actor_tgt, &self.actor, self.tau);
    }

    /// Performs a single gradient iteration on a batch.
    ///
    /// Returns the critic loss and, if the actor was updated, the actor loss.
    fn train_step(&mut self, batch: R::Batch) -> (f32, Option<f32>) {
        self.total_it += 1;

        let (obs, act, next_obs, reward, is_done) = batch.unpack();
        let obs = Into::<Tensor>::into(obs).to(self.device);
        let act = Into::<Tensor>::into(act)
            .to(self.device)
            .to_kind(Kind::Float);
        let next_obs = Into::<Tensor>::into(next_obs).to(self.device);
        let reward = util::reward(&reward).to(self.device);
        let not_done = util::not_done(&is_done).to(self.device);

        let loss_critic = self.update_critic(&obs, &act, &next_obs, &reward, &not_done);

        // Delayed policy updates
        let loss_actor = if self.total_it % self.policy_freq == 0 {
            let loss_actor = self.update_actor(&obs);
            self.soft_update();
            Some(loss_actor)
        } else {
            None
        };

        debug!(
            "it = {}, loss_critic = {}, loss_actor = {:?}",
            self.total_it, loss_critic, loss_actor
        );

        (loss_critic, loss_actor)
    }

    fn opt_(&mut self, buffer: &mut R) -> Record {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;
        let mut n_critic_updates = 0;
        let mut n_actor_updates = 0;

        for _ in 0..self.n_updates_per_opt {
            let batch = match buffer.batch(self.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to sample a batch: {}", e);
                    break;
                }
            };
            let (loss_c, loss_a) = self.train_step(batch);
            loss_critic += loss_c;
            n_critic_updates += 1;
            if let Some(loss_a) = loss_a {
                loss_actor += loss_a;
                n_actor_updates += 1;
            }
        }

        let mut record = Record::empty();
        if n_critic_updates > 0 {
            record.insert(
                "loss_critic",
                RecordValue::Scalar(loss_critic / n_critic_updates as f32),
            );
        }
        if n_actor_updates > 0 {
            record.insert(
                "loss_actor",
                RecordValue::Scalar(loss_actor / n_actor_updates as f32),
            );
        }
        record
    }

    fn opt_configs(&self) -> BTreeMap<String, crate::opt::OptimizerConfig> {
        BTreeMap::from([
            ("actor".to_string(), self.actor.opt_config().clone()),
            ("critic".to_string(), self.critic.opt_config().clone()),
        ])
    }

    /// The number of gradient iterations performed so far.
    pub fn total_it(&self) -> usize {
        self.total_it
    }

    /// Returns the online actor.
    pub fn actor(&self) -> &Actor<P> {
        &self.actor
    }

    /// Returns the target actor.
    pub fn actor_tgt(&self) -> &Actor<P> {
        &self.actor_tgt
    }

    /// Returns the online critic.
    pub fn critic(&self) -> &Critic<Q> {
        &self.critic
    }

    /// Returns the target critic.
    pub fn critic_tgt(&self) -> &Critic<Q> {
        &self.critic_tgt
    }
}

impl<E, Q, P, R> Configurable for Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    type Config = Td3Config<Q::Config, P::Config>;

    /// Constructs [`Td3`] agent.
    ///
    /// The target networks start as copies of the online networks. Fails if the
    /// actor network is configured with another `max_action` than the agent.
    fn build(config: Self::Config) -> Result<Self> {
        if let Some(pi_config) = config.actor_config.pi_config.as_ref() {
            check_max_action("actor", config.max_action, pi_config.get_max_action())?;
        }

        if let Some(seed) = config.seed.as_ref() {
            tch::manual_seed(*seed);
        }

        let device: Device = config.device.unwrap_or_default().into();
        let actor = Actor::build(config.actor_config, device)?;
        let actor_tgt = actor.try_clone()?;
        let critic = Critic::build(config.critic_config, device)?;
        let critic_tgt = critic.try_clone()?;

        Ok(Td3 {
            critic,
            critic_tgt,
            actor,
            actor_tgt,
            discount: config.discount,
            tau: config.tau,
            policy_noise: config.policy_noise,
            noise_clip: config.noise_clip,
            policy_freq: config.policy_freq.max(1),
            max_action: config.max_action,
            expl_noise: config.expl_noise,
            batch_size: config.batch_size,
            n_updates_per_opt: config.n_updates_per_opt,
            min_transitions_warmup: config.min_transitions_warmup,
            train: config.train,
            total_it: 0,
            device,
            phantom: PhantomData,
        })
    }
}

impl<E, Q, P, R> Policy<E> for Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    /// Returns `actor(obs)` with shape `[1, action_dim]` on CPU.
    ///
    /// In training mode Gaussian noise with standard deviation `expl_noise * max_action`
    /// is added and the action is clipped to `[-max_action, max_action]`.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let obs: Tensor = obs.clone().into();
        let act = no_grad(|| {
            let act = self.actor.forward(&obs);
            if self.train && self.expl_noise > 0.0 {
                let noise = act.randn_like() * (self.expl_noise * self.max_action);
                (act + noise).clamp(-self.max_action, self.max_action)
            } else {
                act
            }
        });
        act.to(Device::Cpu).into()
    }
}

impl<E, Q, P, R> Agent<E, R> for Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Record {
        if buffer.len() >= self.min_transitions_warmup {
            self.opt_(buffer)
        } else {
            Record::empty()
        }
    }

    /// Writes `{prefix}_critic.pt`, `{prefix}_actor.pt` and `{prefix}_train_state.yaml`.
    fn save_params(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        create_parent_dir(prefix)?;

        let path_critic = prefixed_path(prefix, "_critic.pt")?;
        let path_actor = prefixed_path(prefix, "_actor.pt")?;
        let path_state = prefixed_path(prefix, "_train_state.yaml")?;

        self.critic.save(&path_critic)?;
        self.actor.save(&path_actor)?;
        TrainState {
            total_it: self.total_it,
            opt_configs: self.opt_configs(),
        }
        .save(&path_state)?;

        Ok(vec![path_critic, path_actor, path_state])
    }

    /// Loads the online networks; the target networks are reset to copies of them.
    fn load_params(&mut self, prefix: &Path) -> Result<()> {
        self.critic.load(prefixed_path(prefix, "_critic.pt")?)?;
        self.critic_tgt.copy_from(&self.critic)?;
        self.actor.load(prefixed_path(prefix, "_actor.pt")?)?;
        self.actor_tgt.copy_from(&self.actor)?;

        let path_state = prefixed_path(prefix, "_train_state.yaml")?;
        if path_state.exists() {
            let state = TrainState::load(&path_state)?;
            state.check_opt_configs(&self.opt_configs());
            self.total_it = state.total_it;
        } else {
            warn!("{:?} not found, the iteration counter is not restored", path_state);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;

    fn column(v: &[f32]) -> Tensor {
        Tensor::from_slice(v).unsqueeze(-1)
    }

    fn assert_close(t: &Tensor, expected: &[f32]) {
        let v = Vec::<f32>::try_from(&t.flatten(0, -1)).unwrap();
        assert_eq!(v.len(), expected.len());
        for (a, b) in v.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{:?} != {:?}", v, expected);
        }
    }

    #[test]
    fn test_critic_target() {
        let reward = util::reward(&[1.0, 2.0]);
        let q1_tgt = column(&[3.0, 5.0]);
        let q2_tgt = column(&[4.0, 1.0]);

        // The second transition ends an episode, so its target is the reward
        let not_done = util::not_done(&[0, 1]);
        let tgt = critic_target(&reward, &not_done, 0.9, &q1_tgt, &q2_tgt);
        assert_eq!(tgt.size(), vec![2, 1]);
        assert_close(&tgt, &[1.0 + 0.9 * 3.0, 2.0]);

        // The smaller of the two values is bootstrapped
        let not_done = util::not_done(&[0, 0]);
        let tgt = critic_target(&reward, &not_done, 0.9, &q1_tgt, &q2_tgt);
        assert_close(&tgt, &[1.0 + 0.9 * 3.0, 2.0 + 0.9 * 1.0]);
    }
}
