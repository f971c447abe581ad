use super::{BcqConfig, PerturbActor, Vae};
use crate::{
    critic::Critic,
    model::{ModelBase, SubModel2},
    opt::OptimizerConfig,
    util::{
        self, check_max_action, create_parent_dir, prefixed_path, repeat_rows, scalar, track,
        ActionBound, OutDim, TrainState,
    },
};
use anyhow::{Context, Result};
use forestfire_core::{
    error::ForestFireError,
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

/// Soft clipped double Q target.
///
/// `q1_tgt` and `q2_tgt` have shape `[batch * n, 1]` and hold `n` consecutive
/// candidates per transition, in the order given by [`repeat_rows`]. The two
/// values of a candidate are mixed as `lmbda * min + (1 - lmbda) * max`, and the
/// best candidate of each transition is bootstrapped. The result has shape `[batch, 1]`.
fn critic_target(
    reward: &Tensor,
    not_done: &Tensor,
    discount: f64,
    lmbda: f64,
    q1_tgt: &Tensor,
    q2_tgt: &Tensor,
) -> Tensor {
    let batch_size = reward.size()[0];
    let q_tgt = lmbda * q1_tgt.minimum(q2_tgt) + (1.0 - lmbda) * q1_tgt.maximum(q2_tgt);
    let (q_tgt, _) = q_tgt.reshape(&[batch_size, -1]).max_dim(1, true);
    reward + not_done * discount * q_tgt
}

/// Batch-Constrained deep Q-learning (BCQ) agent.
pub struct Bcq<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
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
    actor: PerturbActor<P>,
    actor_tgt: PerturbActor<P>,
    vae: Vae,
    discount: f64,
    tau: f64,
    lmbda: f64,
    n_target_samples: i64,
    n_select_samples: i64,
    batch_size: usize,
    n_updates_per_opt: usize,
    min_transitions_warmup: usize,
    train: bool,
    total_it: usize,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Bcq<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update_vae(&mut self, obs: &Tensor, act: &Tensor) -> f32 {
        let loss = self.vae.loss(obs, act);
        self.vae.backward_step(&loss);
        scalar(&loss)
    }

    fn update_critic(
        &mut self,
        obs: &Tensor,
        act: &Tensor,
        next_obs: &Tensor,
        reward: &Tensor,
        not_done: &Tensor,
    ) -> f32 {
        let tgt = no_grad(|| {
            let next_obs = repeat_rows(next_obs, self.n_target_samples);
            let next_act = self
                .actor_tgt
                .forward(&next_obs, &self.vae.decode(&next_obs, None));
            let (q1_tgt, q2_tgt) = self.critic_tgt.forward(&next_obs, &next_act);
            critic_target(reward, not_done, self.discount, self.lmbda, &q1_tgt, &q2_tgt)
        });

        let (q1, q2) = self.critic.forward(obs, act);
        debug_assert_eq!(q1.size(), tgt.size());

        let loss = q1.mse_loss(&tgt, Reduction::Mean) + q2.mse_loss(&tgt, Reduction::Mean);
        self.critic.backward_step(&loss);

        scalar(&loss)
    }

    fn update_actor(&mut self, obs: &Tensor) -> f32 {
        let sampled = no_grad(|| self.vae.decode(obs, None));
        let act = self.actor.forward(obs, &sampled);
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
    /// Returns the losses of the VAE, the critic and the actor.
    fn train_step(&mut self, batch: R::Batch) -> (f32, f32, f32) {
        self.total_it += 1;

        let (obs, act, next_obs, reward, is_done) = batch.unpack();
        let obs = Into::<Tensor>::into(obs).to(self.device);
        let act = Into::<Tensor>::into(act)
            .to(self.device)
            .to_kind(Kind::Float);
        let next_obs = Into::<Tensor>::into(next_obs).to(self.device);
        let reward = util::reward(&reward).to(self.device);
        let not_done = util::not_done(&is_done).to(self.device);

        let loss_vae = self.update_vae(&obs, &act);
        let loss_critic = self.update_critic(&obs, &act, &next_obs, &reward, &not_done);
        let loss_actor = self.update_actor(&obs);
        self.soft_update();

        debug!(
            "it = {}, loss_vae = {}, loss_critic = {}, loss_actor = {}",
            self.total_it, loss_vae, loss_critic, loss_actor
        );

        (loss_vae, loss_critic, loss_actor)
    }

    fn opt_(&mut self, buffer: &mut R) -> Record {
        let mut loss_vae = 0f32;
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;
        let mut n_updates = 0;

        for _ in 0..self.n_updates_per_opt {
            let batch = match buffer.batch(self.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Failed to sample a batch: {}", e);
                    break;
                }
            };
            let (loss_v, loss_c, loss_a) = self.train_step(batch);
            loss_vae += loss_v;
            loss_critic += loss_c;
            loss_actor += loss_a;
            n_updates += 1;
        }

        if n_updates == 0 {
            return Record::empty();
        }

        let n = n_updates as f32;
        Record::from_slice(&[
            ("loss_vae", RecordValue::Scalar(loss_vae / n)),
            ("loss_critic", RecordValue::Scalar(loss_critic / n)),
            ("loss_actor", RecordValue::Scalar(loss_actor / n)),
        ])
    }

    /// Returns the best of `n_select_samples` candidate actions for each observation.
    ///
    /// `obs` is a single observation or a batch of them; the result has shape
    /// `[batch, action_dim]`.
    fn select_action(&self, obs: &Tensor) -> Tensor {
        let n = self.n_select_samples;
        let action_dim = self.actor.out_dim();
        let obs = obs.to(self.device);
        let state_dim = self.vae.state_dim();
        let batch_size = (obs.numel() as i64 / state_dim).max(1);

        let obs = repeat_rows(&obs.reshape(&[batch_size, -1]), n);
        let cand = self.actor.forward(&obs, &self.vae.decode(&obs, None));
        let (q1, _) = self.critic.forward(&obs, &cand);

        let ix = q1.reshape(&[batch_size, n]).argmax(1, true);
        let ix = ix.unsqueeze(-1).expand(&[batch_size, 1, action_dim], false);
        cand.reshape(&[batch_size, n, action_dim])
            .gather(1, &ix, false)
            .squeeze_dim(1)
    }

    fn opt_configs(&self) -> BTreeMap<String, OptimizerConfig> {
        BTreeMap::from([
            ("actor".to_string(), self.actor.opt_config().clone()),
            ("critic".to_string(), self.critic.opt_config().clone()),
            ("vae".to_string(), self.vae.opt_config().clone()),
        ])
    }

    /// The number of gradient iterations performed so far.
    pub fn total_it(&self) -> usize {
        self.total_it
    }

    /// Returns the online perturbation actor.
    pub fn actor(&self) -> &PerturbActor<P> {
        &self.actor
    }

    /// Returns the target perturbation actor.
    pub fn actor_tgt(&self) -> &PerturbActor<P> {
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

    /// Returns the generative model of actions.
    pub fn vae(&self) -> &Vae {
        &self.vae
    }
}

impl<E, Q, P, R> Configurable for Bcq<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    type Config = BcqConfig<Q::Config, P::Config>;

    /// Constructs [`Bcq`] agent.
    ///
    /// Fails if the VAE is not configured, if the VAE and the actor disagree on
    /// the action dimension or on `max_action` of the agent, or if a number of
    /// candidate actions is zero.
    fn build(config: Self::Config) -> Result<Self> {
        if config.n_target_samples < 1 || config.n_select_samples < 1 {
            return Err(ForestFireError::InvalidConfig(format!(
                "n_target_samples = {} and n_select_samples = {} must be positive",
                config.n_target_samples, config.n_select_samples
            ))
            .into());
        }

        let vae_config = config.vae_config.context("vae_config is not set.")?;
        check_max_action("VAE", config.max_action, vae_config.max_action)?;
        if let Some(pi_config) = config.actor_config.pi_config.as_ref() {
            check_max_action("actor", config.max_action, pi_config.get_max_action())?;
            if pi_config.get_out_dim() != vae_config.action_dim {
                return Err(ForestFireError::InvalidConfig(format!(
                    "action_dim of the actor ({}) differs from that of the VAE ({})",
                    pi_config.get_out_dim(),
                    vae_config.action_dim
                ))
                .into());
            }
        }

        if let Some(seed) = config.seed.as_ref() {
            tch::manual_seed(*seed);
        }

        let device: Device = config.device.unwrap_or_default().into();
        let actor = PerturbActor::build(config.actor_config, device)?;
        let actor_tgt = actor.try_clone()?;
        let critic = Critic::build(config.critic_config, device)?;
        let critic_tgt = critic.try_clone()?;
        let vae = Vae::build(vae_config, device)?;

        Ok(Bcq {
            critic,
            critic_tgt,
            actor,
            actor_tgt,
            vae,
            discount: config.discount,
            tau: config.tau,
            lmbda: config.lmbda,
            n_target_samples: config.n_target_samples,
            n_select_samples: config.n_select_samples,
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

impl<E, Q, P, R> Policy<E> for Bcq<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + ActionBound + Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    /// Returns the perturbed candidate action with the highest `Q1`, on CPU.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let obs: Tensor = obs.clone().into();
        let act = no_grad(|| self.select_action(&obs));
        act.to(Device::Cpu).into()
    }
}

impl<E, Q, P, R> Agent<E, R> for Bcq<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = (Tensor, Tensor)>,
    P: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
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

    /// Writes `{prefix}_critic.pt`, `{prefix}_actor.pt`, `{prefix}_vae.pt`
    /// and `{prefix}_train_state.yaml`.
    fn save_params(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        create_parent_dir(prefix)?;

        let path_critic = prefixed_path(prefix, "_critic.pt")?;
        let path_actor = prefixed_path(prefix, "_actor.pt")?;
        let path_vae = prefixed_path(prefix, "_vae.pt")?;
        let path_state = prefixed_path(prefix, "_train_state.yaml")?;

        self.critic.save(&path_critic)?;
        self.actor.save(&path_actor)?;
        self.vae.save(&path_vae)?;
        TrainState {
            total_it: self.total_it,
            opt_configs: self.opt_configs(),
        }
        .save(&path_state)?;

        Ok(vec![path_critic, path_actor, path_vae, path_state])
    }

    /// Loads the online networks and the VAE; the target networks are reset to copies.
    fn load_params(&mut self, prefix: &Path) -> Result<()> {
        self.critic.load(prefixed_path(prefix, "_critic.pt")?)?;
        self.critic_tgt.copy_from(&self.critic)?;
        self.actor.load(prefixed_path(prefix, "_actor.pt")?)?;
        self.actor_tgt.copy_from(&self.actor)?;
        self.vae.load(prefixed_path(prefix, "_vae.pt")?)?;

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
        // Two transitions with three candidates each
        let reward = util::reward(&[1.0, 2.0]);
        let q1_tgt = column(&[1.0, 4.0, 2.0, 0.0, -1.0, 3.0]);
        let q2_tgt = column(&[2.0, 3.0, 2.0, 1.0, 0.0, -5.0]);

        // Mixed values are [1.25, 3.25, 2.0] and [0.25, -0.75, -3.0]
        let not_done = util::not_done(&[0, 0]);
        let tgt = critic_target(&reward, &not_done, 0.9, 0.75, &q1_tgt, &q2_tgt);
        assert_eq!(tgt.size(), vec![2, 1]);
        assert_close(&tgt, &[1.0 + 0.9 * 3.25, 2.0 + 0.9 * 0.25]);

        let not_done = util::not_done(&[0, 1]);
        let tgt = critic_target(&reward, &not_done, 0.9, 0.75, &q1_tgt, &q2_tgt);
        assert_close(&tgt, &[1.0 + 0.9 * 3.25, 2.0]);

        // lmbda = 1 is the clipped double Q target
        let tgt = critic_target(&reward, &not_done, 0.9, 1.0, &q1_tgt, &q2_tgt);
        assert_close(&tgt, &[1.0 + 0.9 * 2.0, 2.0]);
    }

    #[test]
    fn test_critic_target_groups_repeated_rows() {
        // Candidates of a next observation are its value plus the candidate index
        let next_obs = column(&[10.0, 20.0]);
        let q_tgt = repeat_rows(&next_obs, 3) + column(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);

        let reward = util::reward(&[0.0, 0.0]);
        let not_done = util::not_done(&[0, 0]);
        let tgt = critic_target(&reward, &not_done, 1.0, 0.75, &q_tgt, &q_tgt);
        assert_close(&tgt, &[12.0, 22.0]);
    }
}
