//! A point moving on a line, used by the integration tests.
#![allow(dead_code)]
use anyhow::Result;
use forestfire_core::{record::Record, Act, Env, Obs, Step};
use forestfire_tch_agent::replay_buffer::{TensorReplayBuffer, Transition};
use std::convert::TryFrom;
use tch::Tensor;

pub const EPISODE_LEN: usize = 5;

/// Shows the agents' `debug!` losses with `RUST_LOG=debug`.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Positions; a single observation has one element, more elements form a batch.
#[derive(Clone, Debug)]
pub struct PointObs(pub Vec<f32>);

impl Obs for PointObs {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<PointObs> for Tensor {
    fn from(obs: PointObs) -> Tensor {
        Tensor::from_slice(&obs.0).reshape(&[-1, 1])
    }
}

#[derive(Clone, Debug)]
pub struct PointAct(pub Vec<f32>);

impl Act for PointAct {
    fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Tensor> for PointAct {
    fn from(t: Tensor) -> Self {
        let v = Vec::<f32>::try_from(&t.flatten(0, -1).to_kind(tch::Kind::Float))
            .unwrap_or_default();
        Self(v)
    }
}

/// The point moves by the action; the reward is the negative distance from the origin.
pub struct PointEnv {
    x: f32,
    t: usize,
}

impl Env for PointEnv {
    type Config = f32;
    type Obs = PointObs;
    type Act = PointAct;
    type Info = ();

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self { x: *config, t: 0 })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.t += 1;
        self.x += a.0[0];
        let is_truncated = if self.t >= EPISODE_LEN { 1 } else { 0 };
        let step = Step::new(
            PointObs(vec![self.x]),
            a.clone(),
            vec![-self.x.abs()],
            vec![0],
            vec![is_truncated],
            (),
            None,
        );
        (step, Record::empty())
    }

    fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        self.x = 1.0;
        self.t = 0;
        Ok(PointObs(vec![self.x]))
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset(None)
    }
}

/// `n` random transitions of the point environment.
pub fn random_transitions(n: i64) -> Transition {
    let obs = Tensor::rand(&[n, 1], tch::kind::FLOAT_CPU) * 4.0 - 2.0;
    let act = Tensor::rand(&[n, 1], tch::kind::FLOAT_CPU) * 2.0 - 1.0;
    let next_obs = &obs + &act;
    let reward = Vec::<f32>::try_from(&next_obs.abs().neg().flatten(0, -1)).unwrap();
    Transition {
        obs,
        act,
        next_obs,
        reward,
        is_done: vec![0; n as usize],
    }
}

/// An offline dataset of `n` random transitions.
pub fn random_dataset(n: i64) -> Result<TensorReplayBuffer> {
    let tr = random_transitions(n);
    TensorReplayBuffer::from_tensors(tr.obs, tr.act, tr.next_obs, tr.reward, tr.is_done)
}

/// Side of the square images of [`ImageEnv`].
pub const IMAGE_SIZE: i64 = 36;

/// Single-channel images; more than one image forms a batch.
#[derive(Clone, Debug)]
pub struct ImageObs(pub Vec<f32>);

impl Obs for ImageObs {
    fn len(&self) -> usize {
        self.0.len() / (IMAGE_SIZE * IMAGE_SIZE) as usize
    }
}

impl From<ImageObs> for Tensor {
    fn from(obs: ImageObs) -> Tensor {
        Tensor::from_slice(&obs.0).reshape(&[-1, IMAGE_SIZE, IMAGE_SIZE])
    }
}

/// Random images; the reward is the action.
pub struct ImageEnv {
    t: usize,
}

impl ImageEnv {
    fn image() -> ImageObs {
        let n = (IMAGE_SIZE * IMAGE_SIZE) as usize;
        ImageObs((0..n).map(|_| fastrand::f32()).collect())
    }
}

impl Env for ImageEnv {
    type Config = ();
    type Obs = ImageObs;
    type Act = PointAct;
    type Info = ();

    fn build(_config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self { t: 0 })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.t += 1;
        let is_truncated = if self.t >= EPISODE_LEN { 1 } else { 0 };
        let step = Step::new(
            Self::image(),
            a.clone(),
            vec![a.0[0]],
            vec![0],
            vec![is_truncated],
            (),
            None,
        );
        (step, Record::empty())
    }

    fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        self.t = 0;
        Ok(Self::image())
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset(None)
    }
}

/// An offline dataset of `n` random image transitions.
pub fn random_image_dataset(n: i64) -> Result<TensorReplayBuffer> {
    let obs = Tensor::rand(&[n, IMAGE_SIZE, IMAGE_SIZE], tch::kind::FLOAT_CPU);
    let next_obs = Tensor::rand(&[n, IMAGE_SIZE, IMAGE_SIZE], tch::kind::FLOAT_CPU);
    let act = Tensor::rand(&[n, 1], tch::kind::FLOAT_CPU) * 2.0 - 1.0;
    let reward = Vec::<f32>::try_from(&act.flatten(0, -1))?;
    TensorReplayBuffer::from_tensors(obs, act, next_obs, reward, vec![0; n as usize])
}
