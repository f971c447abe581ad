//! Replay buffer of tensors.
//!
//! [`TensorReplayBuffer`] is filled either online, by pushing [`Transition`]s,
//! or at once from an offline dataset with [`TensorReplayBuffer::from_tensors`].
use anyhow::Result;
use forestfire_core::{
    error::ForestFireError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch,
};
use serde::{Deserialize, Serialize};
use tch::{Device, Tensor};

/// Configuration of [`TensorReplayBuffer`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TensorReplayBufferConfig {
    pub(crate) capacity: usize,
    pub(crate) seed: u64,
}

impl Default for TensorReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            seed: 42,
        }
    }
}

impl TensorReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the seed of the random number generator for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Transitions pushed into [`TensorReplayBuffer`].
///
/// The first axis of the tensors is the number of transitions, which must
/// equal the lengths of `reward` and `is_done`.
pub struct Transition {
    /// Observations.
    pub obs: Tensor,

    /// Actions.
    pub act: Tensor,

    /// Next observations.
    pub next_obs: Tensor,

    /// Rewards.
    pub reward: Vec<f32>,

    /// `1` if the episode ended at the next observation.
    pub is_done: Vec<i8>,
}

impl Transition {
    /// Checks that all the fields hold the same number of transitions.
    fn check(&self) -> Result<usize, ForestFireError> {
        let n = self.reward.len() as i64;
        for t in [&self.obs, &self.act, &self.next_obs] {
            let size = t.size();
            if size.first() != Some(&n) {
                return Err(ForestFireError::ShapeMismatch {
                    expected: vec![n],
                    actual: size,
                });
            }
        }
        if self.is_done.len() as i64 != n {
            return Err(ForestFireError::ShapeMismatch {
                expected: vec![n],
                actual: vec![self.is_done.len() as i64],
            });
        }
        Ok(n as usize)
    }
}

/// A batch sampled from [`TensorReplayBuffer`].
pub struct TensorBatch {
    obs: Tensor,
    act: Tensor,
    next_obs: Tensor,
    reward: Vec<f32>,
    is_done: Vec<i8>,
}

impl TransitionBatch for TensorBatch {
    type ObsBatch = Tensor;
    type ActBatch = Tensor;

    fn unpack(self) -> (Tensor, Tensor, Tensor, Vec<f32>, Vec<i8>) {
        (self.obs, self.act, self.next_obs, self.reward, self.is_done)
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Tensor {
        &self.obs
    }

    fn act(&self) -> &Tensor {
        &self.act
    }
}

/// A tensor of shape `[capacity, shape[1..]]`.
///
/// The storage is allocated at the first push, taking the shape and kind of
/// the pushed data and ignoring its first axis. Later pushes must have the
/// same item shape.
struct TensorStore {
    buf: Option<Tensor>,
    item_shape: Option<Vec<i64>>,
    capacity: i64,
}

impl TensorStore {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            item_shape: None,
            capacity: capacity as _,
        }
    }

    /// Fails if the items of `data` differ in shape from the stored ones.
    fn check(&self, data: &Tensor) -> Result<(), ForestFireError> {
        match self.item_shape.as_ref() {
            Some(item_shape) if item_shape.as_slice() != &data.size()[1..] => {
                Err(ForestFireError::ShapeMismatch {
                    expected: item_shape.clone(),
                    actual: data.size()[1..].to_vec(),
                })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, index: usize, data: &Tensor) -> Result<(), ForestFireError> {
        self.check(data)?;
        let batch_size = data.size()[0];
        if batch_size == 0 {
            return Ok(());
        }

        let capacity = self.capacity;
        let item_shape = self
            .item_shape
            .get_or_insert_with(|| data.size()[1..].to_vec())
            .clone();
        let buf = self.buf.get_or_insert_with(|| {
            let mut shape = vec![capacity];
            shape.extend(item_shape);
            Tensor::zeros(shape.as_slice(), (data.kind(), Device::Cpu))
        });

        let data = data.to(Device::Cpu);
        for i_ in 0..batch_size {
            let i = (i_ + index as i64) % capacity;
            buf.get(i).copy_(&data.get(i_));
        }
        Ok(())
    }

    fn sample(&self, ixs: &Tensor) -> Option<Tensor> {
        self.buf.as_ref().map(|buf| buf.index_select(0, ixs))
    }
}

/// A ring buffer of transitions stored as tensors on CPU.
///
/// When full, pushed transitions overwrite the oldest ones. Batches are
/// sampled uniformly with replacement.
pub struct TensorReplayBuffer {
    capacity: usize,
    i: usize,
    size: usize,
    obs: TensorStore,
    act: TensorStore,
    next_obs: TensorStore,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    rng: fastrand::Rng,
}

impl TensorReplayBuffer {
    /// Builds a buffer holding exactly the given dataset.
    ///
    /// The first axis of the tensors indexes the transitions.
    pub fn from_tensors(
        obs: Tensor,
        act: Tensor,
        next_obs: Tensor,
        reward: Vec<f32>,
        is_done: Vec<i8>,
    ) -> Result<Self> {
        let tr = Transition {
            obs,
            act,
            next_obs,
            reward,
            is_done,
        };
        let n = tr.check()?;
        let config = TensorReplayBufferConfig::default().capacity(n.max(1));
        let mut buffer = Self::build(&config);
        buffer.push(tr)?;
        Ok(buffer)
    }

    fn push_reward(&mut self, i: usize, b: &[f32]) {
        let mut j = i;
        for r in b.iter() {
            self.reward[j] = *r;
            j += 1;
            if j == self.capacity {
                j = 0;
            }
        }
    }

    fn push_is_done(&mut self, i: usize, b: &[i8]) {
        let mut j = i;
        for d in b.iter() {
            self.is_done[j] = *d;
            j += 1;
            if j == self.capacity {
                j = 0;
            }
        }
    }

    /// Capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ExperienceBufferBase for TensorReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Transition) -> Result<()> {
        let len = tr.check()?;
        self.obs.check(&tr.obs)?;
        self.act.check(&tr.act)?;
        self.next_obs.check(&tr.next_obs)?;

        let i = self.i;
        self.obs.push(i, &tr.obs)?;
        self.act.push(i, &tr.act)?;
        self.next_obs.push(i, &tr.next_obs)?;
        self.push_reward(i, &tr.reward);
        self.push_is_done(i, &tr.is_done);

        self.i = (self.i + len) % self.capacity;
        self.size = (self.size + len).min(self.capacity);

        Ok(())
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl ReplayBufferBase for TensorReplayBuffer {
    type Config = TensorReplayBufferConfig;
    type Batch = TensorBatch;

    fn build(config: &Self::Config) -> Self {
        let capacity = config.capacity.max(1);

        Self {
            capacity,
            i: 0,
            size: 0,
            obs: TensorStore::new(capacity),
            act: TensorStore::new(capacity),
            next_obs: TensorStore::new(capacity),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            rng: fastrand::Rng::with_seed(config.seed),
        }
    }

    fn batch(&mut self, size: usize) -> Result<TensorBatch> {
        if self.size == 0 {
            return Err(ForestFireError::EmptyReplayBuffer.into());
        }

        let ixs = (0..size)
            .map(|_| self.rng.usize(..self.size))
            .collect::<Vec<_>>();
        let ixs_t = Tensor::from_slice(&ixs.iter().map(|&ix| ix as i64).collect::<Vec<_>>());

        let sample = |store: &TensorStore| {
            store
                .sample(&ixs_t)
                .ok_or(ForestFireError::EmptyReplayBuffer)
        };

        Ok(TensorBatch {
            obs: sample(&self.obs)?,
            act: sample(&self.act)?,
            next_obs: sample(&self.next_obs)?,
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
        })
    }

    fn len(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;

    fn transitions(start: i64, n: i64) -> Transition {
        let obs = Tensor::arange_start(start, start + n, tch::kind::FLOAT_CPU).unsqueeze(-1);
        Transition {
            act: &obs * 0.1,
            next_obs: &obs + 1.0,
            obs,
            reward: (start..start + n).map(|v| v as f32).collect(),
            is_done: vec![0; n as usize],
        }
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = TensorReplayBuffer::build(&TensorReplayBufferConfig::default());
        assert_eq!(ReplayBufferBase::len(&buffer), 0);
        assert!(buffer.batch(4).is_err());
    }

    #[test]
    fn test_push_and_batch() -> Result<()> {
        let config = TensorReplayBufferConfig::default().capacity(10);
        let mut buffer = TensorReplayBuffer::build(&config);
        buffer.push(transitions(0, 4))?;
        assert_eq!(ReplayBufferBase::len(&buffer), 4);

        let batch = buffer.batch(16)?;
        assert_eq!(batch.len(), 16);
        let (obs, act, next_obs, reward, is_done) = batch.unpack();
        assert_eq!(obs.size(), vec![16, 1]);
        assert_eq!(is_done.len(), 16);

        // Fields of a sampled transition stay aligned
        let obs = Vec::<f32>::try_from(&obs.flatten(0, -1))?;
        let act = Vec::<f32>::try_from(&act.flatten(0, -1))?;
        let next_obs = Vec::<f32>::try_from(&next_obs.flatten(0, -1))?;
        for i in 0..16 {
            assert!(obs[i] < 4.0);
            assert_eq!(reward[i], obs[i]);
            assert!((act[i] - 0.1 * obs[i]).abs() < 1e-6);
            assert_eq!(next_obs[i], obs[i] + 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_overwrite_oldest() -> Result<()> {
        let config = TensorReplayBufferConfig::default().capacity(5);
        let mut buffer = TensorReplayBuffer::build(&config);
        buffer.push(transitions(0, 4))?;
        buffer.push(transitions(4, 3))?;
        assert_eq!(ReplayBufferBase::len(&buffer), 5);

        // 0 and 1 were overwritten by 5 and 6
        let (_, _, _, reward, _) = buffer.batch(200)?.unpack();
        assert!(reward.iter().all(|&r| r >= 2.0 && r <= 6.0));
        Ok(())
    }

    #[test]
    fn test_inconsistent_transition() {
        let mut tr = transitions(0, 3);
        tr.reward.pop();
        let mut buffer = TensorReplayBuffer::build(&TensorReplayBufferConfig::default());
        assert!(buffer.push(tr).is_err());
    }

    #[test]
    fn test_item_shape_mismatch() -> Result<()> {
        let tr = |obs_dim: i64| Transition {
            obs: Tensor::zeros(&[1, obs_dim], tch::kind::FLOAT_CPU),
            act: Tensor::zeros(&[1, 1], tch::kind::FLOAT_CPU),
            next_obs: Tensor::zeros(&[1, obs_dim], tch::kind::FLOAT_CPU),
            reward: vec![0.0],
            is_done: vec![0],
        };
        let config = TensorReplayBufferConfig::default().capacity(4);
        let mut buffer = TensorReplayBuffer::build(&config);
        buffer.push(tr(2))?;

        let err = buffer.push(tr(3)).unwrap_err();
        match err.downcast_ref::<ForestFireError>() {
            Some(ForestFireError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, &vec![2]);
                assert_eq!(actual, &vec![3]);
            }
            _ => panic!("unexpected error: {}", err),
        }

        // The rejected transition is not stored
        assert_eq!(ReplayBufferBase::len(&buffer), 1);
        buffer.push(tr(2))?;
        assert_eq!(ReplayBufferBase::len(&buffer), 2);
        Ok(())
    }

    #[test]
    fn test_from_tensors() -> Result<()> {
        let obs = Tensor::rand(&[7, 2, 2], tch::kind::FLOAT_CPU);
        let act = Tensor::rand(&[7, 1], tch::kind::FLOAT_CPU);
        let next_obs = Tensor::rand(&[7, 2, 2], tch::kind::FLOAT_CPU);
        let mut buffer =
            TensorReplayBuffer::from_tensors(obs, act, next_obs, vec![1.0; 7], vec![1; 7])?;

        assert_eq!(buffer.capacity(), 7);
        assert_eq!(ReplayBufferBase::len(&buffer), 7);
        let (obs, _, _, _, is_done) = buffer.batch(3)?.unpack();
        assert_eq!(obs.size(), vec![3, 2, 2]);
        assert_eq!(is_done, vec![1, 1, 1]);
        Ok(())
    }
}
