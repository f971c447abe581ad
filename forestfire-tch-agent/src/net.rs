//! Actor and critic networks of TD3 and BCQ.
//!
//! Both networks start with an [`Encoder`]. With the CNN encoder the image
//! features go through a 512-unit bottleneck before the 256-unit layers
//! shared with the flat variant.
use crate::{
    model::{SubModel, SubModel2},
    util::{ActionBound, OutDim},
    Encoder, EncoderConfig,
};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Kind, Tensor};

const HIDDEN: i64 = 256;
const CNN_HIDDEN: i64 = 512;

// Layers between the encoder features and the 256-unit layer.
fn feature_net(p: &nn::Path, prefix: &str, encoder: &EncoderConfig, in_dim: i64) -> nn::Sequential {
    let seq = nn::seq();
    if encoder.is_cnn() {
        seq.add(nn::linear(
            p / format!("{}0", prefix),
            in_dim,
            CNN_HIDDEN,
            Default::default(),
        ))
        .add_fn(|xs| xs.relu())
        .add(nn::linear(
            p / format!("{}1", prefix),
            CNN_HIDDEN,
            HIDDEN,
            Default::default(),
        ))
    } else {
        seq.add(nn::linear(
            p / format!("{}0", prefix),
            in_dim,
            HIDDEN,
            Default::default(),
        ))
        .add_fn(|xs| xs.relu())
    }
}

/// Configuration of [`DeterministicActorNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DeterministicActorNetConfig {
    /// Observation encoder.
    pub encoder: EncoderConfig,

    /// Dimension of the action vector.
    pub action_dim: i64,

    /// Actions are in `[-max_action, max_action]`.
    pub max_action: f64,
}

impl DeterministicActorNetConfig {
    /// Creates the configuration.
    pub fn new(encoder: EncoderConfig, action_dim: i64, max_action: f64) -> Self {
        Self {
            encoder,
            action_dim,
            max_action,
        }
    }
}

impl OutDim for DeterministicActorNetConfig {
    fn get_out_dim(&self) -> i64 {
        self.action_dim
    }

    fn set_out_dim(&mut self, v: i64) {
        self.action_dim = v;
    }
}

impl ActionBound for DeterministicActorNetConfig {
    fn get_max_action(&self) -> f64 {
        self.max_action
    }
}

/// Deterministic policy `a = max_action * tanh(f(s))`.
pub struct DeterministicActorNet {
    config: DeterministicActorNetConfig,
    encoder: Encoder,
    seq: nn::Sequential,
}

impl DeterministicActorNet {
    fn create_net(
        var_store: &nn::VarStore,
        config: &DeterministicActorNetConfig,
    ) -> (Encoder, nn::Sequential) {
        let p = &var_store.root();
        let encoder = Encoder::build(&(p / "cnn"), config.encoder.clone());
        let max_action = config.max_action;
        let seq = feature_net(p, "fcn", &config.encoder, encoder.out_dim())
            .add(nn::linear(p / "l1", HIDDEN, HIDDEN, Default::default()))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(
                p / "l2",
                HIDDEN,
                config.action_dim,
                Default::default(),
            ))
            .add_fn(move |xs| xs.tanh() * max_action);

        (encoder, seq)
    }
}

impl SubModel for DeterministicActorNet {
    type Config = DeterministicActorNetConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let (encoder, seq) = Self::create_net(var_store, &config);
        Self {
            config,
            encoder,
            seq,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }

    fn forward(&self, obs: &Tensor) -> Tensor {
        self.seq.forward(&self.encoder.forward(obs))
    }
}

/// Configuration of [`TwinQNet`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TwinQNetConfig {
    /// Observation encoder, shared by both heads.
    pub encoder: EncoderConfig,

    /// Dimension of the action vector.
    pub action_dim: i64,
}

impl TwinQNetConfig {
    /// Creates the configuration.
    pub fn new(encoder: EncoderConfig, action_dim: i64) -> Self {
        Self {
            encoder,
            action_dim,
        }
    }
}

/// A pair of action-value functions sharing one observation encoder.
pub struct TwinQNet {
    config: TwinQNetConfig,
    encoder: Encoder,
    q1: nn::Sequential,
    q2: nn::Sequential,
}

impl TwinQNet {
    fn create_head(
        p: &nn::Path,
        ix: usize,
        config: &TwinQNetConfig,
        in_dim: i64,
    ) -> nn::Sequential {
        feature_net(p, &format!("fcn_{}_", ix), &config.encoder, in_dim)
            .add(nn::linear(
                p / format!("q{}_l1", ix),
                HIDDEN,
                HIDDEN,
                Default::default(),
            ))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(
                p / format!("q{}_l2", ix),
                HIDDEN,
                1,
                Default::default(),
            ))
    }

    fn state_action(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let feature = self.encoder.forward(obs);
        let act = act.to(feature.device()).to_kind(Kind::Float);
        Tensor::cat(&[feature, act], 1)
    }

    /// Action values of the first head, shape `[batch, 1]`.
    pub fn q1(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.q1.forward(&self.state_action(obs, act))
    }
}

impl SubModel2 for TwinQNet {
    type Config = TwinQNetConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = (Tensor, Tensor);

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let p = &var_store.root();
        let encoder = Encoder::build(&(p / "cnn"), config.encoder.clone());
        let in_dim = encoder.out_dim() + config.action_dim;
        let q1 = Self::create_head(p, 1, &config, in_dim);
        let q2 = Self::create_head(p, 2, &config, in_dim);

        Self {
            config,
            encoder,
            q1,
            q2,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }

    fn forward(&self, obs: &Tensor, act: &Tensor) -> (Tensor, Tensor) {
        let sa = self.state_action(obs, act);
        (self.q1.forward(&sa), self.q2.forward(&sa))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::Device;

    #[test]
    fn test_actor_bounded() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = DeterministicActorNetConfig::new(EncoderConfig::Flat { in_dim: 3 }, 2, 0.5);
        let actor = DeterministicActorNet::build(&vs, config);

        let obs = Tensor::randn(&[16, 3], tch::kind::FLOAT_CPU) * 100.0;
        let act = actor.forward(&obs);

        assert_eq!(act.size(), vec![16, 2]);
        assert!(act.abs().max().double_value(&[]) <= 0.5);
    }

    #[test]
    fn test_actor_cnn() {
        let vs = nn::VarStore::new(Device::Cpu);
        let encoder = EncoderConfig::from_state_dim(64, true, true);
        let config = DeterministicActorNetConfig::new(encoder, 1, 1.0);
        let actor = DeterministicActorNet::build(&vs, config);

        let obs = Tensor::rand(&[2, 1, 64, 64], tch::kind::FLOAT_CPU);
        assert_eq!(actor.forward(&obs).size(), vec![2, 1]);
        assert!(vs.variables().contains_key("cnn.c3.weight"));
        assert!(vs.variables().contains_key("fcn1.weight"));
    }

    #[test]
    /// Both heads share a single encoder.
    fn test_twin_q_shared_encoder() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = TwinQNetConfig::new(EncoderConfig::from_state_dim(64, true, true), 2);
        let critic = <TwinQNet as SubModel2>::build(&vs, config);

        let n_conv_vars = vs
            .variables()
            .keys()
            .filter(|k| k.starts_with("cnn."))
            .count();
        assert_eq!(n_conv_vars, 6);

        let obs = Tensor::rand(&[4, 64, 64], tch::kind::FLOAT_CPU);
        let act = Tensor::rand(&[4, 2], tch::kind::FLOAT_CPU);
        let (q1, q2) = critic.forward(&obs, &act);

        assert_eq!(q1.size(), vec![4, 1]);
        assert_eq!(q2.size(), vec![4, 1]);
        assert_eq!(critic.q1(&obs, &act).size(), vec![4, 1]);
    }

    #[test]
    fn test_twin_q_flat() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = TwinQNetConfig::new(EncoderConfig::Flat { in_dim: 3 }, 1);
        let critic = <TwinQNet as SubModel2>::build(&vs, config);

        let obs = Tensor::rand(&[5, 3], tch::kind::FLOAT_CPU);
        let act = Tensor::rand(&[5, 1], tch::kind::FLOAT_CPU);
        let (q1, _) = critic.forward(&obs, &act);

        assert!(q1.allclose(&critic.q1(&obs, &act), 1e-6, 1e-6, false));
    }
}
