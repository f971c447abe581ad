//! Multilayer perceptron.
use crate::{
    model::{SubModel, SubModel2},
    util::OutDim,
};
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Device, Tensor};

/// Configuration of [`Mlp`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MlpConfig {
    pub(crate) in_dim: i64,
    pub(crate) units: Vec<i64>,
    pub(crate) out_dim: i64,
    #[serde(default)]
    pub(crate) activation_out: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// `activation_out` applies ReLU to the output layer.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64, activation_out: bool) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out,
        }
    }
}

impl OutDim for MlpConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: i64) {
        self.out_dim = out_dim;
    }
}

/// Multilayer perceptron with ReLU activation function.
///
/// As [`SubModel2`], the two inputs are concatenated along the last axis.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    seq: nn::Sequential,
}

impl Mlp {
    fn create_net(p: &nn::Path, config: &MlpConfig) -> nn::Sequential {
        let mut seq = nn::seq();
        let mut in_dim = config.in_dim;

        for (i, &out_dim) in config.units.iter().enumerate() {
            seq = seq.add(nn::linear(
                p / format!("{}{}", "ln", i),
                in_dim,
                out_dim,
                Default::default(),
            ));
            seq = seq.add_fn(|x| x.relu());
            in_dim = out_dim;
        }

        seq = seq.add(nn::linear(
            p / format!("{}{}", "ln", config.units.len()),
            in_dim,
            config.out_dim,
            Default::default(),
        ));

        if config.activation_out {
            seq = seq.add_fn(|x| x.relu());
        }

        seq
    }

    /// Builds the network under the given path.
    ///
    /// Used when an MLP is a part of a larger network sharing the same [`nn::VarStore`].
    pub fn build_with_path(p: &nn::Path, config: MlpConfig) -> Self {
        let seq = Self::create_net(p, &config);

        Self {
            config,
            device: p.device(),
            seq,
        }
    }

    /// Forward computation on a single input.
    pub fn forward1(&self, x: &Tensor) -> Tensor {
        self.seq.forward(&x.to(self.device))
    }

    /// Forward computation on the concatenation of two inputs.
    pub fn forward2(&self, x1: &Tensor, x2: &Tensor) -> Tensor {
        let input = Tensor::cat(&[x1.to(self.device), x2.to(self.device)], -1);
        self.seq.forward(&input)
    }
}

impl SubModel for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Tensor {
        self.forward1(x)
    }

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        Self::build_with_path(&(var_store.root() / "mlp"), config)
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        <Self as SubModel>::build(var_store, self.config.clone())
    }
}

impl SubModel2 for Mlp {
    type Config = MlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Self::Output {
        self.forward2(input1, input2)
    }

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        Self::build_with_path(&(var_store.root() / "mlp"), config)
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        <Self as SubModel2>::build(var_store, self.config.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mlp_shapes() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig::new(4, vec![16, 8], 2, false);
        let mlp = <Mlp as SubModel>::build(&vs, config);

        let x = Tensor::rand(&[5, 4], tch::kind::FLOAT_CPU);
        assert_eq!(mlp.forward1(&x).size(), vec![5, 2]);

        // ln0, ln1, ln2, each with weight and bias
        assert_eq!(vs.variables().len(), 6);
        assert!(vs.variables().contains_key("mlp.ln2.weight"));
    }

    #[test]
    fn test_mlp_two_inputs() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig::new(5, vec![8], 3, true);
        let mlp = <Mlp as SubModel2>::build(&vs, config);

        let x1 = Tensor::rand(&[7, 3], tch::kind::FLOAT_CPU);
        let x2 = Tensor::rand(&[7, 2], tch::kind::FLOAT_CPU);
        let y = mlp.forward2(&x1, &x2);

        assert_eq!(y.size(), vec![7, 3]);
        // ReLU on the output layer
        assert!(y.min().double_value(&[]) >= 0.0);
    }
}
