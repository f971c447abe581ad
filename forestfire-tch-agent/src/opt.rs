//! Optimizers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{Adam, AdamW, Optimizer as Optimizer_, OptimizerConfig as OptimizerConfig_, VarStore},
    Tensor,
};

/// Configures an optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Coefficient of the running average of the gradient.
        beta1: f64,
        /// Coefficient of the running average of the squared gradient.
        beta2: f64,
        /// Weight decay.
        wd: f64,
        /// Term added to the denominator.
        eps: f64,
        /// Use the AMSGrad variant.
        amsgrad: bool,
    },
}

impl OptimizerConfig {
    /// Constructs an optimizer.
    pub fn build(&self, vs: &VarStore) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::Adam { lr } => {
                let opt = Adam::default().build(vs, *lr)?;
                Ok(Optimizer::Adam(opt))
            }
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                wd,
                eps,
                amsgrad,
            } => {
                let opt = AdamW {
                    beta1: *beta1,
                    beta2: *beta2,
                    wd: *wd,
                    eps: *eps,
                    amsgrad: *amsgrad,
                }
                .build(vs, *lr)?;
                Ok(Optimizer::AdamW(opt))
            }
        }
    }

    /// Returns the learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::Adam { lr } => *lr,
            Self::AdamW { lr, .. } => *lr,
        }
    }
}

/// Optimizers.
///
/// This is a thin wrapper of [tch::nn::Optimizer].
pub enum Optimizer {
    /// Adam optimizer.
    Adam(Optimizer_),

    /// AdamW optimizer.
    AdamW(Optimizer_),
}

impl Optimizer {
    /// Zeroes the gradients, backpropagates `loss` and updates the parameters.
    pub fn backward_step(&mut self, loss: &Tensor) {
        match self {
            Self::Adam(opt) => {
                opt.backward_step(loss);
            }
            Self::AdamW(opt) => {
                opt.backward_step(loss);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;
    use tch::{nn, Device, Kind};

    #[test]
    fn test_adam_step_decreases_loss() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().var("w", &[3], nn::Init::Const(1.0));
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(&vs)?;

        let loss = |w: &Tensor| w.square().sum(Kind::Float);
        let before = f64::try_from(loss(&w))?;
        for _ in 0..10 {
            opt.backward_step(&loss(&w));
        }
        let after = f64::try_from(loss(&w))?;

        assert!(after < before);
        Ok(())
    }

    #[test]
    fn test_serde_optimizer_config() -> Result<()> {
        let config = OptimizerConfig::Adam { lr: 3e-4 };
        let yaml = serde_yaml::to_string(&config)?;
        let config_: OptimizerConfig = serde_yaml::from_str(&yaml)?;

        assert_eq!(config, config_);
        assert_eq!(config_.lr(), 3e-4);
        Ok(())
    }
}
