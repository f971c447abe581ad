//! Utilities.
use crate::{model::ModelBase, opt::OptimizerConfig};
use anyhow::{Context, Result};
use forestfire_core::error::ForestFireError;
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
};
use tch::Tensor;

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track<M: ModelBase>(dest: &mut M, src: &M, tau: f64) {
    let src = src.get_var_store().variables();
    let mut dest = dest.get_var_store_mut().variables();
    debug_assert_eq!(src.len(), dest.len());

    tch::no_grad(|| {
        for (name, src) in src.iter() {
            let dest = dest
                .get_mut(name)
                .unwrap_or_else(|| panic!("Variable {} is missing in the target", name));
            dest.copy_(&(tau * src + (1.0 - tau) * &*dest));
        }
    });
    trace!("soft update");
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Configurations of networks producing actions in `[-max_action, max_action]`.
pub trait ActionBound {
    /// Returns the bound of the actions.
    fn get_max_action(&self) -> f64;
}

/// Fails if the bound of a network differs from the bound of the agent.
pub fn check_max_action(name: &str, max_action: f64, net_max_action: f64) -> Result<()> {
    if (max_action - net_max_action).abs() > f64::EPSILON * max_action.abs().max(1.0) {
        return Err(ForestFireError::InvalidConfig(format!(
            "max_action of the {} ({}) differs from that of the agent ({})",
            name, net_max_action, max_action
        ))
        .into());
    }
    Ok(())
}

/// Appends `suffix` to the file name of `prefix`.
///
/// `prefixed_path("model/td3", "_actor.pt")` gives `model/td3_actor.pt`.
pub fn prefixed_path(prefix: &Path, suffix: &str) -> Result<PathBuf> {
    let mut name = prefix
        .file_name()
        .with_context(|| format!("{:?} has no file name to use as a prefix", prefix))?
        .to_os_string();
    name.push(suffix);
    Ok(prefix.with_file_name(name))
}

/// Converts a single-element tensor, typically a loss, to `f32`.
pub fn scalar(t: &Tensor) -> f32 {
    t.double_value(&[]) as f32
}

/// Converts done flags to `1 - is_done` as a column tensor of shape `[batch, 1]`.
pub fn not_done(is_done: &[i8]) -> Tensor {
    let v = is_done.iter().map(|&d| 1f32 - d as f32).collect::<Vec<_>>();
    Tensor::from_slice(&v).unsqueeze(-1)
}

/// Converts rewards to a column tensor of shape `[batch, 1]`.
pub fn reward(reward: &[f32]) -> Tensor {
    Tensor::from_slice(reward).unsqueeze(-1)
}

/// Repeats each row of `[batch, ...]` tensor `n` times consecutively,
/// giving `[batch * n, ...]` like `repeat_interleave` along the first axis.
pub fn repeat_rows(xs: &Tensor, n: i64) -> Tensor {
    let size = xs.size();
    let b = size[0];
    let xs = xs.reshape(&[b, -1]);
    let d = xs.size()[1];
    let mut shape = size.clone();
    shape[0] = b * n;
    xs.repeat(&[1, n]).reshape(&[b * n, d]).reshape(shape.as_slice())
}

/// Creates the parent directory of a file prefix if it does not exist.
pub fn create_parent_dir(prefix: &Path) -> Result<()> {
    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Training progress saved next to the parameters of an agent.
///
/// tch does not serialize the moments of its optimizers, so only the
/// optimizer configurations are kept; optimizers restart after loading.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct TrainState {
    /// The number of gradient iterations performed so far.
    pub total_it: usize,

    /// Optimizer configuration of each network, keyed by network name.
    pub opt_configs: BTreeMap<String, OptimizerConfig>,
}

impl TrainState {
    /// Saves the state as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save train state to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the state from YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let state = serde_yaml::from_reader(rdr)?;
        info!("Load train state from {:?}", path.as_ref());
        Ok(state)
    }

    /// Warns about optimizer configurations differing from those of the running agent.
    pub fn check_opt_configs(&self, current: &BTreeMap<String, OptimizerConfig>) {
        for (name, config) in self.opt_configs.iter() {
            if current.get(name) != Some(config) {
                warn!(
                    "Optimizer of {} was saved with {:?}, now {:?}",
                    name,
                    config,
                    current.get(name)
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn test_prefixed_path() -> Result<()> {
        let p = prefixed_path(Path::new("model/td3"), "_actor.pt")?;
        assert_eq!(p, PathBuf::from("model/td3_actor.pt"));

        let p = prefixed_path(Path::new("bcq"), "_vae.pt")?;
        assert_eq!(p, PathBuf::from("bcq_vae.pt"));

        assert!(prefixed_path(Path::new("/"), "_vae.pt").is_err());
        Ok(())
    }

    #[test]
    fn test_train_state() -> Result<()> {
        let dir = tempdir::TempDir::new("train_state")?;
        let path = dir.path().join("td3_train_state.yaml");
        let mut state = TrainState::default();
        state.total_it = 42;
        state
            .opt_configs
            .insert("actor".to_string(), OptimizerConfig::Adam { lr: 3e-4 });

        state.save(&path)?;
        assert_eq!(TrainState::load(&path)?, state);
        Ok(())
    }

    #[test]
    fn test_create_parent_dir() -> Result<()> {
        let dir = tempdir::TempDir::new("prefix")?;
        let prefix = dir.path().join("a").join("b").join("td3");
        create_parent_dir(&prefix)?;
        assert!(dir.path().join("a").join("b").is_dir());

        // Prefix without directory
        create_parent_dir(Path::new("td3"))?;
        Ok(())
    }

    #[test]
    fn test_repeat_rows() -> Result<()> {
        let xs = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0]).reshape(&[2, 2]);
        let ys = repeat_rows(&xs, 3);

        assert_eq!(ys.size(), vec![6, 2]);
        assert_eq!(
            Vec::<f32>::try_from(&ys.flatten(0, -1))?,
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]
        );

        // Images keep their shape except the first axis
        let imgs = Tensor::rand(&[2, 4, 4], tch::kind::FLOAT_CPU);
        assert_eq!(repeat_rows(&imgs, 5).size(), vec![10, 4, 4]);
        Ok(())
    }

    #[test]
    fn test_check_max_action() {
        assert!(check_max_action("actor", 2.0, 2.0).is_ok());
        assert!(check_max_action("actor", 2.0, 1.0).is_err());
    }

    #[test]
    fn test_not_done() -> Result<()> {
        let t = not_done(&[0, 1, 0]);
        assert_eq!(t.size(), vec![3, 1]);
        assert_eq!(Vec::<f32>::try_from(&t.flatten(0, -1))?, vec![1.0, 0.0, 1.0]);
        Ok(())
    }
}
