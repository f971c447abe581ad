//! Policy.
use super::Env;
use anyhow::Result;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A policy on an environment.
///
/// Policy is a mapping from an observation to an action.
/// The mapping can be either of deterministic or stochastic.
pub trait Policy<E: Env> {
    /// Sample an action given an observation.
    fn sample(&mut self, obs: &E::Obs) -> E::Act;
}

/// A configurable object.
pub trait Configurable {
    /// Configuration.
    type Config: Clone + DeserializeOwned;

    /// Builds the object.
    fn build(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Build the object with the configuration in the yaml file of the given path.
    fn build_from_path(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        let rdr = std::io::BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Self::build(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ForestFireError;
    use serde::Deserialize;
    use std::io::Write;
    use tempdir::TempDir;

    #[derive(Clone, Deserialize)]
    struct CounterConfig {
        start: usize,
    }

    struct Counter(usize);

    impl Configurable for Counter {
        type Config = CounterConfig;

        fn build(config: Self::Config) -> Result<Self> {
            if config.start > 10 {
                return Err(ForestFireError::InvalidConfig("start > 10".to_string()).into());
            }
            Ok(Self(config.start))
        }
    }

    #[test]
    fn test_build_from_path() -> Result<()> {
        let dir = TempDir::new("configurable")?;
        let path = dir.path().join("counter.yaml");

        std::fs::File::create(&path)?.write_all(b"start: 3\n")?;
        assert_eq!(Counter::build_from_path(&path)?.0, 3);

        std::fs::File::create(&path)?.write_all(b"start: 11\n")?;
        assert!(Counter::build_from_path(&path).is_err());

        assert!(Counter::build_from_path(dir.path().join("missing.yaml")).is_err());
        Ok(())
    }
}
