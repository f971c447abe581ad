//! BCQ agent.
//!
//! Batch-Constrained deep Q-learning learns from a fixed batch of transitions.
//! A [`Vae`] models the actions in the batch; candidate actions decoded from it
//! are shifted by a bounded [`PerturbationNet`] and the candidate with the
//! highest action value is taken.
mod base;
mod config;
mod perturbation;
mod vae;
pub use base::Bcq;
pub use config::BcqConfig;
pub use perturbation::{PerturbActor, PerturbActorConfig, PerturbationNet, PerturbationNetConfig};
pub use vae::{kl_divergence, Vae, VaeConfig};
