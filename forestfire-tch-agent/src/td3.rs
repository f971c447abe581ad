//! TD3 agent.
//!
//! Twin Delayed DDPG trains a deterministic policy against the minimum of two
//! action-value functions. Noise is added to the target action (target policy
//! smoothing), and the policy and target networks are updated once every
//! `policy_freq` critic updates.
//!
//! ```ignore
//! let encoder = EncoderConfig::from_state_dim(64, true, true);
//! let config = Td3Config::default()
//!     .actor_config(ActorConfig::default().pi_config(
//!         DeterministicActorNetConfig::new(encoder.clone(), action_dim, max_action),
//!     ))
//!     .critic_config(CriticConfig::default().q_config(
//!         TwinQNetConfig::new(encoder, action_dim),
//!     ))
//!     .max_action(max_action);
//! type Agent = Td3<FireEnv, TwinQNet, DeterministicActorNet, TensorReplayBuffer>;
//! let mut agent = Agent::build(config)?;
//! ```
mod base;
mod config;
pub use base::Td3;
pub use config::Td3Config;
