//! TD3 and BCQ agents implemented with [tch](https://crates.io/crates/tch).
//!
//! * [`td3::Td3`] learns online from transitions collected by its own policy.
//! * [`bcq::Bcq`] learns from a fixed batch of transitions; its actions are
//!   restricted to those a VAE trained on the batch can generate.
//!
//! Observations are either flat vectors or single-channel square images,
//! see [`EncoderConfig`].
pub mod actor;
pub mod bcq;
pub mod critic;
mod encoder;
pub mod mlp;
pub mod model;
pub mod net;
pub mod opt;
pub mod replay_buffer;
pub mod td3;
pub mod util;
pub use encoder::{Encoder, EncoderConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using tch.
///
/// This enum is added because [`tch::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl From<Device> for tch::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => tch::Device::Cpu,
            Device::Cuda(n) => tch::Device::Cuda(n),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}
