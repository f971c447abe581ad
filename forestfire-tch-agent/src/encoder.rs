//! Observation encoder shared by actors and critics.
//!
//! A flat encoder passes vectors (or flattened images) through unchanged.
//! A CNN encoder applies the convolutional stack of the DQN Nature paper
//! to single-frame images and flattens the result.
use serde::{Deserialize, Serialize};
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// Configuration of [`Encoder`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EncoderConfig {
    /// Observations are vectors of `in_dim` elements.
    Flat {
        /// Dimension of the observation vector.
        in_dim: i64,
    },

    /// Observations are `n_channels x image_size x image_size` images.
    Cnn {
        /// Side length of the square image.
        image_size: i64,
        /// Number of channels.
        n_channels: i64,
    },
}

// (kernel, stride) of the convolution layers.
const CONV_LAYERS: [(i64, i64); 3] = [(8, 4), (4, 2), (3, 1)];
const CONV_OUT_CHANNELS: i64 = 64;

impl EncoderConfig {
    /// Chooses the encoder in the way the agents' positional arguments do.
    ///
    /// * `image_obs && cnn`: a single-channel `state_dim x state_dim` image through the CNN.
    /// * `image_obs`: the image flattened to `state_dim * state_dim` elements.
    /// * otherwise: a vector of `state_dim` elements.
    pub fn from_state_dim(state_dim: i64, image_obs: bool, cnn: bool) -> Self {
        match (image_obs, cnn) {
            (true, true) => Self::Cnn {
                image_size: state_dim,
                n_channels: 1,
            },
            (true, false) => Self::Flat {
                in_dim: state_dim * state_dim,
            },
            (false, _) => Self::Flat { in_dim: state_dim },
        }
    }

    /// Dimension of the encoded feature vector.
    pub fn out_dim(&self) -> i64 {
        match self {
            Self::Flat { in_dim } => *in_dim,
            Self::Cnn { image_size, .. } => {
                let side = CONV_LAYERS
                    .iter()
                    .fold(*image_size, |s, (k, st)| (s - k) / st + 1);
                CONV_OUT_CHANNELS * side * side
            }
        }
    }

    /// Returns `true` for the CNN encoder.
    pub fn is_cnn(&self) -> bool {
        matches!(self, Self::Cnn { .. })
    }
}

/// Maps a batch of observations to a batch of feature vectors.
pub struct Encoder {
    config: EncoderConfig,
    device: Device,
    cnn: Option<nn::Sequential>,
}

impl Encoder {
    fn conv_config(stride: i64) -> nn::ConvConfig {
        nn::ConvConfig {
            stride,
            ws_init: nn::Init::Orthogonal { gain: 1.0 },
            ..Default::default()
        }
    }

    fn create_cnn(p: &nn::Path, n_channels: i64) -> nn::Sequential {
        let mut seq = nn::seq();
        let mut in_channels = n_channels;
        let out_channels = [32, 64, CONV_OUT_CHANNELS];

        for (i, ((kernel, stride), out)) in CONV_LAYERS.iter().zip(out_channels).enumerate() {
            seq = seq
                .add(nn::conv2d(
                    p / format!("c{}", i + 1),
                    in_channels,
                    out,
                    *kernel,
                    Self::conv_config(*stride),
                ))
                .add_fn(|xs| xs.relu());
            in_channels = out;
        }

        seq.add_fn(|xs| xs.flat_view())
    }

    /// Builds the encoder under the given path of a [`nn::VarStore`].
    pub fn build(p: &nn::Path, config: EncoderConfig) -> Self {
        let cnn = match &config {
            EncoderConfig::Cnn { n_channels, .. } => Some(Self::create_cnn(p, *n_channels)),
            EncoderConfig::Flat { .. } => None,
        };

        Self {
            config,
            device: p.device(),
            cnn,
        }
    }

    /// Encodes observations.
    ///
    /// The input is reshaped to `[batch, in_dim]` or `[batch, c, h, w]`, so a single
    /// observation without batch axis is accepted as well.
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = xs.to(self.device).to_kind(Kind::Float);
        match (&self.config, &self.cnn) {
            (
                EncoderConfig::Cnn {
                    image_size,
                    n_channels,
                },
                Some(cnn),
            ) => cnn.forward(&xs.reshape(&[-1, *n_channels, *image_size, *image_size])),
            (EncoderConfig::Flat { in_dim }, _) => xs.reshape(&[-1, *in_dim]),
            _ => unreachable!("CNN encoder is built with its layers"),
        }
    }

    /// Dimension of the encoded feature vector.
    pub fn out_dim(&self) -> i64 {
        self.config.out_dim()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_state_dim() {
        assert_eq!(
            EncoderConfig::from_state_dim(64, true, true),
            EncoderConfig::Cnn {
                image_size: 64,
                n_channels: 1
            }
        );
        assert_eq!(
            EncoderConfig::from_state_dim(64, true, false),
            EncoderConfig::Flat { in_dim: 4096 }
        );
        assert_eq!(
            EncoderConfig::from_state_dim(5, false, true),
            EncoderConfig::Flat { in_dim: 5 }
        );
    }

    #[test]
    fn test_cnn_out_dim() {
        // 64 -> 15 -> 6 -> 4
        let config = EncoderConfig::from_state_dim(64, true, true);
        assert_eq!(config.out_dim(), 64 * 4 * 4);
    }

    #[test]
    /// Check shape of features from images with and without batch axis.
    fn test_cnn_forward() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = EncoderConfig::from_state_dim(64, true, true);
        let encoder = Encoder::build(&(vs.root() / "cnn"), config);

        let xs = Tensor::rand(&[8, 64, 64], tch::kind::FLOAT_CPU);
        assert_eq!(encoder.forward(&xs).size(), vec![8, 1024]);

        let x = Tensor::rand(&[64, 64], tch::kind::FLOAT_CPU);
        assert_eq!(encoder.forward(&x).size(), vec![1, 1024]);
    }

    #[test]
    fn test_flat_forward() {
        let vs = nn::VarStore::new(Device::Cpu);
        let encoder = Encoder::build(&vs.root(), EncoderConfig::Flat { in_dim: 3 });
        let x = Tensor::from_slice(&[1f32, 2.0, 3.0]);

        assert_eq!(encoder.forward(&x).size(), vec![1, 3]);
        assert_eq!(vs.variables().len(), 0);
    }
}
