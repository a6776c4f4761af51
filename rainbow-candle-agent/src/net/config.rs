use serde::{Deserialize, Serialize};

/// Layout of the convolutional encoder.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Architecture {
    /// Three convolutions of the Nature DQN (8x8/4, 4x4/2, 3x3/1).
    Canonical,

    /// Two 5x5/5 convolutions for the data-efficient setting.
    DataEfficient,
}

/// Encoder of the observations.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EncoderConfig {
    /// Fully connected layers with ReLU, for vector observations `[batch_size, in_dim]`.
    Mlp { in_dim: usize, units: Vec<usize> },

    /// Convolutions with ReLU, for stacked frames
    /// `[batch_size, history_length, image_size, image_size]`.
    Conv {
        history_length: usize,
        image_size: usize,
        architecture: Architecture,
    },
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`RainbowNet`](super::RainbowNet).
pub struct RainbowNetConfig {
    pub(super) encoder: EncoderConfig,
    pub(super) hidden_size: usize,
    pub(super) n_actions: usize,
    pub(super) atoms: usize,
    pub(super) noisy_std: f64,
}

impl RainbowNetConfig {
    /// Network with a fully connected encoder.
    pub fn mlp(in_dim: usize, units: Vec<usize>, n_actions: usize) -> Self {
        Self::new(EncoderConfig::Mlp { in_dim, units }, n_actions)
    }

    /// Network with a convolutional encoder.
    pub fn conv(
        history_length: usize,
        image_size: usize,
        architecture: Architecture,
        n_actions: usize,
    ) -> Self {
        let encoder = EncoderConfig::Conv {
            history_length,
            image_size,
            architecture,
        };
        Self::new(encoder, n_actions)
    }

    fn new(encoder: EncoderConfig, n_actions: usize) -> Self {
        Self {
            encoder,
            hidden_size: 512,
            n_actions,
            atoms: 51,
            noisy_std: 0.1,
        }
    }

    /// Sets the number of units of the hidden layers of the value and advantage streams.
    pub fn hidden_size(mut self, v: usize) -> Self {
        self.hidden_size = v;
        self
    }

    /// Sets the number of atoms.
    pub fn atoms(mut self, v: usize) -> Self {
        self.atoms = v;
        self
    }

    /// Sets the initial standard deviation of the noisy layers.
    pub fn noisy_std(mut self, v: f64) -> Self {
        self.noisy_std = v;
        self
    }
}
