//! Reference networks for the agent.
mod base;
mod config;
mod noisy;
pub use base::RainbowNet;
pub use config::{Architecture, EncoderConfig, RainbowNetConfig};
pub use noisy::NoisyLinear;
