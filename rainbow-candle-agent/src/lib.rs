//! Categorical DQN (Rainbow) agent implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The learning step follows the C51 recipe: the n-step Bellman operator is applied
//! to a fixed [`Support`] of return values, the shifted distribution is projected back
//! onto the support ([`project_distribution`]), the bootstrap action is picked with the
//! online network and evaluated with the target network ([`select_bootstrap_dist`]),
//! and the online network minimizes the importance-weighted cross-entropy
//! ([`categorical_cross_entropy`]) with a clipped global gradient norm.
pub mod double_q;
pub mod loss;
pub mod model;
pub mod net;
pub mod opt;
pub mod persist;
pub mod projection;
pub mod rainbow;
pub mod support;
pub mod util;
pub use double_q::{expected_values, gather_actions, greedy_actions, select_bootstrap_dist};
pub use loss::{categorical_cross_entropy, clip_grad_norm};
pub use projection::{grid_neighbors, project_distribution};
pub use support::Support;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The GPU device with the given ordinal.
    Cuda(usize),
}

impl TryFrom<Device> for candle_core::Device {
    type Error = anyhow::Error;

    fn try_from(device: Device) -> Result<Self> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
        }
    }
}
