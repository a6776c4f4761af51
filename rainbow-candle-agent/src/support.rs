//! Fixed support of the categorical return distributions.
use anyhow::Result;
use candle_core::{Device, Tensor};
use rainbow_core::RainbowError;

/// Evenly spaced atoms `z_i = v_min + i * delta_z`, `i = 0, ..., atoms - 1`.
///
/// The grid is immutable. The agent builds it once and lends it to the
/// projection and the expected-value computations.
#[derive(Debug, Clone)]
pub struct Support {
    atoms: usize,
    v_min: f32,
    v_max: f32,
    delta_z: f32,
    values: Tensor,
}

impl Support {
    /// Creates a support of `atoms` points spanning `[v_min, v_max]`.
    ///
    /// Requires `atoms >= 2` and `v_min < v_max`.
    pub fn new(atoms: usize, v_min: f32, v_max: f32, device: &Device) -> Result<Self> {
        if atoms < 2 || !(v_min < v_max) {
            return Err(RainbowError::InvalidSupport {
                atoms,
                v_min,
                v_max,
            }
            .into());
        }

        let delta_z = (v_max - v_min) / (atoms - 1) as f32;

        // Filled from both ends so that the end points are exact.
        let values = (0..atoms)
            .map(|i| {
                if i < atoms / 2 {
                    v_min + i as f32 * delta_z
                } else {
                    v_max - (atoms - 1 - i) as f32 * delta_z
                }
            })
            .collect::<Vec<_>>();
        let values = Tensor::from_vec(values, (atoms,), device)?;

        Ok(Self {
            atoms,
            v_min,
            v_max,
            delta_z,
            values,
        })
    }

    /// Number of atoms.
    pub fn atoms(&self) -> usize {
        self.atoms
    }

    /// Lower bound of the support.
    pub fn v_min(&self) -> f32 {
        self.v_min
    }

    /// Upper bound of the support.
    pub fn v_max(&self) -> f32 {
        self.v_max
    }

    /// Distance between adjacent atoms.
    pub fn delta_z(&self) -> f32 {
        self.delta_z
    }

    /// Atom values, shape `[atoms]`.
    pub fn values(&self) -> &Tensor {
        &self.values
    }

    /// Device on which the atom values live.
    pub fn device(&self) -> &Device {
        self.values.device()
    }
}
