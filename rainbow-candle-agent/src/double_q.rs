//! Double-Q selection of the bootstrap distribution.
use crate::support::Support;
use anyhow::Result;
use candle_core::{DType, Tensor, D};

/// Expected action values of categorical distributions.
///
/// `dist` has shape `[batch_size, n_actions, atoms]` and the output `[batch_size, n_actions]`.
pub fn expected_values(support: &Support, dist: &Tensor) -> Result<Tensor> {
    let z = support.values().reshape((1, 1, support.atoms()))?;
    Ok(dist.broadcast_mul(&z)?.sum(D::Minus1)?)
}

/// Indices of the actions with the largest expected value, shape `[batch_size]`, `u32`.
pub fn greedy_actions(support: &Support, dist: &Tensor) -> Result<Tensor> {
    Ok(expected_values(support, dist)?.argmax(D::Minus1)?)
}

/// Picks the distribution of one action per sample.
///
/// `dist` has shape `[batch_size, n_actions, atoms]`, `actions` holds integer
/// indices with shape `[batch_size]`. Returns `[batch_size, atoms]`.
pub fn gather_actions(dist: &Tensor, actions: &Tensor) -> Result<Tensor> {
    let (batch_size, _, atoms) = dist.dims3()?;
    let ix = actions
        .to_dtype(DType::U32)?
        .reshape((batch_size, 1, 1))?
        .broadcast_as((batch_size, 1, atoms))?
        .contiguous()?;
    Ok(dist.gather(&ix, 1)?.squeeze(1)?)
}

/// Bootstrap distribution for double Q-learning.
///
/// The action is chosen greedily from the online distribution `pns_online` and
/// evaluated with the target distribution `pns_target`. Both inputs are the
/// distributions for the n-th next states.
pub fn select_bootstrap_dist(
    support: &Support,
    pns_online: &Tensor,
    pns_target: &Tensor,
) -> Result<Tensor> {
    let argmax = greedy_actions(support, pns_online)?;
    gather_actions(pns_target, &argmax)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_expected_values() -> Result<()> {
        let dev = Device::Cpu;
        let support = Support::new(3, -1.0, 1.0, &dev)?;
        let dist = Tensor::new(&[[[1f32, 0., 0.], [0.25, 0.25, 0.5]]], &dev)?;
        let q = expected_values(&support, &dist)?;
        assert_eq!(q.to_vec2::<f32>()?, vec![vec![-1.0, 0.25]]);
        Ok(())
    }

    #[test]
    fn test_selection_uses_online_evaluation_uses_target() -> Result<()> {
        let dev = Device::Cpu;
        let support = Support::new(3, -1.0, 1.0, &dev)?;

        // online prefers action 1, target prefers action 0
        let pns_online = Tensor::new(&[[[1f32, 0., 0.], [0., 0., 1.]]], &dev)?;
        let pns_target = Tensor::new(&[[[0f32, 0., 1.], [0.5, 0.5, 0.]]], &dev)?;

        let pns_a = select_bootstrap_dist(&support, &pns_online, &pns_target)?;
        assert_eq!(pns_a.to_vec2::<f32>()?, vec![vec![0.5, 0.5, 0.0]]);
        Ok(())
    }

    #[test]
    fn test_gather_actions() -> Result<()> {
        let dev = Device::Cpu;
        let dist = Tensor::arange(0f32, 12., &dev)?.reshape((2, 3, 2))?;
        let actions = Tensor::new(&[2i64, 0], &dev)?;
        let picked = gather_actions(&dist, &actions)?;
        assert_eq!(
            picked.to_vec2::<f32>()?,
            vec![vec![4.0, 5.0], vec![6.0, 7.0]]
        );
        Ok(())
    }
}
