//! Projection of the n-step Bellman target onto the support.
use crate::support::Support;
use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Returns the lower and upper grid neighbors of fractional atom positions `b`.
///
/// `b` must lie in `[0, atoms - 1]`. When `b` is integral, `floor(b) == ceil(b)` and
/// the pair is widened so that the two indices differ: the lower index is moved down
/// if it can be, otherwise the upper index is moved up.
pub fn grid_neighbors(b: &Tensor, atoms: usize) -> Result<(Tensor, Tensor)> {
    let l = b.floor()?;
    let u = b.ceil()?;

    // l <- l - 1 where u > 0 and l == u
    let shift_l = l
        .eq(&u)?
        .to_dtype(DType::F32)?
        .mul(&u.gt(0f64)?.to_dtype(DType::F32)?)?;
    let l = l.sub(&shift_l)?;

    // u <- u + 1 where l < atoms - 1 and l == u, using the updated l
    let shift_u = l
        .eq(&u)?
        .to_dtype(DType::F32)?
        .mul(&l.lt((atoms - 1) as f64)?.to_dtype(DType::F32)?)?;
    let u = u.add(&shift_u)?;

    Ok((l, u))
}

/// Projects the target distribution of the bootstrap actions onto the support.
///
/// * `returns` - n-step discounted returns, shape `[batch_size]`.
/// * `nonterminals` - 1 for transitions that continue, 0 for terminal ones, shape `[batch_size]`.
/// * `pns_a` - target distribution of the bootstrap action in the n-th next state,
///   shape `[batch_size, atoms]`.
/// * `discount_n` - the discount factor raised to the n-th power.
///
/// Every atom `z_j` is moved to `Tz_j = R + nonterminal * discount_n * z_j`, clamped
/// into `[v_min, v_max]`, and its probability is split between the two grid neighbors
/// in proportion to the distance. Each output row has the same total mass as the
/// corresponding row of `pns_a`.
pub fn project_distribution(
    support: &Support,
    returns: &Tensor,
    nonterminals: &Tensor,
    pns_a: &Tensor,
    discount_n: f32,
) -> Result<Tensor> {
    let (batch_size, atoms) = pns_a.dims2()?;
    if atoms != support.atoms() {
        bail!(
            "Distribution has {} atoms, support has {}",
            atoms,
            support.atoms()
        );
    }
    if returns.dims1()? != batch_size || nonterminals.dims1()? != batch_size {
        bail!(
            "Batch size mismatch: returns {:?}, nonterminals {:?}, distribution {:?}",
            returns.dims(),
            nonterminals.dims(),
            pns_a.dims()
        );
    }
    let device = pns_a.device();

    // Tz = R + nonterminal * discount^n * z
    let z = support.values().unsqueeze(0)?;
    let tz = nonterminals
        .unsqueeze(1)?
        .affine(discount_n as f64, 0.0)?
        .broadcast_mul(&z)?
        .broadcast_add(&returns.unsqueeze(1)?)?
        .clamp(support.v_min(), support.v_max())?;

    // Fractional index, clamped again against rounding at the boundaries
    let delta_z = Tensor::new(support.delta_z(), device)?;
    let b = tz
        .affine(1.0, -support.v_min() as f64)?
        .broadcast_div(&delta_z)?
        .clamp(0f32, (atoms - 1) as f32)?;
    let (l, u) = grid_neighbors(&b, atoms)?;

    let m_l = pns_a.mul(&u.sub(&b)?)?;
    let m_u = pns_a.mul(&b.sub(&l)?)?;
    let m = Tensor::zeros((batch_size, atoms), DType::F32, device)?
        .scatter_add(&l.to_dtype(DType::U32)?, &m_l, 1)?
        .scatter_add(&u.to_dtype(DType::U32)?, &m_u, 1)?;

    Ok(m)
}
