//! Distributional loss and gradient clipping.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var, D};

/// Per-sample cross-entropy `-sum_j m_j * log p_j`.
///
/// `log_ps_a` is the log-probability of the taken action and `m` the projected
/// target, both with shape `[batch_size, atoms]`. Returns `[batch_size]`.
pub fn categorical_cross_entropy(log_ps_a: &Tensor, m: &Tensor) -> Result<Tensor> {
    Ok(m.mul(log_ps_a)?.sum(D::Minus1)?.neg()?)
}

/// Rescales the gradients of `vars` so that their global L2 norm does not exceed `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f32) -> Result<f32> {
    let mut sq_sum = 0f32;
    for var in vars.iter() {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq_sum += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let norm = sq_sum.sqrt();

    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for var in vars.iter() {
            let clipped = match grads.get(var.as_tensor()) {
                Some(g) => g.affine(coef as f64, 0.0)?,
                None => continue,
            };
            grads.insert(var.as_tensor(), clipped);
        }
    }

    Ok(norm)
}
