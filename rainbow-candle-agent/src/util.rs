//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;
use log::trace;
use rainbow_core::RainbowError;
use std::{collections::HashMap, sync::MutexGuard};

/// Evaluates `f` and cuts the result off the computation graph.
///
/// Nothing computed inside `f` receives a gradient through the returned tensor.
pub fn no_grad<F>(f: F) -> Result<Tensor>
where
    F: FnOnce() -> Result<Tensor>,
{
    Ok(f()?.detach())
}

/// Locks the variables of a [`VarMap`].
pub fn lock_vars(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("The variable map is poisoned"))
}

/// Copies all variables of `src` into the variables of `dest` with the same names.
///
/// dest = src
pub fn copy_vars(dest: &VarMap, src: &VarMap) -> Result<()> {
    trace!("copy_vars");
    let dest = lock_vars(dest)?;
    let src = lock_vars(src)?;

    for (name, v_dest) in dest.iter() {
        let v_src = src
            .get(name)
            .ok_or_else(|| RainbowError::MissingParameter(name.clone()))?;
        if v_src.dims() != v_dest.dims() {
            return Err(RainbowError::ShapeMismatch {
                name: name.clone(),
                expected: v_dest.dims().to_vec(),
                found: v_src.dims().to_vec(),
            }
            .into());
        }
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Returns `1 - is_terminated` as a float tensor, shape `[batch_size]`.
pub fn nonterminal_mask(is_terminated: &[i8], device: &Device) -> Result<Tensor> {
    let mask = is_terminated
        .iter()
        .map(|t| 1f32 - *t as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&mask[..], (is_terminated.len(),), device)?)
}

/// Converts a vector of floats to a tensor of shape `[len]`.
pub fn f32_tensor(v: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(v, (v.len(),), device)?)
}
