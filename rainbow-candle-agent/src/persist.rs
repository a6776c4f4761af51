//! Loading of saved parameters.
//!
//! Parameters are stored as a flat safetensors mapping from names to tensors.
//! Files written with the older naming of the convolutional encoder
//! (`conv1`, `conv2`, `conv3`) are migrated to the current naming before they are
//! bound to a network.
use crate::util::lock_vars;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use log::trace;
use rainbow_core::RainbowError;
use std::{collections::HashMap, path::Path};

/// Pairs of legacy and current parameter names.
pub const LEGACY_NAMES: [(&str, &str); 6] = [
    ("conv1.weight", "convs.0.weight"),
    ("conv1.bias", "convs.0.bias"),
    ("conv2.weight", "convs.2.weight"),
    ("conv2.bias", "convs.2.bias"),
    ("conv3.weight", "convs.4.weight"),
    ("conv3.bias", "convs.4.bias"),
];

/// Returns true if the parameters use the legacy naming.
pub fn is_legacy(tensors: &HashMap<String, Tensor>) -> bool {
    tensors.contains_key(LEGACY_NAMES[0].0)
}

/// Renames legacy parameters. Mappings in the current naming are returned as is.
pub fn migrate_legacy_names(mut tensors: HashMap<String, Tensor>) -> HashMap<String, Tensor> {
    if !is_legacy(&tensors) {
        return tensors;
    }

    for (old, new) in LEGACY_NAMES.iter() {
        if let Some(t) = tensors.remove(*old) {
            trace!("Rename parameter {} to {}", old, new);
            tensors.insert(new.to_string(), t);
        }
    }

    tensors
}

/// Reads a safetensors file.
///
/// A missing file is reported as [`RainbowError::ModelFileNotFound`].
pub fn load_tensors(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    if !path.is_file() {
        return Err(RainbowError::ModelFileNotFound(path.to_path_buf()).into());
    }
    Ok(candle_core::safetensors::load(path, device)?)
}

/// Sets every variable of `varmap` to the tensor with the same name.
///
/// The names and shapes of both sides must match exactly. They are checked
/// before any variable is written, so the variables are untouched on error.
pub fn assign_strict(varmap: &VarMap, tensors: &HashMap<String, Tensor>) -> Result<()> {
    let vars = lock_vars(varmap)?;

    for (name, var) in vars.iter() {
        let t = tensors
            .get(name)
            .ok_or_else(|| RainbowError::MissingParameter(name.clone()))?;
        if t.dims() != var.dims() {
            return Err(RainbowError::ShapeMismatch {
                name: name.clone(),
                expected: var.dims().to_vec(),
                found: t.dims().to_vec(),
            }
            .into());
        }
    }

    let mut unexpected = tensors
        .keys()
        .filter(|name| !vars.contains_key(*name))
        .collect::<Vec<_>>();
    unexpected.sort();
    if let Some(name) = unexpected.first() {
        return Err(RainbowError::UnexpectedParameter(name.to_string()).into());
    }

    for (name, var) in vars.iter() {
        if let Some(t) = tensors.get(name) {
            let t = t.to_dtype(var.dtype())?.to_device(var.device())?;
            var.set(&t)?;
        }
    }

    Ok(())
}
