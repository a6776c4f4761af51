//! Errors in the library.
use std::path::PathBuf;
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum RainbowError {
    /// A model file given for loading does not exist.
    #[error("Model file not found: {0}")]
    ModelFileNotFound(PathBuf),

    /// A parameter of the model is absent in the loaded parameter set.
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// The loaded parameter set has a parameter the model does not have.
    #[error("Unexpected parameter: {0}")]
    UnexpectedParameter(String),

    /// A loaded parameter has a shape different from the model's.
    #[error("Shape mismatch of {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Name of the parameter.
        name: String,
        /// Shape in the model.
        expected: Vec<usize>,
        /// Shape in the loaded parameter set.
        found: Vec<usize>,
    },

    /// Bounds or number of atoms do not form a valid support.
    #[error("Invalid support: atoms = {atoms}, v_min = {v_min}, v_max = {v_max}")]
    InvalidSupport {
        /// Number of atoms.
        atoms: usize,
        /// Lower bound.
        v_min: f32,
        /// Upper bound.
        v_max: f32,
    },

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
