//! Categorical estimators.
//!
//! [`CategoricalModel`] is the interface a network has to provide to be trained
//! by the agent. It is instantiated twice: [`DistModel`] owns the online
//! parameters together with the optimizer, [`TargetModel`] holds a copy that can
//! only be changed by [`TargetModel::sync`].
use crate::{
    loss::clip_grad_norm,
    opt::{Optimizer, OptimizerConfig},
    persist,
    util::copy_vars,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, path::Path};

/// Neural network producing a categorical return distribution for every action.
///
/// The network does not own its [`VarMap`]; parameters are registered through the
/// [`VarBuilder`] given to [`CategoricalModel::build`].
pub trait CategoricalModel: Sized {
    /// Configuration from which the model is constructed.
    type Config: Clone + Debug + Serialize + DeserializeOwned;

    /// Builds the model with [`VarBuilder`] and [`CategoricalModel::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>;

    /// Returns probabilities (or log-probabilities if `log` is true),
    /// shape `[batch_size, n_actions, atoms]`.
    fn forward(&self, xs: &Tensor, log: bool) -> Result<Tensor>;

    /// Resamples stochastic parameters, if any.
    fn reset_noise(&mut self) -> Result<()>;

    /// Switches between training and evaluation behavior.
    fn set_train(&mut self, train: bool);

    /// The number of actions.
    fn n_actions(&self) -> usize;

    /// The number of atoms of the output distributions.
    fn atoms(&self) -> usize;
}

/// Online estimator, owning its parameters and optimizer.
pub struct DistModel<Q: CategoricalModel> {
    device: Device,
    varmap: VarMap,
    q: Q,
    config: Q::Config,
    opt: Optimizer,
}

impl<Q: CategoricalModel> DistModel<Q> {
    /// Constructs [`DistModel`].
    pub fn build(config: Q::Config, opt_config: &OptimizerConfig, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            Q::build(vb, config.clone())?
        };
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            q,
            config,
            opt,
        })
    }

    /// Forward pass of the network.
    pub fn forward(&self, xs: &Tensor, log: bool) -> Result<Tensor> {
        self.q.forward(xs, log)
    }

    /// Backpropagates `loss`, clips the global gradient norm to `max_norm` and
    /// applies an optimizer step. Returns the norm before clipping.
    pub fn backward_step(&mut self, loss: &Tensor, max_norm: f32) -> Result<f32> {
        let mut grads = loss.backward()?;
        let norm = clip_grad_norm(&mut grads, &self.varmap.all_vars(), max_norm)?;
        self.opt.step(&grads)?;
        Ok(norm)
    }

    /// Resamples the noise of the network.
    pub fn reset_noise(&mut self) -> Result<()> {
        self.q.reset_noise()
    }

    /// Sets training mode of the network.
    pub fn set_train(&mut self, train: bool) {
        self.q.set_train(train);
    }

    /// The number of actions.
    pub fn n_actions(&self) -> usize {
        self.q.n_actions()
    }

    /// The number of atoms.
    pub fn atoms(&self) -> usize {
        self.q.atoms()
    }

    /// Parameters of the network.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Configuration of the network.
    pub fn config(&self) -> &Q::Config {
        &self.config
    }

    /// Device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Saves the parameters in the safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads parameters saved by [`DistModel::save`], or a file with the legacy
    /// parameter names.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let tensors = persist::load_tensors(path.as_ref(), &self.device)?;
        let tensors = persist::migrate_legacy_names(tensors);
        persist::assign_strict(&self.varmap, &tensors)?;
        info!("Load model from {:?}", path.as_ref());
        Ok(())
    }
}

/// Target estimator.
///
/// It has no optimizer; its parameters only change through [`TargetModel::sync`].
pub struct TargetModel<Q: CategoricalModel> {
    varmap: VarMap,
    q: Q,
}

impl<Q: CategoricalModel> TargetModel<Q> {
    /// Builds a network with the configuration of `online` and copies its parameters.
    pub fn build(online: &DistModel<Q>) -> Result<Self> {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, online.device());
            Q::build(vb, online.config().clone())?
        };
        let target = Self { varmap, q };
        target.sync(online)?;
        Ok(target)
    }

    /// Overwrites all parameters with those of `online`.
    pub fn sync(&self, online: &DistModel<Q>) -> Result<()> {
        copy_vars(&self.varmap, online.varmap())
    }

    /// Forward pass of the network.
    pub fn forward(&self, xs: &Tensor, log: bool) -> Result<Tensor> {
        self.q.forward(xs, log)
    }

    /// Resamples the noise of the network.
    pub fn reset_noise(&mut self) -> Result<()> {
        self.q.reset_noise()
    }

    /// Parameters of the network.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
