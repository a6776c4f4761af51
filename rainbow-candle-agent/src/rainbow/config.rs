//! Configuration of the Rainbow agent.
use crate::{model::CategoricalModel, opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// Constructs [`Rainbow`](super::Rainbow).
#[derive(Deserialize, Serialize)]
#[serde(bound = "")]
pub struct RainbowConfig<Q>
where
    Q: CategoricalModel,
{
    pub(super) model_config: Option<Q::Config>,
    #[serde(default)]
    pub(super) opt_config: OptimizerConfig,
    pub(super) atoms: usize,
    pub(super) v_min: f32,
    pub(super) v_max: f32,
    pub(super) batch_size: usize,
    pub(super) multi_step: usize,
    pub(super) discount: f32,
    pub(super) norm_clip: f32,
    pub(super) eval_epsilon: f64,
    pub(super) seed: u64,
    #[serde(default)]
    pub(super) model_file: Option<PathBuf>,
    pub device: Option<Device>,
    #[serde(skip)]
    phantom: PhantomData<Q>,
}

impl<Q> Clone for RainbowConfig<Q>
where
    Q: CategoricalModel,
{
    fn clone(&self) -> Self {
        Self {
            model_config: self.model_config.clone(),
            opt_config: self.opt_config.clone(),
            atoms: self.atoms,
            v_min: self.v_min,
            v_max: self.v_max,
            batch_size: self.batch_size,
            multi_step: self.multi_step,
            discount: self.discount,
            norm_clip: self.norm_clip,
            eval_epsilon: self.eval_epsilon,
            seed: self.seed,
            model_file: self.model_file.clone(),
            device: self.device,
            phantom: PhantomData,
        }
    }
}

impl<Q> Default for RainbowConfig<Q>
where
    Q: CategoricalModel,
{
    fn default() -> Self {
        Self {
            model_config: None,
            opt_config: OptimizerConfig::default(),
            atoms: 51,
            v_min: -10.0,
            v_max: 10.0,
            batch_size: 32,
            multi_step: 3,
            discount: 0.99,
            norm_clip: 10.0,
            eval_epsilon: 0.001,
            seed: 42,
            model_file: None,
            device: None,
            phantom: PhantomData,
        }
    }
}

impl<Q> RainbowConfig<Q>
where
    Q: CategoricalModel,
{
    /// Sets the configuration of the network.
    pub fn model_config(mut self, v: Q::Config) -> Self {
        self.model_config = Some(v);
        self
    }

    /// Sets the configuration of the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Number of atoms of the support.
    pub fn atoms(mut self, v: usize) -> Self {
        self.atoms = v;
        self
    }

    /// Bounds of the support.
    pub fn v_range(mut self, v_min: f32, v_max: f32) -> Self {
        self.v_min = v_min;
        self.v_max = v_max;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Number of steps of the returns in the batches.
    pub fn multi_step(mut self, v: usize) -> Self {
        self.multi_step = v;
        self
    }

    /// Discount factor.
    pub fn discount(mut self, v: f32) -> Self {
        self.discount = v;
        self
    }

    /// Maximum L2 norm of the gradients.
    pub fn norm_clip(mut self, v: f32) -> Self {
        self.norm_clip = v;
        self
    }

    /// Epsilon of the epsilon-greedy policy in evaluation mode.
    pub fn eval_epsilon(mut self, v: f64) -> Self {
        self.eval_epsilon = v;
        self
    }

    /// Seed of the random number generator of the agent.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Parameter file loaded when the agent is built.
    pub fn model_file(mut self, v: impl AsRef<Path>) -> Self {
        self.model_file = Some(v.as_ref().to_path_buf());
        self
    }

    /// Device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Loads [`RainbowConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of Rainbow agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`RainbowConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of Rainbow agent into {:?}", path_);
        Ok(())
    }
}
