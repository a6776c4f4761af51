//! Rainbow agent implemented with candle.
use super::{config::RainbowConfig, explorer::EpsilonGreedy};
use crate::{
    double_q::{expected_values, gather_actions, select_bootstrap_dist},
    loss::categorical_cross_entropy,
    model::{CategoricalModel, DistModel, TargetModel},
    projection::project_distribution,
    support::Support,
    util::{f32_tensor, no_grad, nonterminal_mask},
};
use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor, D};
use log::trace;
use rainbow_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Policy, ReplayBufferBase, TransitionBatch,
};
use rand::{rngs::SmallRng, SeedableRng};
use std::{fs, marker::PhantomData, path::Path};

const MODEL_FILE_NAME: &str = "model.safetensors";

// Expected action values of a single state, shape [1, n_actions]
fn q_values<Q: CategoricalModel>(
    online: &DistModel<Q>,
    support: &Support,
    state: &Tensor,
) -> Result<Tensor> {
    let state = state.to_device(online.device())?.unsqueeze(0)?;
    no_grad(|| {
        let ps = online.forward(&state, false)?;
        expected_values(support, &ps)
    })
}

fn greedy_action<Q: CategoricalModel>(
    online: &DistModel<Q>,
    support: &Support,
    state: &Tensor,
) -> Result<i64> {
    let a = q_values(online, support, state)?
        .argmax(D::Minus1)?
        .squeeze(0)?;
    Ok(a.to_scalar::<u32>()? as i64)
}

/// Rainbow agent: categorical double DQN with noisy dueling networks, n-step
/// returns and prioritized replay.
///
/// Transitions in the batches are n-step transitions, i.e., `reward` is the
/// discounted return over `multi_step` steps and `next_obs` the observation
/// `multi_step` steps later.
pub struct Rainbow<Q, R>
where
    Q: CategoricalModel,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    online: DistModel<Q>,
    target: TargetModel<Q>,
    support: Support,
    batch_size: usize,
    discount_n: f32,
    norm_clip: f32,
    explorer: EpsilonGreedy,
    train: bool,
    device: Device,
    n_opts: usize,
    rng: SmallRng,
    phantom: PhantomData<R>,
}

impl<Q, R> Rainbow<Q, R>
where
    Q: CategoricalModel,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    /// Performs a learning step on a batch sampled from `buffer`.
    ///
    /// The per-sample cross-entropy losses are fed back to the buffer as priorities.
    /// The returned record holds the importance-weighted loss and the gradient norm
    /// before clipping.
    pub fn learn(&mut self, buffer: &mut R) -> Result<Record> {
        let batch = buffer.batch(self.batch_size)?;
        let (obs, act, next_obs, reward, is_terminated, ixs, weight) = batch.unpack();
        let batch_size = reward.len();
        let obs = obs.into().to_device(&self.device)?;
        let act = act.into().to_device(&self.device)?;
        let next_obs = next_obs.into().to_device(&self.device)?;
        let returns = f32_tensor(&reward, &self.device)?;
        let nonterminals = nonterminal_mask(&is_terminated, &self.device)?;
        let weights = match weight {
            Some(w) => f32_tensor(&w, &self.device)?,
            None => Tensor::ones(batch_size, candle_core::DType::F32, &self.device)?,
        };

        // log p(s_t, a_t)
        let log_ps_a = gather_actions(&self.online.forward(&obs, true)?, &act)?;

        // Target noise is resampled before the target forward pass
        self.target.reset_noise()?;
        let m = {
            let online = &self.online;
            let target = &self.target;
            let support = &self.support;
            no_grad(|| {
                let pns_online = online.forward(&next_obs, false)?;
                let pns_target = target.forward(&next_obs, false)?;
                let pns_a = select_bootstrap_dist(support, &pns_online, &pns_target)?;
                project_distribution(support, &returns, &nonterminals, &pns_a, self.discount_n)
            })?
        };

        let loss = categorical_cross_entropy(&log_ps_a, &m)?;
        let weighted_loss = loss.mul(&weights)?.mean_all()?;
        let grad_norm = self.online.backward_step(&weighted_loss, self.norm_clip)?;

        let priorities = loss.detach().to_vec1::<f32>()?;
        buffer.update_priority(&ixs, &Some(priorities));
        self.n_opts += 1;

        let loss = weighted_loss.to_scalar::<f32>()?;
        trace!("n_opts: {}, loss: {}, grad_norm: {}", self.n_opts, loss, grad_norm);

        Ok(Record::from_slice(&[
            ("loss", RecordValue::Scalar(loss)),
            ("grad_norm", RecordValue::Scalar(grad_norm)),
        ]))
    }

    /// Greedy action for a single (unbatched) state.
    ///
    /// The noise of the network is not resampled.
    pub fn act(&self, state: &Tensor) -> Result<i64> {
        greedy_action(&self.online, &self.support, state)
    }

    /// Uniformly random action with probability `epsilon`, otherwise [`Rainbow::act`].
    pub fn act_e_greedy(&mut self, state: &Tensor, epsilon: f64) -> Result<i64> {
        let (online, support) = (&self.online, &self.support);
        EpsilonGreedy::sample(epsilon, online.n_actions(), &mut self.rng, || {
            greedy_action(online, support, state)
        })
    }

    /// Maximum expected action value of a single (unbatched) state.
    pub fn evaluate_q(&self, state: &Tensor) -> Result<f32> {
        let q = q_values(&self.online, &self.support, state)?
            .max(D::Minus1)?
            .squeeze(0)?;
        Ok(q.to_scalar::<f32>()?)
    }

    /// Resamples the noise of the online network.
    pub fn reset_noise(&mut self) -> Result<()> {
        self.online.reset_noise()
    }

    /// Copies the parameters of the online network to the target network.
    pub fn update_target_net(&mut self) -> Result<()> {
        trace!("Synchronize target network");
        self.target.sync(&self.online)
    }

    /// Saves the parameters of the online network as `dir/name`.
    pub fn save(&self, dir: impl AsRef<Path>, name: &str) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.online.save(dir.join(name))
    }

    /// Loads the parameters of the online network and synchronizes the target network.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.online.load(path)?;
        self.target.sync(&self.online)
    }

    /// Support of the return distributions.
    pub fn support(&self) -> &Support {
        &self.support
    }

    /// Online network.
    pub fn online(&self) -> &DistModel<Q> {
        &self.online
    }

    /// Target network.
    pub fn target(&self) -> &TargetModel<Q> {
        &self.target
    }

    /// The number of learning steps performed so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }
}

impl<Q, R> Configurable for Rainbow<Q, R>
where
    Q: CategoricalModel,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    type Config = RainbowConfig<Q>;

    /// Constructs the agent.
    ///
    /// If a model file is given in the configuration, it must exist and is
    /// loaded into both networks.
    fn build(config: Self::Config) -> Result<Self> {
        let device: Device = config.device.unwrap_or_default().try_into()?;
        let model_config = config.model_config.context("model_config is not set.")?;
        let support = Support::new(config.atoms, config.v_min, config.v_max, &device)?;

        let mut online = DistModel::<Q>::build(model_config, &config.opt_config, device.clone())?;
        if online.atoms() != support.atoms() {
            bail!(
                "The network outputs {} atoms, the support has {}",
                online.atoms(),
                support.atoms()
            );
        }
        if let Some(path) = &config.model_file {
            online.load(path)?;
        }
        online.set_train(true);
        let target = TargetModel::build(&online)?;

        Ok(Self {
            online,
            target,
            support,
            batch_size: config.batch_size,
            discount_n: config.discount.powi(config.multi_step as i32),
            norm_clip: config.norm_clip,
            explorer: EpsilonGreedy::new(config.eval_epsilon),
            train: true,
            device,
            n_opts: 0,
            rng: SmallRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        })
    }
}

impl<Q, R> Policy for Rainbow<Q, R>
where
    Q: CategoricalModel,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    type Obs = Tensor;
    type Act = i64;

    /// Greedy action in training mode, where the noisy layers explore.
    /// Epsilon-greedy action in evaluation mode.
    fn sample(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        match self.train {
            true => self.act(obs),
            false => {
                let (online, support) = (&self.online, &self.support);
                self.explorer
                    .action(online.n_actions(), &mut self.rng, || {
                        greedy_action(online, support, obs)
                    })
            }
        }
    }
}

impl<Q, R> Agent<R> for Rainbow<Q, R>
where
    Q: CategoricalModel,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
        self.online.set_train(true);
    }

    fn eval(&mut self) {
        self.train = false;
        self.online.set_train(false);
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        self.learn(buffer)
    }

    /// Saves the online network as `model.safetensors` in `path`.
    fn save_params(&self, path: &Path) -> Result<()> {
        self.save(path, MODEL_FILE_NAME)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.load(path.join(MODEL_FILE_NAME))
    }
}
