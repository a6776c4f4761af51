use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::{Init, VarBuilder, VarMap};
use rainbow_candle_agent::{
    expected_values,
    model::CategoricalModel,
    net::{Architecture, RainbowNet, RainbowNetConfig},
    opt::OptimizerConfig,
    rainbow::{Rainbow, RainbowConfig},
};
use rainbow_core::{
    Agent, Configurable, GenericTransitionBatch, Policy, RainbowError, ReplayBufferBase,
};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::HashMap};
use tempdir::TempDir;

const BATCH_SIZE: usize = 4;
const DIM_OBS: usize = 4;
const N_ACTIONS: usize = 2;
const ATOMS: usize = 11;

type Batch = GenericTransitionBatch<Tensor, Tensor>;

/// Replay buffer returning the same batch and recording the priorities it receives.
struct FixedBuffer {
    batch: Batch,
    priorities: Vec<(Option<Vec<usize>>, Option<Vec<f32>>)>,
}

#[derive(Clone)]
struct FixedBufferConfig {
    obs_shape: Vec<usize>,
    weight: bool,
}

impl ReplayBufferBase for FixedBuffer {
    type Config = FixedBufferConfig;
    type Batch = Batch;

    fn build(config: &Self::Config) -> Self {
        let dev = Device::Cpu;
        let mut shape = vec![BATCH_SIZE];
        shape.extend(config.obs_shape.iter());
        let batch = GenericTransitionBatch {
            obs: Tensor::randn(0f32, 1f32, shape.as_slice(), &dev).unwrap(),
            act: Tensor::new(&[0i64, 1, 1, 0], &dev).unwrap(),
            next_obs: Tensor::randn(0f32, 1f32, shape.as_slice(), &dev).unwrap(),
            reward: vec![1.0, -0.5, 0.0, 2.0],
            is_terminated: vec![0, 0, 1, 0],
            ix_sample: Some(vec![3, 1, 4, 0]),
            weight: match config.weight {
                true => Some(vec![1.0, 0.5, 0.25, 1.0]),
                false => None,
            },
        };
        Self {
            batch,
            priorities: vec![],
        }
    }

    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        assert_eq!(size, BATCH_SIZE);
        Ok(self.batch.clone())
    }

    fn update_priority(&mut self, ixs: &Option<Vec<usize>>, td_err: &Option<Vec<f32>>) {
        self.priorities.push((ixs.clone(), td_err.clone()));
    }
}

type RainbowAgent = Rainbow<RainbowNet, FixedBuffer>;

thread_local! {
    // (model id, event); ids are given in build order
    static EVENTS: RefCell<Vec<(usize, &'static str)>> = RefCell::new(Vec::new());
    static N_BUILT: RefCell<usize> = RefCell::new(0);
}

fn log_event(id: usize, event: &'static str) {
    EVENTS.with(|e| e.borrow_mut().push((id, event)));
}

fn take_events() -> Vec<(usize, &'static str)> {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct CountingNetConfig {
    n_actions: usize,
    atoms: usize,
}

/// State-independent categorical model recording its forward passes and noise resets.
struct CountingNet {
    id: usize,
    logits: Tensor,
    n_actions: usize,
    atoms: usize,
}

impl CategoricalModel for CountingNet {
    type Config = CountingNetConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let id = N_BUILT.with(|n| {
            let mut n = n.borrow_mut();
            *n += 1;
            *n - 1
        });
        let logits =
            vb.get_with_hints((config.n_actions, config.atoms), "logits", Init::Const(0.0))?;
        Ok(Self {
            id,
            logits,
            n_actions: config.n_actions,
            atoms: config.atoms,
        })
    }

    fn forward(&self, xs: &Tensor, log: bool) -> Result<Tensor> {
        log_event(self.id, "forward");
        let batch_size = xs.dim(0)?;
        let xs = self
            .logits
            .unsqueeze(0)?
            .broadcast_as((batch_size, self.n_actions, self.atoms))?
            .contiguous()?;
        Ok(match log {
            true => candle_nn::ops::log_softmax(&xs, D::Minus1)?,
            false => candle_nn::ops::softmax(&xs, D::Minus1)?,
        })
    }

    fn reset_noise(&mut self) -> Result<()> {
        log_event(self.id, "reset_noise");
        Ok(())
    }

    fn set_train(&mut self, _train: bool) {}

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn atoms(&self) -> usize {
        self.atoms
    }
}

fn mlp_buffer() -> FixedBuffer {
    FixedBuffer::build(&FixedBufferConfig {
        obs_shape: vec![DIM_OBS],
        weight: true,
    })
}

fn mlp_config() -> RainbowConfig<RainbowNet> {
    let model_config = RainbowNetConfig::mlp(DIM_OBS, vec![16], N_ACTIONS)
        .hidden_size(8)
        .atoms(ATOMS);
    RainbowConfig::default()
        .model_config(model_config)
        .opt_config(OptimizerConfig::Adam { lr: 1e-2, eps: 1e-8 })
        .atoms(ATOMS)
        .v_range(-5.0, 5.0)
        .batch_size(BATCH_SIZE)
}

fn conv_config() -> RainbowConfig<RainbowNet> {
    let model_config = RainbowNetConfig::conv(4, 36, Architecture::Canonical, N_ACTIONS)
        .hidden_size(8)
        .atoms(5);
    RainbowConfig::default()
        .model_config(model_config)
        .atoms(5)
        .batch_size(BATCH_SIZE)
}

fn params(varmap: &VarMap) -> HashMap<String, Vec<f32>> {
    varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(k, v)| {
            let v = v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
            (k.clone(), v)
        })
        .collect()
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn state() -> Result<Tensor> {
    Ok(Tensor::new(&[0.1f32, -0.2, 0.3, 0.4], &Device::Cpu)?)
}

#[test]
fn test_learn_updates_online_and_reports_priorities() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config())?;
    let mut buffer = mlp_buffer();
    let online_0 = params(agent.online().varmap());
    assert_eq!(online_0, params(agent.target().varmap()));

    let record = agent.learn(&mut buffer)?;
    assert!(record.get_scalar("grad_norm")? >= 0.0);
    assert_eq!(agent.n_opts(), 1);

    assert_eq!(buffer.priorities.len(), 1);
    let (ixs, td_err) = &buffer.priorities[0];
    assert_eq!(ixs, &Some(vec![3, 1, 4, 0]));
    let td_err = td_err.as_ref().unwrap();
    assert_eq!(td_err.len(), BATCH_SIZE);
    assert!(td_err.iter().all(|p| p.is_finite() && *p >= 0.0));

    // the reported loss is the importance-weighted mean of the per-sample losses
    let weights = [1.0f32, 0.5, 0.25, 1.0];
    let weighted_mean = td_err
        .iter()
        .zip(weights.iter())
        .map(|(l, w)| l * w)
        .sum::<f32>()
        / BATCH_SIZE as f32;
    let loss = record.get_scalar("loss")?;
    assert!((loss - weighted_mean).abs() < 1e-4, "{} != {}", loss, weighted_mean);

    // the online network is updated, the target network is not
    assert_ne!(online_0, params(agent.online().varmap()));
    assert_eq!(online_0, params(agent.target().varmap()));
    Ok(())
}

#[test]
fn test_learn_resamples_target_noise_before_target_forward() -> Result<()> {
    let model_config = CountingNetConfig {
        n_actions: N_ACTIONS,
        atoms: ATOMS,
    };
    let config = RainbowConfig::<CountingNet>::default()
        .model_config(model_config)
        .atoms(ATOMS)
        .batch_size(BATCH_SIZE);
    let mut agent = Rainbow::<CountingNet, FixedBuffer>::build(config)?;
    let mut buffer = mlp_buffer();
    take_events();

    // online model is built first (id 0), the target second (id 1)
    agent.learn(&mut buffer)?;
    assert_eq!(
        take_events(),
        vec![(0, "forward"), (1, "reset_noise"), (0, "forward"), (1, "forward")]
    );

    // acting never resamples noise
    agent.act(&state()?)?;
    agent.evaluate_q(&state()?)?;
    assert_eq!(take_events(), vec![(0, "forward"), (0, "forward")]);
    Ok(())
}

#[test]
fn test_learn_without_weights() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config())?;
    let mut buffer = FixedBuffer::build(&FixedBufferConfig {
        obs_shape: vec![DIM_OBS],
        weight: false,
    });
    let record = agent.opt_with_record(&mut buffer)?;

    // with unit weights the reported loss is the mean of the priorities
    let td_err = buffer.priorities[0].1.clone().unwrap();
    let mean = td_err.iter().sum::<f32>() / td_err.len() as f32;
    assert!((record.get_scalar("loss")? - mean).abs() < 1e-4);
    Ok(())
}

#[test]
fn test_grad_norm_is_reported_before_clipping() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config().norm_clip(1e-6))?;
    let mut buffer = mlp_buffer();
    let record = agent.learn(&mut buffer)?;
    assert!(record.get_scalar("grad_norm")? > 1e-6);
    Ok(())
}

#[test]
fn test_update_target_net() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config())?;
    let mut buffer = mlp_buffer();
    agent.learn(&mut buffer)?;
    assert_ne!(
        params(agent.online().varmap()),
        params(agent.target().varmap())
    );

    agent.update_target_net()?;
    assert_eq!(
        params(agent.online().varmap()),
        params(agent.target().varmap())
    );
    Ok(())
}

#[test]
fn test_act_and_evaluate_q() -> Result<()> {
    let agent = RainbowAgent::build(mlp_config())?;
    let state = state()?;

    let a1 = agent.act(&state)?;
    let a2 = agent.act(&state)?;
    assert_eq!(a1, a2);
    assert!((0..N_ACTIONS as i64).contains(&a1));

    let ps = agent.online().forward(&state.unsqueeze(0)?, false)?;
    let q = expected_values(agent.support(), &ps)?
        .squeeze(0)?
        .to_vec1::<f32>()?;
    let (best, q_max) = q
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(i_max, q_max), (i, q)| match *q > q_max {
            true => (i, *q),
            false => (i_max, q_max),
        });
    assert_eq!(a1, best as i64);
    assert!((agent.evaluate_q(&state)? - q_max).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_act_e_greedy() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config())?;
    let state = state()?;
    let greedy = agent.act(&state)?;

    for _ in 0..20 {
        assert_eq!(agent.act_e_greedy(&state, 0.0)?, greedy);
    }

    let mut counts = [0usize; N_ACTIONS];
    for _ in 0..2000 {
        counts[agent.act_e_greedy(&state, 1.0)? as usize] += 1;
    }
    assert!(counts.iter().all(|c| *c > 850 && *c < 1150), "{:?}", counts);
    Ok(())
}

#[test]
fn test_sample_follows_mode() -> Result<()> {
    let mut agent = RainbowAgent::build(mlp_config().eval_epsilon(0.0))?;
    let state = state()?;
    assert!(agent.is_train());
    assert_eq!(agent.sample(&state)?, agent.act(&state)?);

    agent.eval();
    assert!(!agent.is_train());
    let a = agent.act(&state)?;
    assert_eq!(agent.sample(&state)?, a);

    // mean weights do not depend on the noise
    agent.reset_noise()?;
    assert_eq!(agent.act(&state)?, a);
    Ok(())
}

#[test]
fn test_save_and_load() -> Result<()> {
    init_logger();
    let tmp = TempDir::new("rainbow")?;
    let mut agent = RainbowAgent::build(mlp_config())?;
    let mut buffer = mlp_buffer();
    agent.learn(&mut buffer)?;
    agent.save(tmp.path().join("models"), "model.safetensors")?;
    let saved = params(agent.online().varmap());

    // at construction
    let path = tmp.path().join("models").join("model.safetensors");
    let agent2 = RainbowAgent::build(mlp_config().model_file(&path))?;
    assert_eq!(saved, params(agent2.online().varmap()));
    assert_eq!(saved, params(agent2.target().varmap()));

    // through the agent interface
    let mut agent3 = RainbowAgent::build(mlp_config())?;
    agent.save_params(tmp.path())?;
    agent3.load_params(tmp.path())?;
    assert_eq!(saved, params(agent3.online().varmap()));
    assert_eq!(saved, params(agent3.target().varmap()));
    Ok(())
}

#[test]
fn test_missing_model_file() -> Result<()> {
    let tmp = TempDir::new("rainbow")?;
    let path = tmp.path().join("missing.safetensors");
    let err = match RainbowAgent::build(mlp_config().model_file(&path)) {
        Ok(_) => panic!("a missing model file must be reported"),
        Err(err) => err,
    };
    assert!(matches!(
        err.downcast_ref::<RainbowError>(),
        Some(RainbowError::ModelFileNotFound(p)) if p == &path
    ));
    Ok(())
}

#[test]
fn test_load_legacy_parameter_names() -> Result<()> {
    init_logger();
    let tmp = TempDir::new("rainbow")?;
    let agent = RainbowAgent::build(conv_config())?;
    agent.save(tmp.path(), "model.safetensors")?;
    let saved = params(agent.online().varmap());

    // rewrite the file with the old names of the convolutions
    let tensors = candle_core::safetensors::load(tmp.path().join("model.safetensors"), &Device::Cpu)?;
    let legacy = tensors
        .into_iter()
        .map(|(k, v)| {
            let k = k
                .replace("convs.0.", "conv1.")
                .replace("convs.2.", "conv2.")
                .replace("convs.4.", "conv3.");
            (k, v)
        })
        .collect::<HashMap<_, _>>();
    assert!(legacy.contains_key("conv1.weight"));
    let path = tmp.path().join("legacy.safetensors");
    candle_core::safetensors::save(&legacy, &path)?;

    let mut agent2 = RainbowAgent::build(conv_config().model_file(&path))?;
    assert_eq!(saved, params(agent2.online().varmap()));

    let mut buffer = FixedBuffer::build(&FixedBufferConfig {
        obs_shape: vec![4, 36, 36],
        weight: true,
    });
    agent2.learn(&mut buffer)?;
    Ok(())
}

#[test]
fn test_mismatched_atoms() {
    let config = mlp_config().atoms(ATOMS + 1);
    assert!(RainbowAgent::build(config).is_err());
}
