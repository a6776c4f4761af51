use super::{Architecture, EncoderConfig, NoisyLinear, RainbowNetConfig};
use crate::model::CategoricalModel;
use anyhow::{bail, Result};
use candle_core::{Tensor, D};
use candle_nn::{
    conv::Conv2dConfig,
    conv2d, linear,
    ops::{log_softmax, softmax},
    sequential::{seq, Sequential},
    Module, VarBuilder,
};

/// Dueling network with noisy linear layers and categorical outputs.
///
/// The encoder is followed by a value stream (`fc_h_v`, `fc_z_v`) and an
/// advantage stream (`fc_h_a`, `fc_z_a`), combined per atom as
/// `v + a - mean_a(a)` and normalized over the atoms.
pub struct RainbowNet {
    encoder: Sequential,
    fc_h_v: NoisyLinear,
    fc_h_a: NoisyLinear,
    fc_z_v: NoisyLinear,
    fc_z_a: NoisyLinear,
    n_actions: usize,
    atoms: usize,
}

impl RainbowNet {
    fn stride(s: usize) -> Conv2dConfig {
        Conv2dConfig {
            stride: s,
            ..Default::default()
        }
    }

    // Output size of a convolution without padding
    fn conv_out(size: usize, kernel: usize, stride: usize) -> Result<usize> {
        if size < kernel {
            bail!("Input size {} is smaller than kernel size {}", size, kernel);
        }
        Ok((size - kernel) / stride + 1)
    }

    fn create_conv(
        vb: &VarBuilder,
        history_length: usize,
        image_size: usize,
        architecture: Architecture,
    ) -> Result<(Sequential, usize)> {
        let vb = vb.pp("convs");
        match architecture {
            Architecture::Canonical => {
                let size = Self::conv_out(image_size, 8, 4)?;
                let size = Self::conv_out(size, 4, 2)?;
                let size = Self::conv_out(size, 3, 1)?;
                let seq = seq()
                    .add(conv2d(history_length, 32, 8, Self::stride(4), vb.pp(0))?)
                    .add_fn(|xs| xs.relu())
                    .add(conv2d(32, 64, 4, Self::stride(2), vb.pp(2))?)
                    .add_fn(|xs| xs.relu())
                    .add(conv2d(64, 64, 3, Self::stride(1), vb.pp(4))?)
                    .add_fn(|xs| xs.relu()?.flatten_from(1));
                Ok((seq, 64 * size * size))
            }
            Architecture::DataEfficient => {
                let size = Self::conv_out(image_size, 5, 5)?;
                let size = Self::conv_out(size, 5, 5)?;
                let seq = seq()
                    .add(conv2d(history_length, 32, 5, Self::stride(5), vb.pp(0))?)
                    .add_fn(|xs| xs.relu())
                    .add(conv2d(32, 64, 5, Self::stride(5), vb.pp(2))?)
                    .add_fn(|xs| xs.relu()?.flatten_from(1));
                Ok((seq, 64 * size * size))
            }
        }
    }

    fn create_mlp(vb: &VarBuilder, in_dim: usize, units: &[usize]) -> Result<(Sequential, usize)> {
        let vb = vb.pp("fc");
        let mut seq = seq();
        let mut dim = in_dim;
        for (i, &n) in units.iter().enumerate() {
            seq = seq.add(linear(dim, n, vb.pp(i))?).add_fn(|xs| xs.relu());
            dim = n;
        }
        Ok((seq, dim))
    }

    fn noisy_layers_mut(&mut self) -> [&mut NoisyLinear; 4] {
        [
            &mut self.fc_h_v,
            &mut self.fc_h_a,
            &mut self.fc_z_v,
            &mut self.fc_z_a,
        ]
    }
}

impl CategoricalModel for RainbowNet {
    type Config = RainbowNetConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let (encoder, feature_dim) = match &config.encoder {
            EncoderConfig::Mlp { in_dim, units } => Self::create_mlp(&vb, *in_dim, units)?,
            EncoderConfig::Conv {
                history_length,
                image_size,
                architecture,
            } => Self::create_conv(&vb, *history_length, *image_size, *architecture)?,
        };
        let hidden = config.hidden_size;
        let std = config.noisy_std;
        let n_actions = config.n_actions;
        let atoms = config.atoms;

        Ok(Self {
            encoder,
            fc_h_v: NoisyLinear::new(vb.pp("fc_h_v"), feature_dim, hidden, std)?,
            fc_h_a: NoisyLinear::new(vb.pp("fc_h_a"), feature_dim, hidden, std)?,
            fc_z_v: NoisyLinear::new(vb.pp("fc_z_v"), hidden, atoms, std)?,
            fc_z_a: NoisyLinear::new(vb.pp("fc_z_a"), hidden, n_actions * atoms, std)?,
            n_actions,
            atoms,
        })
    }

    fn forward(&self, xs: &Tensor, log: bool) -> Result<Tensor> {
        let xs = self.encoder.forward(xs)?;
        let batch_size = xs.dims()[0];
        let v = self.fc_z_v.forward(&self.fc_h_v.forward(&xs)?.relu()?)?;
        let a = self.fc_z_a.forward(&self.fc_h_a.forward(&xs)?.relu()?)?;
        let v = v.reshape((batch_size, 1, self.atoms))?;
        let a = a.reshape((batch_size, self.n_actions, self.atoms))?;
        let q = a.broadcast_sub(&a.mean_keepdim(1)?)?.broadcast_add(&v)?;

        match log {
            true => Ok(log_softmax(&q, D::Minus1)?),
            false => Ok(softmax(&q, D::Minus1)?),
        }
    }

    fn reset_noise(&mut self) -> Result<()> {
        for layer in self.noisy_layers_mut() {
            layer.reset_noise()?;
        }
        Ok(())
    }

    fn set_train(&mut self, train: bool) {
        for layer in self.noisy_layers_mut() {
            layer.set_train(train);
        }
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn atoms(&self) -> usize {
        self.atoms
    }
}
