use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, Linear, Module, VarBuilder};

/// Linear layer with factorised Gaussian noise (Fortunato et al., 2017).
///
/// In training mode the effective weights are `mu + sigma * epsilon`, in
/// evaluation mode only `mu` is used. `epsilon` is not a parameter: it is neither
/// optimized nor saved, and changes only in [`NoisyLinear::reset_noise`].
pub struct NoisyLinear {
    in_features: usize,
    out_features: usize,
    weight_mu: Tensor,
    weight_sigma: Tensor,
    bias_mu: Tensor,
    bias_sigma: Tensor,
    weight_epsilon: Tensor,
    bias_epsilon: Tensor,
    train: bool,
}

impl NoisyLinear {
    /// Creates a layer and samples its first noise.
    pub fn new(
        vb: VarBuilder,
        in_features: usize,
        out_features: usize,
        std_init: f64,
    ) -> Result<Self> {
        let mu_range = 1.0 / (in_features as f64).sqrt();
        let init_mu = Init::Uniform {
            lo: -mu_range,
            up: mu_range,
        };
        let weight_mu = vb.get_with_hints((out_features, in_features), "weight_mu", init_mu)?;
        let weight_sigma = vb.get_with_hints(
            (out_features, in_features),
            "weight_sigma",
            Init::Const(std_init / (in_features as f64).sqrt()),
        )?;
        let bias_mu = vb.get_with_hints(out_features, "bias_mu", init_mu)?;
        let bias_sigma = vb.get_with_hints(
            out_features,
            "bias_sigma",
            Init::Const(std_init / (out_features as f64).sqrt()),
        )?;

        let device = vb.device();
        let mut layer = Self {
            in_features,
            out_features,
            weight_mu,
            weight_sigma,
            bias_mu,
            bias_sigma,
            weight_epsilon: Tensor::zeros((out_features, in_features), DType::F32, device)?,
            bias_epsilon: Tensor::zeros(out_features, DType::F32, device)?,
            train: true,
        };
        layer.reset_noise()?;

        Ok(layer)
    }

    // sign(x) * sqrt(|x|), x ~ N(0, 1)
    fn scale_noise(size: usize, device: &Device) -> Result<Tensor> {
        let x = Tensor::randn(0f32, 1f32, size, device)?;
        let sign = x.ge(0f64)?.to_dtype(DType::F32)?.affine(2.0, -1.0)?;
        Ok(sign.mul(&x.abs()?.sqrt()?)?)
    }

    /// Samples new noise.
    pub fn reset_noise(&mut self) -> Result<()> {
        let device = self.weight_mu.device();
        let epsilon_in = Self::scale_noise(self.in_features, device)?;
        let epsilon_out = Self::scale_noise(self.out_features, device)?;
        self.weight_epsilon = epsilon_out
            .unsqueeze(1)?
            .broadcast_mul(&epsilon_in.unsqueeze(0)?)?;
        self.bias_epsilon = epsilon_out;
        Ok(())
    }

    /// Switches between noisy and mean weights.
    pub fn set_train(&mut self, train: bool) {
        self.train = train;
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let linear = match self.train {
            true => Linear::new(
                self.weight_mu
                    .add(&self.weight_sigma.mul(&self.weight_epsilon)?)?,
                Some(self.bias_mu.add(&self.bias_sigma.mul(&self.bias_epsilon)?)?),
            ),
            false => Linear::new(self.weight_mu.clone(), Some(self.bias_mu.clone())),
        };
        Ok(linear.forward(xs)?)
    }
}
