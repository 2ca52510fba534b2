//! Shallow Convolutional Network for fixed-size EEG windows.
//!
//! Temporal convolution → spatial convolution (collapses the channel
//! axis) → batch norm → square → average pool → log → dropout →
//! flatten → dense. The square/log pair approximates log band power of
//! the spatially filtered signal, which is what makes this shallow stack
//! competitive on motor imagery.
//!
//! Input layout is `[batch, 1, C, T]`; kernel and pool sizes default to
//! the 250 Hz values (temporal kernel 25, pool 75, stride 15).
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Hyperparameters of the Shallow ConvNet stack.
#[derive(Config, Debug)]
pub struct ShallowConvNetConfig {
    pub n_classes: usize,
    pub n_chans: usize,
    pub n_samples: usize,
    #[config(default = 40)]
    pub n_filters: usize,
    #[config(default = 25)]
    pub temporal_kernel: usize,
    #[config(default = 75)]
    pub pool_size: usize,
    #[config(default = 15)]
    pub pool_stride: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ShallowConvNetConfig {
    /// Time points after the temporal convolution (valid padding).
    fn conv_out(&self) -> usize {
        assert!(
            self.n_samples >= self.temporal_kernel,
            "window of {} samples is shorter than the temporal kernel ({})",
            self.n_samples,
            self.temporal_kernel
        );
        self.n_samples - self.temporal_kernel + 1
    }

    /// Time points after pooling.
    fn pool_out(&self) -> usize {
        let t = self.conv_out();
        assert!(
            t >= self.pool_size,
            "pool window ({}) does not fit the {t} post-conv samples",
            self.pool_size
        );
        (t - self.pool_size) / self.pool_stride + 1
    }

    /// Flattened feature dimension entering the dense head.
    pub fn feature_dim(&self) -> usize {
        self.n_filters * self.pool_out()
    }

    /// Build the convolutional trunk.
    pub fn init_trunk<B: Backend>(&self, device: &B::Device) -> ScnTrunk<B> {
        ScnTrunk {
            conv_time: Conv2dConfig::new([1, self.n_filters], [1, self.temporal_kernel])
                .init(device),
            conv_spat: Conv2dConfig::new([self.n_filters, self.n_filters], [self.n_chans, 1])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.n_filters)
                .with_epsilon(1e-5)
                .init(device),
            pool: AvgPool2dConfig::new([1, self.pool_size])
                .with_strides([1, self.pool_stride])
                .init(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    /// Build the plain (softmax-head) network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ShallowConvNet<B> {
        ShallowConvNet {
            trunk: self.init_trunk(device),
            fc: LinearConfig::new(self.feature_dim(), self.n_classes).init(device),
        }
    }
}

/// The shared convolutional trunk: everything up to (and including) the
/// flatten, producing one feature vector per trial.
#[derive(Module, Debug)]
pub struct ScnTrunk<B: Backend> {
    conv_time: Conv2d<B>,
    conv_spat: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    pool: AvgPool2d,
    dropout: Dropout,
}

impl<B: Backend> ScnTrunk<B> {
    /// `[batch, 1, C, T]` → `[batch, features]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv_time.forward(x); // [b, F, C, T']
        let x = self.conv_spat.forward(x); // [b, F, 1, T']
        let x = self.norm.forward(x);
        let x = x.powf_scalar(2.0); // square nonlinearity
        let x = self.pool.forward(x);
        let x = x.clamp(1e-7, 1e4).log(); // log nonlinearity, clipped
        let x = self.dropout.forward(x);
        let [b, f, h, w] = x.dims();
        x.reshape([b, f * h * w])
    }
}

/// Plain Shallow ConvNet: trunk + dense classification head. The head
/// emits logits; apply softmax (or a cross-entropy loss) downstream.
#[derive(Module, Debug)]
pub struct ShallowConvNet<B: Backend> {
    trunk: ScnTrunk<B>,
    fc: Linear<B>,
}

impl<B: Backend> ShallowConvNet<B> {
    /// `[batch, 1, C, T]` → logits `[batch, n_classes]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.trunk.forward(x))
    }
}
