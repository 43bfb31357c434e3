use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Elementwise activation applied after the batch norm.
#[derive(Debug, Clone, Copy, Default)]
pub enum Activation {
    #[default]
    Silu,
    Relu,
    Identity,
}

/// "Same"-style padding when none is given: half the kernel, floored.
pub(crate) fn autopad(kernel: usize, padding: Option<usize>) -> usize {
    padding.unwrap_or(kernel / 2)
}

/// Convolution + BatchNorm + activation, the basic unit every conv block
/// here is built from. The convolution carries no bias; stride-1 calls
/// preserve resolution thanks to `autopad`.
#[derive(Module, Debug)]
pub struct Conv<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
    act: Ignored<Activation>,
}

impl<B: Backend> Conv<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self::with_options(
            device,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            None,
            1,
            Activation::Silu,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_options(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: Option<usize>,
        groups: usize,
        act: Activation,
    ) -> Self {
        let padding = autopad(kernel_size, padding);

        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(groups)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
            act: Ignored(act),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        match self.act.0 {
            Activation::Silu => activation::silu(x),
            Activation::Relu => activation::relu(x),
            Activation::Identity => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn stride_one_preserves_resolution() {
        let device = Default::default();
        let conv = Conv::<TestBackend>::new(&device, 3, 16, 3, 1);
        let x = Tensor::random([2, 3, 32, 32], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(conv.forward(x).dims(), [2, 16, 32, 32]);
    }

    #[test]
    fn stride_two_halves_resolution() {
        let device = Default::default();
        let conv = Conv::<TestBackend>::new(&device, 8, 8, 3, 2);
        let x = Tensor::random([1, 8, 32, 32], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(conv.forward(x).dims(), [1, 8, 16, 16]);
    }

    #[test]
    fn grouped_identity_activation() {
        let device = Default::default();
        let conv = Conv::<TestBackend>::with_options(
            &device,
            8,
            8,
            7,
            1,
            None,
            8,
            Activation::Identity,
        );
        let x = Tensor::random([1, 8, 14, 14], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(conv.forward(x).dims(), [1, 8, 14, 14]);
    }
}
