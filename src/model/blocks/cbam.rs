use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::module::adaptive_avg_pool2d;

use crate::error::ModelError;
use crate::model::blocks::CpcaGate;

/// Per-channel gate: global average and max pooling, a shared two-layer
/// 1x1-conv bottleneck (reduction by `ratio`, no bias), summed and
/// squashed to a [0, 1] weight per channel.
#[derive(Module, Debug)]
pub struct ChannelGate<B: Backend> {
    fc1: Conv2d<B>,
    fc2: Conv2d<B>,
}

impl<B: Backend> ChannelGate<B> {
    pub fn new(device: &B::Device, channels: usize, ratio: usize) -> Result<Self, ModelError> {
        let reduced = channels / ratio;
        if reduced == 0 {
            return Err(ModelError::InvalidReduction { channels, ratio });
        }

        Ok(Self {
            fc1: Conv2dConfig::new([channels, reduced], [1, 1])
                .with_bias(false)
                .init(device),
            fc2: Conv2dConfig::new([reduced, channels], [1, 1])
                .with_bias(false)
                .init(device),
        })
    }

    /// Gating weights of shape `[batch, channels, 1, 1]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let avg = adaptive_avg_pool2d(x.clone(), [1, 1]);
        let max = x.max_dim(2).max_dim(3);

        let avg = self.fc2.forward(relu(self.fc1.forward(avg)));
        let max = self.fc2.forward(relu(self.fc1.forward(max)));

        sigmoid(avg + max)
    }
}

/// Per-pixel gate: channel mean and channel max stacked into a 2-channel
/// map, convolved down to one channel and squashed to [0, 1].
#[derive(Module, Debug)]
pub struct SpatialGate<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> SpatialGate<B> {
    pub fn new(device: &B::Device, kernel_size: usize) -> Result<Self, ModelError> {
        if kernel_size != 3 && kernel_size != 7 {
            return Err(ModelError::InvalidSpatialKernel { got: kernel_size });
        }
        let padding = kernel_size / 2;

        Ok(Self {
            conv: Conv2dConfig::new([2, 1], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_bias(false)
                .init(device),
        })
    }

    /// Gating weights of shape `[batch, 1, height, width]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let avg = x.clone().mean_dim(1);
        let max = x.max_dim(1);
        sigmoid(self.conv.forward(Tensor::cat(vec![avg, max], 1)))
    }
}

/// CBAM-style attention gate: channel, spatial and auxiliary channel
/// weights multiplied into the feature map one after another. Pure
/// reweighting, so channel count and resolution are untouched and no
/// value can grow in magnitude.
#[derive(Module, Debug)]
pub struct CbamBlock<B: Backend> {
    channel: ChannelGate<B>,
    spatial: SpatialGate<B>,
    cpca: CpcaGate<B>,
}

impl<B: Backend> CbamBlock<B> {
    pub fn new(
        device: &B::Device,
        channels: usize,
        ratio: usize,
        kernel_size: usize,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            channel: ChannelGate::new(device, channels, ratio)?,
            spatial: SpatialGate::new(device, kernel_size)?,
            cpca: CpcaGate::new(device, channels, ratio)?,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = x.clone() * self.channel.forward(x);
        let x = x.clone() * self.spatial.forward(x);
        x.clone() * self.cpca.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::cast::ToElement;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn rejects_invalid_spatial_kernel() {
        let device = Default::default();
        let err = CbamBlock::<TestBackend>::new(&device, 32, 8, 5).unwrap_err();
        assert_eq!(err, ModelError::InvalidSpatialKernel { got: 5 });
    }

    #[test]
    fn rejects_over_reduction() {
        let device = Default::default();
        let err = CbamBlock::<TestBackend>::new(&device, 4, 8, 7).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidReduction {
                channels: 4,
                ratio: 8
            }
        );
    }

    #[test]
    fn preserves_shape() {
        let device = Default::default();
        let block = CbamBlock::<TestBackend>::new(&device, 32, 8, 7).unwrap();
        let x = Tensor::random([2, 32, 14, 14], Distribution::Uniform(-1.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [2, 32, 14, 14]);
    }

    #[test]
    fn gating_never_amplifies() {
        let device = Default::default();
        let block = CbamBlock::<TestBackend>::new(&device, 16, 8, 3).unwrap();
        let x = Tensor::random([2, 16, 8, 8], Distribution::Uniform(-2.0, 2.0), &device);
        let y = block.forward(x.clone());

        // Every gate is a sigmoid in [0, 1], so |y| <= |x| elementwise.
        let violations = y
            .abs()
            .greater(x.abs().add_scalar(1e-6))
            .float()
            .sum()
            .into_scalar()
            .to_f32();
        assert_eq!(violations, 0.0);
    }
}
