use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;

/// Non-overlapping patch projection: a `patch x patch` convolution with
/// matching stride followed by a LayerNorm over channels. Trades a
/// `patch`-fold spatial reduction for embedding width.
#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    proj: Conv2d<B>,
    norm: LayerNorm<B>,
}

impl<B: Backend> PatchEmbed<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        embed_dim: usize,
        patch_size: usize,
    ) -> Self {
        Self {
            proj: Conv2dConfig::new([in_channels, embed_dim], [patch_size, patch_size])
                .with_stride([patch_size, patch_size])
                .init(device),
            norm: LayerNormConfig::new(embed_dim).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.proj.forward(x);
        let x = x.permute([0, 2, 3, 1]);
        let x = self.norm.forward(x);
        x.permute([0, 3, 1, 2])
    }
}

/// Downsampler between attention stages: every 2x2 neighborhood is
/// concatenated along channels (4x width), normalized, and linearly
/// reduced to the target width. Halves the resolution.
#[derive(Module, Debug)]
pub struct PatchMerging<B: Backend> {
    norm: LayerNorm<B>,
    reduction: Linear<B>,
}

impl<B: Backend> PatchMerging<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            norm: LayerNormConfig::new(4 * in_channels).init(device),
            reduction: LinearConfig::new(4 * in_channels, out_channels)
                .with_bias(false)
                .init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();

        let x = x.permute([0, 2, 3, 1]);
        let x: Tensor<B, 6> = x.reshape([batch, height / 2, 2, width / 2, 2, channels]);
        let x = x.permute([0, 1, 3, 2, 4, 5]);
        let x: Tensor<B, 4> = x.reshape([batch, height / 2, width / 2, 4 * channels]);

        let x = self.norm.forward(x);
        let x = self.reduction.forward(x);
        x.permute([0, 3, 1, 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn patch_embed_quarters_resolution() {
        let device = Default::default();
        let embed = PatchEmbed::<TestBackend>::new(&device, 64, 96, 4);
        let x = Tensor::random([1, 64, 56, 56], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(embed.forward(x).dims(), [1, 96, 14, 14]);
    }

    #[test]
    fn patch_merging_halves_resolution_and_doubles_width() {
        let device = Default::default();
        let merge = PatchMerging::<TestBackend>::new(&device, 24, 48);
        let x = Tensor::random([2, 24, 14, 14], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(merge.forward(x).dims(), [2, 48, 7, 7]);
    }
}
