use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::gelu;

use crate::error::ModelError;

/// Gating recursion depth of the recursive gated convolution.
const ORDER: usize = 5;

/// Scale on the depthwise branch.
const DW_SCALE: f64 = 1.0 / 3.0;

/// Channel widths visited by the gating recursion, narrowest first:
/// `[dim / 16, dim / 8, dim / 4, dim / 2, dim]`.
fn gn_widths(width: usize) -> [usize; ORDER] {
    let mut dims = [0; ORDER];
    for (i, d) in dims.iter_mut().enumerate() {
        *d = width >> (ORDER - 1 - i);
    }
    dims
}

/// Recursive gated convolution: a 1x1 projection split into a narrow
/// head and a depthwise-convolved tail, recombined by multiplicative
/// gating across doubling widths. Channel and resolution preserving.
#[derive(Module, Debug)]
pub struct GnConv<B: Backend> {
    proj_in: Conv2d<B>,
    dwconv: Conv2d<B>,
    projs: Vec<Conv2d<B>>,
    proj_out: Conv2d<B>,
    width: usize,
}

impl<B: Backend> GnConv<B> {
    pub fn new(device: &B::Device, width: usize) -> Result<Self, ModelError> {
        let divisor = 1 << (ORDER - 1);
        if width % divisor != 0 {
            return Err(ModelError::InvalidGatedWidth {
                channels: width,
                divisor,
            });
        }

        let dims = gn_widths(width);
        let tail: usize = dims.iter().sum();

        let projs = (0..ORDER - 1)
            .map(|i| Conv2dConfig::new([dims[i], dims[i + 1]], [1, 1]).init(device))
            .collect();

        Ok(Self {
            proj_in: Conv2dConfig::new([width, 2 * width], [1, 1]).init(device),
            dwconv: Conv2dConfig::new([tail, tail], [7, 7])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_groups(tail)
                .init(device),
            projs,
            proj_out: Conv2dConfig::new([width, width], [1, 1]).init(device),
            width,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let dims = gn_widths(self.width);
        let tail: usize = dims.iter().sum();

        let y = self.proj_in.forward(x);
        let head = y.clone().narrow(1, 0, dims[0]);
        let dw = self
            .dwconv
            .forward(y.narrow(1, dims[0], tail))
            .mul_scalar(DW_SCALE);

        let mut offset = 0;
        let mut gated = head * dw.clone().narrow(1, 0, dims[0]);
        for i in 1..ORDER {
            offset += dims[i - 1];
            gated = self.projs[i - 1].forward(gated) * dw.clone().narrow(1, offset, dims[i]);
        }

        self.proj_out.forward(gated)
    }
}

/// HorNet block: gated convolution and a pointwise MLP, each behind a
/// LayerNorm and a residual scaled by a learnable per-channel factor
/// (initialized to 1e-6).
#[derive(Module, Debug)]
pub struct HorBlock<B: Backend> {
    norm1: LayerNorm<B>,
    gnconv: GnConv<B>,
    norm2: LayerNorm<B>,
    pw1: Linear<B>,
    pw2: Linear<B>,
    gamma1: Param<Tensor<B, 1>>,
    gamma2: Param<Tensor<B, 1>>,
}

impl<B: Backend> HorBlock<B> {
    pub fn new(device: &B::Device, width: usize) -> Result<Self, ModelError> {
        Ok(Self {
            norm1: LayerNormConfig::new(width).init(device),
            gnconv: GnConv::new(device, width)?,
            norm2: LayerNormConfig::new(width).init(device),
            pw1: LinearConfig::new(width, 4 * width).init(device),
            pw2: LinearConfig::new(4 * width, width).init(device),
            gamma1: Param::from_tensor(Tensor::full([width], 1e-6, device)),
            gamma2: Param::from_tensor(Tensor::full([width], 1e-6, device)),
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();

        // Gated convolution branch, normalized over channels.
        let y = x.clone().permute([0, 2, 3, 1]);
        let y = self.norm1.forward(y).permute([0, 3, 1, 2]);
        let y = self.gnconv.forward(y);
        let x = x + y * self.gamma1.val().reshape([1, channels, 1, 1]);

        // Pointwise MLP branch.
        let y = x.clone().permute([0, 2, 3, 1]);
        let y = self.norm2.forward(y);
        let y = self.pw2.forward(gelu(self.pw1.forward(y)));
        let y = y.permute([0, 3, 1, 2]);
        x + y * self.gamma2.val().reshape([1, channels, 1, 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn widths_double_up_to_full() {
        assert_eq!(gn_widths(1024), [64, 128, 256, 512, 1024]);
    }

    #[test]
    fn preserves_shape() {
        let device = Default::default();
        let block = HorBlock::<TestBackend>::new(&device, 32).unwrap();
        let x = Tensor::random([2, 32, 7, 7], Distribution::Uniform(-1.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [2, 32, 7, 7]);
    }

    #[test]
    fn rejects_indivisible_width() {
        let device = Default::default();
        let err = GnConv::<TestBackend>::new(&device, 24).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidGatedWidth {
                channels: 24,
                divisor: 16
            }
        );
    }
}
