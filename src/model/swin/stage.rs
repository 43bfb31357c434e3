use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::gelu;
use burn::tensor::TensorData;

use super::attention::{roll2d, window_partition, window_reverse, WindowAttention};

/// MLP expansion ratio inside each block.
const MLP_RATIO: usize = 4;

/// Attention logit added across shifted-window region boundaries.
const MASK_FILL: f32 = -100.0;

/// Region mask for shifted windows: tokens that wrapped around during the
/// cyclic shift must not attend to tokens from the opposite edge. Returns
/// `[tiles, window^2, window^2]` with 0 within a region and `MASK_FILL`
/// across regions.
fn shift_mask<B: Backend>(
    resolution: usize,
    window: usize,
    shift: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let segments = [
        (0, resolution - window),
        (resolution - window, resolution - shift),
        (resolution - shift, resolution),
    ];

    let mut regions = vec![0f32; resolution * resolution];
    let mut id = 0f32;
    for (hs, he) in segments {
        for (ws, we) in segments {
            for y in hs..he {
                for x in ws..we {
                    regions[y * resolution + x] = id;
                }
            }
            id += 1.0;
        }
    }

    let per_side = resolution / window;
    let tokens = window * window;
    let mut mask = vec![0f32; per_side * per_side * tokens * tokens];

    for wy in 0..per_side {
        for wx in 0..per_side {
            let tile = wy * per_side + wx;
            let mut ids = Vec::with_capacity(tokens);
            for y in 0..window {
                for x in 0..window {
                    ids.push(regions[(wy * window + y) * resolution + wx * window + x]);
                }
            }
            for i in 0..tokens {
                for j in 0..tokens {
                    if ids[i] != ids[j] {
                        mask[tile * tokens * tokens + i * tokens + j] = MASK_FILL;
                    }
                }
            }
        }
    }

    Tensor::from_data(
        TensorData::new(mask, [per_side * per_side, tokens, tokens]),
        device,
    )
}

/// One transformer block: windowed attention (optionally over cyclically
/// shifted windows) and an MLP, each behind a pre-norm residual.
#[derive(Module, Debug)]
pub struct SwinBlock<B: Backend> {
    norm1: LayerNorm<B>,
    attn: WindowAttention<B>,
    norm2: LayerNorm<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    attn_mask: Option<Tensor<B, 3>>,
    window: usize,
    shift: usize,
    resolution: usize,
}

impl<B: Backend> SwinBlock<B> {
    pub fn new(
        device: &B::Device,
        dim: usize,
        num_heads: usize,
        window: usize,
        resolution: usize,
        shift: usize,
    ) -> Self {
        let attn_mask = if shift > 0 {
            Some(shift_mask(resolution, window, shift, device))
        } else {
            None
        };

        Self {
            norm1: LayerNormConfig::new(dim).init(device),
            attn: WindowAttention::new(device, dim, num_heads, window),
            norm2: LayerNormConfig::new(dim).init(device),
            fc1: LinearConfig::new(dim, MLP_RATIO * dim).init(device),
            fc2: LinearConfig::new(MLP_RATIO * dim, dim).init(device),
            attn_mask,
            window,
            shift,
            resolution,
        }
    }

    /// `x` is `[batch, resolution^2, dim]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, tokens, dim] = x.dims();
        let res = self.resolution;
        let shift = self.shift as isize;

        let shortcut = x.clone();
        let x = self.norm1.forward(x);
        let x: Tensor<B, 4> = x.reshape([batch, res, res, dim]);

        let x = if self.shift > 0 {
            roll2d(x, -shift, -shift)
        } else {
            x
        };

        let windows = window_partition(x, self.window);
        let windows = self.attn.forward(windows, self.attn_mask.as_ref());
        let x = window_reverse(windows, self.window, res, res);

        let x = if self.shift > 0 {
            roll2d(x, shift, shift)
        } else {
            x
        };

        let x: Tensor<B, 3> = x.reshape([batch, tokens, dim]);
        let x = shortcut + x;

        let y = self.norm2.forward(x.clone());
        let y = self.fc2.forward(gelu(self.fc1.forward(y)));
        x + y
    }
}

/// A channel-preserving stack of swin blocks running at one fixed
/// resolution, with the cyclic shift alternating off/on per block.
/// Shifting is pointless once the whole map fits in a single window, so
/// it is disabled there.
#[derive(Module, Debug)]
pub struct SwinStage<B: Backend> {
    blocks: Vec<SwinBlock<B>>,
}

impl<B: Backend> SwinStage<B> {
    pub fn new(
        device: &B::Device,
        dim: usize,
        depth: usize,
        num_heads: usize,
        window: usize,
        resolution: usize,
    ) -> Self {
        let blocks = (0..depth)
            .map(|i| {
                let shift = if resolution <= window || i % 2 == 0 {
                    0
                } else {
                    window / 2
                };
                SwinBlock::new(device, dim, num_heads, window, resolution, shift)
            })
            .collect();

        Self { blocks }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();

        let mut x: Tensor<B, 3> = x
            .permute([0, 2, 3, 1])
            .reshape([batch, height * width, channels]);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x: Tensor<B, 4> = x.reshape([batch, height, width, channels]);
        x.permute([0, 3, 1, 2])
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
    fn mask_covers_all_tiles_with_open_diagonal() {
        let device = Default::default();
        let mask = shift_mask::<TestBackend>(14, 7, 3, &device);
        assert_eq!(mask.dims(), [4, 49, 49]);

        // A token always attends to itself.
        let data = mask.into_data();
        let values = data.as_slice::<f32>().unwrap();
        for tile in 0..4 {
            for i in 0..49 {
                assert_eq!(values[tile * 49 * 49 + i * 49 + i], 0.0);
            }
        }
    }

    #[test]
    fn unshifted_tile_is_fully_open() {
        let device = Default::default();
        let mask = shift_mask::<TestBackend>(14, 7, 3, &device);
        // Tile 0 is untouched by the wrap-around.
        let open = mask
            .narrow(0, 0, 1)
            .abs()
            .max()
            .into_scalar()
            .to_f32();
        assert_eq!(open, 0.0);
    }

    #[test]
    fn stage_preserves_shape_with_shifted_blocks() {
        let device = Default::default();
        let stage = SwinStage::<TestBackend>::new(&device, 16, 2, 2, 7, 14);
        let x = Tensor::random([1, 16, 14, 14], Distribution::Uniform(-1.0, 1.0), &device);
        assert_eq!(stage.forward(x).dims(), [1, 16, 14, 14]);
    }

    #[test]
    fn single_window_stage_never_shifts() {
        let device = Default::default();
        let stage = SwinStage::<TestBackend>::new(&device, 16, 2, 2, 7, 7);
        assert!(stage.blocks.iter().all(|b| b.shift == 0));

        let x = Tensor::random([2, 16, 7, 7], Distribution::Uniform(-1.0, 1.0), &device);
        assert_eq!(stage.forward(x).dims(), [2, 16, 7, 7]);
    }
}
