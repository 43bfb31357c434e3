use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::{Distribution, TensorData};

/// Splits a `[batch, height, width, channels]` map into non-overlapping
/// `window x window` tiles, flattened to `[batch * tiles, window^2, channels]`.
pub(crate) fn window_partition<B: Backend>(x: Tensor<B, 4>, window: usize) -> Tensor<B, 3> {
    let [batch, height, width, channels] = x.dims();
    let x: Tensor<B, 6> = x.reshape([
        batch,
        height / window,
        window,
        width / window,
        window,
        channels,
    ]);
    let x = x.permute([0, 1, 3, 2, 4, 5]);
    x.reshape([
        batch * (height / window) * (width / window),
        window * window,
        channels,
    ])
}

/// Inverse of [`window_partition`].
pub(crate) fn window_reverse<B: Backend>(
    x: Tensor<B, 3>,
    window: usize,
    height: usize,
    width: usize,
) -> Tensor<B, 4> {
    let [tiles, _, channels] = x.dims();
    let batch = tiles / ((height / window) * (width / window));
    let x: Tensor<B, 6> = x.reshape([
        batch,
        height / window,
        width / window,
        window,
        window,
        channels,
    ]);
    let x = x.permute([0, 1, 3, 2, 4, 5]);
    x.reshape([batch, height, width, channels])
}

fn roll_dim<B: Backend>(x: Tensor<B, 4>, shift: isize, dim: usize) -> Tensor<B, 4> {
    let size = x.dims()[dim];
    let shift = shift.rem_euclid(size as isize) as usize;
    if shift == 0 {
        return x;
    }

    let head = x.clone().narrow(dim, 0, size - shift);
    let tail = x.narrow(dim, size - shift, shift);
    Tensor::cat(vec![tail, head], dim)
}

/// Cyclic shift over the two spatial dims of a `[batch, h, w, c]` map.
pub(crate) fn roll2d<B: Backend>(x: Tensor<B, 4>, shift_h: isize, shift_w: isize) -> Tensor<B, 4> {
    roll_dim(roll_dim(x, shift_h, 1), shift_w, 2)
}

/// Pairwise relative-position bias lookup indices for one window,
/// flattened row-major: entry `(i, j)` addresses the bias for token `i`
/// attending to token `j`.
fn relative_position_index(window: usize) -> Vec<i64> {
    let tokens = window * window;
    let span = 2 * window as i64 - 1;
    let mut index = Vec::with_capacity(tokens * tokens);

    for i in 0..tokens {
        let (yi, xi) = ((i / window) as i64, (i % window) as i64);
        for j in 0..tokens {
            let (yj, xj) = ((j / window) as i64, (j % window) as i64);
            let dy = yi - yj + window as i64 - 1;
            let dx = xi - xj + window as i64 - 1;
            index.push(dy * span + dx);
        }
    }

    index
}

/// Multi-head self-attention restricted to one window of tokens, with a
/// learned relative-position bias shared across windows.
#[derive(Module, Debug)]
pub struct WindowAttention<B: Backend> {
    qkv: Linear<B>,
    proj: Linear<B>,
    bias_table: Param<Tensor<B, 2>>,
    bias_index: Tensor<B, 1, Int>,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl<B: Backend> WindowAttention<B> {
    pub fn new(device: &B::Device, dim: usize, num_heads: usize, window: usize) -> Self {
        debug_assert_eq!(dim % num_heads, 0);
        let head_dim = dim / num_heads;
        let span = 2 * window - 1;
        let tokens = window * window;

        Self {
            qkv: LinearConfig::new(dim, 3 * dim).init(device),
            proj: LinearConfig::new(dim, dim).init(device),
            bias_table: Param::from_tensor(Tensor::random(
                [span * span, num_heads],
                Distribution::Normal(0.0, 0.02),
                device,
            )),
            bias_index: Tensor::from_data(
                TensorData::new(relative_position_index(window), [tokens * tokens]),
                device,
            ),
            num_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        }
    }

    /// `windows` is `[batch * tiles, window^2, dim]`; `mask`, when present,
    /// is `[tiles, window^2, window^2]` with 0 / -100 entries blocking
    /// attention across shifted-window boundaries.
    pub fn forward(&self, windows: Tensor<B, 3>, mask: Option<&Tensor<B, 3>>) -> Tensor<B, 3> {
        let [groups, tokens, dim] = windows.dims();

        let qkv = self.qkv.forward(windows);
        let qkv: Tensor<B, 5> = qkv.reshape([groups, tokens, 3, self.num_heads, self.head_dim]);
        let qkv = qkv.permute([2, 0, 3, 1, 4]);

        let q: Tensor<B, 4> = qkv
            .clone()
            .narrow(0, 0, 1)
            .reshape([groups, self.num_heads, tokens, self.head_dim]);
        let k: Tensor<B, 4> = qkv
            .clone()
            .narrow(0, 1, 1)
            .reshape([groups, self.num_heads, tokens, self.head_dim]);
        let v: Tensor<B, 4> = qkv
            .narrow(0, 2, 1)
            .reshape([groups, self.num_heads, tokens, self.head_dim]);

        let mut attn = q.mul_scalar(self.scale).matmul(k.swap_dims(2, 3));

        let bias = self
            .bias_table
            .val()
            .select(0, self.bias_index.clone())
            .reshape([tokens, tokens, self.num_heads])
            .permute([2, 0, 1]);
        attn = attn + bias.unsqueeze::<4>();

        if let Some(mask) = mask {
            let tiles = mask.dims()[0];
            let attn5: Tensor<B, 5> =
                attn.reshape([groups / tiles, tiles, self.num_heads, tokens, tokens]);
            let mask5: Tensor<B, 5> = mask.clone().reshape([1, tiles, 1, tokens, tokens]);
            attn = (attn5 + mask5).reshape([groups, self.num_heads, tokens, tokens]);
        }

        let attn = softmax(attn, 3);
        let out = attn.matmul(v);
        let out: Tensor<B, 3> = out.swap_dims(1, 2).reshape([groups, tokens, dim]);
        self.proj.forward(out)
    }
}
