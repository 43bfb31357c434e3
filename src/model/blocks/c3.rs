use burn::prelude::*;

use crate::model::blocks::{Bottleneck, Conv};

/// Concat-residual aggregation block (C3).
///
/// Two parallel 1x1 projections to `floor(c2 * e)` hidden channels; one
/// branch runs `n` chained full-ratio bottlenecks, the other passes
/// through. Both are concatenated and projected back to `c2`, so the
/// output width is `c2` no matter how deep the bottleneck chain is.
#[derive(Module, Debug)]
pub struct C3<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    cv3: Conv<B>,
    bottlenecks: Vec<Bottleneck<B>>,
}

impl<B: Backend> C3<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        n: usize,
        shortcut: bool,
        groups: usize,
        expansion: f64,
    ) -> Self {
        let hidden = (out_channels as f64 * expansion) as usize;

        let bottlenecks = (0..n)
            .map(|_| Bottleneck::new(device, hidden, hidden, shortcut, groups, 1.0))
            .collect();

        Self {
            cv1: Conv::new(device, in_channels, hidden, 1, 1),
            cv2: Conv::new(device, in_channels, hidden, 1, 1),
            cv3: Conv::new(device, 2 * hidden, out_channels, 1, 1),
            bottlenecks,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut deep = self.cv1.forward(x.clone());
        for bottleneck in &self.bottlenecks {
            deep = bottleneck.forward(deep);
        }

        let direct = self.cv2.forward(x);
        self.cv3.forward(Tensor::cat(vec![deep, direct], 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn output_width_is_c2_for_any_depth() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random(
            [2, 24, 8, 8],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );

        for n in [1, 2, 6] {
            let block = C3::new(&device, 24, 40, n, true, 1, 0.5);
            assert_eq!(block.forward(x.clone()).dims(), [2, 40, 8, 8]);
        }
    }

    #[test]
    fn hidden_width_floors() {
        let device = Default::default();
        // floor(10 * 0.5) = 5 hidden channels on each branch.
        let block = C3::<TestBackend>::new(&device, 10, 10, 1, true, 1, 0.5);
        let x = Tensor::random([1, 10, 4, 4], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [1, 10, 4, 4]);
    }
}
