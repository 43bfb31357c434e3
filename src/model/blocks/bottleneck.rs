use burn::prelude::*;

use crate::model::blocks::Conv;

/// Residual bottleneck: 1x1 reduction to `floor(c2 * e)` hidden channels,
/// then a 3x3 (optionally grouped) convolution back to `c2`.
///
/// The additive skip only applies when it is requested AND the channel
/// counts match; a width-changing bottleneck silently runs without it.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    cv1: Conv<B>,
    cv2: Conv<B>,
    add: bool,
}

impl<B: Backend> Bottleneck<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        shortcut: bool,
        groups: usize,
        expansion: f64,
    ) -> Self {
        let hidden = (out_channels as f64 * expansion) as usize;

        Self {
            cv1: Conv::new(device, in_channels, hidden, 1, 1),
            cv2: Conv::with_options(
                device,
                hidden,
                out_channels,
                3,
                1,
                None,
                groups,
                Default::default(),
            ),
            add: shortcut && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = self.cv2.forward(self.cv1.forward(x.clone()));

        if self.add {
            x + y
        } else {
            y
        }
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
    fn skip_is_a_plain_add_when_channels_match() {
        let device = Default::default();
        let block = Bottleneck::<TestBackend>::new(&device, 16, 16, true, 1, 0.5);
        assert!(block.add);

        // Same parameters, skip disabled: the residual must be exactly x.
        let no_skip = Bottleneck {
            add: false,
            ..block.clone()
        };

        let x = Tensor::random([2, 16, 8, 8], Distribution::Uniform(-1.0, 1.0), &device);
        let with = block.forward(x.clone());
        let without = no_skip.forward(x.clone());

        let diff = (with - without - x).abs().max().into_scalar().to_f32();
        assert!(diff < 1e-5, "skip path deviates from identity add: {diff}");
    }

    #[test]
    fn skip_silently_disabled_on_channel_change() {
        let device = Default::default();
        let block = Bottleneck::<TestBackend>::new(&device, 16, 32, true, 1, 0.5);
        assert!(!block.add);

        let x = Tensor::random([1, 16, 8, 8], Distribution::Uniform(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [1, 32, 8, 8]);
    }
}
