use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::module::adaptive_avg_pool2d;

use crate::error::ModelError;

/// Auxiliary channel gate, parameterized independently of the CBAM
/// channel gate: its own biased 1x1-conv bottleneck over pooled
/// statistics. Both pooling branches are summed before the sigmoid so
/// the resulting weight stays in [0, 1].
#[derive(Module, Debug)]
pub struct CpcaGate<B: Backend> {
    fc1: Conv2d<B>,
    fc2: Conv2d<B>,
}

impl<B: Backend> CpcaGate<B> {
    pub fn new(device: &B::Device, channels: usize, ratio: usize) -> Result<Self, ModelError> {
        let internal = channels / ratio;
        if internal == 0 {
            return Err(ModelError::InvalidReduction { channels, ratio });
        }

        Ok(Self {
            fc1: Conv2dConfig::new([channels, internal], [1, 1]).init(device),
            fc2: Conv2dConfig::new([internal, channels], [1, 1]).init(device),
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
