use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::error::ModelError;
use crate::model::blocks::{C3, CbamBlock, Conv, HorBlock};
use crate::model::stages::{
    stage_plan, validate_plan, BlockKind, StageSpec, IMAGE_SIZE, IN_CHANNELS,
};
use crate::model::swin::{PatchEmbed, PatchMerging, SwinStage};

/// Classes predicted by the default head.
pub const NUM_CLASSES: usize = 4;

/// Hidden width of the classifier head.
const HEAD_WIDTH: usize = 512;

/// One pipeline stage, dispatching to the block kind the plan asked for.
/// Every variant maps a `[batch, c_in, h, w]` tensor to
/// `[batch, c_out, h / down, w / down]` per its `StageSpec` row.
#[derive(Module, Debug)]
pub enum Stage<B: Backend> {
    Conv(Conv<B>),
    PatchEmbed(PatchEmbed<B>),
    Cbam(CbamBlock<B>),
    Swin(SwinStage<B>),
    PatchMerge(PatchMerging<B>),
    Aggregate(C3<B>),
    GatedConv(HorBlock<B>),
}

impl<B: Backend> Stage<B> {
    /// `resolution` is the spatial size this stage produces (and, for the
    /// resolution-preserving kinds, also consumes).
    fn build(device: &B::Device, spec: &StageSpec, resolution: usize) -> Result<Self, ModelError> {
        Ok(match spec.kind {
            BlockKind::Stem { kernel } => {
                Stage::Conv(Conv::new(device, spec.c_in, spec.c_out, kernel, 1))
            }
            BlockKind::PatchEmbed { patch } => {
                Stage::PatchEmbed(PatchEmbed::new(device, spec.c_in, spec.c_out, patch))
            }
            BlockKind::Cbam { ratio, kernel } => {
                Stage::Cbam(CbamBlock::new(device, spec.c_in, ratio, kernel)?)
            }
            BlockKind::Swin {
                depth,
                heads,
                window,
            } => Stage::Swin(SwinStage::new(
                device, spec.c_in, depth, heads, window, resolution,
            )),
            BlockKind::PatchMerge => {
                Stage::PatchMerge(PatchMerging::new(device, spec.c_in, spec.c_out))
            }
            BlockKind::Aggregate { n } => {
                Stage::Aggregate(C3::new(device, spec.c_in, spec.c_out, n, true, 1, 0.5))
            }
            BlockKind::GatedConv => Stage::GatedConv(HorBlock::new(device, spec.c_in)?),
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Stage::Conv(block) => block.forward(x),
            Stage::PatchEmbed(block) => block.forward(x),
            Stage::Cbam(block) => block.forward(x),
            Stage::Swin(block) => block.forward(x),
            Stage::PatchMerge(block) => block.forward(x),
            Stage::Aggregate(block) => block.forward(x),
            Stage::GatedConv(block) => block.forward(x),
        }
    }
}

/// Three-layer MLP over the flattened feature map. Raw logits out, no
/// softmax.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub fc3: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(device: &B::Device, in_features: usize, num_classes: usize) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, HEAD_WIDTH).init(device),
            fc2: LinearConfig::new(HEAD_WIDTH, HEAD_WIDTH).init(device),
            fc3: LinearConfig::new(HEAD_WIDTH, num_classes).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.fc3.forward(x)
    }
}

/// The composite network: the validated stage plan materialized as an
/// ordered stage list, plus the classifier head.
#[derive(Module, Debug)]
pub struct SthcsNet<B: Backend> {
    pub stages: Vec<Stage<B>>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> SthcsNet<B> {
    /// Validates the stage table first; a plan that cannot line up its
    /// channels or resolutions fails here, before any tensor is allocated.
    pub fn new(device: &B::Device, num_classes: usize) -> Result<Self, ModelError> {
        let plan = stage_plan();
        let final_resolution = validate_plan(&plan, IMAGE_SIZE)?;

        let mut resolution = IMAGE_SIZE;
        let mut stages = Vec::with_capacity(plan.len());
        for spec in &plan {
            resolution /= spec.down;
            stages.push(Stage::build(device, spec, resolution)?);
        }

        // An empty plan would leave the head reading the raw input.
        let final_channels = plan.last().map(|s| s.c_out).unwrap_or(IN_CHANNELS);
        let in_features = final_channels * final_resolution * final_resolution;

        Ok(Self {
            stages,
            head: ClassifierHead::new(device, in_features, num_classes),
        })
    }

    /// `[batch, 3, 224, 224]` in, `[batch, num_classes]` logits out.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x);
        }

        let [batch, channels, height, width] = x.dims();
        let flat: Tensor<B, 2> = x.reshape([batch, channels * height * width]);
        self.head.forward(flat)
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
    fn builds_the_full_plan() {
        let device = Default::default();
        let net = SthcsNet::<TestBackend>::new(&device, NUM_CLASSES).unwrap();
        assert_eq!(net.stages.len(), 21);
        assert!(net.num_params() > 0);

        // The head consumes the flattened 768 x 7 x 7 map.
        assert_eq!(net.head.fc1.weight.val().dims()[0], 768 * 7 * 7);
    }

    #[test]
    fn forward_is_four_logits_and_deterministic() {
        let device = Default::default();
        let net = SthcsNet::<TestBackend>::new(&device, NUM_CLASSES).unwrap();

        let x = Tensor::random([2, 3, 224, 224], Distribution::Uniform(0.0, 1.0), &device);
        let first = net.forward(x.clone());
        assert_eq!(first.dims(), [2, NUM_CLASSES]);

        let second = net.forward(x);
        let diff = (first - second).abs().max().into_scalar().to_f32();
        assert_eq!(diff, 0.0);
    }
}
