use crate::error::ModelError;

/// Side length of the input image.
pub const IMAGE_SIZE: usize = 224;

/// Channels of the input image.
pub const IN_CHANNELS: usize = 3;

/// Default attention-gate reduction ratio.
pub const CBAM_RATIO: usize = 8;

/// Default attention-gate spatial kernel.
pub const CBAM_KERNEL: usize = 7;

/// What a pipeline stage is, with its block-specific knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Basic convolution unit (stride 1, resolution preserving).
    Stem { kernel: usize },
    /// Patch embedding: `patch`-fold spatial reduction.
    PatchEmbed { patch: usize },
    /// Channel/spatial/auxiliary attention gate.
    Cbam { ratio: usize, kernel: usize },
    /// Windowed-attention transformer stage.
    Swin {
        depth: usize,
        heads: usize,
        window: usize,
    },
    /// 2x2 patch merging downsampler.
    PatchMerge,
    /// Concat-residual aggregation block with `n` bottlenecks.
    Aggregate { n: usize },
    /// Recursive gated convolution block.
    GatedConv,
}

/// One row of the pipeline table: the block kind plus its declared
/// channel and resolution contract.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub kind: BlockKind,
    pub c_in: usize,
    pub c_out: usize,
    /// Spatial reduction factor (1 = resolution preserving).
    pub down: usize,
}

impl StageSpec {
    pub fn name(&self) -> &'static str {
        match self.kind {
            BlockKind::Stem { .. } => "Conv",
            BlockKind::PatchEmbed { .. } => "PatchEmbed",
            BlockKind::Cbam { .. } => "CbamBlock",
            BlockKind::Swin { .. } => "SwinStage",
            BlockKind::PatchMerge => "PatchMerging",
            BlockKind::Aggregate { .. } => "C3",
            BlockKind::GatedConv => "HorBlock",
        }
    }

    fn preserves_channels(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::Cbam { .. } | BlockKind::Swin { .. } | BlockKind::GatedConv
        )
    }
}

fn stage(kind: BlockKind, c_in: usize, c_out: usize, down: usize) -> StageSpec {
    StageSpec {
        kind,
        c_in,
        c_out,
        down,
    }
}

fn cbam(channels: usize) -> StageSpec {
    stage(
        BlockKind::Cbam {
            ratio: CBAM_RATIO,
            kernel: CBAM_KERNEL,
        },
        channels,
        channels,
        1,
    )
}

fn swin(channels: usize, depth: usize, heads: usize) -> StageSpec {
    stage(
        BlockKind::Swin {
            depth,
            heads,
            window: 7,
        },
        channels,
        channels,
        1,
    )
}

/// The full tensor-to-tensor pipeline as data: 21 stages from the RGB
/// input to the final 768-channel 7x7 map fed into the classifier.
pub fn stage_plan() -> Vec<StageSpec> {
    vec![
        stage(BlockKind::Stem { kernel: 3 }, IN_CHANNELS, 64, 1),
        stage(BlockKind::PatchEmbed { patch: 4 }, 64, 96, 4),
        cbam(96),
        swin(96, 2, 3),
        stage(BlockKind::PatchMerge, 96, 192, 2),
        cbam(192),
        swin(192, 2, 6),
        stage(BlockKind::PatchMerge, 192, 384, 2),
        swin(384, 6, 12),
        stage(BlockKind::PatchMerge, 384, 768, 2),
        swin(768, 2, 24),
        stage(BlockKind::Aggregate { n: 1 }, 768, 1024, 1),
        cbam(1024),
        stage(BlockKind::GatedConv, 1024, 1024, 1),
        stage(BlockKind::Aggregate { n: 1 }, 1024, 1536, 1),
        cbam(1536),
        stage(BlockKind::GatedConv, 1536, 1536, 1),
        stage(BlockKind::Aggregate { n: 1 }, 1536, 1024, 1),
        stage(BlockKind::GatedConv, 1024, 1024, 1),
        stage(BlockKind::Aggregate { n: 1 }, 1024, 768, 1),
        stage(BlockKind::GatedConv, 768, 768, 1),
    ]
}

/// Checks the whole table before any module is built: the channel chain,
/// every spatial divisibility requirement, and the per-block parameter
/// constraints. Returns the final spatial resolution.
pub fn validate_plan(plan: &[StageSpec], image_size: usize) -> Result<usize, ModelError> {
    let mut channels = IN_CHANNELS;
    let mut resolution = image_size;

    for (i, spec) in plan.iter().enumerate() {
        if spec.c_in != channels {
            return Err(ModelError::ChannelMismatch {
                stage: i,
                name: spec.name(),
                expected: spec.c_in,
                found: channels,
            });
        }
        if spec.preserves_channels() && spec.c_out != spec.c_in {
            return Err(ModelError::ChannelMismatch {
                stage: i,
                name: spec.name(),
                expected: spec.c_in,
                found: spec.c_out,
            });
        }
        if spec.down == 0 || resolution % spec.down != 0 {
            return Err(ModelError::ResolutionMismatch {
                stage: i,
                name: spec.name(),
                resolution,
                divisor: spec.down,
            });
        }

        match spec.kind {
            BlockKind::PatchEmbed { patch } => {
                if resolution % patch != 0 {
                    return Err(ModelError::ResolutionMismatch {
                        stage: i,
                        name: spec.name(),
                        resolution,
                        divisor: patch,
                    });
                }
            }
            BlockKind::Swin { heads, window, .. } => {
                if resolution % window != 0 {
                    return Err(ModelError::ResolutionMismatch {
                        stage: i,
                        name: spec.name(),
                        resolution,
                        divisor: window,
                    });
                }
                if heads == 0 || spec.c_in % heads != 0 {
                    return Err(ModelError::InvalidHeadSplit {
                        channels: spec.c_in,
                        heads,
                    });
                }
            }
            BlockKind::Cbam { ratio, kernel } => {
                if kernel != 3 && kernel != 7 {
                    return Err(ModelError::InvalidSpatialKernel { got: kernel });
                }
                if spec.c_in / ratio == 0 {
                    return Err(ModelError::InvalidReduction {
                        channels: spec.c_in,
                        ratio,
                    });
                }
            }
            BlockKind::GatedConv => {
                if spec.c_in % 16 != 0 {
                    return Err(ModelError::InvalidGatedWidth {
                        channels: spec.c_in,
                        divisor: 16,
                    });
                }
            }
            _ => {}
        }

        resolution /= spec.down;
        channels = spec.c_out;
    }

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_plan_is_valid() {
        let plan = stage_plan();
        assert_eq!(plan.len(), 21);
        assert_eq!(validate_plan(&plan, IMAGE_SIZE), Ok(7));
    }

    #[test]
    fn broken_channel_chain_is_rejected() {
        let mut plan = stage_plan();
        plan[11].c_in = 512;
        assert!(matches!(
            validate_plan(&plan, IMAGE_SIZE),
            Err(ModelError::ChannelMismatch { stage: 11, .. })
        ));
    }

    #[test]
    fn invalid_gate_kernel_is_rejected() {
        let mut plan = stage_plan();
        plan[2].kind = BlockKind::Cbam { ratio: 8, kernel: 5 };
        assert_eq!(
            validate_plan(&plan, IMAGE_SIZE),
            Err(ModelError::InvalidSpatialKernel { got: 5 })
        );
    }

    #[test]
    fn heads_must_divide_the_width() {
        let mut plan = stage_plan();
        plan[3].kind = BlockKind::Swin {
            depth: 2,
            heads: 5,
            window: 7,
        };
        assert_eq!(
            validate_plan(&plan, IMAGE_SIZE),
            Err(ModelError::InvalidHeadSplit {
                channels: 96,
                heads: 5
            })
        );
    }

    #[test]
    fn window_must_tile_the_resolution() {
        let plan = stage_plan();
        // 220 / 4 = 55 is not divisible by the window size 7.
        assert!(matches!(
            validate_plan(&plan, 220),
            Err(ModelError::ResolutionMismatch { .. })
        ));
    }
}
