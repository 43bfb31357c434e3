use thiserror::Error;

/// Configuration errors raised while assembling the network.
///
/// Every variant is a construction-time failure: once `SthcsNet::new`
/// returns `Ok`, the forward pass cannot hit a shape mismatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("stage {stage} ({name}) expects {expected} input channels but the previous stage produces {found}")]
    ChannelMismatch {
        stage: usize,
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("stage {stage} ({name}) cannot operate at {resolution}x{resolution}: not divisible by {divisor}")]
    ResolutionMismatch {
        stage: usize,
        name: &'static str,
        resolution: usize,
        divisor: usize,
    },

    #[error("spatial attention kernel size must be 3 or 7, got {got}")]
    InvalidSpatialKernel { got: usize },

    #[error("channel attention with {channels} channels cannot be reduced by ratio {ratio}")]
    InvalidReduction { channels: usize, ratio: usize },

    #[error("attention stage with {channels} channels cannot be split across {heads} heads")]
    InvalidHeadSplit { channels: usize, heads: usize },

    #[error("gated convolution requires the width ({channels}) to be divisible by {divisor}")]
    InvalidGatedWidth { channels: usize, divisor: usize },
}
