pub mod blocks;
pub mod net;
pub mod stages;
pub mod swin;

pub use net::{ClassifierHead, SthcsNet, Stage, NUM_CLASSES};
pub use stages::{stage_plan, validate_plan, BlockKind, StageSpec, IMAGE_SIZE, IN_CHANNELS};
