pub mod attention;
pub mod patch;
pub mod stage;

pub use attention::WindowAttention;
pub use patch::{PatchEmbed, PatchMerging};
pub use stage::{SwinBlock, SwinStage};
