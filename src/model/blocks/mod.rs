pub mod bottleneck;
pub mod c3;
pub mod cbam;
pub mod conv;
pub mod cpca;
pub mod hornet;

pub use bottleneck::Bottleneck;
pub use c3::C3;
pub use cbam::{CbamBlock, ChannelGate, SpatialGate};
pub use conv::{Activation, Conv};
pub use cpca::CpcaGate;
pub use hornet::{GnConv, HorBlock};
