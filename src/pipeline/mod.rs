pub mod controller;
mod edges;
pub mod filter;
pub mod stage;

pub use controller::{version, FrameProducer, Pipeline};
pub use filter::{FilterParameters, FrameFilter};
pub use stage::{FrameStage, Publish, StageSnapshot, StagedFrame};
