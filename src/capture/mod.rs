pub mod convert;
pub mod frame;
pub mod synthetic;

pub use convert::FrameConverter;
pub use frame::{ColorRange, FrameLayout, PixelBuffer, Plane, PlanarImage};
pub use synthetic::{ChromaLayout, SyntheticCamera, TestPattern, YuvFrame};
