pub mod context;
pub mod renderer;
pub mod resources;

pub use context::SurfaceContext;
pub use renderer::{RenderOutcome, TextureRenderer, Viewport};
pub use resources::GpuResources;
