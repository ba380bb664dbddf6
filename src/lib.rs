//! Animated sphere scene ray traced per pixel on the GPU.
//!
//! A scene of spheres is regenerated every frame from the elapsed time,
//! uploaded to a wgpu storage buffer, intersected and shaded by a compute
//! kernel (one invocation per pixel) and read back as an 8-bit RGB image.
//! The window glue in [`app`] is kept apart from the pipeline so the
//! pipeline can also run headless.

pub mod app;
pub mod config;
pub mod error;
pub mod frame;
pub mod orchestrator;
pub mod render;
pub mod scene;

pub use app::{run_headless, run_windowed, FramePacer, HeadlessPresenter, HeadlessSummary, WindowInitError};
pub use config::RenderConfig;
pub use error::{ConfigError, PipelineError};
pub use frame::FrameImage;
pub use orchestrator::{
    FrameClock, FrameRenderer, Orchestrator, OrchestratorContext, PresentOutcome, Presenter, RunState,
};
pub use render::{BufferExchange, GpuContext, WindowPresenter};
pub use scene::{generate, Camera, DirectionalLight, Sphere};
