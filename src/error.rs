use thiserror::Error;

/// Failures raised while setting up or driving the compute pipeline.
///
/// Every variant is fatal for the frame loop; the renderer never retries a
/// frame or presents a partial one.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("kernel failed to compile:\n{diagnostics}")]
    ShaderCompile { diagnostics: String },
    #[error("layout mismatch for {item}: host size {host} bytes, device size {device} bytes")]
    LayoutMismatch {
        item: &'static str,
        host: u64,
        device: u64,
    },
    #[error("kernel binding {binding} is not an array of {expected}")]
    BindingMismatch {
        binding: u32,
        expected: &'static str,
    },
    #[error("kernel workgroup size {device:?} does not match host dispatch size {host:?}")]
    WorkgroupMismatch { host: [u32; 3], device: [u32; 3] },
    #[error("{buffer} buffer needs {size} bytes but the device allows at most {limit}")]
    BufferTooLarge {
        buffer: &'static str,
        size: u64,
        limit: u64,
    },
    #[error("failed to allocate kernel buffers: {0}")]
    Allocation(String),
    #[error("scene holds {actual} spheres but the sphere buffer was sized for {expected}")]
    SceneSize { expected: usize, actual: usize },
    #[error("kernel dispatch failed: {0}")]
    Dispatch(String),
    #[error("pixel buffer read-back failed: {0}")]
    Readback(String),
    #[error("pixel {index} was not written by the kernel")]
    IncompleteFrame { index: usize },
    #[error("failed to present frame: {0}")]
    Present(String),
}

/// Rejected values in a [`crate::RenderConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size {width}x{height} has zero area")]
    ZeroArea { width: u32, height: u32 },
    #[error("pixel size must be at least 1")]
    ZeroPixelSize,
    #[error("pixel size {pixel_size} leaves no pixels in a {width}x{height} window")]
    PixelSizeTooLarge {
        pixel_size: u32,
        width: u32,
        height: u32,
    },
}
