pub mod context;
pub mod exchange;
pub mod kernel;
pub mod layout;
pub mod present;

pub use context::GpuContext;
pub use exchange::BufferExchange;
pub use present::WindowPresenter;
