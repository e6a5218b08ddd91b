//! Core plumbing: the error type, the device and queue wrappers, and the
//! [`Context`](context::Context) environment that replaces global state.

pub mod context;
pub mod device;
pub mod error;
pub mod queue;

pub use context::{Context, ContextCreateInfo};
pub use device::Device;
pub use error::Error;
pub use queue::Queue;
