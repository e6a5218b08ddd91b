//! Window system integration: the swapchain wrapper and the
//! [`SimpleSubmitContext`] frame pacing helper. Surface creation and support
//! queries are the application's responsibility.

pub mod frame;
pub mod swapchain;

pub use frame::SimpleSubmitContext;
pub use swapchain::{SurfaceSupport, Swapchain, SwapchainState};
