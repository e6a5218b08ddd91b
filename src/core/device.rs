//! The [`Device`] wrapper used by every other part of the library.
//!
//! Instance creation, physical device selection and logical device creation are
//! the responsibility of the application (or a loader crate); deimos only wraps
//! the resulting [`ash::Device`] so it can be cloned around cheaply.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
}

/// Wrapper around a `VkDevice`. The device provides access to almost the entire
/// Vulkan API. Internal state is wrapped in an `Arc`, so this is safe and cheap
/// to clone.
///
/// Deimos does not own the device: it must stay alive for as long as any object
/// created from it, and destroying it remains the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Wrap an externally created [`ash::Device`].
    pub fn new(handle: ash::Device) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                handle,
            }),
        }
    }

    /// Wait for the device to be completely idle. This is an expensive full
    /// synchronization point; after it returns, [`QueueTracker::on_wait`]
    /// (and for live recordings [`CmdBufferTracker::on_sync`]) should be
    /// notified so tracked stage and access masks are dropped.
    ///
    /// [`QueueTracker::on_wait`]: crate::sync::queue_tracker::QueueTracker::on_wait
    /// [`CmdBufferTracker::on_sync`]: crate::sync::tracker::CmdBufferTracker::on_sync
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.inner.handle.device_wait_idle()? };
        Ok(())
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}
