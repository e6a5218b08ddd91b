//! Wrapper around the single universal queue used for submission.

use std::slice;

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;

/// Wrapper around a `VkQueue` together with its family index. Deimos uses a
/// single queue for all purposes; async compute and cross-queue ownership
/// transfer are out of scope.
#[derive(Debug, Clone)]
pub struct Queue {
    device: Device,
    handle: vk::Queue,
    family_index: u32,
}

impl Queue {
    /// Wrap an externally obtained queue handle.
    pub fn new(device: Device, handle: vk::Queue, family_index: u32) -> Self {
        Self {
            device,
            handle,
            family_index,
        }
    }

    /// Get unsafe access to the underlying `VkQueue` handle.
    /// # Safety
    /// Submissions through this handle bypass the queue tracker, so resource
    /// state validation will not see them.
    pub unsafe fn handle(&self) -> vk::Queue {
        self.handle
    }

    /// Get the queue family index this queue belongs to.
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Submit a batch to this queue, signalling `fence` on completion.
    /// Direct translation of [`vkQueueSubmit`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkQueueSubmit.html).
    pub fn submit(&self, submit: vk::SubmitInfo, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device.queue_submit(self.handle, slice::from_ref(&submit), fence)?;
        }
        Ok(())
    }
}
