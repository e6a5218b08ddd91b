//! The two synchronization primitives the submit path is built on.
//!
//! A [`Fence`] is how the `Pending -> Initial` edge of a command buffer's
//! lifecycle is observed: the frame loop waits on the fence the submission
//! signalled, puts it back in the unsignaled state and only then resets the
//! command buffer for reuse. A [`Semaphore`] orders GPU work against the
//! presentation engine; the wsi layer keeps one acquire/present pair per
//! backbuffer, created as a ring with [`Semaphore::ring`].

use std::slice;

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;

/// A binary fence for CPU-GPU synchronization. Submitting a
/// [`SyncCommandBuffer`](crate::command_buffer::SyncCommandBuffer) signals one;
/// observing it is the caller's license to reset that command buffer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Fence,
}

impl Fence {
    /// Create a fence. Frame loops start their per-frame fences out signaled
    /// so the first acquire of every frame slot does not block.
    pub fn new(device: Device, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags,
        };
        Ok(Fence {
            handle: unsafe { device.create_fence(&info, None)? },
            device,
        })
    }

    /// Block until the fence signals, with no timeout.
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(slice::from_ref(&self.handle), true, u64::MAX)?;
        }
        Ok(())
    }

    /// Put the fence back in the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device.reset_fences(slice::from_ref(&self.handle))?;
        }
        Ok(())
    }

    /// Wait for the fence and rearm it. This is the frame loop's step for
    /// observing that a frame slot's submission finished before the slot's
    /// command buffer is recycled.
    pub fn wait_and_reset(&self) -> Result<()> {
        self.wait()?;
        self.reset()
    }

    /// Get unsafe access to the underlying `VkFence` object.
    /// # Safety
    /// Waiting or resetting through this handle bypasses the lifecycle
    /// bookkeeping of whoever owns the fence.
    pub unsafe fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}

/// A binary semaphore for GPU-GPU synchronization, used to chain backbuffer
/// acquisition, submission and presentation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Device) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: Default::default(),
        };
        Ok(Semaphore {
            handle: unsafe { device.create_semaphore(&info, None)? },
            device,
        })
    }

    /// Create one semaphore per slot of a ring. The submit context sizes its
    /// acquire and present rings to the backbuffer count, since a semaphore
    /// may not be rewaited until the presentation engine is done with it.
    pub fn ring(device: &Device, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::new(device.clone())).collect()
    }

    /// Get unsafe access to the underlying `VkSemaphore` object.
    /// # Safety
    /// Waiting or signalling through this handle bypasses the acquire/present
    /// chaining of whoever owns the semaphore.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
