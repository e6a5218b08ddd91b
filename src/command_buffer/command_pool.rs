//! Backing storage for one [`SyncCommandBuffer`](crate::command_buffer::SyncCommandBuffer).
//!
//! A [`RecorderPool`] owns the `VkCommandPool`, the primary command buffer
//! allocated from it, and every secondary command buffer handed out to render
//! scopes since the last reset. Secondaries are not recycled individually:
//! they only execute inside this recording, so one pool-level
//! [`reset`](RecorderPool::reset) releases the whole batch when the command
//! buffer goes back to its `Initial` state.

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;
use crate::core::error::Error;

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct RecorderPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandPool,
    primary: vk::CommandBuffer,
    /// Secondaries handed out since the last reset, in allocation order.
    secondaries: Vec<vk::CommandBuffer>,
}

impl RecorderPool {
    /// Create the pool on the given queue family and allocate the primary
    /// command buffer from it.
    pub fn new(device: Device, family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
        };
        let handle = unsafe { device.create_command_pool(&info, None)? };

        // From here on a failure drops `pool`, which destroys the vk pool.
        let mut pool = RecorderPool {
            device,
            handle,
            primary: vk::CommandBuffer::null(),
            secondaries: Vec::new(),
        };
        pool.primary = pool.allocate(vk::CommandBufferLevel::PRIMARY)?;
        Ok(pool)
    }

    fn allocate(&self, level: vk::CommandBufferLevel) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            p_next: std::ptr::null(),
            command_pool: self.handle,
            level,
            command_buffer_count: 1,
        };
        unsafe { self.device.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or_else(|| Error::Uncategorized("command buffer allocation returned nothing").into())
    }

    /// The primary command buffer. Valid for the lifetime of the pool; reset
    /// together with it.
    pub fn primary(&self) -> vk::CommandBuffer {
        self.primary
    }

    /// Allocate a secondary command buffer for one render scope. Ownership
    /// stays with the pool; the buffer is released by the next
    /// [`reset`](Self::reset).
    pub fn allocate_secondary(&mut self) -> Result<vk::CommandBuffer> {
        let secondary = self.allocate(vk::CommandBufferLevel::SECONDARY)?;
        self.secondaries.push(secondary);
        Ok(secondary)
    }

    /// Recycle the pool: the primary is ready to begin a new recording and
    /// every secondary handed out since the last reset is freed.
    pub fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())?;
            if !self.secondaries.is_empty() {
                self.device.free_command_buffers(self.handle, &self.secondaries);
            }
        }
        self.secondaries.clear();
        Ok(())
    }
}

impl Drop for RecorderPool {
    fn drop(&mut self) {
        // Destroying the pool frees the primary and any remaining secondaries.
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
