//! Provides utilities to manage [`VkBuffer`](vk::Buffer) objects.
//!
//! Like images, every buffer gets a process-unique [`ResourceId`] at construction, carried by its
//! [`BufferHandle`]; the state trackers key on that id. [`BufferView`]s describe an offset/size range
//! inside a buffer and are plain copyable values.

use anyhow::Result;
use ash::vk;

use crate::allocator::{Allocation, Allocator, DefaultAllocator, MemoryType};
use crate::core::device::Device;
use crate::core::error::Error;
use crate::sync::state::ResourceId;

/// Identity of a buffer as seen by the state trackers. This is a plain value and can be copied
/// around freely.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    id: ResourceId,
    raw: vk::Buffer,
}

impl BufferHandle {
    /// Build a buffer handle around a raw `VkBuffer` not owned by deimos, assigning it a fresh
    /// resource id. The caller is responsible for only building one handle per underlying buffer.
    pub fn from_raw(raw: vk::Buffer) -> Self {
        Self {
            id: ResourceId::new(),
            raw,
        }
    }

    /// The tracker identity of this buffer.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get unsafe access to the underlying `VkBuffer` handle.
    /// # Safety
    /// Any vulkan calls that mutate this buffer's state may put the system into an undefined state.
    pub unsafe fn raw(&self) -> vk::Buffer {
        self.raw
    }
}

/// A view into a range of a buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferView {
    buffer: BufferHandle,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl BufferView {
    /// The buffer this view points into.
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Get unsafe access to the underlying `VkBuffer` handle.
    /// # Safety
    /// Any vulkan calls that mutate this buffer's state may put the system into an undefined state.
    pub unsafe fn handle(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    /// Offset of this view into the buffer, in bytes.
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Size of the viewed range, in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// Abstraction over a [`VkBuffer`](vk::Buffer), coupled with its memory allocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: BufferHandle,
    #[derivative(Debug = "ignore")]
    memory: A::Allocation,
    size: vk::DeviceSize,
}

unsafe impl<A: Allocator> Send for Buffer<A> {}

unsafe impl<A: Allocator> Sync for Buffer<A> {}

impl<A: Allocator> Buffer<A> {
    /// Create a new buffer and allocate memory for it. Use [`MemoryType::CpuToGpu`] for staging
    /// uploads and [`MemoryType::GpuToCpu`] for readback; those allocations are mappable through
    /// [`Self::mapped_slice`].
    pub fn new(
        device: Device,
        alloc: &mut A,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_type: MemoryType,
    ) -> Result<Self> {
        let handle = unsafe {
            device.create_buffer(
                &vk::BufferCreateInfo {
                    s_type: vk::StructureType::BUFFER_CREATE_INFO,
                    p_next: std::ptr::null(),
                    flags: Default::default(),
                    size,
                    usage,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    queue_family_index_count: 0,
                    p_queue_family_indices: std::ptr::null(),
                },
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {handle:?}");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let memory = alloc.allocate("buffer_", &requirements, memory_type)?;
        unsafe {
            device.bind_buffer_memory(handle, memory.memory(), memory.offset())?;
        }

        Ok(Self {
            handle: BufferHandle::from_raw(handle),
            device,
            memory,
            size,
        })
    }

    /// Create a view over a range of this buffer.
    /// # Errors
    /// Fails with [`Error::BufferViewOutOfRange`] if the range does not fit inside the buffer.
    pub fn view(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<BufferView> {
        if offset + size > self.size {
            return Err(Error::BufferViewOutOfRange.into());
        }
        Ok(BufferView {
            buffer: self.handle,
            offset,
            size,
        })
    }

    /// Create a view over the whole buffer.
    pub fn view_full(&self) -> BufferView {
        BufferView {
            buffer: self.handle,
            offset: 0,
            size: self.size,
        }
    }

    /// Obtain the mapped memory of this buffer as a byte slice.
    /// # Errors
    /// Fails with [`Error::UnmappableBuffer`] if the buffer memory is not host visible.
    pub fn mapped_slice(&mut self) -> Result<&mut [u8]> {
        let pointer = self.memory.mapped_ptr().ok_or(Error::UnmappableBuffer)?;
        // SAFETY: the allocation is mapped, lives as long as self and is self.size bytes large.
        Ok(unsafe { std::slice::from_raw_parts_mut(pointer.cast::<u8>().as_ptr(), self.size as usize) })
    }

    /// The tracker identity of this buffer. This is a cheap copyable value.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Get the size of the buffer, in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl<A: Allocator> Drop for Buffer<A> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:?}", unsafe { self.handle.raw() });
        unsafe {
            self.device.destroy_buffer(self.handle.raw(), None);
        }
    }
}
