//! Allocator traits to implement for using your own custom allocator with deimos

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;

/// To supply custom allocators to deimos, this trait must be implemented.
/// Note that all allocators must be `Clone`, `Send` and `Sync`. To do this, wrap internal state in
/// `Arc<Mutex<T>>` or similar where applicable.
pub trait Allocator: Clone + Send + Sync {
    /// Allocation type for this allocator. Must implement [`Allocation`].
    type Allocation: Allocation;

    /// Allocates raw memory of a specific memory type. The given name is used for internal tracking and
    /// debug logging. To get proper [`VkMemoryRequirements`](vk::MemoryRequirements), call
    /// [`vkGetBufferMemoryRequirements`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkGetBufferMemoryRequirements.html) or
    /// [`vkGetImageMemoryRequirements`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkGetImageMemoryRequirements.html) with your buffer or image.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;

    /// Free some memory allocated from this allocator. It's allowed for this function to do nothing, and instead
    /// use [`Drop`] to do this. Note that in this case, the allocation is still dropped, because it is moved into the function.
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

/// Represents an allocation. This trait exposes methods for accessing the underlying device memory and
/// obtaining a mapped pointer.
pub trait Allocation: Default {
    /// Get unsafe access to the underlying [`VkDeviceMemory`](vk::DeviceMemory).
    /// Should always be used together with [`Allocation::offset()`].
    /// # Safety
    /// The caller must not free this memory or access a range outside of
    /// `allocation.offset()..allocation.offset() + size`.
    unsafe fn memory(&self) -> vk::DeviceMemory;

    /// Get the offset in this [`VkDeviceMemory`](vk::DeviceMemory) this allocation refers to.
    /// This is exposed because the allocator implementation may choose to subdivide large memory
    /// blocks into smaller allocations.
    fn offset(&self) -> vk::DeviceSize;

    /// Obtain a mapped pointer to this allocation. This pointer already points into the exact memory
    /// region of the suballocation, so no offset must be applied.
    ///
    /// Returns `None` if this memory was not mappable (not [`HOST_VISIBLE`](vk::MemoryPropertyFlags::HOST_VISIBLE)).
    /// Memory allocated with [`MemoryType::CpuToGpu`] is always mappable.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}
