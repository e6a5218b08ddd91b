//! The dynamic, per-frame descriptor pool.
//!
//! The pool is a ring of `N` raw descriptor pools, one per frame in flight.
//! Advancing the ring with [`DynamicDescriptorPool::flip`] resets the pool
//! that is entered, destroying every set that was allocated from it `N` frames
//! ago. Each allocated [`DescriptorSet`] is stamped with the flip count at
//! allocation time, so checking whether a set is still alive is a single
//! integer comparison.

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;
use crate::descriptor::set::{Binding, DescriptorSet};
use crate::descriptor::set_layout::{DescriptorLayoutId, DescriptorSetLayoutCache};

const NUM_DESCRIPTOR_SETS: u32 = 2048;
const NUM_UNIFORM_BUFFERS: u32 = 2048;
const NUM_STORAGE_BUFFERS: u32 = 512;
const NUM_SAMPLERS: u32 = 128;
const NUM_SAMPLED_IMAGES: u32 = 512;
const NUM_STORAGE_IMAGES: u32 = 512;
const NUM_COMBINED_IMAGE_SAMPLERS: u32 = 2048;

const DEFAULT_POOL_SIZES: [vk::DescriptorPoolSize; 6] = [
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: NUM_UNIFORM_BUFFERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: NUM_STORAGE_BUFFERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::SAMPLER,
        descriptor_count: NUM_SAMPLERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::SAMPLED_IMAGE,
        descriptor_count: NUM_SAMPLED_IMAGES,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_IMAGE,
        descriptor_count: NUM_STORAGE_IMAGES,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: NUM_COMBINED_IMAGE_SAMPLERS,
    },
];

/// Whether a set allocated at `generation` is still alive after `flips` pool
/// flips with a ring of `ring_size` frame pools. The pool a set came from is
/// reset on the flip that re-enters it, which happens exactly `ring_size`
/// flips after allocation.
pub fn generation_alive(generation: u64, ring_size: u32, flips: u64) -> bool {
    generation + ring_size as u64 > flips
}

/// Ring of per-frame descriptor pools with generation-based set validity.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DynamicDescriptorPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    ring: Vec<vk::DescriptorPool>,
    frame_index: usize,
    flips_count: u64,
}

impl DynamicDescriptorPool {
    /// Create a pool ring with one raw pool per frame in flight, each sized
    /// from the default allocation table.
    pub fn new(device: Device, frames_in_flight: u32) -> Result<Self> {
        assert!(frames_in_flight > 0, "descriptor pool ring cannot be empty");
        let info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
            max_sets: NUM_DESCRIPTOR_SETS,
            pool_size_count: DEFAULT_POOL_SIZES.len() as u32,
            p_pool_sizes: DEFAULT_POOL_SIZES.as_ptr(),
        };

        let mut ring = Vec::with_capacity(frames_in_flight as usize);
        for _ in 0..frames_in_flight {
            let handle = unsafe { device.create_descriptor_pool(&info, None)? };
            #[cfg(feature = "log-objects")]
            trace!("Created new VkDescriptorPool {handle:?}");
            ring.push(handle);
        }

        Ok(Self {
            device,
            ring,
            frame_index: 0,
            flips_count: 0,
        })
    }

    /// Number of frame pools in the ring.
    pub fn ring_size(&self) -> u32 {
        self.ring.len() as u32
    }

    /// Total number of flips performed so far.
    pub fn flips_count(&self) -> u64 {
        self.flips_count
    }

    /// Get the raw pool sets are currently allocated from.
    /// # Safety
    /// Allocating or resetting through this handle bypasses generation tracking.
    pub unsafe fn current_pool(&self) -> vk::DescriptorPool {
        self.ring[self.frame_index]
    }

    /// Advance the ring by one frame. The pool that is entered is reset,
    /// invalidating every descriptor set previously allocated from it.
    pub fn flip(&mut self) -> Result<()> {
        self.frame_index = (self.frame_index + 1) % self.ring.len();
        self.flips_count += 1;
        unsafe {
            self.device
                .reset_descriptor_pool(self.ring[self.frame_index], vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    /// Invalidate every set allocated from this pool by flipping through the
    /// entire ring once.
    pub fn destroy_all(&mut self) -> Result<()> {
        for _ in 0..self.ring.len() {
            self.flip()?;
        }
        Ok(())
    }

    /// Allocate a descriptor set with the given layout from the current frame
    /// pool and stamp it with the current generation. The set's bindings are
    /// recorded but not yet written; see
    /// [`write_set`](crate::descriptor::set::write_set).
    pub fn allocate(
        &mut self,
        layouts: &DescriptorSetLayoutCache,
        layout: DescriptorLayoutId,
        bindings: Vec<Binding>,
    ) -> Result<DescriptorSet> {
        let set_layout = layouts.vk_layout(layout);
        let info = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            p_next: std::ptr::null(),
            descriptor_pool: self.ring[self.frame_index],
            descriptor_set_count: 1,
            p_set_layouts: &set_layout,
        };
        let handle = unsafe { self.device.allocate_descriptor_sets(&info)? }
            .into_iter()
            .next()
            .ok_or(crate::core::error::Error::Uncategorized("descriptor set allocation returned nothing"))?;

        Ok(DescriptorSet::new(self.flips_count, layout, handle, bindings))
    }

    /// Whether a set is still alive: it has a non-null handle and the frame
    /// pool it came from has not been reset since.
    pub fn is_set_valid(&self, set: &DescriptorSet) -> bool {
        (unsafe { set.handle() != vk::DescriptorSet::null() })
            && generation_alive(set.generation(), self.ring_size(), self.flips_count)
    }
}

impl Drop for DynamicDescriptorPool {
    fn drop(&mut self) {
        for handle in self.ring.drain(..) {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkDescriptorPool {handle:?}");
            unsafe {
                self.device.destroy_descriptor_pool(handle, None);
            }
        }
    }
}
