//! Value types describing the tracked state of GPU resources.
//!
//! Images are decomposed into one cell per (mip level, array layer) pair;
//! buffers are tracked as a single cell. A *missing* cell is distinct from a
//! default-constructed one: missing means "this map has never seen the
//! subresource", while a default cell means "seen, with no active stages or
//! accesses and an undefined layout".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;

use crate::resource::image::ImageHandle;

/// Process-unique identity of a tracked image or buffer.
///
/// State maps are keyed on this id rather than the raw Vulkan handle: drivers
/// are free to reuse a handle value as soon as the old object is destroyed, and
/// keying on the handle would then alias the stale state of the dead resource
/// onto the new one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ResourceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw integer value of this id.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Tracked state of a single image subresource: the pipeline stages it is
/// active in, the accesses those stages perform, and its current layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SubresourceState {
    pub stages: vk::PipelineStageFlags2,
    pub accesses: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

/// Tracked state of a buffer. Buffers have no layout and generate only global
/// memory barriers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct BufferState {
    pub stages: vk::PipelineStageFlags2,
    pub accesses: vk::AccessFlags2,
}

/// Per-subresource states of one image, stored as a flat grid of
/// `mip_levels * array_layers` optional cells indexed by
/// `layer * mip_levels + mip`.
#[derive(Debug, Clone)]
pub struct ImageState {
    pub(crate) image: ImageHandle,
    pub(crate) states: Vec<Option<SubresourceState>>,
}

impl ImageState {
    /// Create a state grid for an image with every cell missing.
    pub fn new(image: &ImageHandle) -> Self {
        Self {
            image: *image,
            states: vec![None; (image.mip_levels() * image.array_layers()) as usize],
        }
    }

    fn index(&self, mip: u32, layer: u32) -> usize {
        assert!(
            mip < self.image.mip_levels() && layer < self.image.array_layers(),
            "subresource (mip {mip}, layer {layer}) out of range for image with {} mips and {} layers",
            self.image.mip_levels(),
            self.image.array_layers()
        );
        (layer * self.image.mip_levels() + mip) as usize
    }

    /// The image this grid tracks.
    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    /// Access the cell for one subresource.
    pub fn subresource(&self, mip: u32, layer: u32) -> &Option<SubresourceState> {
        &self.states[self.index(mip, layer)]
    }

    /// Mutable access to the cell for one subresource.
    pub fn subresource_mut(&mut self, mip: u32, layer: u32) -> &mut Option<SubresourceState> {
        let index = self.index(mip, layer);
        &mut self.states[index]
    }
}

/// Tracked state of one resource. The tag of a given [`ResourceId`] never
/// changes over its lifetime; the two cases share no code and are branched on
/// exactly where image and buffer handling diverge.
#[derive(Debug, Clone)]
pub enum ResourceState {
    Image(ImageState),
    Buffer(BufferState),
}

impl ResourceState {
    /// Drop all stage and access bits while keeping image layouts. Used after
    /// a full synchronization point, when previous GPU work can no longer
    /// require barriers.
    pub(crate) fn forget_activity(&mut self) {
        match self {
            ResourceState::Image(image) => {
                for state in image.states.iter_mut().flatten() {
                    state.stages = vk::PipelineStageFlags2::empty();
                    state.accesses = vk::AccessFlags2::empty();
                }
            }
            ResourceState::Buffer(buffer) => *buffer = BufferState::default(),
        }
    }
}

/// Mapping from resource identity to tracked state.
pub type StateMap = HashMap<ResourceId, ResourceState>;
