//! The per-command-buffer resource state tracker.
//!
//! A [`CmdBufferTracker`] owns three state maps:
//!
//! - `expected` records the states this command buffer assumes resources are in
//!   when it starts executing. It is validated against the queue's last known
//!   states at submit time.
//! - `current` records the states resources are in at the current point of
//!   recording, as far as this command buffer has touched them.
//! - `requests` accumulates the states upcoming commands need resources to be
//!   in. [`CmdBufferTracker::flush_barrier`] turns the accumulated requests
//!   into a single batched [`CmdBarrier`] and folds them into `current`.
//!
//! The recording layer files requests for everything a command is about to
//! touch and flushes immediately before emitting the command, so each flush
//! window contains exactly the requests of one command (or of one render scope,
//! where barriers cannot be recorded in between).

use std::collections::hash_map::Entry;
use std::mem;
use std::ptr;

use ash::vk;

use crate::core::device::Device;
use crate::resource::buffer::BufferHandle;
use crate::resource::image::ImageHandle;
use crate::sync::access::{is_read_access, is_write_access, WRITE_ACCESS_MASK};
use crate::sync::state::{BufferState, ImageState, ResourceId, ResourceState, StateMap, SubresourceState};

/// A batched barrier produced by [`CmdBufferTracker::flush_barrier`]. All
/// buffer transitions of a flush merge into one global memory barrier; image
/// transitions get one entry per subresource.
#[derive(Debug, Default)]
pub struct CmdBarrier {
    pub memory: Option<vk::MemoryBarrier2>,
    pub images: Vec<vk::ImageMemoryBarrier2>,
}

// The vk barrier structs hold (always null) p_next pointers.
unsafe impl Send for CmdBarrier {}

impl CmdBarrier {
    /// Whether this barrier would be a no-op if recorded.
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.images.is_empty()
    }

    /// Discard the staged barrier.
    pub fn clear(&mut self) {
        self.memory = None;
        self.images.clear();
    }

    /// Record the staged barrier with a single
    /// [`vkCmdPipelineBarrier2`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkCmdPipelineBarrier2.html)
    /// call, then clear it. Does nothing if the barrier is empty.
    /// # Safety
    /// `cmd` must be in the recording state and must be outside a render pass
    /// instance.
    pub unsafe fn record(&mut self, device: &Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        let info = vk::DependencyInfo {
            s_type: vk::StructureType::DEPENDENCY_INFO,
            p_next: ptr::null(),
            dependency_flags: vk::DependencyFlags::empty(),
            memory_barrier_count: self.memory.is_some() as u32,
            p_memory_barriers: match &self.memory {
                Some(barrier) => barrier,
                None => ptr::null(),
            },
            buffer_memory_barrier_count: 0,
            p_buffer_memory_barriers: ptr::null(),
            image_memory_barrier_count: self.images.len() as u32,
            p_image_memory_barriers: self.images.as_ptr(),
        };
        device.cmd_pipeline_barrier2(cmd, &info);
        self.clear();
    }
}

/// Tracks the resource states one command buffer expects, holds and requests.
/// See the [module documentation](self) for the role of the three maps.
#[derive(Debug, Default)]
pub struct CmdBufferTracker {
    expected: StateMap,
    current: StateMap,
    requests: StateMap,
}

fn image_entry<'m>(map: &'m mut StateMap, image: &ImageHandle) -> &'m mut ImageState {
    let state = map
        .entry(image.id())
        .or_insert_with(|| ResourceState::Image(ImageState::new(image)));
    match state {
        ResourceState::Image(state) => state,
        ResourceState::Buffer(_) => panic!("resource {:?} is tracked as a buffer", image.id()),
    }
}

impl CmdBufferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the state an image subresource is in when this command buffer
    /// starts executing. Overwrites any previously declared expectation for
    /// the same cell.
    pub fn expect_image(&mut self, image: &ImageHandle, mip: u32, layer: u32, state: SubresourceState) {
        *image_entry(&mut self.expected, image).subresource_mut(mip, layer) = Some(state);
    }

    /// Declare the state a buffer is in when this command buffer starts
    /// executing.
    pub fn expect_buffer(&mut self, buffer: &BufferHandle, state: BufferState) {
        self.expected.insert(buffer.id(), ResourceState::Buffer(state));
    }

    /// Import a state map (normally the queue tracker's current states) as the
    /// expected initial states. If expectations were already recorded, the
    /// incoming map is merged cell by cell, with incoming cells overwriting
    /// existing ones.
    pub fn init_expected(&mut self, states: StateMap) {
        if self.expected.is_empty() {
            self.expected = states;
            return;
        }

        for (id, state) in states {
            match self.expected.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(state);
                }
                Entry::Occupied(mut entry) => match (entry.get_mut(), state) {
                    (ResourceState::Image(merged), ResourceState::Image(incoming)) => {
                        for (index, cell) in incoming.states.into_iter().enumerate() {
                            if cell.is_some() {
                                merged.states[index] = cell;
                            }
                        }
                    }
                    (ResourceState::Buffer(merged), ResourceState::Buffer(incoming)) => {
                        *merged = incoming;
                    }
                    _ => panic!("resource {id:?} changed kind between image and buffer"),
                },
            }
        }
    }

    /// Request that an image subresource be in `state` for the next command.
    /// Multiple requests for the same cell within one flush window union their
    /// stages and accesses; requesting two different layouts for the same cell
    /// in one window is a programmer error.
    pub fn request_image(&mut self, image: &ImageHandle, mip: u32, layer: u32, state: SubresourceState) {
        let cell = image_entry(&mut self.requests, image).subresource_mut(mip, layer);
        match cell {
            None => *cell = Some(state),
            Some(pending) => {
                assert_eq!(
                    pending.layout, state.layout,
                    "different layouts requested for the same image subresource"
                );
                pending.accesses |= state.accesses;
                pending.stages |= state.stages;
            }
        }
    }

    /// Request a state for a rectangular block of subresources.
    pub fn request_image_subresources(
        &mut self,
        image: &ImageHandle,
        first_mip: u32,
        mip_count: u32,
        first_layer: u32,
        layer_count: u32,
        state: SubresourceState,
    ) {
        for mip in first_mip..first_mip + mip_count {
            for layer in first_layer..first_layer + layer_count {
                self.request_image(image, mip, layer, state);
            }
        }
    }

    /// Request a state for every subresource in `range`. The range's aspect
    /// mask is ignored; separate depth and stencil transitions are not
    /// supported.
    pub fn request_image_range(&mut self, image: &ImageHandle, range: vk::ImageSubresourceRange, state: SubresourceState) {
        self.request_image_subresources(
            image,
            range.base_mip_level,
            range.level_count,
            range.base_array_layer,
            range.layer_count,
            state,
        );
    }

    /// Request that a buffer be in `state` for the next command. Requests in
    /// the same flush window union their stages and accesses.
    pub fn request_buffer(&mut self, buffer: &BufferHandle, state: BufferState) {
        let entry = self
            .requests
            .entry(buffer.id())
            .or_insert_with(|| ResourceState::Buffer(BufferState::default()));
        match entry {
            ResourceState::Buffer(pending) => {
                pending.accesses |= state.accesses;
                pending.stages |= state.stages;
            }
            ResourceState::Image(_) => panic!("resource {:?} is tracked as an image", buffer.id()),
        }
    }

    /// Turn all accumulated requests into barriers, pushing them onto
    /// `barrier`, and fold the requested states into the current map. After
    /// this call the request map is empty.
    pub fn flush_barrier(&mut self, barrier: &mut CmdBarrier) {
        let requests = mem::take(&mut self.requests);
        for (id, state) in requests {
            match state {
                ResourceState::Image(request) => {
                    for layer in 0..request.image().array_layers() {
                        for mip in 0..request.image().mip_levels() {
                            let Some(dst) = *request.subresource(mip, layer) else {
                                continue;
                            };
                            let src = self.acquire_image(id, request.image(), mip, layer);
                            if let Some(image_barrier) = gen_image_barrier(request.image(), mip, layer, src, &dst) {
                                barrier.images.push(image_barrier);
                            }
                        }
                    }
                }
                ResourceState::Buffer(request) => {
                    let src = self.acquire_buffer(id);
                    gen_memory_barrier(&mut barrier.memory, src, &request);
                }
            }
        }
    }

    /// Look up the current state of an image subresource, importing it from
    /// the expected map on first touch. A subresource seen by neither map is
    /// created default-initialized in *both*: the caller implicitly promises
    /// the resource was unused, and recording that promise in `expected` makes
    /// it checkable at submit time.
    fn acquire_image(&mut self, id: ResourceId, image: &ImageHandle, mip: u32, layer: u32) -> &mut SubresourceState {
        if !self.current.contains_key(&id) {
            let imported = match self.expected.get(&id) {
                Some(expected @ ResourceState::Image(_)) => expected.clone(),
                Some(ResourceState::Buffer(_)) => panic!("resource {id:?} is tracked as a buffer"),
                None => ResourceState::Image(ImageState::new(image)),
            };
            self.current.insert(id, imported);
        }

        let expected_cell = match self
            .expected
            .entry(id)
            .or_insert_with(|| ResourceState::Image(ImageState::new(image)))
        {
            ResourceState::Image(expected) => expected.subresource_mut(mip, layer),
            ResourceState::Buffer(_) => panic!("resource {id:?} is tracked as a buffer"),
        };

        let cell = match self.current.get_mut(&id) {
            Some(ResourceState::Image(current)) => current.subresource_mut(mip, layer),
            _ => unreachable!("current entry inserted above"),
        };
        if cell.is_none() {
            match *expected_cell {
                Some(state) => *cell = Some(state),
                None => {
                    *expected_cell = Some(SubresourceState::default());
                    *cell = Some(SubresourceState::default());
                }
            }
        }
        match cell {
            Some(state) => state,
            None => unreachable!("cell filled above"),
        }
    }

    /// Buffer analogue of [`Self::acquire_image`].
    fn acquire_buffer(&mut self, id: ResourceId) -> &mut BufferState {
        if !self.current.contains_key(&id) {
            let imported = match self.expected.get(&id) {
                Some(expected @ ResourceState::Buffer(_)) => expected.clone(),
                Some(ResourceState::Image(_)) => panic!("resource {id:?} is tracked as an image"),
                None => ResourceState::Buffer(BufferState::default()),
            };
            // First touch also promises the queue the buffer was unused.
            self.expected
                .entry(id)
                .or_insert_with(|| ResourceState::Buffer(BufferState::default()));
            self.current.insert(id, imported);
        }
        match self.current.get_mut(&id) {
            Some(ResourceState::Buffer(state)) => state,
            _ => unreachable!("current entry inserted above"),
        }
    }

    /// Drop all stage and access bits in the current map while keeping image
    /// layouts. Call this after an external full synchronization such as a
    /// device wait-idle. Expected states are preserved: after the queue
    /// tracker's own [`on_wait`](crate::sync::queue_tracker::QueueTracker::on_wait)
    /// they can only be more specific than the queue's zeroed states, which
    /// submit-time validation accepts.
    pub fn on_sync(&mut self) {
        assert!(self.requests.is_empty(), "state requests pending across a sync point");
        for state in self.current.values_mut() {
            state.forget_activity();
        }
    }

    /// Strip expectations for subresources this command buffer never actually
    /// touched. These are the entries [`acquire`](Self::acquire_image) created
    /// for first-touch resources: the whole-resource entry was promised, but
    /// only the touched cells of the promise are meaningful.
    pub fn remove_unused(&mut self) {
        assert!(self.requests.is_empty(), "state requests pending at submit");

        for (id, state) in &self.current {
            match state {
                ResourceState::Image(current) => {
                    let Some(ResourceState::Image(expected)) = self.expected.get_mut(id) else {
                        panic!("image {id:?} in current states but not in expected states")
                    };
                    for (index, cell) in current.states.iter().enumerate() {
                        if cell.is_none() {
                            expected.states[index] = None;
                        }
                    }
                }
                ResourceState::Buffer(_) => {
                    let removed = self.expected.remove(id);
                    assert!(
                        matches!(removed, Some(ResourceState::Buffer(_))),
                        "buffer {id:?} in current states but not in expected states"
                    );
                }
            }
        }
    }

    /// Move out the current map for the queue tracker to absorb.
    pub fn take_current(&mut self) -> StateMap {
        mem::take(&mut self.current)
    }

    /// The states this command buffer expects resources to be in on execution.
    pub fn expected(&self) -> &StateMap {
        &self.expected
    }

    /// The states resources are in at the current point of recording.
    pub fn current(&self) -> &StateMap {
        &self.current
    }

    /// Empty all three maps.
    pub fn clear_all(&mut self) {
        self.expected.clear();
        self.current.clear();
        self.requests.clear();
    }
}

/// Generate the barrier taking one image subresource from `src` to `dst`, and
/// advance `src` to the state the subresource is in afterwards.
///
/// The policy:
/// - layout change: barrier; destination scope is all commands with
///   memory-read|memory-write so no further barrier is needed whatever comes
///   next
/// - write -> write: barrier; destination scope is exactly the requested
///   stages and accesses
/// - write -> read: barrier; destination scope widened to all commands with
///   memory-read|memory-write so later read-only uses need no barrier
/// - read -> write: execution-only barrier (a read state has no writes to
///   make available)
/// - read -> read: no barrier; the source state unions in the new stages and
///   accesses
/// - no previous access: no barrier; first use in this window
fn gen_image_barrier(
    image: &ImageHandle,
    mip: u32,
    layer: u32,
    src: &mut SubresourceState,
    dst: &SubresourceState,
) -> Option<vk::ImageMemoryBarrier2> {
    let range = vk::ImageSubresourceRange {
        aspect_mask: image.aspect(),
        base_mip_level: mip,
        level_count: 1,
        base_array_layer: layer,
        layer_count: 1,
    };

    if src.layout != dst.layout {
        let barrier = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: ptr::null(),
            src_stage_mask: src.stages | vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access_mask: src.accesses & WRITE_ACCESS_MASK,
            dst_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            dst_access_mask: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            old_layout: src.layout,
            new_layout: dst.layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: unsafe { image.raw() },
            subresource_range: range,
        };
        *src = *dst;
        return Some(barrier);
    }

    let src_write = is_write_access(src.accesses);
    let src_read = is_read_access(src.accesses);
    let dst_write = is_write_access(dst.accesses);
    let dst_read = is_read_access(dst.accesses);

    if src_write {
        let mut barrier = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: ptr::null(),
            src_stage_mask: src.stages,
            src_access_mask: src.accesses & WRITE_ACCESS_MASK,
            dst_stage_mask: vk::PipelineStageFlags2::empty(),
            dst_access_mask: vk::AccessFlags2::empty(),
            old_layout: src.layout,
            new_layout: dst.layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: unsafe { image.raw() },
            subresource_range: range,
        };
        if dst_write {
            // Make the writes available to the next command only.
            barrier.dst_stage_mask = dst.stages;
            barrier.dst_access_mask = dst.accesses;
        } else if dst_read {
            // Read only: make the writes available to every access, so that
            // further reads do not need a barrier between them.
            barrier.dst_stage_mask = vk::PipelineStageFlags2::ALL_COMMANDS;
            barrier.dst_access_mask = vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE;
        }
        *src = *dst;
        return Some(barrier);
    }

    if src_read && dst_write {
        // Execution dependency only: a read state has no writes to make
        // available, and its data is already visible to every access.
        let barrier = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            p_next: ptr::null(),
            src_stage_mask: src.stages,
            src_access_mask: vk::AccessFlags2::empty(),
            dst_stage_mask: dst.stages,
            dst_access_mask: vk::AccessFlags2::empty(),
            old_layout: src.layout,
            new_layout: dst.layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: unsafe { image.raw() },
            subresource_range: range,
        };
        *src = *dst;
        return Some(barrier);
    }

    if src_read && dst_read {
        src.accesses |= dst.accesses;
        src.stages |= dst.stages;
        return None;
    }

    // Neither read nor write: the subresource was not used yet in this
    // command buffer, or an explicit barrier was recorded before.
    assert!(src.accesses.is_empty(), "unknown resource access");
    assert!(src.stages.is_empty(), "unknown pipeline stages");
    *src = *dst;
    None
}

fn merge_memory_barrier(merged: &mut Option<vk::MemoryBarrier2>, barrier: vk::MemoryBarrier2) {
    match merged {
        Some(merged) => {
            merged.src_stage_mask |= barrier.src_stage_mask;
            merged.src_access_mask |= barrier.src_access_mask;
            merged.dst_stage_mask |= barrier.dst_stage_mask;
            merged.dst_access_mask |= barrier.dst_access_mask;
        }
        None => *merged = Some(barrier),
    }
}

/// Buffer analogue of [`gen_image_barrier`], without the layout row. All
/// buffer transitions of a flush OR-merge into a single global memory barrier.
fn gen_memory_barrier(out: &mut Option<vk::MemoryBarrier2>, src: &mut BufferState, dst: &BufferState) {
    let src_write = is_write_access(src.accesses);
    let src_read = is_read_access(src.accesses);
    let dst_write = is_write_access(dst.accesses);
    let dst_read = is_read_access(dst.accesses);

    if src_write {
        let mut barrier = vk::MemoryBarrier2 {
            s_type: vk::StructureType::MEMORY_BARRIER_2,
            p_next: ptr::null(),
            src_stage_mask: src.stages,
            src_access_mask: src.accesses & WRITE_ACCESS_MASK,
            dst_stage_mask: vk::PipelineStageFlags2::empty(),
            dst_access_mask: vk::AccessFlags2::empty(),
        };
        if dst_write {
            barrier.dst_stage_mask = dst.stages;
            barrier.dst_access_mask = dst.accesses;
        } else if dst_read {
            barrier.dst_stage_mask = vk::PipelineStageFlags2::ALL_COMMANDS;
            barrier.dst_access_mask = vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE;
        }
        *src = *dst;
        merge_memory_barrier(out, barrier);
        return;
    }

    if src_read && dst_write {
        let barrier = vk::MemoryBarrier2 {
            s_type: vk::StructureType::MEMORY_BARRIER_2,
            p_next: ptr::null(),
            src_stage_mask: src.stages,
            src_access_mask: vk::AccessFlags2::empty(),
            dst_stage_mask: dst.stages,
            dst_access_mask: vk::AccessFlags2::empty(),
        };
        *src = *dst;
        merge_memory_barrier(out, barrier);
        return;
    }

    if src_read && dst_read {
        src.accesses |= dst.accesses;
        src.stages |= dst.stages;
        return;
    }

    assert!(src.accesses.is_empty(), "unknown resource access");
    assert!(src.stages.is_empty(), "unknown pipeline stages");
    *src = *dst;
}
