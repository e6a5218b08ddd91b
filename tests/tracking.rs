//! Tests for the state tracking and barrier generation engine. The trackers
//! operate on plain handle values, so no device is needed.

use ash::vk;
use ash::vk::Handle;

use deimos::{
    descriptor_type_to_access, is_read_access, is_write_access, shader_stage_to_pipeline_stage, BufferHandle,
    BufferState, CmdBarrier, CmdBufferTracker, ImageHandle, ImageState, QueueTracker, ResourceState, StateMap,
    SubresourceState,
};

fn color_image(mip_levels: u32, array_layers: u32) -> ImageHandle {
    ImageHandle::from_raw_parts(
        vk::Image::from_raw(0x1122_3344_5566_7788),
        vk::ImageAspectFlags::COLOR,
        mip_levels,
        array_layers,
    )
}

fn buffer() -> BufferHandle {
    BufferHandle::from_raw(vk::Buffer::from_raw(0xAABB_CCDD))
}

fn transfer_write_state() -> SubresourceState {
    SubresourceState {
        stages: vk::PipelineStageFlags2::TRANSFER,
        accesses: vk::AccessFlags2::TRANSFER_WRITE,
        layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    }
}

fn fragment_sample_state() -> SubresourceState {
    SubresourceState {
        stages: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        accesses: vk::AccessFlags2::SHADER_SAMPLED_READ,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

fn image_current<'t>(tracker: &'t CmdBufferTracker, image: &ImageHandle) -> &'t ImageState {
    match tracker.current().get(&image.id()) {
        Some(ResourceState::Image(state)) => state,
        other => panic!("expected tracked image state, got {other:?}"),
    }
}

fn buffer_current(tracker: &CmdBufferTracker, buffer: &BufferHandle) -> BufferState {
    match tracker.current().get(&buffer.id()) {
        Some(ResourceState::Buffer(state)) => *state,
        other => panic!("expected tracked buffer state, got {other:?}"),
    }
}

#[test]
pub fn first_use_write_transitions_from_undefined() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);

    assert_eq!(barrier.images.len(), 1, "first use with a layout change needs one barrier");
    assert!(barrier.memory.is_none());
    let emitted = &barrier.images[0];
    assert_eq!(emitted.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(emitted.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(emitted.src_stage_mask, vk::PipelineStageFlags2::TOP_OF_PIPE);
    assert_eq!(emitted.src_access_mask, vk::AccessFlags2::empty());
    assert_eq!(emitted.dst_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
    assert_eq!(
        emitted.dst_access_mask,
        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE
    );
    assert_eq!(emitted.subresource_range.base_mip_level, 0);
    assert_eq!(emitted.subresource_range.level_count, 1);

    // The current state is exactly what was requested.
    let state = image_current(&tracker, &image);
    assert_eq!(state.subresource(0, 0).unwrap(), transfer_write_state());
}

#[test]
pub fn write_then_read_emits_one_barrier() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    barrier.clear();

    tracker.request_image(&image, 0, 0, fragment_sample_state());
    tracker.flush_barrier(&mut barrier);

    assert_eq!(barrier.images.len(), 1);
    let emitted = &barrier.images[0];
    assert_eq!(emitted.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(emitted.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(
        emitted.src_stage_mask,
        vk::PipelineStageFlags2::TRANSFER | vk::PipelineStageFlags2::TOP_OF_PIPE
    );
    assert_eq!(emitted.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    assert_eq!(emitted.dst_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
    assert_eq!(
        emitted.dst_access_mask,
        vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE
    );
}

#[test]
pub fn read_after_read_coalesces_without_barrier() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    tracker.request_image(&image, 0, 0, fragment_sample_state());
    tracker.flush_barrier(&mut barrier);
    barrier.clear();

    // Same layout, read-only access from another stage.
    tracker.request_image(
        &image,
        0,
        0,
        SubresourceState {
            stages: vk::PipelineStageFlags2::VERTEX_SHADER,
            accesses: vk::AccessFlags2::SHADER_SAMPLED_READ,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        },
    );
    tracker.flush_barrier(&mut barrier);

    assert!(barrier.is_empty(), "read after read must not emit a barrier");
    let state = image_current(&tracker, &image).subresource(0, 0).unwrap();
    assert_eq!(
        state.stages,
        vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::VERTEX_SHADER
    );
    assert_eq!(state.accesses, vk::AccessFlags2::SHADER_SAMPLED_READ);
    assert_eq!(state.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
pub fn buffer_write_after_write_emits_memory_barrier() {
    let buffer = buffer();
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    let write = BufferState {
        stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
        accesses: vk::AccessFlags2::SHADER_STORAGE_WRITE,
    };
    tracker.request_buffer(&buffer, write);
    tracker.flush_barrier(&mut barrier);
    assert!(barrier.is_empty(), "first use needs no barrier");

    tracker.request_buffer(&buffer, write);
    tracker.flush_barrier(&mut barrier);

    let memory = barrier.memory.expect("write after write needs a memory barrier");
    assert_eq!(memory.src_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
    assert_eq!(memory.src_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(memory.dst_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
    assert_eq!(memory.dst_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
}

#[test]
pub fn buffer_reads_union_without_barrier() {
    let buffer = buffer();
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_buffer(
        &buffer,
        BufferState {
            stages: vk::PipelineStageFlags2::VERTEX_SHADER,
            accesses: vk::AccessFlags2::UNIFORM_READ,
        },
    );
    tracker.flush_barrier(&mut barrier);

    tracker.request_buffer(
        &buffer,
        BufferState {
            stages: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            accesses: vk::AccessFlags2::SHADER_SAMPLED_READ,
        },
    );
    tracker.flush_barrier(&mut barrier);

    assert!(barrier.is_empty(), "read after read must not emit a barrier");
    let state = buffer_current(&tracker, &buffer);
    assert_eq!(
        state.stages,
        vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
    );
    assert_eq!(state.accesses, vk::AccessFlags2::UNIFORM_READ | vk::AccessFlags2::SHADER_SAMPLED_READ);
}

#[test]
pub fn layout_change_always_emits_barrier() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    barrier.clear();

    // Same stages and accesses, different layout.
    tracker.request_image(
        &image,
        0,
        0,
        SubresourceState {
            layout: vk::ImageLayout::GENERAL,
            ..transfer_write_state()
        },
    );
    tracker.flush_barrier(&mut barrier);

    assert_eq!(barrier.images.len(), 1);
    assert_eq!(barrier.images[0].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(barrier.images[0].new_layout, vk::ImageLayout::GENERAL);
}

#[test]
pub fn flush_after_flush_is_a_noop() {
    let image = color_image(1, 1);
    let buffer = buffer();
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.request_buffer(
        &buffer,
        BufferState {
            stages: vk::PipelineStageFlags2::TRANSFER,
            accesses: vk::AccessFlags2::TRANSFER_WRITE,
        },
    );
    tracker.flush_barrier(&mut barrier);
    barrier.clear();

    tracker.flush_barrier(&mut barrier);
    assert!(barrier.is_empty(), "flushing with no requests pending must do nothing");
}

#[test]
pub fn sync_drops_activity_but_keeps_layouts() {
    let image = color_image(1, 1);
    let buffer = buffer();
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.request_buffer(
        &buffer,
        BufferState {
            stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
            accesses: vk::AccessFlags2::SHADER_STORAGE_WRITE,
        },
    );
    tracker.flush_barrier(&mut barrier);

    tracker.on_sync();

    let image_state = image_current(&tracker, &image).subresource(0, 0).unwrap();
    assert_eq!(image_state.stages, vk::PipelineStageFlags2::empty());
    assert_eq!(image_state.accesses, vk::AccessFlags2::empty());
    assert_eq!(image_state.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

    let buffer_state = buffer_current(&tracker, &buffer);
    assert_eq!(buffer_state, BufferState::default());

    // A write after the sync point starts from a clean state: layout matches,
    // no pending accesses, so no barrier.
    barrier.clear();
    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    assert!(barrier.is_empty());
}

#[test]
#[should_panic(expected = "different layouts")]
pub fn conflicting_layouts_in_one_flush_window_panic() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.request_image(&image, 0, 0, fragment_sample_state());
}

#[test]
pub fn range_requests_cover_the_cartesian_product() {
    let image = color_image(2, 2);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    tracker.request_image_range(&image, image.whole_range(), transfer_write_state());
    tracker.flush_barrier(&mut barrier);

    assert_eq!(barrier.images.len(), 4, "one barrier per (mip, layer) cell");
    for emitted in &barrier.images {
        assert_eq!(emitted.subresource_range.level_count, 1);
        assert_eq!(emitted.subresource_range.layer_count, 1);
    }
}

#[test]
pub fn expected_state_is_imported_on_first_touch() {
    let image = color_image(1, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();

    // The queue reported the image as already sampled in the fragment shader.
    tracker.expect_image(&image, 0, 0, fragment_sample_state());

    // Another read at the same layout: read after read, no barrier.
    tracker.request_image(
        &image,
        0,
        0,
        SubresourceState {
            stages: vk::PipelineStageFlags2::VERTEX_SHADER,
            accesses: vk::AccessFlags2::SHADER_SAMPLED_READ,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        },
    );
    tracker.flush_barrier(&mut barrier);

    assert!(barrier.is_empty());
    let state = image_current(&tracker, &image).subresource(0, 0).unwrap();
    assert_eq!(
        state.stages,
        vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::VERTEX_SHADER
    );
}

#[test]
pub fn init_expected_merges_with_incoming_priority() {
    let image = color_image(2, 1);
    let mut tracker = CmdBufferTracker::new();

    // Locally declared expectation for both cells.
    tracker.expect_image(&image, 0, 0, transfer_write_state());
    tracker.expect_image(&image, 1, 0, transfer_write_state());

    // Queue-provided map only knows cell (0, 0), with a different state.
    let mut incoming = ImageState::new(&image);
    *incoming.subresource_mut(0, 0) = Some(fragment_sample_state());
    let mut map = StateMap::new();
    map.insert(image.id(), ResourceState::Image(incoming));
    tracker.init_expected(map);

    let expected = match tracker.expected().get(&image.id()) {
        Some(ResourceState::Image(state)) => state,
        other => panic!("expected image state, got {other:?}"),
    };
    assert_eq!(expected.subresource(0, 0).unwrap(), fragment_sample_state(), "incoming cell wins");
    assert_eq!(expected.subresource(1, 0).unwrap(), transfer_write_state(), "untouched cell survives");
}

#[test]
pub fn submit_publishes_only_touched_subresources() {
    let image = color_image(2, 1);
    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();
    let mut queue = QueueTracker::new();

    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);

    queue.on_submit(&mut tracker);

    assert_eq!(queue.current_states().len(), 1);
    let state = match queue.current_states().get(&image.id()) {
        Some(ResourceState::Image(state)) => state,
        other => panic!("expected image state, got {other:?}"),
    };
    assert!(state.subresource(0, 0).is_some());
    assert!(state.subresource(1, 0).is_none(), "untouched subresource must not be published");

    // The tracker is cleared for reuse.
    assert!(tracker.current().is_empty());
    assert!(tracker.expected().is_empty());
}

#[test]
pub fn upload_then_sample_across_submissions() {
    let image = color_image(1, 1);
    let mut queue = QueueTracker::new();

    // First submission: copy into the image.
    let mut first = CmdBufferTracker::new();
    queue.set_expected(&mut first);
    let mut barrier = CmdBarrier::default();
    first.request_image(&image, 0, 0, transfer_write_state());
    first.flush_barrier(&mut barrier);
    assert_eq!(barrier.images.len(), 1);
    queue.on_submit(&mut first);

    // Second submission: sample it in a shader.
    let mut second = CmdBufferTracker::new();
    queue.set_expected(&mut second);
    barrier.clear();
    second.request_image(&image, 0, 0, fragment_sample_state());
    second.flush_barrier(&mut barrier);
    assert_eq!(barrier.images.len(), 1);
    let emitted = &barrier.images[0];
    assert_eq!(emitted.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(emitted.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    queue.on_submit(&mut second);

    let state = match queue.current_states().get(&image.id()) {
        Some(ResourceState::Image(state)) => state,
        other => panic!("expected image state, got {other:?}"),
    };
    assert_eq!(state.subresource(0, 0).unwrap().layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
#[should_panic(expected = "incompatible")]
pub fn submit_with_stale_expectations_panics() {
    let image = color_image(1, 1);
    let mut queue = QueueTracker::new();

    let mut first = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();
    first.request_image(&image, 0, 0, transfer_write_state());
    first.flush_barrier(&mut barrier);
    queue.on_submit(&mut first);

    // Recorded against the assumption the image is ready for sampling, but
    // the queue left it in TRANSFER_DST_OPTIMAL.
    let mut second = CmdBufferTracker::new();
    second.expect_image(&image, 0, 0, fragment_sample_state());
    queue.on_submit(&mut second);
}

#[test]
pub fn queue_wait_drops_activity_but_keeps_layouts() {
    let image = color_image(1, 1);
    let mut queue = QueueTracker::new();

    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();
    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    queue.on_submit(&mut tracker);

    queue.on_wait();

    let state = match queue.current_states().get(&image.id()) {
        Some(ResourceState::Image(state)) => state,
        other => panic!("expected image state, got {other:?}"),
    };
    let cell = state.subresource(0, 0).unwrap();
    assert_eq!(cell.stages, vk::PipelineStageFlags2::empty());
    assert_eq!(cell.accesses, vk::AccessFlags2::empty());
    assert_eq!(cell.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
}

#[test]
pub fn resource_deletion_forgets_queue_state() {
    let image = color_image(1, 1);
    let mut queue = QueueTracker::new();

    let mut tracker = CmdBufferTracker::new();
    let mut barrier = CmdBarrier::default();
    tracker.request_image(&image, 0, 0, transfer_write_state());
    tracker.flush_barrier(&mut barrier);
    queue.on_submit(&mut tracker);

    queue.on_resource_deletion(image.id());
    assert!(queue.current_states().is_empty());
}

#[test]
pub fn access_classification_tables() {
    assert!(is_write_access(vk::AccessFlags2::TRANSFER_WRITE));
    assert!(!is_read_access(vk::AccessFlags2::TRANSFER_WRITE));
    assert!(is_read_access(vk::AccessFlags2::SHADER_SAMPLED_READ));
    // Storage access is both.
    let storage = descriptor_type_to_access(vk::DescriptorType::STORAGE_BUFFER);
    assert!(is_read_access(storage) && is_write_access(storage));

    assert_eq!(
        descriptor_type_to_access(vk::DescriptorType::UNIFORM_BUFFER),
        vk::AccessFlags2::UNIFORM_READ
    );
    assert_eq!(
        descriptor_type_to_access(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        vk::AccessFlags2::SHADER_SAMPLED_READ
    );
    assert_eq!(descriptor_type_to_access(vk::DescriptorType::SAMPLER), vk::AccessFlags2::empty());

    assert_eq!(
        shader_stage_to_pipeline_stage(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
        vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
    );
    assert_eq!(
        shader_stage_to_pipeline_stage(vk::ShaderStageFlags::COMPUTE),
        vk::PipelineStageFlags2::COMPUTE_SHADER
    );
}
