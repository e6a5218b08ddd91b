//! The synchronizing command buffer.
//!
//! A [`SyncCommandBuffer`] is the public recording surface of the library.
//! Every recorded operation goes through three steps: it files state requests
//! for each resource the GPU work will touch, flushes the accumulated requests
//! into one batched barrier recorded just before the work, and then records
//! the raw Vulkan command.
//!
//! # Lifecycle
//!
//! A command buffer moves through the states `Initial -> Recording ->
//! Executable -> Pending` and back to `Initial` once its fence has been
//! observed and [`SyncCommandBuffer::reset`] is called. Inside a recording,
//! [`SyncCommandBuffer::begin_rendering`] enters the `Rendering` state and
//! [`SyncCommandBuffer::end_rendering`] leaves it. Calling an operation in the
//! wrong state is a programmer error and panics.
//!
//! # Render scopes and the primary/secondary split
//!
//! Barriers cannot be recorded inside a render pass instance, so all state
//! requests belonging to one render scope must be satisfied by a single
//! barrier recorded *before* the pass begins. To make that possible without
//! constraining the API, draw-type commands inside a render scope are recorded
//! into a secondary command buffer and the actual
//! [`vkCmdBeginRendering`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkCmdBeginRendering.html)
//! is deferred: `end_rendering` first ends the secondary buffer, then flushes
//! the scope's accumulated barrier into the primary, and only then opens the
//! pass on the primary and executes the secondary inside it.

use std::ffi::c_void;
use std::ptr;
use std::slice;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::queue::Queue;
use crate::descriptor::set::DescriptorSet;
use crate::descriptor::set_layout::DescriptorSetLayoutCache;
use crate::resource::buffer::{BufferHandle, BufferView};
use crate::resource::image::ImageHandle;
use crate::shader::{ShaderProgramId, ShaderProgramManager};
use crate::sync::primitives::{Fence, Semaphore};
use crate::sync::queue_tracker::QueueTracker;
use crate::sync::state::{BufferState, SubresourceState};
use crate::sync::tracker::{CmdBarrier, CmdBufferTracker};

pub mod render_scope;
pub mod state;

pub(crate) mod command_pool;

use command_pool::RecorderPool;
pub use render_scope::RenderScope;
pub use state::RenderingAttachment;
use state::RenderScopeState;

/// Lifecycle state of a [`SyncCommandBuffer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordState {
    /// Freshly created or reset; ready for [`SyncCommandBuffer::begin`].
    Initial,
    /// Accepting commands.
    Recording,
    /// Recording finished; ready for [`SyncCommandBuffer::submit`].
    Executable,
    /// Inside a render scope; accepting draw-type commands only.
    Rendering,
    /// Submitted; waiting for its fence to be observed.
    Pending,
}

/// A command buffer that tracks the state of every resource it records
/// commands against and inserts the required barriers automatically. See the
/// [module documentation](self) for the recording model.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SyncCommandBuffer {
    #[derivative(Debug = "ignore")]
    device: Device,
    pool: RecorderPool,
    state: RecordState,
    tracker: CmdBufferTracker,
    barrier: CmdBarrier,
    #[derivative(Debug = "ignore")]
    scope: Option<RenderScopeState>,
    current_program: Option<ShaderProgramId>,
    #[derivative(Debug = "ignore")]
    programs: Arc<Mutex<ShaderProgramManager>>,
    #[derivative(Debug = "ignore")]
    layouts: Arc<Mutex<DescriptorSetLayoutCache>>,
    #[derivative(Debug = "ignore")]
    queue_tracker: Arc<Mutex<QueueTracker>>,
}

impl SyncCommandBuffer {
    /// Create a command buffer recording on the given queue family, together
    /// with its backing command pool.
    pub fn new(
        device: Device,
        family_index: u32,
        programs: Arc<Mutex<ShaderProgramManager>>,
        layouts: Arc<Mutex<DescriptorSetLayoutCache>>,
        queue_tracker: Arc<Mutex<QueueTracker>>,
    ) -> Result<Self> {
        let pool = RecorderPool::new(device.clone(), family_index)?;

        Ok(Self {
            device,
            pool,
            state: RecordState::Initial,
            tracker: CmdBufferTracker::new(),
            barrier: CmdBarrier::default(),
            scope: None,
            current_program: None,
            programs,
            layouts,
            queue_tracker,
        })
    }

    /// The current lifecycle state.
    pub fn record_state(&self) -> RecordState {
        self.state
    }

    /// Get unsafe access to the underlying primary `VkCommandBuffer`.
    /// # Safety
    /// Commands recorded through this handle bypass state tracking.
    pub unsafe fn handle(&self) -> vk::CommandBuffer {
        self.pool.primary()
    }

    fn expect_record_state(&self, expected: RecordState) {
        assert!(
            self.state == expected,
            "command buffer is in state {:?}, but the operation requires {expected:?}",
            self.state
        );
    }

    fn scope(&self) -> &RenderScopeState {
        match &self.scope {
            Some(scope) => scope,
            None => panic!("not inside a render scope"),
        }
    }

    /// Flush accumulated state requests and record the resulting barrier on
    /// the primary command buffer.
    fn flush_barriers(&mut self) {
        self.tracker.flush_barrier(&mut self.barrier);
        unsafe {
            self.barrier.record(&self.device, self.pool.primary());
        }
    }

    /// Begin recording. Imports the queue's current resource states as this
    /// command buffer's expected initial states.
    pub fn begin(&mut self) -> Result<()> {
        self.expect_record_state(RecordState::Initial);
        let info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            p_next: ptr::null(),
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            p_inheritance_info: ptr::null(),
        };
        unsafe {
            self.device.begin_command_buffer(self.pool.primary(), &info)?;
        }
        self.queue_tracker
            .lock()
            .map_err(|_| Error::PoisonError)?
            .set_expected(&mut self.tracker);
        self.state = RecordState::Recording;
        Ok(())
    }

    /// Finish recording. The command buffer can then be submitted.
    pub fn end(&mut self) -> Result<()> {
        self.expect_record_state(RecordState::Recording);
        unsafe {
            self.device.end_command_buffer(self.pool.primary())?;
        }
        self.state = RecordState::Executable;
        Ok(())
    }

    /// Submit this command buffer, signalling `fence` on completion. The
    /// tracker's expected states are validated against the queue's last known
    /// states before anything reaches the device; an incompatibility is a
    /// fatal programmer error.
    ///
    /// After the fence has been observed, call [`Self::reset`] to make the
    /// command buffer recordable again.
    pub fn submit(
        &mut self,
        queue: &Queue,
        wait: Option<(&Semaphore, vk::PipelineStageFlags)>,
        signal: Option<&Semaphore>,
        fence: &Fence,
    ) -> Result<()> {
        self.expect_record_state(RecordState::Executable);
        self.queue_tracker
            .lock()
            .map_err(|_| Error::PoisonError)?
            .on_submit(&mut self.tracker);

        let primary = self.pool.primary();
        let wait_semaphore = wait.map(|(semaphore, _)| unsafe { semaphore.handle() });
        let wait_stage = wait.map(|(_, stage)| stage);
        let signal_semaphore = signal.map(|semaphore| unsafe { semaphore.handle() });
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            p_next: ptr::null(),
            wait_semaphore_count: wait_semaphore.is_some() as u32,
            p_wait_semaphores: match &wait_semaphore {
                Some(semaphore) => semaphore,
                None => ptr::null(),
            },
            p_wait_dst_stage_mask: match &wait_stage {
                Some(stage) => stage,
                None => ptr::null(),
            },
            command_buffer_count: 1,
            p_command_buffers: &primary,
            signal_semaphore_count: signal_semaphore.is_some() as u32,
            p_signal_semaphores: match &signal_semaphore {
                Some(semaphore) => semaphore,
                None => ptr::null(),
            },
        };
        queue.submit(submit, unsafe { fence.handle() })?;
        self.state = RecordState::Pending;
        Ok(())
    }

    /// Reset the command buffer back to the `Initial` state from any state,
    /// releasing the secondary command buffers of past render scopes. A
    /// command buffer in `Pending` state must only be reset after its fence
    /// has been observed.
    pub fn reset(&mut self) -> Result<()> {
        self.pool.reset()?;
        self.scope = None;
        self.tracker.clear_all();
        self.barrier.clear();
        self.current_program = None;
        self.state = RecordState::Initial;
        Ok(())
    }

    /// Declare the state an image subresource is in when this command buffer
    /// executes, overriding what was imported from the queue at
    /// [`Self::begin`].
    pub fn expect_image(&mut self, image: &ImageHandle, mip: u32, layer: u32, state: SubresourceState) {
        self.expect_record_state(RecordState::Recording);
        self.tracker.expect_image(image, mip, layer, state);
    }

    /// Declare the state a buffer is in when this command buffer executes.
    pub fn expect_buffer(&mut self, buffer: &BufferHandle, state: BufferState) {
        self.expect_record_state(RecordState::Recording);
        self.tracker.expect_buffer(buffer, state);
    }

    /// Notify the tracker that a full synchronization (such as a device
    /// wait-idle) happened: all tracked stage and access bits are dropped,
    /// image layouts are kept.
    pub fn on_sync(&mut self) {
        self.expect_record_state(RecordState::Recording);
        self.tracker.on_sync();
    }

    /// Read access to the underlying state tracker.
    pub fn tracker(&self) -> &CmdBufferTracker {
        &self.tracker
    }

    /// Copy `src` into `dst`. The views must have the same size.
    pub fn copy_buffer(&mut self, src: &BufferView, dst: &BufferView) -> Result<()> {
        self.expect_record_state(RecordState::Recording);
        if src.size() != dst.size() {
            return Err(Error::InvalidBufferCopy.into());
        }

        self.tracker.request_buffer(
            &src.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::TRANSFER,
                accesses: vk::AccessFlags2::TRANSFER_READ,
            },
        );
        self.tracker.request_buffer(
            &dst.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::TRANSFER,
                accesses: vk::AccessFlags2::TRANSFER_WRITE,
            },
        );
        self.flush_barriers();

        let copy = vk::BufferCopy {
            src_offset: src.offset(),
            dst_offset: dst.offset(),
            size: src.size(),
        };
        unsafe {
            self.device
                .cmd_copy_buffer(self.pool.primary(), src.handle(), dst.handle(), slice::from_ref(&copy));
        }
        Ok(())
    }

    /// Copy buffer data into image subresources. Each region's target mip and
    /// layers are transitioned to `dst_layout`.
    pub fn copy_buffer_to_image(
        &mut self,
        src: &BufferView,
        dst: &ImageHandle,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.expect_record_state(RecordState::Recording);

        self.tracker.request_buffer(
            &src.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::TRANSFER,
                accesses: vk::AccessFlags2::TRANSFER_READ,
            },
        );
        for region in regions {
            self.tracker.request_image_subresources(
                dst,
                region.image_subresource.mip_level,
                1,
                region.image_subresource.base_array_layer,
                region.image_subresource.layer_count,
                SubresourceState {
                    stages: vk::PipelineStageFlags2::TRANSFER,
                    accesses: vk::AccessFlags2::TRANSFER_WRITE,
                    layout: dst_layout,
                },
            );
        }
        self.flush_barriers();

        unsafe {
            self.device
                .cmd_copy_buffer_to_image(self.pool.primary(), src.handle(), dst.raw(), dst_layout, regions);
        }
    }

    /// Blit image subresources with the given filter. Source regions are
    /// transitioned to `src_layout`, destination regions to `dst_layout`.
    pub fn blit_image(
        &mut self,
        src: &ImageHandle,
        src_layout: vk::ImageLayout,
        dst: &ImageHandle,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.expect_record_state(RecordState::Recording);

        for region in regions {
            self.tracker.request_image_subresources(
                src,
                region.src_subresource.mip_level,
                1,
                region.src_subresource.base_array_layer,
                region.src_subresource.layer_count,
                SubresourceState {
                    stages: vk::PipelineStageFlags2::TRANSFER,
                    accesses: vk::AccessFlags2::TRANSFER_READ,
                    layout: src_layout,
                },
            );
            self.tracker.request_image_subresources(
                dst,
                region.dst_subresource.mip_level,
                1,
                region.dst_subresource.base_array_layer,
                region.dst_subresource.layer_count,
                SubresourceState {
                    stages: vk::PipelineStageFlags2::TRANSFER,
                    accesses: vk::AccessFlags2::TRANSFER_WRITE,
                    layout: dst_layout,
                },
            );
        }
        self.flush_barriers();

        unsafe {
            self.device.cmd_blit_image(
                self.pool.primary(),
                src.raw(),
                src_layout,
                dst.raw(),
                dst_layout,
                regions,
                filter,
            );
        }
    }

    /// Clear image subresource ranges to a color. The ranges are transitioned
    /// to `layout`.
    pub fn clear_color_image(
        &mut self,
        image: &ImageHandle,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.expect_record_state(RecordState::Recording);

        for range in ranges {
            self.tracker.request_image_range(
                image,
                *range,
                SubresourceState {
                    stages: vk::PipelineStageFlags2::TRANSFER,
                    accesses: vk::AccessFlags2::TRANSFER_WRITE,
                    layout,
                },
            );
        }
        self.flush_barriers();

        unsafe {
            self.device
                .cmd_clear_color_image(self.pool.primary(), image.raw(), layout, &color, ranges);
        }
    }

    /// Fill a buffer range with a repeated 32-bit value.
    pub fn fill_buffer(&mut self, dst: &BufferView, data: u32) {
        self.expect_record_state(RecordState::Recording);

        self.tracker.request_buffer(
            &dst.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::TRANSFER,
                accesses: vk::AccessFlags2::TRANSFER_WRITE,
            },
        );
        self.flush_barriers();

        unsafe {
            self.device
                .cmd_fill_buffer(self.pool.primary(), dst.handle(), dst.offset(), dst.size(), data);
        }
    }

    /// Force a layout transition on a subresource range without recording any
    /// other work. Requests the new layout with empty stage and access masks.
    pub fn transform_layout(&mut self, image: &ImageHandle, layout: vk::ImageLayout, range: vk::ImageSubresourceRange) {
        self.expect_record_state(RecordState::Recording);

        self.tracker.request_image_range(
            image,
            range,
            SubresourceState {
                stages: vk::PipelineStageFlags2::empty(),
                accesses: vk::AccessFlags2::empty(),
                layout,
            },
        );
        self.flush_barriers();
    }

    /// Bind a compute pipeline. The program id is used to resolve the pipeline
    /// layout for subsequent descriptor binds and push constants.
    pub fn bind_compute_pipeline(&mut self, program: ShaderProgramId, pipeline: vk::Pipeline) {
        self.expect_record_state(RecordState::Recording);
        unsafe {
            self.device
                .cmd_bind_pipeline(self.pool.primary(), vk::PipelineBindPoint::COMPUTE, pipeline);
        }
        self.current_program = Some(program);
    }

    /// Bind a graphics pipeline. Only legal inside a render scope.
    pub fn bind_graphics_pipeline(&mut self, program: ShaderProgramId, pipeline: vk::Pipeline) {
        self.expect_record_state(RecordState::Rendering);
        unsafe {
            self.device
                .cmd_bind_pipeline(self.scope().secondary, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.current_program = Some(program);
    }

    /// Bind a descriptor set to the currently bound program, filing state
    /// requests for every resource the set references. In the `Recording`
    /// state this binds for compute (the barrier is recorded at the next
    /// dispatch); in the `Rendering` state it binds for graphics (the barrier
    /// becomes part of the render scope's deferred barrier).
    pub fn bind_descriptor_set(&mut self, index: u32, set: &DescriptorSet) -> Result<()> {
        let (target, bind_point) = match self.state {
            RecordState::Recording => (self.pool.primary(), vk::PipelineBindPoint::COMPUTE),
            RecordState::Rendering => (self.scope().secondary, vk::PipelineBindPoint::GRAPHICS),
            state => panic!("command buffer is in state {state:?}, but binding descriptors requires Recording or Rendering"),
        };
        let Some(program) = self.current_program else {
            panic!("binding a descriptor set requires a bound pipeline")
        };

        let pipeline_layout = {
            let programs = self.programs.lock().map_err(|_| Error::PoisonError)?;
            let info = programs.info(program);
            assert!(
                info.set_layouts.get(index as usize) == Some(&set.layout_id()),
                "descriptor set layout does not match set {index} of the bound program"
            );
            info.pipeline_layout
        };

        {
            let layouts = self.layouts.lock().map_err(|_| Error::PoisonError)?;
            set.request_states(&layouts, &mut self.tracker);
        }

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                target,
                bind_point,
                pipeline_layout,
                index,
                slice::from_ref(&set.handle()),
                &[],
            );
        }
        Ok(())
    }

    /// Dispatch compute work. Records the barrier for everything the bound
    /// descriptor sets requested since the last flush.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.expect_record_state(RecordState::Recording);
        self.flush_barriers();
        unsafe {
            self.device.cmd_dispatch(self.pool.primary(), x, y, z);
        }
    }

    /// Bind a vertex buffer. Only legal inside a render scope; the state
    /// request becomes part of the scope's deferred barrier.
    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: &BufferView) {
        self.expect_record_state(RecordState::Rendering);
        self.tracker.request_buffer(
            &buffer.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                accesses: vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
            },
        );
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.scope().secondary,
                binding,
                slice::from_ref(&buffer.handle()),
                slice::from_ref(&buffer.offset()),
            );
        }
    }

    /// Bind an index buffer. Only legal inside a render scope.
    pub fn bind_index_buffer(&mut self, buffer: &BufferView, index_type: vk::IndexType) {
        self.expect_record_state(RecordState::Rendering);
        self.tracker.request_buffer(
            &buffer.buffer(),
            BufferState {
                stages: vk::PipelineStageFlags2::INDEX_INPUT,
                accesses: vk::AccessFlags2::INDEX_READ,
            },
        );
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.scope().secondary, buffer.handle(), buffer.offset(), index_type);
        }
    }

    /// Issue a draw call. Only legal inside a render scope; render scopes
    /// cannot contain barriers, so nothing is flushed here.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.expect_record_state(RecordState::Rendering);
        unsafe {
            self.device
                .cmd_draw(self.scope().secondary, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// Issue an indexed draw call. Only legal inside a render scope.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.expect_record_state(RecordState::Rendering);
        unsafe {
            self.device.cmd_draw_indexed(
                self.scope().secondary,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    /// Set the viewport. Only legal inside a render scope.
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.expect_record_state(RecordState::Rendering);
        unsafe {
            self.device
                .cmd_set_viewport(self.scope().secondary, 0, slice::from_ref(&viewport));
        }
    }

    /// Set the scissor region. Only legal inside a render scope.
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.expect_record_state(RecordState::Rendering);
        unsafe {
            self.device.cmd_set_scissor(self.scope().secondary, 0, slice::from_ref(&scissor));
        }
    }

    /// Upload push constants to the bound program's push constant range.
    /// Writing outside the program's declared range is a programmer error.
    pub fn push_constants<T: Copy>(&mut self, offset: u32, data: &[T]) -> Result<()> {
        let target = match self.state {
            RecordState::Recording => self.pool.primary(),
            RecordState::Rendering => self.scope().secondary,
            state => panic!("command buffer is in state {state:?}, but push constants require Recording or Rendering"),
        };
        let Some(program) = self.current_program else {
            panic!("push constants require a bound pipeline")
        };

        let programs = self.programs.lock().map_err(|_| Error::PoisonError)?;
        let info = programs.info(program);
        let Some(range) = info.push_constants else {
            panic!("bound program has no push constant range")
        };

        // SAFETY: T is Copy, reinterpreting as bytes is always valid.
        let (_, bytes, _) = unsafe { data.align_to::<u8>() };
        assert!(
            offset + bytes.len() as u32 <= range.size,
            "push constant write of {} bytes at offset {offset} exceeds the program's range of {} bytes",
            bytes.len(),
            range.size
        );
        unsafe {
            self.device
                .cmd_push_constants(target, info.pipeline_layout, range.stage_flags, offset, bytes);
        }
        Ok(())
    }

    /// Enter a render scope. Files state requests for every attachment and
    /// starts recording draw-type commands into a secondary command buffer;
    /// the actual render pass is opened on the primary buffer by
    /// [`Self::end_rendering`], after the scope's single barrier has been
    /// recorded.
    ///
    /// Prefer [`RenderScope`] over calling this directly; it guarantees the
    /// scope is closed on every exit path.
    pub fn begin_rendering(
        &mut self,
        render_area: vk::Rect2D,
        color_attachments: Vec<RenderingAttachment>,
        depth_attachment: Option<RenderingAttachment>,
    ) -> Result<()> {
        self.expect_record_state(RecordState::Recording);

        for attachment in &color_attachments {
            self.tracker.request_image_range(
                &attachment.view.image(),
                attachment.view.subresource_range(),
                SubresourceState {
                    stages: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    accesses: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                    layout: attachment.layout,
                },
            );
        }
        if let Some(attachment) = &depth_attachment {
            let read_only = matches!(
                attachment.layout,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            );
            let mut accesses = vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ;
            if !read_only {
                accesses |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
            }
            self.tracker.request_image_range(
                &attachment.view.image(),
                attachment.view.subresource_range(),
                SubresourceState {
                    stages: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                    accesses,
                    layout: attachment.layout,
                },
            );
        }

        let secondary = self.pool.allocate_secondary()?;

        let color_formats = color_attachments
            .iter()
            .map(|attachment| attachment.view.format())
            .collect::<Vec<_>>();
        let samples = color_attachments
            .first()
            .or(depth_attachment.as_ref())
            .map(|attachment| attachment.view.samples())
            .unwrap_or(vk::SampleCountFlags::TYPE_1);
        let inheritance_rendering = vk::CommandBufferInheritanceRenderingInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_INHERITANCE_RENDERING_INFO,
            p_next: ptr::null(),
            flags: vk::RenderingFlags::empty(),
            view_mask: 0,
            color_attachment_count: color_formats.len() as u32,
            p_color_attachment_formats: color_formats.as_ptr(),
            depth_attachment_format: depth_attachment
                .as_ref()
                .map(|attachment| attachment.view.format())
                .unwrap_or(vk::Format::UNDEFINED),
            stencil_attachment_format: vk::Format::UNDEFINED,
            rasterization_samples: samples,
        };
        let inheritance = vk::CommandBufferInheritanceInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_INHERITANCE_INFO,
            p_next: &inheritance_rendering as *const _ as *const c_void,
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            framebuffer: vk::Framebuffer::null(),
            occlusion_query_enable: vk::FALSE,
            query_flags: vk::QueryControlFlags::empty(),
            pipeline_statistics: vk::QueryPipelineStatisticFlags::empty(),
        };
        let begin_info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            p_next: ptr::null(),
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
            p_inheritance_info: &inheritance,
        };
        unsafe {
            self.device.begin_command_buffer(secondary, &begin_info)?;
        }

        self.scope = Some(RenderScopeState {
            render_area,
            color_attachments,
            depth_attachment,
            secondary,
        });
        self.state = RecordState::Rendering;
        Ok(())
    }

    /// Leave the current render scope: end the secondary command buffer,
    /// record the scope's accumulated barrier on the primary, then open the
    /// render pass on the primary and execute the secondary inside it.
    pub fn end_rendering(&mut self) -> Result<()> {
        self.expect_record_state(RecordState::Rendering);
        let Some(scope) = self.scope.take() else {
            panic!("not inside a render scope")
        };

        unsafe {
            self.device.end_command_buffer(scope.secondary)?;
        }

        // Back in Recording: the scope's barrier goes onto the primary before
        // the render pass opens.
        self.state = RecordState::Recording;
        self.flush_barriers();

        let map_attachment = |attachment: &RenderingAttachment| vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            p_next: ptr::null(),
            image_view: unsafe { attachment.view.handle() },
            image_layout: attachment.layout,
            resolve_mode: vk::ResolveModeFlags::NONE,
            resolve_image_view: vk::ImageView::null(),
            resolve_image_layout: vk::ImageLayout::UNDEFINED,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            clear_value: attachment.clear_value,
        };
        let color_attachments = scope.color_attachments.iter().map(map_attachment).collect::<Vec<_>>();
        let depth_attachment = scope.depth_attachment.as_ref().map(map_attachment);
        let info = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            p_next: ptr::null(),
            flags: vk::RenderingFlags::CONTENTS_SECONDARY_COMMAND_BUFFERS,
            render_area: scope.render_area,
            layer_count: 1,
            view_mask: 0,
            color_attachment_count: color_attachments.len() as u32,
            p_color_attachments: color_attachments.as_ptr(),
            p_depth_attachment: match &depth_attachment {
                Some(attachment) => attachment,
                None => ptr::null(),
            },
            p_stencil_attachment: ptr::null(),
        };

        unsafe {
            self.device.cmd_begin_rendering(self.pool.primary(), &info);
            self.device.cmd_execute_commands(self.pool.primary(), slice::from_ref(&scope.secondary));
            self.device.cmd_end_rendering(self.pool.primary());
        }
        // The secondary stays owned by the pool until the next reset.
        Ok(())
    }
}
