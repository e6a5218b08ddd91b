//! Deimos is a thin Vulkan abstraction whose core feature is automatic
//! resource state tracking: you record commands, and the library deduces and
//! records the pipeline barriers and image layout transitions they need.
//!
//! # The tracking engine
//!
//! Every image is decomposed into one cell per (mip level, array layer) pair
//! and every buffer is a single cell; see the [`sync`] module. Recording an
//! operation on a [`SyncCommandBuffer`](command_buffer::SyncCommandBuffer)
//! files *requests* describing the stages, accesses and (for images) layout
//! the operation needs, and flushes them into one batched
//! `vkCmdPipelineBarrier2` immediately before the operation itself. Across
//! submissions, a [`QueueTracker`](sync::QueueTracker) remembers where every
//! resource was left and validates that each submitted command buffer's
//! assumptions match.
//!
//! # What deimos does not do
//!
//! Instance and device setup, physical device selection, shader compilation
//! and reflection, and pipeline creation stay outside the library; the
//! [`Context`](core::Context) consumes the resulting handles and metadata.
//! Multi-queue coordination, sparse resources, separate depth/stencil aspect
//! transitions and MSAA resolve are out of scope.
//!
//! # Modules
//!
//! - [`core`]: error type, device/queue wrappers, the [`Context`](core::Context)
//!   environment.
//! - [`sync`]: the state trackers, barrier generation, fences and semaphores.
//! - [`command_buffer`]: the recording surface and render scopes.
//! - [`descriptor`]: interned set layouts, the per-frame descriptor pool,
//!   descriptor sets.
//! - [`resource`]: images, buffers and their identity values.
//! - [`allocator`]: memory allocation behind a pluggable trait.
//! - [`wsi`]: swapchain and frame pacing.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod descriptor;
pub mod prelude;
pub mod resource;
pub mod shader;
pub mod sync;
pub mod wsi;

pub use ash::vk;

pub use crate::allocator::{Allocation, Allocator, DefaultAllocator, MemoryType};
pub use crate::command_buffer::{RecordState, RenderScope, RenderingAttachment, SyncCommandBuffer};
pub use crate::core::{Context, ContextCreateInfo, Device, Error, Queue};
pub use crate::descriptor::{
    generation_alive, write_set, Binding, BindingInfo, BindingResource, BufferBinding, DescriptorLayoutId,
    DescriptorSet, DescriptorSetLayoutCache, DescriptorSetLayoutInfo, DynamicDescriptorPool, ImageBinding,
    MAX_DESCRIPTOR_BINDINGS,
};
pub use crate::resource::{
    aspect_from_format, Buffer, BufferHandle, BufferView, Image, ImageCreateInfo, ImageHandle, ImageView, ImgView,
};
pub use crate::shader::{ShaderProgramId, ShaderProgramInfo, ShaderProgramManager};
pub use crate::sync::{
    descriptor_type_to_access, is_read_access, is_write_access, shader_stage_to_pipeline_stage, BufferState,
    CmdBarrier, CmdBufferTracker, Fence, ImageState, QueueTracker, ResourceId, ResourceState, Semaphore, StateMap,
    SubresourceState,
};
pub use crate::wsi::{SimpleSubmitContext, SurfaceSupport, Swapchain, SwapchainState};
