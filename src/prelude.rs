//! Import all commonly used deimos types at once.

pub use anyhow::Result;
pub use ash::vk;

pub use crate::allocator::{Allocator, DefaultAllocator, MemoryType};
pub use crate::command_buffer::{RecordState, RenderScope, RenderingAttachment, SyncCommandBuffer};
pub use crate::core::{Context, ContextCreateInfo, Device, Error, Queue};
pub use crate::descriptor::{Binding, BindingInfo, BufferBinding, DescriptorSet, DescriptorSetLayoutInfo, ImageBinding};
pub use crate::resource::{Buffer, BufferHandle, BufferView, Image, ImageCreateInfo, ImageHandle, ImageView};
pub use crate::shader::{ShaderProgramId, ShaderProgramInfo};
pub use crate::sync::{BufferState, Fence, Semaphore, SubresourceState};
pub use crate::wsi::{SimpleSubmitContext, SurfaceSupport, SwapchainState};
