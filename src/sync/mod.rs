//! Synchronization: the automatic state tracking and barrier generation
//! engine, plus the fence and semaphore primitives the submit path is built
//! on.
//!
//! The tracking engine has two levels. A [`CmdBufferTracker`] lives inside
//! each [`SyncCommandBuffer`](crate::command_buffer::SyncCommandBuffer) and
//! deduces the barriers to record in it; a [`QueueTracker`] carries resource
//! states across submissions and validates each command buffer's assumptions
//! when it is submitted.

pub mod access;
pub mod primitives;
pub mod queue_tracker;
pub mod state;
pub mod tracker;

pub use access::{descriptor_type_to_access, is_read_access, is_write_access, shader_stage_to_pipeline_stage};
pub use primitives::{Fence, Semaphore};
pub use queue_tracker::QueueTracker;
pub use state::{BufferState, ImageState, ResourceId, ResourceState, StateMap, SubresourceState};
pub use tracker::{CmdBarrier, CmdBufferTracker};
