//! GPU memory allocation. The [`DefaultAllocator`] forwards to the
//! `gpu_allocator` crate; a custom allocator can be plugged in by implementing
//! the [`Allocator`] trait.

pub mod default_allocator;
pub mod memory_type;
pub mod traits;

pub use default_allocator::DefaultAllocator;
pub use memory_type::MemoryType;
pub use traits::{Allocation, Allocator};
