//! Descriptor set management: the interned layout cache, the per-frame dynamic
//! pool with generation-based validity, and the descriptor set type together
//! with its translation into tracker state requests.

pub mod pool;
pub mod set;
pub mod set_layout;

pub use pool::{generation_alive, DynamicDescriptorPool};
pub use set::{write_set, Binding, BindingResource, BufferBinding, DescriptorSet, ImageBinding};
pub use set_layout::{BindingInfo, DescriptorLayoutId, DescriptorSetLayoutCache, DescriptorSetLayoutInfo, MAX_DESCRIPTOR_BINDINGS};
