//! Content-addressed cache of descriptor set layouts.
//!
//! Layouts are interned: two layouts described by the same binding table share
//! one `VkDescriptorSetLayout` and one [`DescriptorLayoutId`]. The id is what
//! the rest of the system stores and passes around.

use std::collections::HashMap;
use std::ptr;

use anyhow::Result;
use ash::vk;

use crate::core::device::Device;

/// Highest descriptor binding slot (exclusive) a set layout may use.
pub const MAX_DESCRIPTOR_BINDINGS: usize = 32;

/// One binding slot of a descriptor set layout, as consumed from shader-program
/// metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BindingInfo {
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

/// Describes a full descriptor set layout as a table of binding slots. This is
/// the interning key of the [`DescriptorSetLayoutCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutInfo {
    bindings: [Option<BindingInfo>; MAX_DESCRIPTOR_BINDINGS],
}

impl DescriptorSetLayoutInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding slot. Declaring the same slot twice is a programmer error.
    pub fn add_binding(&mut self, slot: u32, info: BindingInfo) {
        assert!(
            (slot as usize) < MAX_DESCRIPTOR_BINDINGS,
            "descriptor binding slot {slot} out of range"
        );
        let binding = &mut self.bindings[slot as usize];
        assert!(binding.is_none(), "descriptor binding slot {slot} declared twice");
        *binding = Some(info);
    }

    /// Builder-style version of [`Self::add_binding`].
    pub fn with_binding(mut self, slot: u32, info: BindingInfo) -> Self {
        self.add_binding(slot, info);
        self
    }

    /// Whether a binding slot is declared by this layout.
    pub fn is_binding_used(&self, slot: u32) -> bool {
        (slot as usize) < MAX_DESCRIPTOR_BINDINGS && self.bindings[slot as usize].is_some()
    }

    /// Look up a binding slot.
    pub fn binding(&self, slot: u32) -> Option<&BindingInfo> {
        self.bindings.get(slot as usize).and_then(|binding| binding.as_ref())
    }

    /// Iterate over the declared binding slots in slot order.
    pub fn bindings(&self) -> impl Iterator<Item = (u32, &BindingInfo)> {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(slot, binding)| binding.as_ref().map(|binding| (slot as u32, binding)))
    }

    fn vk_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings()
            .map(|(slot, binding)| vk::DescriptorSetLayoutBinding {
                binding: slot,
                descriptor_type: binding.descriptor_type,
                descriptor_count: binding.descriptor_count,
                stage_flags: binding.stage_flags,
                p_immutable_samplers: ptr::null(),
            })
            .collect()
    }
}

/// Identifies one interned descriptor set layout. Comparing two ids compares
/// the layouts they stand for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorLayoutId(u32);

/// Content-addressed cache of `VkDescriptorSetLayout` objects.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSetLayoutCache {
    #[derivative(Debug = "ignore")]
    device: Device,
    layouts: Vec<(DescriptorSetLayoutInfo, vk::DescriptorSetLayout)>,
    lookup: HashMap<DescriptorSetLayoutInfo, DescriptorLayoutId>,
}

impl DescriptorSetLayoutCache {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            layouts: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Look up the id for a layout description, creating the underlying
    /// `VkDescriptorSetLayout` if this is the first time it is seen.
    pub fn get_or_create(&mut self, info: &DescriptorSetLayoutInfo) -> Result<DescriptorLayoutId> {
        if let Some(id) = self.lookup.get(info) {
            return Ok(*id);
        }

        let bindings = info.vk_bindings();
        let create_info = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            p_next: ptr::null(),
            flags: Default::default(),
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
        };
        let handle = unsafe { self.device.create_descriptor_set_layout(&create_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {handle:?}");

        let id = DescriptorLayoutId(self.layouts.len() as u32);
        self.layouts.push((info.clone(), handle));
        self.lookup.insert(info.clone(), id);
        Ok(id)
    }

    /// Get the raw layout handle for an id. Passing an id from before a
    /// [`clear`](Self::clear) is a programmer error.
    pub fn vk_layout(&self, id: DescriptorLayoutId) -> vk::DescriptorSetLayout {
        self.layouts
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("descriptor layout id {id:?} is stale"))
            .1
    }

    /// Get the binding table for an id.
    pub fn layout_info(&self, id: DescriptorLayoutId) -> &DescriptorSetLayoutInfo {
        &self
            .layouts
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("descriptor layout id {id:?} is stale"))
            .0
    }

    /// Destroy all cached layouts, invalidating every previously returned id.
    /// Used by shader reloads; callers must re-intern their layouts afterwards.
    pub fn clear(&mut self) {
        for (_, handle) in self.layouts.drain(..) {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkDescriptorSetLayout {handle:?}");
            unsafe {
                self.device.destroy_descriptor_set_layout(handle, None);
            }
        }
        self.lookup.clear();
    }
}

impl Drop for DescriptorSetLayoutCache {
    fn drop(&mut self) {
        self.clear();
    }
}
