//! Descriptor sets and their bindings.
//!
//! A [`DescriptorSet`] remembers the bindings it was created with. Besides
//! feeding the batched descriptor write in [`write_set`], the bindings are
//! what lets [`DescriptorSet::request_states`] translate "this set is bound
//! with these shader stages" into tracker state requests: the descriptor type
//! determines the access mask, the binding's stage visibility determines the
//! pipeline stages, and image bindings carry the layout the shader expects.

use ash::vk;

use crate::core::device::Device;
use crate::descriptor::set_layout::{DescriptorLayoutId, DescriptorSetLayoutCache, MAX_DESCRIPTOR_BINDINGS};
use crate::resource::buffer::BufferView;
use crate::resource::image::ImageView;
use crate::sync::access::{descriptor_type_to_access, shader_stage_to_pipeline_stage};
use crate::sync::state::{BufferState, SubresourceState};
use crate::sync::tracker::CmdBufferTracker;

/// An image bound to a descriptor slot.
#[derive(Debug, Clone)]
pub struct ImageBinding {
    pub view: ImageView,
    /// The layout the image will be in while shaders access it through this binding.
    pub layout: vk::ImageLayout,
    /// Sampler for combined image samplers and sampler bindings; null otherwise.
    pub sampler: vk::Sampler,
}

/// A buffer range bound to a descriptor slot.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    pub buffer: BufferView,
}

/// The resource carried by one binding.
#[derive(Debug, Clone)]
pub enum BindingResource {
    Image(ImageBinding),
    Buffer(BufferBinding),
}

/// One descriptor bound to a slot (and array element) of a set.
#[derive(Debug, Clone)]
pub struct Binding {
    pub binding: u32,
    pub array_element: u32,
    pub resource: BindingResource,
}

impl Binding {
    /// Bind an image to a slot.
    pub fn image(binding: u32, info: ImageBinding) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: BindingResource::Image(info),
        }
    }

    /// Bind a buffer range to a slot.
    pub fn buffer(binding: u32, info: BufferBinding) -> Self {
        Self {
            binding,
            array_element: 0,
            resource: BindingResource::Buffer(info),
        }
    }
}

/// A descriptor set allocated from the
/// [`DynamicDescriptorPool`](crate::descriptor::pool::DynamicDescriptorPool).
/// Immutable after creation; sets live until their frame pool is reset, so
/// they must not be kept across more frames than the pool ring has entries.
/// Validity can always be checked in O(1) through
/// [`DynamicDescriptorPool::is_set_valid`](crate::descriptor::pool::DynamicDescriptorPool::is_set_valid).
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    generation: u64,
    layout: DescriptorLayoutId,
    handle: vk::DescriptorSet,
    bindings: Vec<Binding>,
}

impl DescriptorSet {
    pub(crate) fn new(generation: u64, layout: DescriptorLayoutId, handle: vk::DescriptorSet, bindings: Vec<Binding>) -> Self {
        Self {
            generation,
            layout,
            handle,
            bindings,
        }
    }

    /// The pool flip count at which this set was allocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The interned layout this set was allocated with.
    pub fn layout_id(&self) -> DescriptorLayoutId {
        self.layout
    }

    /// Get unsafe access to the underlying `VkDescriptorSet` handle.
    /// # Safety
    /// The handle dangles once the owning frame pool has been reset.
    pub unsafe fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// The bindings this set was created with.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// File a state request for every resource bound in this set: image
    /// bindings request their subresource range at the binding's layout,
    /// buffer bindings request stage/access only. Stages come from the layout
    /// slot's shader stage visibility, accesses from its descriptor type.
    pub fn request_states(&self, layouts: &DescriptorSetLayoutCache, tracker: &mut CmdBufferTracker) {
        let layout_info = layouts.layout_info(self.layout);
        for binding in &self.bindings {
            let Some(slot) = layout_info.binding(binding.binding) else {
                panic!("descriptor set has no slot {}", binding.binding)
            };
            let stages = shader_stage_to_pipeline_stage(slot.stage_flags);
            let accesses = descriptor_type_to_access(slot.descriptor_type);

            match &binding.resource {
                BindingResource::Image(image) => {
                    tracker.request_image_range(
                        &image.view.image(),
                        image.view.subresource_range(),
                        SubresourceState {
                            stages,
                            accesses,
                            layout: image.layout,
                        },
                    );
                }
                BindingResource::Buffer(buffer) => {
                    tracker.request_buffer(
                        &buffer.buffer.buffer(),
                        BufferState {
                            stages,
                            accesses,
                        },
                    );
                }
            }
        }
    }
}

fn is_image_descriptor(descriptor_type: vk::DescriptorType) -> bool {
    match descriptor_type {
        vk::DescriptorType::UNIFORM_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER
        | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => false,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        | vk::DescriptorType::SAMPLED_IMAGE
        | vk::DescriptorType::STORAGE_IMAGE
        | vk::DescriptorType::SAMPLER => true,
        _ => panic!("descriptor write error: unsupported descriptor type {descriptor_type:?}"),
    }
}

/// Check that the bindings of a set exactly satisfy its layout: every declared
/// slot gets `descriptor_count` bindings and every binding carries the kind of
/// resource (image or buffer) its slot requires. Any mismatch is a programmer
/// error.
fn validate_write(layouts: &DescriptorSetLayoutCache, set: &DescriptorSet) {
    let layout_info = layouts.layout_info(set.layout_id());

    let mut unbound = [0u32; MAX_DESCRIPTOR_BINDINGS];
    for (slot, binding) in layout_info.bindings() {
        unbound[slot as usize] = binding.descriptor_count;
    }

    for binding in set.bindings() {
        let Some(slot) = layout_info.binding(binding.binding) else {
            panic!("descriptor write error: descriptor set doesn't have slot {}", binding.binding)
        };
        let image_required = is_image_descriptor(slot.descriptor_type);
        let image_bound = matches!(binding.resource, BindingResource::Image(_));
        if image_required != image_bound {
            panic!(
                "descriptor write error: slot {} requires {} but {} bound",
                binding.binding,
                if image_required { "an image" } else { "a buffer" },
                if image_bound { "an image was" } else { "a buffer was" },
            );
        }

        let count = &mut unbound[binding.binding as usize];
        assert!(
            *count > 0,
            "descriptor write error: slot {} has more bindings than descriptors",
            binding.binding
        );
        *count -= 1;
    }

    for (slot, count) in unbound.iter().enumerate() {
        assert!(
            *count == 0,
            "descriptor write error: slot {slot} has {count} unbound descriptors"
        );
    }
}

/// Write all bindings of a set to the GPU in one batched
/// [`vkUpdateDescriptorSets`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkUpdateDescriptorSets.html)
/// call, after validating them against the set's layout.
pub fn write_set(device: &Device, layouts: &DescriptorSetLayoutCache, set: &DescriptorSet) {
    validate_write(layouts, set);

    let layout_info = layouts.layout_info(set.layout_id());

    // Descriptor infos need stable addresses while the write array is alive.
    let mut image_infos = Vec::with_capacity(set.bindings().len());
    let mut buffer_infos = Vec::with_capacity(set.bindings().len());
    for binding in set.bindings() {
        match &binding.resource {
            BindingResource::Image(image) => image_infos.push(vk::DescriptorImageInfo {
                sampler: image.sampler,
                image_view: unsafe { image.view.handle() },
                image_layout: image.layout,
            }),
            BindingResource::Buffer(buffer) => buffer_infos.push(vk::DescriptorBufferInfo {
                buffer: unsafe { buffer.buffer.handle() },
                offset: buffer.buffer.offset(),
                range: buffer.buffer.size(),
            }),
        }
    }

    let mut image_index = 0;
    let mut buffer_index = 0;
    let writes = set
        .bindings()
        .iter()
        .map(|binding| {
            let slot = layout_info
                .binding(binding.binding)
                .unwrap_or_else(|| panic!("descriptor set has no slot {}", binding.binding));
            let mut write = vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                p_next: std::ptr::null(),
                dst_set: unsafe { set.handle() },
                dst_binding: binding.binding,
                dst_array_element: binding.array_element,
                descriptor_count: 1,
                descriptor_type: slot.descriptor_type,
                p_image_info: std::ptr::null(),
                p_buffer_info: std::ptr::null(),
                p_texel_buffer_view: std::ptr::null(),
            };
            match &binding.resource {
                BindingResource::Image(_) => {
                    write.p_image_info = &image_infos[image_index];
                    image_index += 1;
                }
                BindingResource::Buffer(_) => {
                    write.p_buffer_info = &buffer_infos[buffer_index];
                    buffer_index += 1;
                }
            }
            write
        })
        .collect::<Vec<_>>();

    unsafe {
        device.update_descriptor_sets(writes.as_slice(), &[]);
    }
}
