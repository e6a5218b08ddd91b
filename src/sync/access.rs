//! Classification of Vulkan access masks into read and write sets, and the
//! mappings from shader stages and descriptor types to pipeline stages and
//! access masks. These tables drive the barrier generation policy in
//! [`tracker`](crate::sync::tracker).

use ash::vk;

/// All read-flavoured access bits known to the tracker.
pub const READ_ACCESS_MASK: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR.as_raw()
        | vk::AccessFlags2::INDEX_READ.as_raw()
        | vk::AccessFlags2::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags2::UNIFORM_READ.as_raw()
        | vk::AccessFlags2::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::SHADER_READ.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::TRANSFER_READ.as_raw()
        | vk::AccessFlags2::MEMORY_READ.as_raw()
        | vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_READ.as_raw(),
);

/// All write-flavoured access bits known to the tracker.
pub const WRITE_ACCESS_MASK: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
);

/// Whether an access mask contains at least one read access. Note that a mask
/// can be both a read and a write access at the same time.
pub fn is_read_access(flags: vk::AccessFlags2) -> bool {
    flags.intersects(READ_ACCESS_MASK)
}

/// Whether an access mask contains at least one write access.
pub fn is_write_access(flags: vk::AccessFlags2) -> bool {
    flags.intersects(WRITE_ACCESS_MASK)
}

/// Map shader stage flags to the pipeline stages those shaders execute in.
/// Stage bits without a shader pipeline stage (such as `ALL_GRAPHICS`) are
/// ignored.
pub fn shader_stage_to_pipeline_stage(shader_stages: vk::ShaderStageFlags) -> vk::PipelineStageFlags2 {
    const MAPPING: [(vk::ShaderStageFlags, vk::PipelineStageFlags2); 7] = [
        (vk::ShaderStageFlags::VERTEX, vk::PipelineStageFlags2::VERTEX_SHADER),
        (vk::ShaderStageFlags::FRAGMENT, vk::PipelineStageFlags2::FRAGMENT_SHADER),
        (vk::ShaderStageFlags::COMPUTE, vk::PipelineStageFlags2::COMPUTE_SHADER),
        (vk::ShaderStageFlags::GEOMETRY, vk::PipelineStageFlags2::GEOMETRY_SHADER),
        (
            vk::ShaderStageFlags::TESSELLATION_CONTROL,
            vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER,
        ),
        (
            vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER,
        ),
        (vk::ShaderStageFlags::MESH_EXT, vk::PipelineStageFlags2::MESH_SHADER_EXT),
    ];

    let mut stages = vk::PipelineStageFlags2::empty();
    for (shader_stage, pipeline_stage) in MAPPING {
        if shader_stages.contains(shader_stage) {
            stages |= pipeline_stage;
        }
    }
    stages
}

/// Map a descriptor type to the access mask a shader performs through it.
/// Storage descriptors map to both read and write access since reflection
/// information does not tell us which one the shader actually does.
pub fn descriptor_type_to_access(descriptor_type: vk::DescriptorType) -> vk::AccessFlags2 {
    match descriptor_type {
        vk::DescriptorType::SAMPLER => vk::AccessFlags2::empty(),
        vk::DescriptorType::SAMPLED_IMAGE
        | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        | vk::DescriptorType::UNIFORM_TEXEL_BUFFER => vk::AccessFlags2::SHADER_SAMPLED_READ,
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
            vk::AccessFlags2::UNIFORM_READ
        }
        vk::DescriptorType::STORAGE_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        | vk::DescriptorType::STORAGE_IMAGE
        | vk::DescriptorType::STORAGE_TEXEL_BUFFER => {
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
        }
        vk::DescriptorType::INPUT_ATTACHMENT => vk::AccessFlags2::INPUT_ATTACHMENT_READ,
        _ => vk::AccessFlags2::empty(),
    }
}
