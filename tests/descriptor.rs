//! Tests for descriptor pool generations, layout interning keys and the
//! shader program registry. Everything here is pure over handle values.

use ash::vk;

use deimos::{generation_alive, BindingInfo, DescriptorSetLayoutInfo, ShaderProgramInfo, ShaderProgramManager};

fn uniform_binding(stage_flags: vk::ShaderStageFlags) -> BindingInfo {
    BindingInfo {
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags,
    }
}

#[test]
pub fn set_becomes_invalid_after_exactly_ring_size_flips() {
    const RING_SIZE: u32 = 2;
    // A set allocated at flip count 0.
    let generation = 0;

    assert!(generation_alive(generation, RING_SIZE, 0));
    assert!(generation_alive(generation, RING_SIZE, 1), "still alive one flip later");
    assert!(
        !generation_alive(generation, RING_SIZE, 2),
        "the pool the set came from is reset on the second flip"
    );
    assert!(!generation_alive(generation, RING_SIZE, 3));
}

#[test]
pub fn generation_validity_tracks_allocation_time() {
    const RING_SIZE: u32 = 3;
    // Sets allocated in consecutive frames expire in consecutive frames.
    for generation in 0..8u64 {
        assert!(generation_alive(generation, RING_SIZE, generation));
        assert!(generation_alive(generation, RING_SIZE, generation + RING_SIZE as u64 - 1));
        assert!(!generation_alive(generation, RING_SIZE, generation + RING_SIZE as u64));
    }
}

#[test]
pub fn equal_binding_tables_intern_equally() {
    let first = DescriptorSetLayoutInfo::new()
        .with_binding(0, uniform_binding(vk::ShaderStageFlags::VERTEX))
        .with_binding(
            1,
            BindingInfo {
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
            },
        );
    // Same table declared in the opposite order.
    let second = DescriptorSetLayoutInfo::new()
        .with_binding(
            1,
            BindingInfo {
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
            },
        )
        .with_binding(0, uniform_binding(vk::ShaderStageFlags::VERTEX));

    assert_eq!(first, second, "declaration order must not matter for interning");

    let different_stages = DescriptorSetLayoutInfo::new()
        .with_binding(0, uniform_binding(vk::ShaderStageFlags::FRAGMENT))
        .with_binding(
            1,
            BindingInfo {
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
            },
        );
    assert_ne!(first, different_stages, "stage visibility is part of the layout identity");
}

#[test]
pub fn layout_info_reports_declared_slots() {
    let info = DescriptorSetLayoutInfo::new().with_binding(3, uniform_binding(vk::ShaderStageFlags::COMPUTE));

    assert!(info.is_binding_used(3));
    assert!(!info.is_binding_used(0));
    assert!(!info.is_binding_used(100));
    assert_eq!(info.binding(3).unwrap().descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(info.bindings().count(), 1);
}

#[test]
#[should_panic(expected = "declared twice")]
pub fn declaring_a_slot_twice_panics() {
    let _ = DescriptorSetLayoutInfo::new()
        .with_binding(0, uniform_binding(vk::ShaderStageFlags::VERTEX))
        .with_binding(0, uniform_binding(vk::ShaderStageFlags::FRAGMENT));
}

#[test]
#[should_panic(expected = "out of range")]
pub fn out_of_range_slot_panics() {
    let _ = DescriptorSetLayoutInfo::new().with_binding(32, uniform_binding(vk::ShaderStageFlags::VERTEX));
}

#[test]
pub fn shader_programs_are_found_by_name() {
    let mut programs = ShaderProgramManager::new();
    let id = programs.register(
        "tonemap",
        ShaderProgramInfo {
            pipeline_layout: vk::PipelineLayout::null(),
            push_constants: Some(vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: 16,
            }),
            set_layouts: Vec::new(),
        },
    );

    assert_eq!(programs.by_name("tonemap").unwrap(), id);
    assert_eq!(programs.info(id).push_constants.unwrap().size, 16);
    assert!(programs.by_name("bloom").is_err());
}

#[test]
#[should_panic(expected = "registered twice")]
pub fn duplicate_program_names_panic() {
    let mut programs = ShaderProgramManager::new();
    let info = ShaderProgramInfo {
        pipeline_layout: vk::PipelineLayout::null(),
        push_constants: None,
        set_layouts: Vec::new(),
    };
    programs.register("tonemap", info.clone());
    programs.register("tonemap", info);
}
