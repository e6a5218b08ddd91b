//! Registry of shader program metadata.
//!
//! Deimos does not compile or reflect shaders; a shader toolchain collaborator
//! supplies, per program, the pipeline layout, the push constant range and the
//! interned descriptor set layouts. The recording layer only ever consumes
//! this metadata: the pipeline layout for binds and push constants, the push
//! constant range for bounds checking, and the set layout ids for validating
//! descriptor binds.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;
use crate::descriptor::set_layout::DescriptorLayoutId;

/// Identifies one registered shader program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ShaderProgramId(u32);

/// Metadata of one shader program, as supplied by the shader toolchain.
#[derive(Debug, Clone)]
pub struct ShaderProgramInfo {
    /// The program's pipeline layout. Owned by the shader toolchain.
    pub pipeline_layout: vk::PipelineLayout,
    /// The push constant range of the program, if it has one.
    pub push_constants: Option<vk::PushConstantRange>,
    /// Interned descriptor set layouts, indexed by set number.
    pub set_layouts: Vec<DescriptorLayoutId>,
}

/// Name-addressed registry of shader program metadata.
#[derive(Debug, Default)]
pub struct ShaderProgramManager {
    programs: Vec<ShaderProgramInfo>,
    names: HashMap<String, ShaderProgramId>,
}

impl ShaderProgramManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a program under a unique name. Registering the same name twice
    /// is a programmer error.
    pub fn register(&mut self, name: impl Into<String>, info: ShaderProgramInfo) -> ShaderProgramId {
        let name = name.into();
        let id = ShaderProgramId(self.programs.len() as u32);
        let previous = self.names.insert(name.clone(), id);
        assert!(previous.is_none(), "shader program `{name}` registered twice");
        self.programs.push(info);
        id
    }

    /// Look up a program's metadata. Passing an id from before a
    /// [`clear`](Self::clear) is a programmer error.
    pub fn info(&self, id: ShaderProgramId) -> &ShaderProgramInfo {
        self.programs
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("shader program id {id:?} is stale"))
    }

    /// Look up a program id by its registered name.
    pub fn by_name(&self, name: &str) -> Result<ShaderProgramId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::ProgramNotFound(name.to_string()).into())
    }

    /// Forget all programs, invalidating every previously returned id. Used by
    /// shader reloads; the caller re-registers its programs afterwards.
    pub fn clear(&mut self) {
        self.programs.clear();
        self.names.clear();
    }
}
