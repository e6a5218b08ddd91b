//! The deimos context: one explicit environment value holding everything the
//! library needs, threaded through every call instead of living in globals.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocator::{DefaultAllocator, MemoryType};
use crate::command_buffer::SyncCommandBuffer;
use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::queue::Queue;
use crate::descriptor::pool::DynamicDescriptorPool;
use crate::descriptor::set::{write_set, Binding, DescriptorSet};
use crate::descriptor::set_layout::{DescriptorLayoutId, DescriptorSetLayoutCache, DescriptorSetLayoutInfo};
use crate::resource::buffer::Buffer;
use crate::resource::image::{Image, ImageCreateInfo};
use crate::shader::{ShaderProgramId, ShaderProgramInfo, ShaderProgramManager};
use crate::sync::queue_tracker::QueueTracker;
use crate::sync::state::ResourceId;

/// Everything needed to build a [`Context`]. The instance, physical device,
/// device and queue come from the application's loader; deimos does not create
/// or destroy them.
pub struct ContextCreateInfo {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    /// Ring size of the descriptor pool and the intended number of frames in
    /// flight.
    pub frames_in_flight: u32,
}

/// The process environment of the library: device, queue, allocator, the
/// descriptor layout cache, the shader program registry, the per-frame
/// descriptor pool and the queue state tracker. Single-threaded per instance;
/// the shared pieces are behind mutexes only so command buffers can hold on to
/// them.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Context {
    #[derivative(Debug = "ignore")]
    device: Device,
    queue: Queue,
    #[derivative(Debug = "ignore")]
    allocator: DefaultAllocator,
    #[derivative(Debug = "ignore")]
    set_layouts: Arc<Mutex<DescriptorSetLayoutCache>>,
    #[derivative(Debug = "ignore")]
    programs: Arc<Mutex<ShaderProgramManager>>,
    #[derivative(Debug = "ignore")]
    descriptor_pool: Arc<Mutex<DynamicDescriptorPool>>,
    #[derivative(Debug = "ignore")]
    queue_tracker: Arc<Mutex<QueueTracker>>,
    frames_in_flight: u32,
}

impl Context {
    /// Build a context over externally created Vulkan objects.
    pub fn new(info: ContextCreateInfo) -> Result<Self> {
        let allocator = DefaultAllocator::new(&info.instance, &info.device, info.physical_device)?;
        let device = Device::new(info.device);
        let queue = Queue::new(device.clone(), info.queue, info.queue_family_index);
        let set_layouts = Arc::new(Mutex::new(DescriptorSetLayoutCache::new(device.clone())));
        let descriptor_pool = Arc::new(Mutex::new(DynamicDescriptorPool::new(device.clone(), info.frames_in_flight)?));

        Ok(Self {
            device,
            queue,
            allocator,
            set_layouts,
            programs: Arc::new(Mutex::new(ShaderProgramManager::new())),
            descriptor_pool,
            queue_tracker: Arc::new(Mutex::new(QueueTracker::new())),
            frames_in_flight: info.frames_in_flight,
        })
    }

    /// The wrapped device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The universal queue.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The number of frames in flight this context was configured for.
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// The queue state tracker.
    pub fn queue_tracker(&self) -> &Arc<Mutex<QueueTracker>> {
        &self.queue_tracker
    }

    /// Create an image backed by allocated memory.
    pub fn create_image(&mut self, info: ImageCreateInfo) -> Result<Image> {
        Image::new(self.device.clone(), &mut self.allocator, info)
    }

    /// Create a buffer backed by allocated memory.
    pub fn create_buffer(&mut self, size: vk::DeviceSize, usage: vk::BufferUsageFlags, memory_type: MemoryType) -> Result<Buffer> {
        Buffer::new(self.device.clone(), &mut self.allocator, size, usage, memory_type)
    }

    /// Signal that a resource is about to be destroyed. The queue tracker
    /// drops its state for it; without this call the tracker would retain
    /// dangling metadata.
    pub fn on_resource_deletion(&self, id: ResourceId) -> Result<()> {
        self.queue_tracker
            .lock()
            .map_err(|_| Error::PoisonError)?
            .on_resource_deletion(id);
        Ok(())
    }

    /// Intern a descriptor set layout, returning its id.
    pub fn get_or_create_set_layout(&self, info: &DescriptorSetLayoutInfo) -> Result<DescriptorLayoutId> {
        self.set_layouts
            .lock()
            .map_err(|_| Error::PoisonError)?
            .get_or_create(info)
    }

    /// Register a shader program's metadata under a unique name.
    pub fn register_shader_program(&self, name: impl Into<String>, info: ShaderProgramInfo) -> Result<ShaderProgramId> {
        Ok(self.programs.lock().map_err(|_| Error::PoisonError)?.register(name, info))
    }

    /// Look up a registered shader program by name.
    pub fn shader_program(&self, name: &str) -> Result<ShaderProgramId> {
        self.programs.lock().map_err(|_| Error::PoisonError)?.by_name(name)
    }

    /// Allocate a descriptor set from the current frame pool and write its
    /// bindings. The set stays valid for [`Self::frames_in_flight`] calls to
    /// [`Self::flip_descriptor_pool`].
    pub fn create_descriptor_set(&self, layout: DescriptorLayoutId, bindings: Vec<Binding>) -> Result<DescriptorSet> {
        let layouts = self.set_layouts.lock().map_err(|_| Error::PoisonError)?;
        let mut pool = self.descriptor_pool.lock().map_err(|_| Error::PoisonError)?;
        let set = pool.allocate(&layouts, layout, bindings)?;
        write_set(&self.device, &layouts, &set);
        Ok(set)
    }

    /// Whether a descriptor set is still alive.
    pub fn is_set_valid(&self, set: &DescriptorSet) -> Result<bool> {
        Ok(self.descriptor_pool.lock().map_err(|_| Error::PoisonError)?.is_set_valid(set))
    }

    /// Advance the descriptor pool ring. Call once per frame boundary; sets
    /// allocated [`Self::frames_in_flight`] flips ago become invalid.
    pub fn flip_descriptor_pool(&self) -> Result<()> {
        self.descriptor_pool.lock().map_err(|_| Error::PoisonError)?.flip()
    }

    /// Throw away all descriptor layouts, shader program metadata and
    /// descriptor sets. Call when the shader toolchain reloads its programs;
    /// afterwards the caller re-interns its layouts, re-registers its programs
    /// and re-creates its pipelines, since every previously returned id is
    /// invalidated.
    pub fn reload_shaders(&self) -> Result<()> {
        self.set_layouts.lock().map_err(|_| Error::PoisonError)?.clear();
        self.programs.lock().map_err(|_| Error::PoisonError)?.clear();
        self.descriptor_pool.lock().map_err(|_| Error::PoisonError)?.destroy_all()
    }

    /// Create a [`SyncCommandBuffer`] recording on the universal queue.
    pub fn create_command_buffer(&self) -> Result<SyncCommandBuffer> {
        SyncCommandBuffer::new(
            self.device.clone(),
            self.queue.family_index(),
            self.programs.clone(),
            self.set_layouts.clone(),
            self.queue_tracker.clone(),
        )
    }

    /// Wait for the device to go idle, then drop all tracked stage and access
    /// bits on the queue tracker.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()?;
        self.queue_tracker.lock().map_err(|_| Error::PoisonError)?.on_wait();
        Ok(())
    }
}
