//! Provides utilities to manage [`VkImage`](vk::Image) and [`VkImageView`](vk::ImageView) objects.
//!
//! # Images
//!
//! Images are managed through the [`Image`] struct. These images are usually backed by a memory allocation,
//! except when they are swapchain images managed by the OS.
//!
//! # Identity
//!
//! Every image gets a process-unique [`ResourceId`] at construction, carried by its [`ImageHandle`].
//! The state trackers key on this id, so destroying an image and creating a new one that happens to
//! reuse the same `VkImage` handle value can never alias tracked state. When an image is destroyed,
//! [`Context::on_resource_deletion`](crate::core::context::Context::on_resource_deletion) must be told.
//!
//! # Image views
//!
//! Using [`Image::view`] you can create an [`ImageView`] over a mip/layer range. Note that [`ImageView`]
//! is in fact an `Arc<ImgView>`. An [`ImgView`] owns a full Vulkan resource, so we wrap it in a
//! reference-counted `Arc` so it can be treated as a cheap value. The view copies everything the rest of
//! the system needs to know about its image (identity, shape, format, aspect), so it never has to reach
//! back into the [`Image`] it was created from.

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::allocator::{Allocation, Allocator, DefaultAllocator, MemoryType};
use crate::core::device::Device;
use crate::sync::state::ResourceId;

/// Identity and subresource shape of an image as seen by the state trackers.
/// This is a plain value and can be copied around freely.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    id: ResourceId,
    raw: vk::Image,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    array_layers: u32,
}

impl ImageHandle {
    /// Build an image handle around a raw `VkImage` not owned by deimos, assigning it a fresh
    /// resource id. The caller is responsible for only building one handle per underlying image,
    /// otherwise the trackers will treat the copies as distinct resources.
    pub fn from_raw_parts(raw: vk::Image, aspect: vk::ImageAspectFlags, mip_levels: u32, array_layers: u32) -> Self {
        Self {
            id: ResourceId::new(),
            raw,
            aspect,
            mip_levels,
            array_layers,
        }
    }

    /// The tracker identity of this image.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image's state may put the system into an undefined state.
    pub unsafe fn raw(&self) -> vk::Image {
        self.raw
    }

    /// Get the image aspect, derived from the image format at construction.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Get the number of mip levels in the image.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Get the number of array layers in the image.
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// The subresource range covering the whole image.
    pub fn whole_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

/// Derive the aspect mask from an image format. Combined depth/stencil formats map to both aspects;
/// separate depth and stencil transitions are not supported.
pub fn aspect_from_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Settings that describe how an image should be created
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageCreateInfo {
    /// Width in pixels of the image
    pub width: u32,
    /// Height in pixels of the image
    pub height: u32,
    /// Depth in pixels of the image, set to 1 for 2D images.
    pub depth: u32,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// Pixel format of the image
    pub format: vk::Format,
    /// MSAA samples
    pub samples: vk::SampleCountFlags,
    /// Number of mip levels. Set to 1 if not using mipmapping
    pub mip_levels: u32,
    /// Number of array layers. Set to 1 for non-array textures.
    pub layers: u32,
    /// Where the backing memory should live. Almost always [`MemoryType::GpuOnly`].
    pub memory_type: MemoryType,
}

/// Abstraction over a [`VkImage`](vk::Image). Stores information about size, format, etc. Additionally couples
/// the image data together with a memory allocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: ImageHandle,
    /// GPU memory allocation. If this is None, then the image is not owned by our system (for
    /// example a swapchain image) and should not be destroyed.
    #[derivative(Debug = "ignore")]
    memory: Option<A::Allocation>,
    format: vk::Format,
    size: vk::Extent3D,
    samples: vk::SampleCountFlags,
}

unsafe impl<A: Allocator> Send for Image<A> {}

unsafe impl<A: Allocator> Sync for Image<A> {}

impl<A: Allocator> Image<A> {
    /// Create a new [`VkImage`](vk::Image) and allocate memory for it.
    pub fn new(device: Device, alloc: &mut A, info: ImageCreateInfo) -> Result<Self> {
        let image_type = if info.height == 1 && info.depth == 1 {
            vk::ImageType::TYPE_1D
        } else if info.depth > 1 {
            vk::ImageType::TYPE_3D
        } else if info.height > 1 {
            vk::ImageType::TYPE_2D
        } else {
            anyhow::bail!("Image extents invalid");
        };

        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: info.depth,
        };
        let handle = unsafe {
            device.create_image(
                &vk::ImageCreateInfo {
                    s_type: vk::StructureType::IMAGE_CREATE_INFO,
                    p_next: std::ptr::null(),
                    flags: Default::default(),
                    image_type,
                    format: info.format,
                    extent,
                    mip_levels: info.mip_levels,
                    array_layers: info.layers,
                    samples: info.samples,
                    tiling: vk::ImageTiling::OPTIMAL,
                    usage: info.usage,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    queue_family_index_count: 0,
                    p_queue_family_indices: std::ptr::null(),
                    initial_layout: vk::ImageLayout::UNDEFINED,
                },
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:?}");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let memory = alloc.allocate("image_", &requirements, info.memory_type)?;
        unsafe {
            device.bind_image_memory(handle, memory.memory(), memory.offset())?;
        }

        Ok(Self {
            handle: ImageHandle::from_raw_parts(handle, aspect_from_format(info.format), info.mip_levels, info.layers),
            device,
            memory: Some(memory),
            format: info.format,
            size: extent,
            samples: info.samples,
        })
    }

    /// Wrap an image owned by an external manager (such as the swapchain). The returned image
    /// will not destroy the underlying `VkImage` on drop.
    pub(crate) fn new_managed(
        device: Device,
        handle: vk::Image,
        format: vk::Format,
        size: vk::Extent3D,
        layers: u32,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            handle: ImageHandle::from_raw_parts(handle, aspect_from_format(format), mip_levels, layers),
            device,
            memory: None,
            format,
            size,
            samples,
        }
    }

    /// Construct an [`ImageView`] over the given mip and layer range. Passing `None` for a count
    /// selects the remainder of the range.
    pub fn view(
        &self,
        base_mip_level: u32,
        level_count: Option<u32>,
        base_layer: u32,
        layer_count: Option<u32>,
    ) -> Result<ImageView> {
        let view_type = if self.size.height == 1 && self.size.depth == 1 {
            vk::ImageViewType::TYPE_1D
        } else if self.size.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else {
            vk::ImageViewType::TYPE_2D
        };

        let range = vk::ImageSubresourceRange {
            aspect_mask: self.handle.aspect(),
            base_mip_level,
            level_count: match level_count {
                Some(count) => count,
                None => self.handle.mip_levels() - base_mip_level,
            },
            base_array_layer: base_layer,
            layer_count: match layer_count {
                Some(count) => count,
                None => self.handle.array_layers() - base_layer,
            },
        };

        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: Default::default(),
            image: unsafe { self.handle.raw() },
            view_type,
            format: self.format,
            components: vk::ComponentMapping::default(),
            subresource_range: range,
        };

        let view_handle = unsafe { self.device.create_image_view(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {view_handle:?}");
        Ok(ImageView(Arc::new(ImgView {
            device: self.device.clone(),
            handle: view_handle,
            image: self.handle,
            format: self.format,
            samples: self.samples,
            size: self.size,
            base_level: range.base_mip_level,
            level_count: range.level_count,
            base_layer: range.base_array_layer,
            layer_count: range.layer_count,
        })))
    }

    /// Construct a trivial [`ImageView`] that views the whole image.
    pub fn whole_view(&self) -> Result<ImageView> {
        self.view(0, None, 0, None)
    }

    /// The tracker identity of this image. This is a cheap copyable value.
    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    /// Whether this image resource is owned by the application or an external manager (such as the swapchain).
    pub fn is_owned(&self) -> bool {
        self.memory.is_some()
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the image size
    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    /// Get the image width
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Get the image height
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Get the number of MSAA samples for this image.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl<A: Allocator> Drop for Image<A> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImage {:?}", unsafe { self.handle.raw() });
        if self.is_owned() {
            unsafe {
                self.device.destroy_image(self.handle.raw(), None);
            }
        }
    }
}

/// Abstraction over a [`VkImageView`](vk::ImageView). Most functions operating on images expect these
/// instead of raw owning [`Image`] structs. Image views refer to one or more array layers or mip levels
/// of an image, and copy the identity and shape data they need at creation instead of holding a
/// reference back to their image.
#[derive(Derivative)]
#[derivative(Debug, Hash, PartialEq, Eq)]
pub struct ImgView {
    #[derivative(Debug = "ignore")]
    #[derivative(Hash = "ignore")]
    #[derivative(PartialEq = "ignore")]
    device: Device,
    handle: vk::ImageView,
    image: ImageHandle,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    size: vk::Extent3D,
    base_level: u32,
    level_count: u32,
    base_layer: u32,
    layer_count: u32,
}

/// Reference-counted version of [`ImgView`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ImageView(pub Arc<ImgView>);

impl Deref for ImageView {
    type Target = Arc<ImgView>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

unsafe impl Send for ImageView {}

unsafe impl Sync for ImageView {}

impl ImgView {
    /// Returns the subresource range of the original image that this image view covers.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.image.aspect(),
            base_mip_level: self.base_level,
            level_count: self.level_count,
            base_array_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }

    /// Get unsafe access to the underlying `VkImageView` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image view's state may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ImageView {
        self.handle
    }

    /// The tracker identity and shape of the viewed image.
    pub fn image(&self) -> ImageHandle {
        self.image
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the number of MSAA samples of the viewed image.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Get the image size
    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    /// Get the image width
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Get the image height
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Get the first mip level this view was made from
    pub fn base_level(&self) -> u32 {
        self.base_level
    }

    /// Get the number of mip levels this view was made from
    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Get the first layer this view was made from
    pub fn base_layer(&self) -> u32 {
        self.base_layer
    }

    /// Get the number of layers this view was made from
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }
}

impl Drop for ImgView {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {:?}", self.handle);
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}
