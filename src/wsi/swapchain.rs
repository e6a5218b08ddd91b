//! Swapchain wrapper. The surface itself and the support query (formats,
//! capabilities, present support) are the application's responsibility;
//! deimos consumes the results.

use anyhow::Result;
use ash::extensions::khr;
use ash::vk;

use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::queue::Queue;
use crate::resource::image::Image;
use crate::sync::primitives::Semaphore;

/// Three-valued result of swapchain operations. `OutOfDate` means the caller
/// must recreate the swapchain before it can present again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwapchainState {
    Ok,
    Suboptimal,
    OutOfDate,
}

/// Surface properties the application queried for its surface, consumed when
/// creating a swapchain.
#[derive(Debug, Copy, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
}

/// Wrapper around a `VkSwapchainKHR` and proxy [`Image`]s for its backbuffers.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Swapchain {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<Image>,
}

impl Swapchain {
    /// Create a swapchain on `surface`. `window_extent` is used when the
    /// surface does not report a usable extent yet (this happens on Wayland
    /// before the first present). Pass the retired swapchain's handle in
    /// `old_swapchain` when recreating, null otherwise.
    pub fn new(
        device: Device,
        loader: khr::Swapchain,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let mut extent = support.capabilities.current_extent;
        if extent.width == 0 || extent.height == 0 || extent.width == u32::MAX {
            extent = window_extent;
        }

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            p_next: std::ptr::null(),
            flags: Default::default(),
            surface,
            min_image_count: support.capabilities.min_image_count,
            image_format: support.format.format,
            image_color_space: support.format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: support.capabilities.supported_usage_flags,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 0,
            p_queue_family_indices: std::ptr::null(),
            pre_transform: support.capabilities.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            // Always supported; the submit context does not expose present mode selection.
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: vk::TRUE,
            old_swapchain,
        };
        let handle = unsafe { loader.create_swapchain(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSwapchainKHR {handle:?}");

        let images = unsafe { loader.get_swapchain_images(handle)? }
            .into_iter()
            .map(|raw| {
                Image::new_managed(
                    device.clone(),
                    raw,
                    support.format.format,
                    vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    },
                    1,
                    1,
                    vk::SampleCountFlags::TYPE_1,
                )
            })
            .collect();

        Ok(Self {
            device,
            loader,
            handle,
            format: support.format,
            extent,
            images,
        })
    }

    /// Get unsafe access to the underlying `VkSwapchainKHR` handle.
    /// # Safety
    /// Presenting or acquiring through this handle bypasses backbuffer tracking.
    pub unsafe fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub(crate) fn loader(&self) -> &khr::Swapchain {
        &self.loader
    }

    /// The surface format the swapchain was created with.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// The extent of the backbuffers.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The backbuffer proxy images.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Number of backbuffers.
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Acquire the next backbuffer, signalling `semaphore` once it is ready.
    /// Returns the image index, or `None` together with
    /// [`SwapchainState::OutOfDate`] if the swapchain can no longer present.
    pub fn acquire_next_image(&self, semaphore: &Semaphore) -> Result<(Option<u32>, SwapchainState)> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore.handle(), vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok((Some(index), SwapchainState::Ok)),
            Ok((index, true)) => Ok((Some(index), SwapchainState::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, SwapchainState::OutOfDate)),
            Err(err) => Err(Error::VkError(err).into()),
        }
    }

    /// Present a backbuffer, waiting on `wait` before presentation.
    pub fn present(&self, queue: &Queue, index: u32, wait: &Semaphore) -> Result<SwapchainState> {
        let wait_semaphore = unsafe { wait.handle() };
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            p_next: std::ptr::null(),
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait_semaphore,
            swapchain_count: 1,
            p_swapchains: &self.handle,
            p_image_indices: &index,
            p_results: std::ptr::null_mut(),
        };
        let result = unsafe { self.loader.queue_present(queue.handle(), &info) };
        match result {
            Ok(false) => Ok(SwapchainState::Ok),
            Ok(true) => Ok(SwapchainState::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainState::OutOfDate),
            Err(err) => Err(Error::VkError(err).into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSwapchainKHR {:?}", self.handle);
        // The backbuffer images are proxies and do not destroy themselves.
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}
