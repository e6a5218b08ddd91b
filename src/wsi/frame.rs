//! The simple submit context: frame pacing over one swapchain with a ring of
//! command buffers.
//!
//! The context owns one [`SyncCommandBuffer`] and fence per frame in flight
//! and one acquire/present semaphore pair per backbuffer. A frame looks like:
//!
//! ```text
//! let cmd = ctx.acquire_next_cmd()?;          // waits the frame's fence, resets
//! let (image, state) = ctx.acquire_backbuffer()?;
//! cmd.begin()?;
//! // ... record ...
//! cmd.end()?;
//! ctx.submit_cmd(true)?;                      // submit + present
//! ```

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::extensions::khr;
use ash::vk;

use crate::command_buffer::SyncCommandBuffer;
use crate::core::context::Context;
use crate::core::device::Device;
use crate::core::error::Error;
use crate::core::queue::Queue;
use crate::resource::image::Image;
use crate::sync::primitives::{Fence, Semaphore};
use crate::sync::queue_tracker::QueueTracker;
use crate::wsi::swapchain::{SurfaceSupport, Swapchain, SwapchainState};

/// Presentation and frame pacing built on the rest of the library. Owns the
/// swapchain, the per-frame command buffers and fences, and the per-backbuffer
/// semaphores.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SimpleSubmitContext {
    #[derivative(Debug = "ignore")]
    device: Device,
    queue: Queue,
    #[derivative(Debug = "ignore")]
    queue_tracker: Arc<Mutex<QueueTracker>>,
    surface: vk::SurfaceKHR,
    swapchain: Swapchain,
    acquire_semaphores: Vec<Semaphore>,
    present_semaphores: Vec<Semaphore>,
    semaphore_index: usize,
    cmds: Vec<SyncCommandBuffer>,
    fences: Vec<Fence>,
    cmd_index: usize,
    cmd_acquired: bool,
    current_backbuffer: Option<u32>,
}

impl SimpleSubmitContext {
    /// Build a submit context over an application-created surface. The
    /// surface stays owned by the application and must outlive this context.
    pub fn new(
        context: &Context,
        loader: khr::Swapchain,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
    ) -> Result<Self> {
        let device = context.device().clone();
        let swapchain = Swapchain::new(
            device.clone(),
            loader,
            surface,
            support,
            window_extent,
            vk::SwapchainKHR::null(),
        )?;

        let backbuffers = swapchain.image_count() as usize;
        let frames_in_flight = context.frames_in_flight() as usize;

        let cmds = (0..frames_in_flight)
            .map(|_| context.create_command_buffer())
            .collect::<Result<Vec<_>>>()?;
        let fences = (0..frames_in_flight)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            acquire_semaphores: Semaphore::ring(&device, backbuffers)?,
            present_semaphores: Semaphore::ring(&device, backbuffers)?,
            device,
            queue: context.queue().clone(),
            queue_tracker: context.queue_tracker().clone(),
            surface,
            swapchain,
            semaphore_index: 0,
            cmds,
            fences,
            cmd_index: 0,
            cmd_acquired: false,
            current_backbuffer: None,
        })
    }

    /// Number of backbuffers in the swapchain.
    pub fn backbuffer_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Number of frames in flight.
    pub fn frames_in_flight(&self) -> u32 {
        self.cmds.len() as u32
    }

    /// The swapchain this context presents to.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Acquire this frame's command buffer. Blocks until the frame's fence is
    /// signaled, then resets the command buffer back to `Initial`. Acquiring
    /// twice without submitting in between is a programmer error.
    pub fn acquire_next_cmd(&mut self) -> Result<&mut SyncCommandBuffer> {
        assert!(
            !self.cmd_acquired,
            "command buffer is already acquired; submit it before acquiring the next one"
        );

        self.fences[self.cmd_index].wait_and_reset()?;
        self.cmds[self.cmd_index].reset()?;
        self.cmd_acquired = true;
        Ok(&mut self.cmds[self.cmd_index])
    }

    /// Acquire the next backbuffer. May block on the presentation engine.
    /// Returns `None` together with [`SwapchainState::OutOfDate`] if the
    /// swapchain must be recreated first.
    pub fn acquire_backbuffer(&mut self) -> Result<(Option<&Image>, SwapchainState)> {
        assert!(self.current_backbuffer.is_none(), "backbuffer is already acquired");

        let (index, state) = self
            .swapchain
            .acquire_next_image(&self.acquire_semaphores[self.semaphore_index])?;
        match index {
            Some(index) => {
                self.current_backbuffer = Some(index);
                Ok((Some(&self.swapchain.images()[index as usize]), state))
            }
            None => Ok((None, state)),
        }
    }

    /// Submit the acquired command buffer, and present the acquired
    /// backbuffer if `present` is set. Non-blocking; completion is observed
    /// through the frame's fence on the next
    /// [`acquire_next_cmd`](Self::acquire_next_cmd) for this frame slot.
    pub fn submit_cmd(&mut self, present: bool) -> Result<SwapchainState> {
        assert!(self.cmd_acquired, "no command buffer acquired");
        assert!(
            !present || self.current_backbuffer.is_some(),
            "presentation is requested, but backbuffer is not acquired"
        );

        let (wait, signal) = if present {
            (
                Some((
                    &self.acquire_semaphores[self.semaphore_index],
                    vk::PipelineStageFlags::ALL_COMMANDS,
                )),
                Some(&self.present_semaphores[self.semaphore_index]),
            )
        } else {
            (None, None)
        };

        let fence = &self.fences[self.cmd_index];
        self.cmds[self.cmd_index].submit(&self.queue, wait, signal, fence)?;
        self.cmd_acquired = false;
        self.cmd_index = (self.cmd_index + 1) % self.cmds.len();

        if present {
            let Some(index) = self.current_backbuffer.take() else {
                unreachable!("checked above")
            };
            let state = self
                .swapchain
                .present(&self.queue, index, &self.present_semaphores[self.semaphore_index])?;
            self.semaphore_index = (self.semaphore_index + 1) % self.acquire_semaphores.len();
            return Ok(state);
        }
        Ok(SwapchainState::Ok)
    }

    /// Recreate the swapchain after an [`SwapchainState::OutOfDate`] result.
    /// The caller must ensure no submitted work still uses the old
    /// backbuffers, and must recreate any views it made of them.
    pub fn recreate_swapchain(&mut self, support: &SurfaceSupport, window_extent: vk::Extent2D) -> Result<()> {
        self.current_backbuffer = None;

        let old_ids = self
            .swapchain
            .images()
            .iter()
            .map(|image| image.handle().id())
            .collect::<Vec<_>>();

        let new_swapchain = Swapchain::new(
            self.device.clone(),
            self.swapchain.loader().clone(),
            self.surface,
            support,
            window_extent,
            unsafe { self.swapchain.handle() },
        )?;
        // Replacing the field retires and destroys the old swapchain.
        self.swapchain = new_swapchain;

        // The old backbuffers are gone; drop their tracked states.
        let mut tracker = self.queue_tracker.lock().map_err(|_| Error::PoisonError)?;
        for id in old_ids {
            tracker.on_resource_deletion(id);
        }
        drop(tracker);

        let backbuffers = self.swapchain.image_count() as usize;
        if backbuffers != self.acquire_semaphores.len() {
            self.acquire_semaphores = Semaphore::ring(&self.device, backbuffers)?;
            self.present_semaphores = Semaphore::ring(&self.device, backbuffers)?;
        }
        self.semaphore_index = 0;
        Ok(())
    }
}

impl Drop for SimpleSubmitContext {
    fn drop(&mut self) {
        // Frames may still be in flight against our fences and backbuffers.
        if let Err(err) = self.device.wait_idle() {
            error!("failed to wait for device idle: {err}");
        }
    }
}
