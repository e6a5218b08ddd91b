//! Scoped acquisition of a render span.
//!
//! A [`RenderScope`] wraps [`SyncCommandBuffer::begin_rendering`] and
//! guarantees the matching [`SyncCommandBuffer::end_rendering`] runs on every
//! exit path. It also enforces the process-wide rule that no two render scopes
//! are ever open at the same time.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use ash::vk;

use crate::command_buffer::state::RenderingAttachment;
use crate::command_buffer::SyncCommandBuffer;

static SCOPE_OPEN: AtomicBool = AtomicBool::new(false);

/// An open render scope on a [`SyncCommandBuffer`]. Dereferences to the
/// command buffer so draw-type commands can be recorded directly on it; the
/// scope is closed when this is dropped.
pub struct RenderScope<'cmd> {
    cmd: &'cmd mut SyncCommandBuffer,
}

impl<'cmd> RenderScope<'cmd> {
    /// Open a render scope over the full `extent`, with the viewport and
    /// scissor preset to cover it. Panics if another render scope is already
    /// open anywhere in the process.
    pub fn new(
        cmd: &'cmd mut SyncCommandBuffer,
        extent: vk::Extent2D,
        color_attachments: Vec<RenderingAttachment>,
        depth_attachment: Option<RenderingAttachment>,
    ) -> Result<Self> {
        assert!(!SCOPE_OPEN.swap(true, Ordering::SeqCst), "render scopes must not overlap");

        let area = vk::Rect2D {
            offset: vk::Offset2D {
                x: 0,
                y: 0,
            },
            extent,
        };
        if let Err(err) = cmd.begin_rendering(area, color_attachments, depth_attachment) {
            SCOPE_OPEN.store(false, Ordering::SeqCst);
            return Err(err);
        }

        cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(area);

        Ok(Self {
            cmd,
        })
    }
}

impl Deref for RenderScope<'_> {
    type Target = SyncCommandBuffer;

    fn deref(&self) -> &Self::Target {
        self.cmd
    }
}

impl DerefMut for RenderScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cmd
    }
}

impl Drop for RenderScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.cmd.end_rendering() {
            error!("failed to end render scope: {err}");
        }
        SCOPE_OPEN.store(false, Ordering::SeqCst);
    }
}
