use ash::vk;

use crate::resource::image::ImageView;

/// One attachment of a render scope. The attachment's state request is filed
/// when the scope begins; the layout given here is the layout the attachment
/// will be in for the whole scope.
#[derive(Clone)]
pub struct RenderingAttachment {
    pub view: ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearValue,
}

/// State carried between `begin_rendering` and `end_rendering`: the attachments
/// to open the render pass with, and the secondary command buffer draw commands
/// are recorded into.
pub(crate) struct RenderScopeState {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
    pub secondary: vk::CommandBuffer,
}
