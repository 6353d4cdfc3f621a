// Command buffer recording
//
// One primary command buffer per framebuffer, recorded once at startup and
// replayed unmodified every frame. The scene is static, so the pool is
// created without RESET_COMMAND_BUFFER.

use super::error::{RenderError, RenderResult};
use super::pipeline::GraphicsPipeline;
use ash::vk;

/// The triangle's corners come from gl_VertexIndex
pub const DRAW_VERTEX_COUNT: u32 = 3;
pub const DRAW_INSTANCE_COUNT: u32 = 1;

#[derive(Debug, Clone)]
pub struct CommandRecorder {
    pub pool: vk::CommandPool,
    /// Indexed by swapchain image
    pub buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    pub fn new(
        device: &ash::Device,
        graphics_family: u32,
        pipeline: &GraphicsPipeline,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(graphics_family);
        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(RenderError::init("command pool"))?;

        match record_all(device, pool, pipeline, extent, clear_color) {
            Ok(buffers) => {
                log::info!("Recorded {} command buffers", buffers.len());
                Ok(Self { pool, buffers })
            }
            Err(e) => {
                // Frees any buffers allocated from it as well
                unsafe { device.destroy_command_pool(pool, None) };
                Err(e)
            }
        }
    }

    /// Destroying the pool frees its buffers.
    ///
    /// # Safety
    /// None of the buffers may still be executing.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Allocate one buffer per framebuffer from `pool` and record each
fn record_all(
    device: &ash::Device,
    pool: vk::CommandPool,
    pipeline: &GraphicsPipeline,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
) -> RenderResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(pipeline.framebuffers.len() as u32);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(RenderError::init("command buffers"))?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }];

    for (&cmd, &framebuffer) in buffers.iter().zip(&pipeline.framebuffers) {
        record_draw(device, cmd, pipeline, framebuffer, extent, &clear_values)?;
    }

    Ok(buffers)
}

fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &GraphicsPipeline,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_values: &[vk::ClearValue],
) -> RenderResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder();

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(pipeline.render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(clear_values);

    unsafe {
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(RenderError::submit("begin command buffer"))?;

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        device.cmd_draw(cmd, DRAW_VERTEX_COUNT, DRAW_INSTANCE_COUNT, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .map_err(RenderError::submit("end command buffer"))
    }
}
