// Graphics pipeline creation
//
// One render pass with a single color attachment, one fixed-function
// pipeline and one framebuffer per swapchain image. Nothing here is
// reconfigurable at runtime; the whole state comes from `PipelineConfig`.

use super::error::{RenderError, RenderResult};
use super::shader::load_shader_module;
use super::swapchain::Swapchain;
use ash::vk;
use std::ffi::CStr;
use std::path::Path;

const SHADER_ENTRY_POINT: &CStr = c"main";

/// Fixed-function state of the triangle pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl PipelineConfig {
    /// No vertex input, the vertex shader generates the corners
    pub const TRIANGLE: Self = Self {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        samples: vk::SampleCountFlags::TYPE_1,
        blend_enable: false,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };
}

/// Paths of the two SPIR-V binaries
#[derive(Debug, Clone, Copy)]
pub struct ShaderPaths<'a> {
    pub vertex: &'a Path,
    pub fragment: &'a Path,
}

#[derive(Debug, Clone)]
pub struct GraphicsPipeline {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    /// One per swapchain image, same order as the image views
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl GraphicsPipeline {
    pub fn new(
        device: &ash::Device,
        swapchain: &Swapchain,
        shaders: ShaderPaths<'_>,
        config: &PipelineConfig,
    ) -> RenderResult<Self> {
        let render_pass = create_render_pass(device, swapchain.format, config)?;

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(result) => {
                unsafe { device.destroy_render_pass(render_pass, None) };
                return Err(RenderError::init("pipeline layout")(result));
            }
        };

        let linked = link_pipeline(device, render_pass, layout, swapchain.extent, shaders, config);
        let pipeline = match linked {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe {
                    device.destroy_pipeline_layout(layout, None);
                    device.destroy_render_pass(render_pass, None);
                }
                return Err(e);
            }
        };
        log::debug!("Graphics pipeline created");

        let mut this = Self {
            render_pass,
            layout,
            pipeline,
            framebuffers: Vec::with_capacity(swapchain.image_views.len()),
        };

        for &image_view in &swapchain.image_views {
            match create_framebuffer(device, image_view, render_pass, swapchain.extent) {
                Ok(framebuffer) => this.framebuffers.push(framebuffer),
                Err(e) => {
                    unsafe { this.destroy(device) };
                    return Err(e);
                }
            }
        }

        Ok(this)
    }

    /// # Safety
    /// Command buffers referencing these objects must no longer be executing.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for &framebuffer in &self.framebuffers {
            device.destroy_framebuffer(framebuffer, None);
        }
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        device.destroy_render_pass(self.render_pass, None);
    }
}

/// Load both shader stages and build the pipeline. The modules are only
/// needed while linking and are destroyed on every path.
fn link_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    shaders: ShaderPaths<'_>,
    config: &PipelineConfig,
) -> RenderResult<vk::Pipeline> {
    let vert_shader = load_shader_module(device, shaders.vertex)?;
    let frag_shader = match load_shader_module(device, shaders.fragment) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_shader, None) };
            return Err(e);
        }
    };

    let pipeline = create_graphics_pipeline(
        device,
        render_pass,
        layout,
        extent,
        vert_shader,
        frag_shader,
        config,
    );

    unsafe {
        device.destroy_shader_module(frag_shader, None);
        device.destroy_shader_module(vert_shader, None);
    }
    pipeline
}

/// The swapchain image: cleared on load, stored, handed to presentation
fn color_attachment(
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
    config: &PipelineConfig,
) -> RenderResult<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The layout transition must wait for the stage the acquire semaphore guards
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment(format, config.samples)];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(RenderError::init("render pass"))
}

fn create_framebuffer(
    device: &ash::Device,
    image_view: vk::ImageView,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> RenderResult<vk::Framebuffer> {
    let attachments = &[image_view];
    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    unsafe { device.create_framebuffer(&framebuffer_info, None) }
        .map_err(RenderError::init("framebuffer"))
}

fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    config: &PipelineConfig,
) -> RenderResult<vk::Pipeline> {
    let shader_stages = &[
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader)
            .name(SHADER_ENTRY_POINT)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader)
            .name(SHADER_ENTRY_POINT)
            .build(),
    ];

    // No bindings or attributes
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(config.topology)
        .primitive_restart_enable(false);

    let viewports = &[viewport(extent)];
    let scissors = &[scissor(extent)];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(config.polygon_mode)
        .line_width(1.0)
        .cull_mode(config.cull_mode)
        .front_face(config.front_face)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(config.samples);

    let color_blend_attachments = &[vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(config.color_write_mask)
        .blend_enable(config.blend_enable)
        .build()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| RenderError::Init {
        what: "graphics pipeline",
        result,
    })?;

    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_state_is_fixed() {
        let config = PipelineConfig::TRIANGLE;
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.samples, vk::SampleCountFlags::TYPE_1);
        assert!(!config.blend_enable);
        assert_eq!(
            config.color_write_mask,
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A
        );
    }

    #[test]
    fn color_attachment_ends_presentable() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_SRGB, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn viewport_and_scissor_cover_the_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };

        let vp = viewport(extent);
        assert_eq!((vp.x, vp.y), (0.0, 0.0));
        assert_eq!((vp.width, vp.height), (1280.0, 720.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));

        let sc = scissor(extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!(sc.extent, extent);
    }
}
