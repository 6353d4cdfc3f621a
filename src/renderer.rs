// =============================================================================
// RENDERER CONTEXT - owns every GPU object of one rendering session
// =============================================================================
//
// CREATION ORDER (teardown runs exactly backwards):
// instance -> surface -> device -> swapchain -> pipeline -> commands -> sync
//
// The application driver owns the Renderer and the window; the window must
// outlive it.

use crate::backend::{
    CommandRecorder, FrameBackend, FrameOutcome, FrameSync, GraphicsPipeline, PipelineConfig,
    RenderResult, ShaderPaths, Surface, Swapchain, VulkanDevice, VulkanInstance,
};
use crate::config::Config;
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

pub struct Renderer {
    frame_sync: FrameSync,
    commands: CommandRecorder,
    pipeline: GraphicsPipeline,
    swapchain: Swapchain,
    device: VulkanDevice,
    surface: Surface,
    instance: VulkanInstance,
    frames_drawn: u64,
}

impl Renderer {
    /// Build the whole presentation pipeline for `window`.
    ///
    /// # Arguments
    /// * `config` - Window title, present mode, clear color, shader paths, validation
    /// * `window` - Native window to present to
    /// * `framebuffer_size` - Window size in pixels, used when the surface leaves the extent open
    pub fn new<W>(config: &Config, window: &W, framebuffer_size: (u32, u32)) -> RenderResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;

        // Everything created below is released again if a later step fails
        let mut unwind = Unwind::default();

        let instance = VulkanInstance::new(
            &config.window.title,
            window.raw_display_handle(),
            enable_validation,
        )?;
        unwind.push("instance", {
            let mut instance = instance.clone();
            move || unsafe { instance.destroy() }
        });

        let surface = Surface::new(&instance, window)?;
        unwind.push("surface", {
            let surface = surface.clone();
            move || unsafe { surface.destroy() }
        });

        let device = VulkanDevice::new(&instance, &surface)?;
        unwind.push("device", {
            let device = device.clone();
            move || unsafe { device.destroy() }
        });

        let swapchain = Swapchain::new(
            &instance.instance,
            &device,
            &surface,
            framebuffer_size,
            config.present_mode(),
        )?;
        unwind.push("swapchain", {
            let (swapchain, device) = (swapchain.clone(), device.device.clone());
            move || unsafe { swapchain.destroy(&device) }
        });

        let pipeline = GraphicsPipeline::new(
            &device.device,
            &swapchain,
            ShaderPaths {
                vertex: &config.shaders.vertex,
                fragment: &config.shaders.fragment,
            },
            &PipelineConfig::TRIANGLE,
        )?;
        unwind.push("pipeline", {
            let (pipeline, device) = (pipeline.clone(), device.device.clone());
            move || unsafe { pipeline.destroy(&device) }
        });

        let commands = CommandRecorder::new(
            &device.device,
            device.graphics_family,
            &pipeline,
            swapchain.extent,
            config.graphics.clear_color,
        )?;
        unwind.push("command pool", {
            let (commands, device) = (commands.clone(), device.device.clone());
            move || unsafe { commands.destroy(&device) }
        });

        let frame_sync = FrameSync::new(&device.device, swapchain.image_count())?;

        unwind.disarm();
        log::info!("Vulkan initialized successfully!");
        Ok(Self {
            frame_sync,
            commands,
            pipeline,
            swapchain,
            device,
            surface,
            instance,
            frames_drawn: 0,
        })
    }

    /// Render one frame. Blocks while the frame slot is still in use by the GPU.
    pub fn draw_frame(&mut self) -> RenderResult<FrameOutcome> {
        let queues = QueueContext {
            device: &self.device.device,
            swapchain_loader: &self.swapchain.swapchain_loader,
            swapchain: self.swapchain.swapchain,
            graphics_queue: self.device.graphics_queue,
            present_queue: self.device.present_queue,
            command_buffers: &self.commands.buffers,
        };

        let outcome = self.frame_sync.draw_frame(&queues)?;
        self.frames_drawn += 1;
        Ok(outcome)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources after {} frames...", self.frames_drawn);

        // Nothing may be destroyed while the GPU could still be using it
        if let Err(e) = self.device.wait_idle() {
            log::error!("{}", e);
        }

        unsafe {
            let device = &self.device.device;
            self.frame_sync.destroy(device);
            self.commands.destroy(device);
            self.pipeline.destroy(device);
            self.swapchain.destroy(device);
            self.device.destroy();
            self.surface.destroy();
            self.instance.destroy();
        }

        log::info!("Cleanup complete");
    }
}

/// Teardown steps for a partially started renderer, run newest first on drop
#[derive(Default)]
struct Unwind {
    steps: Vec<(&'static str, Box<dyn FnOnce()>)>,
}

impl Unwind {
    fn push(&mut self, what: &'static str, step: impl FnOnce() + 'static) {
        self.steps.push((what, Box::new(step)));
    }

    /// Startup finished; the Renderer owns everything from here on
    fn disarm(&mut self) {
        self.steps.clear();
    }
}

impl Drop for Unwind {
    fn drop(&mut self) {
        while let Some((what, step)) = self.steps.pop() {
            log::debug!("Startup failed, destroying {}", what);
            step();
        }
    }
}

/// Borrowed view of the queues and swapchain for one frame
struct QueueContext<'a> {
    device: &'a ash::Device,
    swapchain_loader: &'a khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_buffers: &'a [vk::CommandBuffer],
}

impl FrameBackend for QueueContext<'_> {
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn submit(
        &self,
        image_index: u32,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        let wait_semaphores = [wait];
        // Only the color write has to wait for the image to be released
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], fence)
        }
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_unwind(log: &Rc<RefCell<Vec<&'static str>>>) -> Unwind {
        let mut unwind = Unwind::default();
        for what in ["instance", "surface", "device"] {
            let log = Rc::clone(log);
            unwind.push(what, move || log.borrow_mut().push(what));
        }
        unwind
    }

    #[test]
    fn failed_startup_destroys_newest_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        drop(recording_unwind(&log));
        assert_eq!(*log.borrow(), vec!["device", "surface", "instance"]);
    }

    #[test]
    fn finished_startup_destroys_nothing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut unwind = recording_unwind(&log);
        unwind.disarm();
        drop(unwind);
        assert!(log.borrow().is_empty());
    }
}
