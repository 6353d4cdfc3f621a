// Presentation surface
//
// Binds the instance to the native window handed over by the windowing layer.

use super::error::{RenderError, RenderResult};
use super::instance::VulkanInstance;
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

#[derive(Clone)]
pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
}

impl Surface {
    /// Create a surface for `window`. The window must outlive the surface.
    pub fn new<W>(instance: &VulkanInstance, window: &W) -> RenderResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(RenderError::init("window surface"))?;

        log::debug!("Window surface created");
        Ok(Self { surface, loader })
    }

    /// Whether queue family `family` of `device` can present to this surface
    pub fn supports_present(&self, device: vk::PhysicalDevice, family: u32) -> RenderResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(device, family, self.surface)
        }
        .map_err(RenderError::init("surface support query"))
    }

    pub fn capabilities(
        &self,
        device: vk::PhysicalDevice,
    ) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(device, self.surface)
        }
        .map_err(RenderError::init("surface capabilities query"))
    }

    pub fn formats(&self, device: vk::PhysicalDevice) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.loader.get_physical_device_surface_formats(device, self.surface) }
            .map_err(RenderError::init("surface format query"))
    }

    pub fn present_modes(
        &self,
        device: vk::PhysicalDevice,
    ) -> RenderResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(device, self.surface)
        }
        .map_err(RenderError::init("present mode query"))
    }

    /// # Safety
    /// The swapchain built on this surface must already be destroyed.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_surface(self.surface, None);
    }
}
