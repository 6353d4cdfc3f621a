// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Created once; there is no recreation path, so a resized or out-of-date
// surface keeps the original extent until restart.

use super::device::{QueueFamilyIndices, VulkanDevice};
use super::error::{RenderError, RenderResult};
use super::surface::Surface;
use ash::extensions::khr;
use ash::vk;

/// Everything the surface reports for one physical device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> RenderResult<Self> {
        Ok(Self {
            capabilities: surface.capabilities(physical_device)?,
            formats: surface.formats(physical_device)?,
            present_modes: surface.present_modes(physical_device)?,
        })
    }
}

/// 8-bit sRGB color formats, either channel order
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];

/// Prefer an 8-bit sRGB format in the nonlinear sRGB color space, else the
/// first one offered. `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            PREFERRED_FORMATS.contains(&f.format)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// `preferred` when offered, otherwise FIFO (always supported)
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-fixed extent when there is one, otherwise the framebuffer size
/// clamped into the supported range
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        let (width, height) = framebuffer;
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded)
pub fn requested_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Every decision that goes into the swapchain create info
#[derive(Debug, Clone)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    pub fn new(
        support: &SwapchainSupport,
        framebuffer: (u32, u32),
        queue_families: &QueueFamilyIndices,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RenderResult<Self> {
        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| RenderError::Unsupported("surface reports no formats".into()))?;
        let (sharing_mode, queue_family_indices) = queue_families.sharing();

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes, preferred_present_mode),
            extent: choose_extent(&support.capabilities, framebuffer),
            image_count: requested_image_count(&support.capabilities),
            sharing_mode,
            queue_family_indices,
            pre_transform: support.capabilities.current_transform,
        })
    }
}

#[derive(Clone)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        device: &VulkanDevice,
        surface: &Surface,
        framebuffer: (u32, u32),
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RenderResult<Self> {
        let support = SwapchainSupport::query(surface, device.physical_device)?;
        let plan = SwapchainPlan::new(
            &support,
            framebuffer,
            &device.queue_families,
            preferred_present_mode,
        )?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images requested",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            plan.image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(plan.sharing_mode)
            .queue_family_indices(&plan.queue_family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true);

        let swapchain_loader = khr::Swapchain::new(instance, &device.device);
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::init("swapchain"))?;

        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: plan.surface_format.format,
            extent: plan.extent,
        };

        if let Err(e) = this.create_views(&device.device) {
            unsafe { this.destroy(&device.device) };
            return Err(e);
        }
        Ok(this)
    }

    fn create_views(&mut self, device: &ash::Device) -> RenderResult<()> {
        // The driver may hand back more images than requested
        self.images = unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain) }
            .map_err(RenderError::init("swapchain image list"))?;
        log::info!("Created swapchain with {} images", self.images.len());

        for &image in &self.images {
            let view = create_image_view(device, image, self.format)?;
            self.image_views.push(view);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// # Safety
    /// Framebuffers using the views must already be destroyed and the
    /// device must be idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        self.swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> RenderResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(RenderError::init("image view"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        image_counts: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: image_counts.0,
            max_image_count: image_counts.1,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_is_preferred_wherever_it_appears() {
        let srgb = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let others = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        for position in 0..=others.len() {
            let mut formats = others.to_vec();
            formats.insert(position, srgb);
            assert_eq!(choose_surface_format(&formats), Some(srgb));
        }

        let rgba = format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(choose_surface_format(&[others[0], rgba]), Some(rgba));
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&formats[1..]), Some(formats[1]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_is_used_when_offered() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_is_the_fallback_even_when_unlisted() {
        let modes = [vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let caps = caps((800, 600), (1, 1), (4096, 4096), (2, 3));
        assert_eq!(
            choose_extent(&caps, (2000, 100)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn undefined_extent_clamps_framebuffer_size() {
        let caps = caps((u32::MAX, u32::MAX), (1, 1), (1920, 1080), (2, 3));
        assert_eq!(
            choose_extent(&caps, (2000, 100)),
            vk::Extent2D {
                width: 1920,
                height: 100
            }
        );
        assert_eq!(
            choose_extent(&caps, (0, 5000)),
            vk::Extent2D {
                width: 1,
                height: 1080
            }
        );
    }

    #[test]
    fn image_count_is_one_above_minimum_within_bounds() {
        assert_eq!(requested_image_count(&caps((1, 1), (1, 1), (1, 1), (1, 0))), 2);
        assert_eq!(requested_image_count(&caps((1, 1), (1, 1), (1, 1), (2, 8))), 3);
        assert_eq!(requested_image_count(&caps((1, 1), (1, 1), (1, 1), (3, 3))), 3);
    }

    #[test]
    fn plan_for_unbounded_surface_requests_two_images() {
        let support = SwapchainSupport {
            capabilities: caps((u32::MAX, u32::MAX), (1, 1), (1920, 1080), (1, 0)),
            formats: vec![
                format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };

        let plan =
            SwapchainPlan::new(&support, (1280, 720), &families, vk::PresentModeKHR::MAILBOX)
                .unwrap();

        assert_eq!(plan.image_count, 2);
        assert_eq!(plan.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            plan.extent,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(plan.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(plan.queue_family_indices.is_empty());
        assert_eq!(plan.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn plan_without_formats_is_unsupported() {
        let support = SwapchainSupport {
            capabilities: caps((640, 480), (1, 1), (640, 480), (2, 0)),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(1),
        };
        let err = SwapchainPlan::new(&support, (640, 480), &families, vk::PresentModeKHR::MAILBOX)
            .unwrap_err();
        assert!(matches!(err, RenderError::Unsupported(_)));
    }
}
