// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first discrete GPU that can draw and present)
// - Queue family discovery
// - Logical device + graphics/present queue creation

use super::error::{RenderError, RenderResult};
use super::instance::VulkanInstance;
use super::surface::Surface;
use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;

/// Capabilities of one queue family that matter for selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub flags: vk::QueueFlags,
    pub present: bool,
}

/// Queue family index per role. Both must resolve before a device is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans every family once. When several families qualify for a role,
    /// the one with the highest index wins.
    pub fn find(families: &[QueueFamilySupport]) -> Self {
        let mut indices = Self::default();
        for (index, family) in (0u32..).zip(families) {
            if family.flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if family.present {
                indices.present = Some(index);
            }
        }
        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct families, one queue gets created per entry
    pub fn unique(&self) -> BTreeSet<u32> {
        self.graphics.iter().chain(self.present.iter()).copied().collect()
    }

    /// Swapchain image sharing: concurrent across two families, exclusive for one
    pub fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) if graphics != present => {
                (vk::SharingMode::CONCURRENT, vec![graphics, present])
            }
            _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
        }
    }
}

/// Read-only description of an enumerated GPU
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilySupport>,
}

impl DeviceCandidate {
    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::find(&self.queue_families)
    }

    pub fn is_suitable(&self) -> bool {
        self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
            && self.queue_family_indices().is_complete()
    }
}

/// First suitable candidate in enumeration order, no scoring.
/// `None` when nothing qualifies.
pub fn select_device(candidates: &[DeviceCandidate]) -> Option<(usize, QueueFamilyIndices)> {
    candidates
        .iter()
        .position(DeviceCandidate::is_suitable)
        .map(|index| (index, candidates[index].queue_family_indices()))
}

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// One single-queue create info per distinct family
fn queue_create_infos(
    queue_families: &QueueFamilyIndices,
    priorities: &[f32],
) -> Vec<vk::DeviceQueueCreateInfo> {
    queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(priorities)
                .build()
        })
        .collect()
}

/// Logical device and its two queues (which may be the same queue)
#[derive(Clone)]
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub graphics_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanDevice {
    pub fn new(instance: &VulkanInstance, surface: &Surface) -> RenderResult<Self> {
        let candidates = Self::enumerate_candidates(instance, surface)?;
        if candidates.is_empty() {
            return Err(RenderError::Unsupported("no Vulkan-capable GPU found".into()));
        }

        for candidate in &candidates {
            log::debug!(
                "Found GPU: {} ({:?}, {} queue families)",
                candidate.name,
                candidate.device_type,
                candidate.queue_families.len()
            );
        }

        let (index, queue_families) = select_device(&candidates).ok_or_else(|| {
            RenderError::Unsupported(
                "no discrete GPU with graphics and present queue families found".into(),
            )
        })?;
        let chosen = &candidates[index];

        // Both present: select_device only returns complete indices
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics, queue_families.present)
        else {
            return Err(RenderError::Unsupported("queue families did not resolve".into()));
        };

        let physical_device = chosen.handle;
        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };

        log::info!("Selected GPU: {}", chosen.name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics={}, present={}",
            graphics_family,
            present_family
        );

        let device =
            Self::create_logical_device(&instance.instance, physical_device, &queue_families)?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Self {
            device,
            physical_device,
            queue_families,
            graphics_family,
            graphics_queue,
            present_queue,
        })
    }

    fn enumerate_candidates(
        instance: &VulkanInstance,
        surface: &Surface,
    ) -> RenderResult<Vec<DeviceCandidate>> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .map_err(RenderError::init("physical device list"))?;

        devices
            .into_iter()
            .map(|handle| {
                let props = unsafe { instance.instance.get_physical_device_properties(handle) };
                let families = unsafe {
                    instance
                        .instance
                        .get_physical_device_queue_family_properties(handle)
                };

                let queue_families = (0u32..)
                    .zip(&families)
                    .map(|(index, family)| {
                        Ok(QueueFamilySupport {
                            flags: family.queue_flags,
                            present: surface.supports_present(handle, index)?,
                        })
                    })
                    .collect::<RenderResult<Vec<_>>>()?;

                Ok(DeviceCandidate {
                    handle,
                    name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                        .to_string_lossy()
                        .into_owned(),
                    device_type: props.device_type,
                    queue_families,
                })
            })
            .collect()
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> RenderResult<ash::Device> {
        let queue_infos = queue_create_infos(queue_families, &QUEUE_PRIORITIES);

        // Layers are enabled on the instance only
        let extensions = [khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(RenderError::init("logical device"))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(RenderError::frame("wait for device idle"))
    }

    /// # Safety
    /// Every object created from this device must already be destroyed.
    pub unsafe fn destroy(&self) {
        self.device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilySupport {
        QueueFamilySupport { flags, present }
    }

    fn candidate(
        raw: u64,
        device_type: vk::PhysicalDeviceType,
        queue_families: Vec<QueueFamilySupport>,
    ) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::from_raw(raw),
            name: format!("gpu-{raw}"),
            device_type,
            queue_families,
        }
    }

    fn graphics_and_present() -> Vec<QueueFamilySupport> {
        vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)]
    }

    #[test]
    fn last_matching_family_wins_per_role() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, true),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::COMPUTE, false),
        ];
        let indices = QueueFamilyIndices::find(&families);
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn missing_present_family_is_incomplete() {
        let indices = QueueFamilyIndices::find(&[family(vk::QueueFlags::GRAPHICS, false)]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());
        assert!(!QueueFamilyIndices::find(&[]).is_complete());
    }

    #[test]
    fn shared_family_creates_one_queue_and_exclusive_images() {
        let indices = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(indices.sharing(), (vk::SharingMode::EXCLUSIVE, vec![]));
    }

    #[test]
    fn split_families_share_images_concurrently() {
        let indices = QueueFamilyIndices {
            graphics: Some(2),
            present: Some(1),
        };
        assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(indices.sharing(), (vk::SharingMode::CONCURRENT, vec![2, 1]));
    }

    #[test]
    fn one_queue_per_distinct_family() {
        let shared = QueueFamilyIndices {
            graphics: Some(3),
            present: Some(3),
        };
        let infos = queue_create_infos(&shared, &QUEUE_PRIORITIES);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 3);
        assert_eq!(infos[0].queue_count, 1);

        let split = QueueFamilyIndices {
            graphics: Some(2),
            present: Some(0),
        };
        let families: Vec<_> = queue_create_infos(&split, &QUEUE_PRIORITIES)
            .iter()
            .map(|info| info.queue_family_index)
            .collect();
        assert_eq!(families, vec![0, 2]);
    }

    #[test]
    fn single_qualifying_device_is_chosen_regardless_of_position() {
        for position in 0..3 {
            let mut candidates = vec![
                candidate(1, vk::PhysicalDeviceType::INTEGRATED_GPU, graphics_and_present()),
                candidate(2, vk::PhysicalDeviceType::CPU, graphics_and_present()),
            ];
            candidates.insert(
                position,
                candidate(9, vk::PhysicalDeviceType::DISCRETE_GPU, graphics_and_present()),
            );

            let (index, indices) = select_device(&candidates).unwrap();
            assert_eq!(index, position);
            assert_eq!(candidates[index].handle.as_raw(), 9);
            assert!(indices.is_complete());
        }
    }

    #[test]
    fn first_qualifying_device_wins() {
        let candidates = vec![
            candidate(1, vk::PhysicalDeviceType::DISCRETE_GPU, graphics_and_present()),
            candidate(2, vk::PhysicalDeviceType::DISCRETE_GPU, graphics_and_present()),
        ];
        assert_eq!(select_device(&candidates).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn discrete_gpu_without_present_support_is_rejected() {
        let candidates = vec![
            candidate(
                1,
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vec![family(vk::QueueFlags::GRAPHICS, false)],
            ),
            candidate(2, vk::PhysicalDeviceType::INTEGRATED_GPU, graphics_and_present()),
        ];
        assert!(select_device(&candidates).is_none());
        assert!(select_device(&[]).is_none());
    }
}
