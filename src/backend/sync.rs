// Synchronization primitives and the per-frame protocol
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// Up to MAX_FRAMES_IN_FLIGHT frames are submitted before the CPU waits.
//
// Per slot: Idle -> Acquiring -> Submitted -> Presenting -> Idle

use super::error::{RenderError, RenderResult};
use ash::prelude::VkResult;
use ash::vk;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// The queue and swapchain calls the frame protocol needs.
///
/// Implemented over the real device by the renderer; tests substitute a
/// recording mock.
pub trait FrameBackend {
    /// Block until `fence` is signaled, without timeout
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    /// Returns the image index and the suboptimal flag
    fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<(u32, bool)>;
    /// Submit the pre-recorded buffer of `image_index` to the graphics queue
    fn submit(
        &self,
        image_index: u32,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;
    /// Queue `image_index` for presentation; returns the suboptimal flag
    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VkResult<bool>;
}

/// How well the swapchain still matches the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The image was rendered and queued for presentation
    Presented {
        image_index: u32,
        status: SurfaceStatus,
    },
    /// Acquire reported the swapchain out of date, nothing was submitted
    Skipped,
}

/// Sync objects of one frame slot
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSlot {
    pub fn new(device: &ash::Device) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(RenderError::init("image-available semaphore"))?;

            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(RenderError::init("render-finished semaphore")(result));
                }
            };

            let in_flight_fence = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(result) => {
                    device.destroy_semaphore(render_finished, None);
                    device.destroy_semaphore(image_available, None);
                    return Err(RenderError::init("in-flight fence")(result));
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight_fence,
            })
        }
    }

    /// # Safety
    /// The objects must not be in use by the GPU.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight_fence, None);
    }
}

/// Frame-slot bookkeeping. Mutated only by the render loop thread.
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    /// Fence of the slot currently rendering into each swapchain image
    images_in_flight: Vec<Option<vk::Fence>>,
    current_frame: usize,
    surface_status: SurfaceStatus,
}

impl FrameSync {
    pub fn new(device: &ash::Device, image_count: usize) -> RenderResult<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameSlot::new(device) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in &slots {
                        unsafe { slot.destroy(device) };
                    }
                    return Err(e);
                }
            }
        }

        log::debug!(
            "Created sync objects for {} frames in flight, {} swapchain images",
            MAX_FRAMES_IN_FLIGHT,
            image_count
        );
        Ok(Self::from_slots(slots, image_count))
    }

    fn from_slots(slots: Vec<FrameSlot>, image_count: usize) -> Self {
        debug_assert_eq!(slots.len(), MAX_FRAMES_IN_FLIGHT);
        Self {
            slots,
            images_in_flight: vec![None; image_count],
            current_frame: 0,
            surface_status: SurfaceStatus::Optimal,
        }
    }

    #[cfg(test)]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[cfg(test)]
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    #[cfg(test)]
    pub fn images_in_flight(&self) -> &[Option<vk::Fence>] {
        &self.images_in_flight
    }

    /// Last status reported by acquire/present. Nothing acts on it: there is
    /// no swapchain recreation.
    #[cfg(test)]
    pub fn surface_status(&self) -> SurfaceStatus {
        self.surface_status
    }

    /// Run one acquire/submit/present cycle on the current slot.
    ///
    /// The slot counter advances whatever acquire and present report.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &B) -> RenderResult<FrameOutcome> {
        let slot = self.slots[self.current_frame];

        // The command buffers this slot will reuse must be done executing
        backend
            .wait_for_fence(slot.in_flight_fence)
            .map_err(RenderError::frame("wait for in-flight fence"))?;

        let outcome = match backend.acquire_next_image(slot.image_available) {
            Ok((image_index, suboptimal)) => {
                let acquired = if suboptimal {
                    SurfaceStatus::Suboptimal
                } else {
                    SurfaceStatus::Optimal
                };
                let presented = self.submit_and_present(backend, slot, image_index)?;
                let status = acquired.max(presented);
                self.note_surface_status(status);
                FrameOutcome::Presented {
                    image_index,
                    status,
                }
            }
            // No image and no semaphore signal: the slot fence stays signaled
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.note_surface_status(SurfaceStatus::OutOfDate);
                FrameOutcome::Skipped
            }
            Err(result) => {
                return Err(RenderError::Frame {
                    what: "acquire swapchain image",
                    result,
                })
            }
        };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(outcome)
    }

    fn submit_and_present<B: FrameBackend>(
        &mut self,
        backend: &B,
        slot: FrameSlot,
        image_index: u32,
    ) -> RenderResult<SurfaceStatus> {
        let image = image_index as usize;

        // Another slot may still be rendering into this image when the slot
        // count does not divide the image count
        if let Some(owner) = self.images_in_flight[image] {
            backend
                .wait_for_fence(owner)
                .map_err(RenderError::frame("wait for image fence"))?;
        }
        self.images_in_flight[image] = Some(slot.in_flight_fence);

        backend
            .reset_fence(slot.in_flight_fence)
            .map_err(RenderError::frame("reset in-flight fence"))?;

        backend
            .submit(
                image_index,
                slot.image_available,
                slot.render_finished,
                slot.in_flight_fence,
            )
            .map_err(RenderError::submit("submit draw commands"))?;

        match backend.present(image_index, slot.render_finished) {
            Ok(false) => Ok(SurfaceStatus::Optimal),
            Ok(true) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
            Err(result) => Err(RenderError::Frame {
                what: "present swapchain image",
                result,
            }),
        }
    }

    fn note_surface_status(&mut self, status: SurfaceStatus) {
        if status == self.surface_status {
            return;
        }
        if status == SurfaceStatus::Optimal {
            log::info!("Swapchain matches the surface again");
        } else {
            log::warn!(
                "Swapchain is {:?}; recreation is not supported, keeping the current swapchain",
                status
            );
        }
        self.surface_status = status;
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for slot in &self.slots {
            slot.destroy(device);
        }
    }
}
