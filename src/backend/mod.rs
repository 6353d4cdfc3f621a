// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one module per stage of bring-up
// Order: instance -> surface -> device -> swapchain -> pipeline -> commands -> sync

pub mod commands;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use commands::CommandRecorder;
pub use device::VulkanDevice;
pub use error::RenderResult;
pub use instance::VulkanInstance;
pub use pipeline::{GraphicsPipeline, PipelineConfig, ShaderPaths};
pub use surface::Surface;
pub use swapchain::Swapchain;
pub use sync::{FrameBackend, FrameOutcome, FrameSync};
