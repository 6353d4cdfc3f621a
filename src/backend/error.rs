// Renderer error taxonomy
//
// Everything here is fatal: startup failures abort initialization and
// per-frame failures end the run. Nothing is retried.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The Vulkan loader library could not be opened
    #[error("failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A resource-creation call was rejected during startup
    #[error("failed to create {what}: {result}")]
    Init {
        what: &'static str,
        result: vk::Result,
    },

    /// The environment lacks something the renderer requires
    #[error("unsupported environment: {0}")]
    Unsupported(String),

    /// A shader binary could not be read or is not valid SPIR-V
    #[error("failed to load shader binary {path:?}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Queue submission or command buffer recording failed
    #[error("failed to {what}: {result}")]
    Submit {
        what: &'static str,
        result: vk::Result,
    },

    /// A per-frame fence, acquire or present call failed unrecoverably
    #[error("frame failed to {what}: {result}")]
    Frame {
        what: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    /// Adapter for `map_err` on creation calls
    pub fn init(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Init { what, result }
    }

    pub fn submit(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Submit { what, result }
    }

    pub fn frame(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Frame { what, result }
    }

    /// True for failures that can only happen while the renderer starts up
    pub fn is_init(&self) -> bool {
        matches!(
            self,
            Self::Loading(_) | Self::Init { .. } | Self::Unsupported(_) | Self::Asset { .. }
        )
    }
}
