// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The binaries are produced ahead of time
// (see build.rs) and read from disk at startup.

use super::error::{RenderError, RenderResult};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a whole file verbatim
pub fn load_binary(path: &Path) -> RenderResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| RenderError::Asset {
        path: path.to_path_buf(),
        source,
    })
}

/// Reinterpret SPIR-V bytes as 4-byte words. Rejects lengths that are not a
/// multiple of 4 and fixes up byte order when the magic number is swapped.
pub fn parse_spirv(path: &Path, bytes: &[u8]) -> RenderResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::Asset {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a SPIR-V file and create a shader module from it
pub fn load_shader_module(device: &ash::Device, path: &Path) -> RenderResult<vk::ShaderModule> {
    let bytes = load_binary(path)?;
    let code = parse_spirv(path, &bytes)?;
    log::debug!("Loaded shader {:?} ({} bytes)", path, bytes.len());

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(RenderError::init("shader module"))
}
