//! SPIR-V shader modules.
//!
//! Shaders are compiled offline. At runtime they are read from
//! `<shader_dir>/<name>.spv` and wrapped in a [`Shader`] that knows its stage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lsv_rhi::RhiError> {
//! let vertex = Shader::load(device.clone(), Path::new("shaders"), "mesh.vert", ShaderStage::Vertex)?;
//! let fragment = Shader::load(device, Path::new("shaders"), "mesh.frag", ShaderStage::Fragment)?;
//! assert_eq!(vertex.stage(), ShaderStage::Vertex);
//! # drop(fragment);
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point used by every shader the renderer loads.
pub const ENTRY_POINT: &CStr = c"main";

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the shader stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returns the path a compiled shader called `name` is expected at.
pub fn spirv_path(shader_dir: &Path, name: &str) -> PathBuf {
    shader_dir.join(format!("{name}.spv"))
}

/// Decodes a little-endian SPIR-V blob into code words.
///
/// # Errors
///
/// Returns [`RhiError::Shader`] if the length is not a multiple of 4 or the blob
/// does not start with the SPIR-V magic number.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::Shader(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if code[0] != SPIRV_MAGIC {
        return Err(RhiError::Shader(format!(
            "Bad SPIR-V magic number {:#010x}",
            code[0]
        )));
    }

    Ok(code)
}

/// Vulkan shader module wrapper.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads `<shader_dir>/<name>.spv` and creates a shader module from it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Io`] if the file cannot be read, [`RhiError::Shader`] if
    /// its contents are not SPIR-V, or the Vulkan error if module creation fails.
    pub fn load(
        device: Arc<Device>,
        shader_dir: &Path,
        name: &str,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = spirv_path(shader_dir, name);
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(&path).map_err(|source| RhiError::Io {
            path: path.clone(),
            source,
        })?;

        let code = decode_spirv(&bytes)
            .map_err(|e| RhiError::Shader(format!("{}: {}", path.display(), e)))?;

        Self::from_words(device, &code, stage)
    }

    /// Creates a shader module from decoded SPIR-V words.
    pub fn from_words(device: Arc<Device>, code: &[u32], stage: ShaderStage) -> RhiResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_path_appends_extension() {
        assert_eq!(
            spirv_path(Path::new("shaders"), "mesh.vert"),
            Path::new("shaders").join("mesh.vert.spv")
        );
    }

    #[test]
    fn test_decode_valid_module() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0300, 0, 8, 0]);
        let code = decode_spirv(&bytes).unwrap();
        assert_eq!(code.len(), 5);
        assert_eq!(code[1], 0x0001_0300);
    }

    #[test]
    fn test_decode_rejects_misaligned_length() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0]);
        bytes.push(0);
        assert!(matches!(decode_spirv(&bytes), Err(RhiError::Shader(_))));
        assert!(matches!(decode_spirv(&[]), Err(RhiError::Shader(_))));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC.swap_bytes(), 0]);
        assert!(matches!(decode_spirv(&bytes), Err(RhiError::Shader(_))));
    }
}
