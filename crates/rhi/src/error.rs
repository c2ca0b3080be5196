//! RHI-specific error types.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// Invalid startup parameters handed to the device layer
    #[error("Setup error: {0}")]
    Setup(String),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface is unusable (lost, or zero-area)
    #[error("Surface error: {0}")]
    Surface(String),

    /// Swapchain creation error
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// A fence or acquire wait exceeded its bound
    #[error("Timed out after {timeout_ns} ns waiting for {what}")]
    Timeout { what: &'static str, timeout_ns: u64 },

    /// Image, buffer or sampler creation error
    #[error("Resource error: {0}")]
    Resource(String),

    /// Malformed shader bytecode
    #[error("Shader error: {0}")]
    Shader(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A file the renderer needs could not be read
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image was not in the layout a transition expected
    #[error("Image is in layout {actual:?}, expected {expected:?}")]
    InvalidLayout {
        expected: vk::ImageLayout,
        actual: vk::ImageLayout,
    },
}

/// Failure classes the run loop reports on exit.
///
/// Presentation staleness is not listed: it never travels as an error, see
/// [`crate::gpu::Staleness`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Window, surface, device or queue creation failed.
    SetupFailure,
    /// Image, buffer or pipeline construction failed.
    ResourceCreationFailure,
    /// A bounded wait expired; indicates device loss or a logic bug.
    SynchronizationTimeout,
    /// A shader or asset file is missing.
    IoFailure,
    /// Any other non-success device or queue result.
    Device,
}

impl RhiError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RhiError::Loading(_)
            | RhiError::Setup(_)
            | RhiError::NoSuitableGpu
            | RhiError::Surface(_)
            | RhiError::Swapchain(_) => ErrorKind::SetupFailure,
            RhiError::Allocator(_)
            | RhiError::Resource(_)
            | RhiError::Shader(_)
            | RhiError::Pipeline(_) => ErrorKind::ResourceCreationFailure,
            RhiError::Timeout { .. } => ErrorKind::SynchronizationTimeout,
            RhiError::Io { .. } => ErrorKind::IoFailure,
            RhiError::Vulkan(vk::Result::TIMEOUT) => ErrorKind::SynchronizationTimeout,
            RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | RhiError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                ErrorKind::ResourceCreationFailure
            }
            RhiError::Vulkan(_) | RhiError::InvalidLayout { .. } => ErrorKind::Device,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
