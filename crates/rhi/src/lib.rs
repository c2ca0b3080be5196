//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - The presentation chain and its per-image synchronization
//! - Command recording, image layout transitions and one-off submissions
//! - Buffers, render targets, shaders, pipelines and descriptors
//!
//! Everything that touches the device goes through the [`gpu::GpuDevice`] trait, so
//! the frame lifecycle built on top can run against a recording fake in tests.

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod gpu;
pub mod image;
pub mod immediate;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorKind, RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
