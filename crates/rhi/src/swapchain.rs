//! Presentation chain management.
//!
//! [`SurfaceChain`] owns the presentable images of the window surface, one view per
//! image and one "render finished" semaphore per image. The three sequences always
//! have the same length. A chain is never patched: on resize or staleness the owner
//! drops it and builds a new one.
//!
//! The selection helpers at the bottom pick format, present mode, extent and image
//! count from what the surface reports. The Vulkan device uses them when it creates
//! the chain handle.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::swapchain::SurfaceChain;
//! use lsv_rhi::sync::Semaphore;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lsv_rhi::RhiError> {
//! let chain = SurfaceChain::build(device.clone(), 1280, 720)?;
//! let image_acquired = Semaphore::new(device)?;
//!
//! // In render loop:
//! // match chain.acquire(&image_acquired, 1_000_000_000)? { ... }
//! // ... render to chain.image(image_index) ...
//! // chain.present(image_index)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{AcquireOutcome, GpuDevice, PresentOutcome};
use crate::sync::Semaphore;

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Checks if the swapchain support is adequate for rendering.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentable image chain bound to the window surface.
///
/// # Resource Destruction
///
/// Views and per-image semaphores are destroyed before the chain handle. The images
/// themselves belong to the chain handle and are never destroyed individually.
pub struct SurfaceChain<D: GpuDevice> {
    device: Arc<D>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    render_finished: Vec<Semaphore<D>>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl<D: GpuDevice> SurfaceChain<D> {
    /// Builds a chain sized as close to `width`x`height` as the surface allows, with a
    /// view and a render-finished semaphore for every image.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Surface`] for a zero-area request. Any failure part way
    /// through releases what was already created.
    pub fn build(device: Arc<D>, width: u32, height: u32) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::Surface(format!(
                "Cannot build a presentation chain for a {}x{} surface",
                width, height
            )));
        }

        let created = device.create_swapchain(width, height)?;
        let image_count = created.images.len();

        let mut chain = Self {
            device: device.clone(),
            swapchain: created.swapchain,
            images: created.images,
            views: Vec::with_capacity(image_count),
            render_finished: Vec::with_capacity(image_count),
            format: created.format,
            extent: created.extent,
        };

        for &image in &chain.images {
            chain.views.push(device.create_image_view(image, chain.format)?);
            chain.render_finished.push(Semaphore::new(device.clone())?);
        }

        info!(
            "Presentation chain built: {}x{}, format {:?}, {} images",
            chain.extent.width, chain.extent.height, chain.format, image_count
        );

        Ok(chain)
    }

    /// Asks for the next presentable image; `signal` is signaled once it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] when no image becomes available in time.
    pub fn acquire(&self, signal: &Semaphore<D>, timeout_ns: u64) -> RhiResult<AcquireOutcome> {
        self.device
            .acquire_next_image(self.swapchain, signal.handle(), timeout_ns)
    }

    /// Queues image `image_index` for presentation once its render-finished semaphore
    /// is signaled.
    pub fn present(&self, image_index: u32) -> RhiResult<PresentOutcome> {
        let wait = self.render_finished(image_index)?.handle();
        self.device.present(self.swapchain, image_index, wait)
    }

    /// Returns the render-finished semaphore of image `image_index`.
    pub fn render_finished(&self, image_index: u32) -> RhiResult<&Semaphore<D>> {
        self.render_finished
            .get(image_index as usize)
            .ok_or_else(|| self.index_error(image_index))
    }

    /// Returns image `image_index`.
    pub fn image(&self, image_index: u32) -> RhiResult<vk::Image> {
        self.images
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| self.index_error(image_index))
    }

    /// Returns the view of image `image_index`.
    pub fn view(&self, image_index: u32) -> RhiResult<vk::ImageView> {
        self.views
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| self.index_error(image_index))
    }

    fn index_error(&self, image_index: u32) -> RhiError {
        RhiError::Swapchain(format!(
            "Image index {} out of range ({} images)",
            image_index,
            self.images.len()
        ))
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl<D: GpuDevice> Drop for SurfaceChain<D> {
    fn drop(&mut self) {
        for view in self.views.drain(..) {
            self.device.destroy_image_view(view);
        }
        self.render_finished.clear();
        self.device.destroy_swapchain(self.swapchain);

        info!(
            "Presentation chain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Chooses the best surface format from the available formats.
///
/// Prefers B8G8R8A8_UNORM with SRGB_NONLINEAR color space, then B8G8R8A8_SRGB,
/// then the first available format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        debug!("Selected preferred surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return Some(format);
    }

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        warn!("Using fallback surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied()?;
    warn!("Using first available surface format: {:?}", first.format);
    Some(first)
}

/// Chooses `preferred` when the surface supports it, FIFO otherwise.
///
/// FIFO is always available.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        debug!("Selected {:?} present mode", preferred);
        return preferred;
    }

    warn!(
        "Present mode {:?} unavailable, falling back to FIFO",
        preferred
    );
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// Determines the number of swapchain images.
///
/// One more than the minimum, clamped to the maximum if the surface sets one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // 0 means no maximum
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
