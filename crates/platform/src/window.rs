//! Window management using winit.
//!
//! The window owns its event loop and drives it with `pump_app_events`, so the run
//! loop stays in control: each iteration drains pending events without blocking and
//! then draws. This module also creates the Vulkan surface for the window.

use std::ffi::c_char;
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use lsv_core::{Error, Result};

use crate::input::InputState;
use crate::source::WindowSource;

/// Pumps allowed for the platform to deliver `resumed` during startup.
const STARTUP_PUMPS: usize = 64;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(16);

/// RAII wrapper for a Vulkan surface.
///
/// The caller must ensure that the Vulkan instance outlives this surface and that
/// the surface is dropped before the window it was created for.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for querying surface capabilities, formats and present modes.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface from the same
        // instance as the loader, and nothing else destroys it.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// Receives winit callbacks while the event loop is pumped.
struct Handler {
    /// Taken when the window is created.
    attributes: Option<WindowAttributes>,
    created: Option<WinitWindow>,
    creation_error: Option<String>,
    input: InputState,
    quit: bool,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => self.created = Some(window),
            Err(e) => self.creation_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.quit = true;
            }
            WindowEvent::KeyboardInput { event: key, .. }
                if key.state == ElementState::Pressed
                    && key.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                info!("Escape pressed, quitting");
                self.quit = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
            }
            _ => {}
        }
        self.input.handle_event(&event);
    }
}

/// Application window plus the event loop that feeds it.
pub struct Window {
    // Field order is drop order: the window goes before its event loop.
    window: WinitWindow,
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Opens a resizable window with the given physical size and title.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop or the window cannot be created.
    pub fn new(width: u32, height: u32, title: &str) -> Result<Self> {
        let mut event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;

        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let mut handler = Handler {
            attributes: Some(attributes),
            created: None,
            creation_error: None,
            input: InputState::new(),
            quit: false,
        };

        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut handler)
            {
                return Err(Error::Window(format!(
                    "Event loop exited during startup with code {code}"
                )));
            }
            if let Some(e) = handler.creation_error.take() {
                return Err(Error::Window(e));
            }
            if let Some(window) = handler.created.take() {
                info!("Window created: {}x{} '{}'", width, height, title);
                return Ok(Self {
                    window,
                    handler,
                    event_loop,
                });
            }
        }

        Err(Error::Window(
            "The platform never delivered a resumed event".to_string(),
        ))
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// The returned pointers refer to static strings owned by ash-window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Surface`] if the display is not supported by Vulkan.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Surface(format!("Failed to enumerate required extensions: {}", e))
            })?;

        debug!("Surface needs {} instance extension(s)", extensions.len());
        Ok(extensions.to_vec())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// `instance` must have been created with [`required_extensions`](Self::required_extensions)
    /// and must outlive the returned [`Surface`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Surface`] on invalid handles or when Vulkan rejects the surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {}", e)))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Surface(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid, the handles come from a live winit
        // window, and Surface::drop destroys the surface.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {}", e)))?;

        info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}

impl WindowSource for Window {
    fn drawable_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn poll_events(&mut self) {
        self.handler.input.begin_iteration();
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler)
        {
            warn!("Event loop exited with code {}", code);
            self.handler.quit = true;
        }
    }

    fn quit_requested(&self) -> bool {
        self.handler.quit
    }

    fn input(&self) -> &InputState {
        &self.handler.input
    }
}
