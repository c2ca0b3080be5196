//! L System Visualizer - main entry point.
//!
//! Opens a window, brings up Vulkan and runs the frame loop until the window is
//! closed. A fatal error is logged and turns into a non-zero exit code after the
//! already-created resources are released.

mod triangle;
mod viewport;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use ash::vk;
use clap::Parser;
use tracing::{error, info, warn};

use lsv_core::{PresentModePreference, RenderConfig};
use lsv_platform::Window;
use lsv_renderer::{Renderer, RendererDesc, SceneRenderer, WindowSource};
use lsv_rhi::RhiError;
use lsv_rhi::device::Device;
use lsv_rhi::gpu::GpuDevice;
use lsv_rhi::instance::Instance;
use lsv_rhi::physical_device::select_physical_device;

use crate::triangle::TriangleLayer;
use crate::viewport::ViewportUi;

/// Command line arguments. Flags override values from the config file.
#[derive(Parser, Debug)]
#[command(name = "lsv", version, about = "L System Visualizer")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initial window width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Window title and application name
    #[arg(long)]
    title: Option<String>,

    /// Enable the Vulkan validation layer
    #[arg(long, overrides_with = "no_validation")]
    validation: bool,

    /// Disable the Vulkan validation layer
    #[arg(long, overrides_with = "validation")]
    no_validation: bool,

    /// Directory holding the compiled SPIR-V shaders
    #[arg(long, value_name = "DIR", default_value = "shaders")]
    shader_dir: PathBuf,
}

impl Args {
    fn validation(&self) -> Option<bool> {
        match (self.validation, self.no_validation) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Loads the config file (or defaults) and applies the command line overrides.
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)?,
            None => RenderConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(title) = &self.title {
            config.application_name = title.clone();
        }
        if let Some(validation) = self.validation() {
            config.enable_validation = validation;
        }

        config.validate()?;
        Ok(config)
    }
}

fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.render_config().context("Invalid configuration")?;
    info!(
        "Starting '{}' at {}x{}",
        config.application_name, config.width, config.height
    );

    // Locals drop in reverse order: layers, renderer, device, surface, instance, window.
    let mut window = Window::new(config.width, config.height, &config.application_name)
        .context("Failed to open window")?;

    let extensions = window.required_extensions()?;
    let instance = Instance::new(
        &config.application_name,
        config.enable_validation,
        &extensions,
    )
    .context("Failed to create Vulkan instance")?;

    let surface = window.create_surface(instance.entry(), instance.handle())?;
    let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())
        .context("Failed to select a GPU")?;
    let device = Device::new(
        &instance,
        surface.handle(),
        &gpu,
        present_mode(config.present_mode),
    )
    .context("Failed to create logical device")?;

    let desc = RendererDesc::from_config(&config, window.drawable_size());
    let mut renderer =
        Renderer::new(device.clone(), &desc).context("Failed to initialize renderer")?;

    let triangle = TriangleLayer::new(device.clone(), renderer.immediate(), &args.shader_dir)
        .context("Failed to build triangle layer")?;
    let mut ui = ViewportUi::new(device.clone(), renderer.targets().scene(), &args.shader_dir)
        .context("Failed to build viewport layer")?;
    let mut scenes: Vec<Box<dyn SceneRenderer<Device>>> = vec![Box::new(triangle)];

    let result = renderer.run(&mut window, &mut scenes, &mut ui);

    // The layers go before the renderer, so the GPU must be done with them even
    // when the loop stopped mid-frame.
    if let Err(e) = device.wait_idle() {
        warn!("Device did not go idle before teardown: {}", e);
    }

    result.context("Frame loop failed")
}

fn main() -> ExitCode {
    lsv_core::init_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => {
            info!("Clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<RhiError>() {
                Some(rhi) => error!(kind = ?rhi.kind(), "{:#}", e),
                None => error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("lsv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&["--width", "800", "--title", "Plants", "--no-validation"])
            .render_config()
            .unwrap();
        assert_eq!(config.width, 800);
        assert_eq!(config.height, RenderConfig::default().height);
        assert_eq!(config.application_name, "Plants");
        assert!(!config.enable_validation);
    }

    #[test]
    fn test_last_validation_flag_wins() {
        assert_eq!(parse(&["--no-validation", "--validation"]).validation(), Some(true));
        assert_eq!(parse(&["--validation", "--no-validation"]).validation(), Some(false));
        assert_eq!(parse(&[]).validation(), None);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        assert!(parse(&["--height", "0"]).render_config().is_err());
        assert!(parse(&["--title", " "]).render_config().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(
            parse(&["--config", "does/not/exist.toml"])
                .render_config()
                .is_err()
        );
    }

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(present_mode(PresentModePreference::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode(PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn test_shader_dir_default() {
        assert_eq!(parse(&[]).shader_dir, PathBuf::from("shaders"));
    }
}
