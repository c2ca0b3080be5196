//! Platform layer: the window, its input and its Vulkan surface.
//!
//! [`Window`] implements [`WindowSource`], so the run loop can poll it once per
//! iteration, read its live drawable size and hand its input to the scene.

mod input;
mod source;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use source::WindowSource;
pub use window::{Surface, Window};
