//! What the run loop needs from a window.

use crate::input::InputState;

/// Window the renderer presents to.
pub trait WindowSource {
    /// Current drawable size in physical pixels. Zero while minimized.
    fn drawable_size(&self) -> (u32, u32);

    /// Processes pending window and input events.
    fn poll_events(&mut self);

    /// True once the user asked to close the application.
    fn quit_requested(&self) -> bool;

    /// Input as of the last [`poll_events`](Self::poll_events).
    fn input(&self) -> &InputState;
}
