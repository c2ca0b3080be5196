//! Frame lifecycle on top of the RHI.
//!
//! This crate drives rendering one frame at a time:
//! - [`frame_ring`]: per-slot command buffers, acquire semaphores and fences
//! - [`frame_driver`]: wait, acquire, record, submit, present for one frame
//! - [`run_loop`]: the [`Renderer`] that owns everything and rebuilds the
//!   presentation chain when it goes stale
//!
//! Draw content comes from collaborators implementing the traits in [`layer`].

pub mod context;
pub mod frame_driver;
pub mod frame_ring;
pub mod layer;
pub mod run_loop;
pub mod targets;

pub use context::FrameContext;
pub use frame_driver::{FrameDriver, FrameOutcome, FrameState};
pub use frame_ring::{FrameRing, FrameSlot};
pub use layer::{FrameInfo, SceneRenderer, TargetInfo, UiLayer};
pub use lsv_platform::{InputState, WindowSource};
pub use run_loop::{Renderer, RendererDesc, TickOutcome};
pub use targets::DrawTargets;

/// Number of frames that can be in flight simultaneously.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Bound on waiting for a slot's fence or for a presentable image.
pub const FRAME_TIMEOUT_NS: u64 = 1_000_000_000;
