//! Render state shared by the frame driver and the run loop.

use lsv_rhi::gpu::Staleness;
use tracing::debug;

use crate::FRAMES_IN_FLIGHT;

/// Frame counter and staleness flag.
///
/// Passed explicitly to the frame driver and owned by the [`crate::Renderer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// Number of frames that reached presentation.
    pub frame_number: u64,
    /// The presentation chain no longer matches the surface and must be rebuilt
    /// before the next frame.
    pub chain_stale: bool,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the frame ring slot the current frame uses.
    #[inline]
    pub fn slot_index(&self) -> usize {
        (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Counts a frame whose submission has been queued and presentation requested.
    #[inline]
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    pub fn mark_stale(&mut self, staleness: Staleness) {
        if !self.chain_stale {
            debug!(
                "Presentation chain stale ({:?}) at frame {}",
                staleness, self.frame_number
            );
        }
        self.chain_stale = true;
    }

    /// Clears the staleness flag, returning whether it was set.
    pub fn take_stale(&mut self) -> bool {
        std::mem::take(&mut self.chain_stale)
    }
}
