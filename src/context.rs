//! The per-window rendering context: owner of the capability table, the
//! pixel buffer and the tuning knobs. Widgets only ever borrow it.

use crate::batch::DrawBatch;
use crate::caps::{detect, RenderOps};
use crate::pixelbuf::PixelBuffer;
use crate::policy::PolicyConfig;
use crate::target::DrawTarget;

/// Long-lived rendering state for one window or screen.
///
/// Created at window setup, dropped at window teardown. Everything it
/// owns is accessed from the owning thread only; a draw pass runs to
/// completion without suspension points.
pub struct RenderContext {
    pub(crate) caps: RenderOps,
    pub(crate) pixel: PixelBuffer,
    pub(crate) policy: PolicyConfig,
    pub(crate) last_pass_batched_ops: usize,
}

impl RenderContext {
    /// Context with capabilities probed from the running CPU.
    pub fn new() -> Self {
        Self::with_ops(detect())
    }

    /// Context with a forced capability mask over the reference
    /// implementations. Lets tests and heterogeneous hosts pin behavior.
    pub fn with_caps(caps: u32) -> Self {
        Self::with_ops(RenderOps::with_caps(caps))
    }

    fn with_ops(caps: RenderOps) -> Self {
        Self {
            caps,
            pixel: PixelBuffer::new(),
            policy: PolicyConfig::default(),
            last_pass_batched_ops: 0,
        }
    }

    /// Replace the default policy thresholds.
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn caps(&self) -> &RenderOps {
        &self.caps
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn pixel_buffer(&self) -> &PixelBuffer {
        &self.pixel
    }

    pub fn pixel_buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.pixel
    }

    /// Batched-operation count recorded by the most recent non-empty
    /// batch flush; feeds the widget optimization gate.
    pub fn last_pass_batched_ops(&self) -> usize {
        self.last_pass_batched_ops
    }

    /// Flush a batch into `target`, recording its depth for the policy
    /// heuristics.
    pub fn flush_batch(&mut self, batch: &mut DrawBatch, target: &mut dyn DrawTarget) {
        if batch.has_ops() {
            self.last_pass_batched_ops = batch.len();
        }
        batch.flush(&self.caps, &mut self.pixel, target);
    }

    /// Flush any dirty pixel-buffer region into `target`.
    pub fn flush_pixel_buffer(&mut self, target: &mut dyn DrawTarget) {
        self.pixel.flush(&self.caps, target);
    }

    /// Flush and free the pixel buffer's storage, at window teardown or
    /// under memory pressure. The buffer reallocates lazily if used
    /// again.
    pub fn release_pixel_buffer(&mut self, target: &mut dyn DrawTarget) {
        self.pixel.flush(&self.caps, target);
        self.pixel.release();
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CAP_BATCH;
    use crate::color::pack_rgba;
    use crate::geometry::Rect;
    use crate::target::RecordingTarget;

    #[test]
    fn test_contexts_are_independent() {
        let a = RenderContext::with_caps(0);
        let b = RenderContext::with_caps(CAP_BATCH);
        assert_eq!(a.caps().caps, 0);
        assert_eq!(b.caps().caps, CAP_BATCH);
    }

    #[test]
    fn test_flush_batch_records_depth() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(64, 64);
        let mut batch = DrawBatch::new();
        batch.add_fill(Rect::new(0, 0, 3, 3), pack_rgba(255, 255, 255, 255));
        batch.add_fill(Rect::new(0, 10, 3, 13), pack_rgba(255, 255, 255, 255));

        ctx.flush_batch(&mut batch, &mut target);
        assert_eq!(ctx.last_pass_batched_ops(), 2);
        assert!(batch.is_empty());

        // Empty flush keeps the last recorded depth
        ctx.flush_batch(&mut batch, &mut target);
        assert_eq!(ctx.last_pass_batched_ops(), 2);
    }

    #[test]
    fn test_release_flushes_then_frees() {
        let mut ctx = RenderContext::with_caps(crate::caps::CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(16, 16);
        assert!(ctx.pixel_buffer_mut().acquire(16, 16));
        let caps = RenderOps::with_caps(crate::caps::CAP_PIXELBUFFER);
        ctx.pixel.fill(&caps, Rect::new(0, 0, 3, 3), 0xFFFFFFFF);

        ctx.release_pixel_buffer(&mut target);
        assert!(target.span_writes() > 0);
        assert!(!ctx.pixel_buffer().is_allocated());
    }
}
