//! Transparent draw-target wrapper: the surface widgets actually draw
//! through.
//!
//! Every call lands in one of three places, decided per call: the pixel
//! buffer (large or blended work), the batch queue (deferred until the
//! end of the pass), or the target itself (immediate mode). Pen state is
//! mirrored locally so deferred operations capture the pen that was
//! current when they were issued, not the pen at flush time.

use log::trace;

use crate::batch::{DrawBatch, OpKind};
use crate::caps::CAP_PIXELBUFFER;
use crate::color::Rgba;
use crate::context::RenderContext;
use crate::geometry::Rect;
use crate::policy::should_use_pixel_buffer;
use crate::target::{DrawMode, DrawTarget, Pattern, Pen};

/// Wraps a draw target and a rendering context for the duration of one
/// draw pass.
///
/// Dropping the wrapper flushes everything still pending, so a widget
/// that returns early never leaves queued pixels behind. `finish`
/// does the same explicitly.
pub struct DrawTargetWrapper<'a> {
    ctx: &'a mut RenderContext,
    target: &'a mut dyn DrawTarget,
    batch: Option<DrawBatch>,
    immediate: bool,
    /// Route everything bufferable to the pixel buffer, policy aside
    force_pixel_buffer: bool,
    /// The pixel buffer holds live pixels from this pass
    pixel_active: bool,
    // Mirrored target pen state
    pen: Pen,
    bg_pen: Pen,
    draw_mode: DrawMode,
}

impl<'a> DrawTargetWrapper<'a> {
    /// Wrap `target` for one draw pass. Starts in immediate mode with the
    /// pen state read from the target.
    pub fn new(ctx: &'a mut RenderContext, target: &'a mut dyn DrawTarget) -> Self {
        let pen = target.pen();
        let bg_pen = target.bg_pen();
        let draw_mode = target.draw_mode();
        Self {
            ctx,
            target,
            batch: None,
            immediate: true,
            force_pixel_buffer: false,
            pixel_active: false,
            pen,
            bg_pen,
            draw_mode,
        }
    }

    pub fn pen(&self) -> Pen {
        self.pen
    }

    pub fn bg_pen(&self) -> Pen {
        self.bg_pen
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn is_batching(&self) -> bool {
        !self.immediate && self.batch.is_some()
    }

    /// Queued operations in the current batch, 0 in immediate mode.
    pub fn batch_depth(&self) -> usize {
        self.batch.as_ref().map_or(0, DrawBatch::len)
    }

    // ========================================================================
    // Mode control
    // ========================================================================

    /// Start deferring fills into `batch` until `disable_batch_mode` or
    /// the end of the pass. A batch already in place is flushed first;
    /// mode switches never drop queued operations.
    pub fn enable_batch_mode(&mut self, batch: DrawBatch) {
        trace!("batch mode on");
        if let Some(prev) = self.batch.as_mut() {
            self.ctx.flush_batch(prev, &mut *self.target);
        }
        self.batch = Some(batch);
        self.immediate = false;
    }

    /// Flush and return the batch, back to immediate mode. The caller can
    /// reuse the batch next pass to keep its capacity.
    pub fn disable_batch_mode(&mut self) -> Option<DrawBatch> {
        if let Some(batch) = self.batch.as_mut() {
            self.ctx.flush_batch(batch, &mut *self.target);
        }
        self.immediate = true;
        self.batch.take()
    }

    /// Route all bufferable operations through the pixel buffer
    /// regardless of the policy thresholds.
    pub fn enable_pixel_buffer(&mut self) {
        self.force_pixel_buffer = true;
    }

    /// Flush any buffered pixels and stop forcing the pixel buffer.
    pub fn disable_pixel_buffer(&mut self) {
        self.ctx.flush_pixel_buffer(&mut *self.target);
        self.force_pixel_buffer = false;
        self.pixel_active = false;
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    /// Fill `rect` with the current pen.
    pub fn fill_rect(&mut self, rect: Rect) {
        if self.route_to_buffer(OpKind::Fill, rect) {
            let color = (self.ctx.caps.pen_to_rgba)(&*self.target, self.pen);
            let ctx = &mut *self.ctx;
            ctx.pixel.fill(&ctx.caps, rect, color);
            return;
        }
        if let Some(batch) = self.batch.as_mut() {
            if !self.immediate {
                let color = (self.ctx.caps.pen_to_rgba)(&*self.target, self.pen);
                batch.add_fill(rect, color);
                return;
            }
        }
        (self.ctx.caps.fill_rect)(&mut *self.target, rect, self.pen);
    }

    /// Stippled fill with the current pens. The stipple only survives on
    /// the immediate path; batched patterns run as solid foreground fills.
    pub fn fill_pattern(&mut self, rect: Rect, pattern: &Pattern) {
        if let Some(batch) = self.batch.as_mut() {
            if !self.immediate {
                let color = (self.ctx.caps.pen_to_rgba)(&*self.target, self.pen);
                batch.add_pattern(rect, color);
                return;
            }
        }
        (self.ctx.caps.fill_pattern)(&mut *self.target, rect, pattern, self.pen, self.bg_pen);
    }

    /// Blend `color` over `rect` at `alpha`. Alpha 0 is a complete no-op.
    /// Without a usable pixel buffer, mostly-opaque blends degrade to
    /// solid fills and the rest are skipped.
    pub fn blend_rect(&mut self, rect: Rect, color: Rgba, alpha: u8) {
        if alpha == 0 {
            return;
        }
        if self.route_to_buffer(OpKind::Blend, rect) {
            let ctx = &mut *self.ctx;
            ctx.pixel.blend(&ctx.caps, rect, color, alpha);
            return;
        }
        if let Some(batch) = self.batch.as_mut() {
            if !self.immediate {
                batch.add_blend(rect, color, alpha);
                return;
            }
        }
        if alpha >= 128 {
            let pen = self.target.resolve_color(color);
            (self.ctx.caps.fill_rect)(&mut *self.target, rect, pen);
        }
    }

    /// Linear two-color gradient. Gradients need per-pixel writes, so
    /// they always go through the pixel buffer; if it cannot be acquired
    /// the gradient degrades to a solid fill of the start color.
    pub fn fill_gradient(&mut self, rect: Rect, start: Rgba, end: Rgba, horizontal: bool) {
        if self.ctx.caps.has(CAP_PIXELBUFFER) && self.acquire_for(rect) {
            self.ctx.pixel.gradient(rect, start, end, horizontal);
            return;
        }
        let pen = self.target.resolve_color(start);
        (self.ctx.caps.fill_rect)(&mut *self.target, rect, pen);
    }

    // ========================================================================
    // Pen state
    // ========================================================================

    /// Set the foreground pen: written through to the target, mirrored
    /// locally, and announced to the dispatch table.
    pub fn set_pen(&mut self, pen: Pen) {
        self.pen = pen;
        (self.ctx.caps.set_pen)(&mut *self.target, pen);
    }

    pub fn set_bg_pen(&mut self, pen: Pen) {
        self.bg_pen = pen;
        self.target.set_bg_pen(pen);
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw_mode = mode;
        self.target.set_draw_mode(mode);
    }

    /// Set both pens and the draw mode in one call.
    pub fn set_pens_draw_mode(&mut self, pen: Pen, bg_pen: Pen, mode: DrawMode) {
        self.pen = pen;
        self.bg_pen = bg_pen;
        self.draw_mode = mode;
        (self.ctx.caps.set_pens_draw_mode)(&mut *self.target, pen, bg_pen, mode);
    }

    /// Re-read the mirrored pen state from the target, after a caller has
    /// driven the target directly behind the wrapper's back.
    pub fn sync(&mut self) {
        self.pen = self.target.pen();
        self.bg_pen = self.target.bg_pen();
        self.draw_mode = self.target.draw_mode();
    }

    // ========================================================================
    // End of pass
    // ========================================================================

    /// Flush everything still pending and end the pass. Equivalent to
    /// dropping the wrapper, but explicit at call sites that care about
    /// ordering.
    pub fn finish(mut self) {
        self.flush_all();
    }

    fn flush_all(&mut self) {
        if let Some(batch) = self.batch.as_mut() {
            self.ctx.flush_batch(batch, &mut *self.target);
        }
        self.ctx.flush_pixel_buffer(&mut *self.target);
        self.pixel_active = false;
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Decide whether this operation goes to the pixel buffer, and if so
    /// make sure the buffer is ready for it. A failed acquire falls back
    /// to the non-buffered paths.
    fn route_to_buffer(&mut self, kind: OpKind, rect: Rect) -> bool {
        let wanted = self.force_pixel_buffer
            || should_use_pixel_buffer(
                self.ctx.caps.caps,
                &self.ctx.policy,
                kind,
                rect.area(),
                self.batch_depth(),
            );
        wanted && self.ctx.caps.has(CAP_PIXELBUFFER) && self.acquire_for(rect)
    }

    /// Acquire the pixel buffer for `rect`, flushing first when growth
    /// would discard pixels already buffered this pass.
    fn acquire_for(&mut self, rect: Rect) -> bool {
        // Saturate: an extent at i32::MAX must fail the acquire, not
        // overflow
        let min_w = rect.x2.saturating_add(1).max(1) as u32;
        let min_h = rect.y2.saturating_add(1).max(1) as u32;
        if self.pixel_active && self.ctx.pixel.covers(min_w, min_h) {
            return true;
        }
        // Growth reallocates without preserving contents, and acquire
        // resets the dirty state either way.
        self.ctx.flush_pixel_buffer(&mut *self.target);
        if self.ctx.pixel.acquire(min_w, min_h) {
            self.pixel_active = true;
            true
        } else {
            self.pixel_active = false;
            false
        }
    }
}

impl Drop for DrawTargetWrapper<'_> {
    fn drop(&mut self) {
        self.flush_all();
    }
}

/// Blend directly against a bare target, for callers that have no
/// rendering context at hand. Degrades the same way the wrapper does
/// without a buffer: mostly-opaque becomes a solid fill, the rest is
/// skipped.
pub fn blend_rect_direct(target: &mut dyn DrawTarget, rect: Rect, color: Rgba, alpha: u8) {
    if alpha == 0 || alpha < 128 {
        return;
    }
    let pen = target.resolve_color(color);
    target.set_pen(pen);
    target.fill_rect(rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{CAP_BATCH, CAP_BLEND, CAP_PIXELBUFFER};
    use crate::target::{RecordingTarget, TargetCall};

    const WHITE_PEN: Pen = 1;

    fn ctx_without_buffer() -> RenderContext {
        RenderContext::with_caps(0)
    }

    #[test]
    fn test_immediate_fill_dispatches_exactly_once() {
        let mut ctx = ctx_without_buffer();
        let mut target = RecordingTarget::new(32, 32);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.fill_rect(Rect::new(2, 3, 10, 11));
        assert_eq!(w.batch_depth(), 0);
        w.finish();

        assert_eq!(
            target.calls(),
            &[
                TargetCall::SetPen(WHITE_PEN),
                TargetCall::SetPen(WHITE_PEN),
                TargetCall::FillRect(Rect::new(2, 3, 10, 11)),
            ]
        );
    }

    #[test]
    fn test_batched_fills_defer_until_flush() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_batch_mode(DrawBatch::new());

        w.fill_rect(Rect::new(0, 0, 3, 3));
        w.fill_rect(Rect::new(8, 0, 11, 3));
        assert_eq!(w.batch_depth(), 2);

        let batch = w.disable_batch_mode();
        assert!(batch.is_some_and(|b| b.is_empty()));
        w.finish();

        assert_eq!(target.fill_calls().len(), 2);
        assert_eq!(ctx.last_pass_batched_ops(), 2);
    }

    #[test]
    fn test_enable_batch_mode_flushes_previous_batch() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_batch_mode(DrawBatch::new());
        w.fill_rect(Rect::new(0, 0, 3, 3));

        // Re-entering batch mode must not lose the queued fill
        w.enable_batch_mode(DrawBatch::new());
        assert_eq!(w.batch_depth(), 0);
        w.fill_rect(Rect::new(8, 0, 11, 3));
        w.finish();

        assert_eq!(
            target.fill_calls(),
            vec![Rect::new(0, 0, 3, 3), Rect::new(8, 0, 11, 3)]
        );
    }

    #[test]
    fn test_huge_rect_degrades_without_panic() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER | CAP_BLEND);
        let mut target = RecordingTarget::new(16, 16);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        // Extent at i32::MAX: acquire fails on the byte ceiling and the
        // fill goes out immediately, clipped by the target
        let huge = Rect::new(0, 0, i32::MAX, i32::MAX);
        w.fill_rect(huge);
        w.blend_rect(huge, 0xFF0000FF, 200);
        w.finish();

        assert_eq!(target.fill_calls(), vec![huge, huge]);
        assert_eq!(target.span_writes(), 0);
    }

    #[test]
    fn test_abutting_batched_fills_merge_to_one_dispatch() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_batch_mode(DrawBatch::new());
        w.fill_rect(Rect::new(0, 0, 9, 9));
        w.fill_rect(Rect::new(10, 0, 19, 9));
        w.finish();

        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 19, 9)]);
    }

    #[test]
    fn test_batched_fill_captures_pen_at_issue_time() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.enable_batch_mode(DrawBatch::new());

        w.set_pen(0); // black
        w.fill_rect(Rect::new(0, 0, 3, 3));
        w.set_pen(1); // white
        w.fill_rect(Rect::new(8, 0, 11, 3));
        w.finish();

        // Each fill resolved back to the pen current when it was issued
        assert_eq!(target.pixel(0, 0), Some(0x000000FF));
        assert_eq!(target.pixel(8, 0), Some(0xFFFFFFFF));
    }

    #[test]
    fn test_large_fill_routes_to_pixel_buffer() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        // 40x40 = 1600 > default 1000 area threshold
        w.fill_rect(Rect::new(0, 0, 39, 39));
        w.finish();

        // Buffered and copied out, never dispatched as a fill
        assert!(target.fill_calls().is_empty());
        assert!(target.span_writes() > 0);
        assert_eq!(target.pixel(0, 0), Some(0xFFFFFFFF));
        assert_eq!(target.pixel(39, 39), Some(0xFFFFFFFF));
        assert_eq!(target.pixel(40, 40), Some(0));
    }

    #[test]
    fn test_small_fill_stays_immediate() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.fill_rect(Rect::new(0, 0, 3, 3));
        w.finish();

        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 3, 3)]);
        assert_eq!(target.span_writes(), 0);
    }

    #[test]
    fn test_forced_pixel_buffer_overrides_policy() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_pixel_buffer();
        w.fill_rect(Rect::new(0, 0, 3, 3)); // tiny, still buffered
        w.finish();

        assert!(target.fill_calls().is_empty());
        assert!(target.span_writes() > 0);
    }

    #[test]
    fn test_disable_pixel_buffer_flushes_once() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(64, 64);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_pixel_buffer();
        w.fill_rect(Rect::new(0, 0, 7, 0));
        w.disable_pixel_buffer();
        w.finish();

        // One row flushed at disable; finish found the buffer clean and
        // copied nothing more
        assert_eq!(target.span_writes(), 1);
    }

    #[test]
    fn test_blend_alpha_zero_touches_nothing() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER | CAP_BLEND);
        let mut target = RecordingTarget::new(32, 32);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.blend_rect(Rect::new(0, 0, 9, 9), 0xFF0000FF, 0);
        w.finish();
        assert!(target.calls().is_empty());
    }

    #[test]
    fn test_blend_without_buffer_degrades_by_alpha() {
        let mut ctx = ctx_without_buffer();
        let mut target = RecordingTarget::new(32, 32);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.blend_rect(Rect::new(0, 0, 9, 9), 0xFFFFFFFF, 200);
        w.blend_rect(Rect::new(10, 0, 19, 9), 0xFFFFFFFF, 50);
        w.finish();
        // Only the mostly-opaque blend landed, as a solid fill
        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 9, 9)]);
    }

    #[test]
    fn test_blend_through_buffer_composites() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER | CAP_BLEND);
        let mut target = RecordingTarget::new(32, 32);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.enable_pixel_buffer();
        w.fill_rect(Rect::new(0, 0, 9, 9)); // white base (default pen 1)
        w.blend_rect(Rect::new(0, 0, 9, 9), 0x000000FF, 128);
        w.finish();

        // Roughly half-darkened white, definitely neither endpoint
        let px = target.pixel(5, 5).unwrap_or(0);
        let r = (px >> 24) & 0xFF;
        assert!(r > 0x40 && r < 0xC0, "got {px:#010X}");
    }

    #[test]
    fn test_buffer_growth_flushes_earlier_pixels() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(200, 200);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(WHITE_PEN);
        w.enable_pixel_buffer();
        w.fill_rect(Rect::new(0, 0, 9, 9));
        // Needs a bigger buffer; the first fill must be flushed, not lost
        w.fill_rect(Rect::new(0, 0, 99, 99));
        w.finish();

        assert_eq!(target.pixel(5, 5), Some(0xFFFFFFFF));
        assert_eq!(target.pixel(99, 99), Some(0xFFFFFFFF));
    }

    #[test]
    fn test_drop_flushes_pending_work() {
        let mut ctx = RenderContext::with_caps(CAP_BATCH);
        let mut target = RecordingTarget::new(32, 32);
        {
            let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
            w.set_pen(WHITE_PEN);
            w.enable_batch_mode(DrawBatch::new());
            w.fill_rect(Rect::new(0, 0, 3, 3));
            // No finish(): early return path
        }
        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 3, 3)]);
    }

    #[test]
    fn test_sync_rereads_target_pens() {
        let mut ctx = ctx_without_buffer();
        let mut target = RecordingTarget::new(8, 8);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.set_pen(0);
        // Somebody drove the target directly
        w.target.set_pen(3);
        assert_eq!(w.pen(), 0);
        w.sync();
        assert_eq!(w.pen(), 3);
    }

    #[test]
    fn test_gradient_lands_endpoint_colors() {
        let mut ctx = RenderContext::with_caps(CAP_PIXELBUFFER);
        let mut target = RecordingTarget::new(32, 32);
        let mut w = DrawTargetWrapper::new(&mut ctx, &mut target);
        w.fill_gradient(Rect::new(0, 0, 15, 0), 0x000000FF, 0xFF0000FF, true);
        w.finish();
        assert_eq!(target.pixel(0, 0), Some(0x000000FF));
        assert_eq!(target.pixel(15, 0), Some(0xFF0000FF));
    }

    #[test]
    fn test_direct_blend_helper() {
        let mut target = RecordingTarget::new(16, 16);
        blend_rect_direct(&mut target, Rect::new(0, 0, 3, 3), 0xFFFFFFFF, 30);
        assert!(target.fill_calls().is_empty());
        blend_rect_direct(&mut target, Rect::new(0, 0, 3, 3), 0xFFFFFFFF, 255);
        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 3, 3)]);
    }
}
