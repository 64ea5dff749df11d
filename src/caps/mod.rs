//! Capability detection and the operation dispatch table.
//!
//! `detect()` probes the CPU once per rendering context and builds an
//! immutable table of function pointers: reference (scalar)
//! implementations are installed first, SIMD variants overwrite entries
//! only when the corresponding runtime probe succeeds, and the batching
//! capability is derived from what else is present rather than probed.

mod simd;

use log::debug;

use crate::batch::BatchOp;
use crate::color::{pack_rgba, Rgba};
use crate::geometry::Rect;
use crate::pixelbuf::PixelBuffer;
use crate::target::{DrawMode, DrawTarget, Pattern, Pen};

// Capability flags
pub const CAP_SIMD: u32 = 1 << 0; // some SIMD class is available
pub const CAP_BATCH: u32 = 1 << 1; // batch entry points worth using
pub const CAP_BLEND: u32 = 1 << 2; // accelerated blending
pub const CAP_PIXELBUFFER: u32 = 1 << 3; // off-screen compositing buffer
pub const CAP_SSE2: u32 = 1 << 4;
pub const CAP_AVX2: u32 = 1 << 5;
pub const CAP_NEON: u32 = 1 << 6;

/// Immutable dispatch table built once per rendering context.
///
/// Every entry is always callable: detection fails soft, leaving the
/// portable reference implementation in place and the corresponding
/// capability bit clear.
pub struct RenderOps {
    /// Bitmask of CAP_* flags
    pub caps: u32,

    // Target operations
    pub fill_rect: fn(&mut dyn DrawTarget, Rect, Pen),
    pub fill_pattern: fn(&mut dyn DrawTarget, Rect, &Pattern, Pen, Pen),
    pub set_pen: fn(&mut dyn DrawTarget, Pen),
    pub set_pens_draw_mode: fn(&mut dyn DrawTarget, Pen, Pen, DrawMode),

    // Batch operations: dispatch a run of same-kind ops in one call
    pub batch_fill: fn(&mut dyn DrawTarget, &[BatchOp]),
    pub batch_blend: fn(&mut dyn DrawTarget, &[BatchOp]),

    // Pixel buffer operations: rects are pre-clamped by the buffer
    pub pb_fill: fn(&mut [Rgba], u32, Rect, Rgba),
    pub pb_blend: fn(&mut [Rgba], u32, Rect, Rgba, u8),
    pub pb_copy: fn(&[Rgba], u32, Rect, &mut dyn DrawTarget),

    // Color conversion
    pub pen_to_rgba: fn(&dyn DrawTarget, Pen) -> Rgba,
    pub pack_color: fn(u8, u8, u8, u8) -> Rgba,
}

impl RenderOps {
    /// All-reference table with no capability bits set: the portable
    /// baseline every platform gets.
    pub fn reference() -> Self {
        Self {
            caps: 0,
            fill_rect: ref_fill_rect,
            fill_pattern: ref_fill_pattern,
            set_pen: ref_set_pen,
            set_pens_draw_mode: ref_set_pens_draw_mode,
            batch_fill: ref_batch_fill,
            batch_blend: ref_batch_blend,
            pb_fill: ref_pb_fill,
            pb_blend: ref_pb_blend,
            pb_copy: ref_pb_copy,
            pen_to_rgba: ref_pen_to_rgba,
            pack_color: pack_rgba,
        }
    }

    /// Reference table with a forced capability mask. Used by tests and by
    /// hosts that need to pin behavior across heterogeneous backends.
    pub fn with_caps(caps: u32) -> Self {
        let mut ops = Self::reference();
        ops.caps = caps;
        ops
    }

    #[inline]
    pub fn has(&self, flag: u32) -> bool {
        self.caps & flag != 0
    }
}

// ============================================================================
// CPU feature probes
// ============================================================================

#[inline(always)]
fn sse2() -> bool {
    #[cfg(target_arch = "x86_64")]
    return std::arch::is_x86_feature_detected!("sse2");
    #[cfg(not(target_arch = "x86_64"))]
    return false;
}

#[inline(always)]
fn avx2() -> bool {
    #[cfg(target_arch = "x86_64")]
    return std::arch::is_x86_feature_detected!("avx2");
    #[cfg(not(target_arch = "x86_64"))]
    return false;
}

#[inline(always)]
fn neon() -> bool {
    #[cfg(target_arch = "aarch64")]
    // Baseline on aarch64, but probe anyway
    return std::arch::is_aarch64_feature_detected!("neon");
    #[cfg(not(target_arch = "aarch64"))]
    return false;
}

/// Probe the runtime environment and build the dispatch table.
///
/// Never fails: with no acceleration present the result is the reference
/// table with an all-zero feature mask.
pub fn detect() -> RenderOps {
    let mut ops = RenderOps::reference();

    // The linear compositing buffer needs nothing beyond the allocator,
    // and our blend path rides on it.
    ops.caps |= CAP_PIXELBUFFER | CAP_BLEND;

    if sse2() {
        ops.caps |= CAP_SIMD | CAP_SSE2;
        #[cfg(target_arch = "x86_64")]
        {
            ops.pb_fill = simd::pb_fill_sse2;
        }
    }

    if avx2() {
        ops.caps |= CAP_SIMD | CAP_AVX2;
        #[cfg(target_arch = "x86_64")]
        {
            ops.pb_fill = simd::pb_fill_avx2;
        }
    }

    if neon() {
        ops.caps |= CAP_SIMD | CAP_NEON;
        #[cfg(target_arch = "aarch64")]
        {
            ops.pb_fill = simd::pb_fill_neon;
        }
    }

    // Batching pays off only when either the wide fill path or the
    // compositing buffer is there to absorb the grouped work.
    if ops.caps & (CAP_SIMD | CAP_PIXELBUFFER) != 0 {
        ops.caps |= CAP_BATCH;
    }

    debug!(
        "render caps: {:#09b} (sse2={} avx2={} neon={})",
        ops.caps,
        ops.has(CAP_SSE2),
        ops.has(CAP_AVX2),
        ops.has(CAP_NEON)
    );

    ops
}

// ============================================================================
// Reference implementations
// ============================================================================

fn ref_fill_rect(target: &mut dyn DrawTarget, rect: Rect, pen: Pen) {
    target.set_pen(pen);
    target.fill_rect(rect);
}

fn ref_fill_pattern(target: &mut dyn DrawTarget, rect: Rect, pattern: &Pattern, fg: Pen, bg: Pen) {
    target.set_pen(fg);
    target.set_bg_pen(bg);
    target.fill_pattern(rect, pattern);
}

fn ref_set_pen(target: &mut dyn DrawTarget, pen: Pen) {
    target.set_pen(pen);
}

fn ref_set_pens_draw_mode(target: &mut dyn DrawTarget, pen: Pen, bg_pen: Pen, mode: DrawMode) {
    target.set_pens_draw_mode(pen, bg_pen, mode);
}

fn ref_batch_fill(target: &mut dyn DrawTarget, run: &[BatchOp]) {
    for op in run {
        let pen = target.resolve_color(op.color);
        target.set_pen(pen);
        target.fill_rect(op.rect);
    }
}

/// Reference blend run: no way to read target pixels back, so
/// mostly-opaque ops become solid fills and the rest are skipped. This is
/// the documented lossy path for targets without buffer support.
fn ref_batch_blend(target: &mut dyn DrawTarget, run: &[BatchOp]) {
    for op in run {
        if op.alpha >= 128 {
            let pen = target.resolve_color(op.color);
            target.set_pen(pen);
            target.fill_rect(op.rect);
        }
    }
}

fn ref_pb_fill(pixels: &mut [Rgba], stride: u32, rect: Rect, color: Rgba) {
    for y in rect.y1..=rect.y2 {
        let row = (y as u32 * stride) as usize;
        pixels[row + rect.x1 as usize..=row + rect.x2 as usize].fill(color);
    }
}

fn ref_pb_blend(pixels: &mut [Rgba], stride: u32, rect: Rect, color: Rgba, alpha: u8) {
    for y in rect.y1..=rect.y2 {
        let row = (y as u32 * stride) as usize;
        for px in &mut pixels[row + rect.x1 as usize..=row + rect.x2 as usize] {
            PixelBuffer::blend_px(px, color, alpha);
        }
    }
}

fn ref_pb_copy(pixels: &[Rgba], stride: u32, area: Rect, target: &mut dyn DrawTarget) {
    for y in area.y1..=area.y2 {
        let row = (y as u32 * stride) as usize;
        let span = &pixels[row + area.x1 as usize..=row + area.x2 as usize];
        target.write_span(area.x1, y, span);
    }
}

fn ref_pen_to_rgba(target: &dyn DrawTarget, pen: Pen) -> Rgba {
    target.resolve_pen(pen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{RecordingTarget, TargetCall};

    #[test]
    fn test_reference_table_has_no_caps() {
        let ops = RenderOps::reference();
        assert_eq!(ops.caps, 0);
        assert!(!ops.has(CAP_BATCH));
    }

    #[test]
    fn test_detect_always_has_pixelbuffer_and_batch() {
        let ops = detect();
        assert!(ops.has(CAP_PIXELBUFFER));
        // Batching derives from pixel-buffer presence even without SIMD
        assert!(ops.has(CAP_BATCH));
    }

    #[test]
    fn test_simd_flag_implies_class_flag() {
        let ops = detect();
        if ops.has(CAP_SIMD) {
            assert!(ops.has(CAP_SSE2) || ops.has(CAP_AVX2) || ops.has(CAP_NEON));
        }
    }

    #[test]
    fn test_forced_mask_keeps_reference_entries() {
        let ops = RenderOps::with_caps(CAP_BATCH);
        assert!(ops.has(CAP_BATCH));
        assert!(!ops.has(CAP_PIXELBUFFER));
        let mut target = RecordingTarget::new(8, 8);
        (ops.fill_rect)(&mut target, Rect::new(0, 0, 3, 3), 1);
        assert_eq!(
            target.calls(),
            &[
                TargetCall::SetPen(1),
                TargetCall::FillRect(Rect::new(0, 0, 3, 3))
            ]
        );
    }

    #[test]
    fn test_ref_batch_blend_degrades_by_alpha() {
        let ops = RenderOps::reference();
        let mut target = RecordingTarget::new(16, 16);
        let run = [
            BatchOp {
                rect: Rect::new(0, 0, 3, 3),
                color: 0xFFFFFFFF,
                kind: crate::batch::OpKind::Blend,
                alpha: 200,
            },
            BatchOp {
                rect: Rect::new(4, 0, 7, 3),
                color: 0xFFFFFFFF,
                kind: crate::batch::OpKind::Blend,
                alpha: 50,
            },
        ];
        (ops.batch_blend)(&mut target, &run);
        // Only the mostly-opaque op lands, as a solid fill
        assert_eq!(target.fill_calls(), vec![Rect::new(0, 0, 3, 3)]);
    }

    #[test]
    fn test_pb_fill_matches_reference_when_simd_active() {
        // Whatever entry detection installed must agree with the scalar
        // reference on the same input.
        let detected = detect();
        let rect = Rect::new(1, 1, 13, 6);
        let mut a = vec![0u32; 16 * 8];
        let mut b = vec![0u32; 16 * 8];
        (detected.pb_fill)(&mut a, 16, rect, 0xAABBCCFF);
        ref_pb_fill(&mut b, 16, rect, 0xAABBCCFF);
        assert_eq!(a, b);
    }
}
