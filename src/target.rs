//! The draw-target seam: the trait the optimization layer renders through,
//! plus a plain in-memory implementation.
//!
//! Widgets never talk to a backend directly. Everything in this crate
//! bottoms out in `DrawTarget` calls, which keeps backends swappable and
//! lets tests observe exactly what was dispatched.

use crate::color::{unpack_rgba, Rgba};
use crate::geometry::Rect;

/// Pen index into the target's palette.
pub type Pen = u32;

/// 16x16 one-bit stipple pattern, one row per entry, MSB leftmost.
pub type Pattern = [u16; 16];

/// How fills combine pens, mirroring the classic raster draw modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    /// Foreground pen only
    #[default]
    Jam1,
    /// Foreground and background pens (patterns use both)
    Jam2,
    /// Invert destination
    Complement,
}

/// A real rendering destination.
///
/// Fills use the target's current pen state, matching the original raster
/// API where `fill_rect` draws with whatever pen was last set. `write_span`
/// is the compositor's exit path: a run of already-resolved RGBA pixels.
pub trait DrawTarget {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn set_pen(&mut self, pen: Pen);
    fn set_bg_pen(&mut self, pen: Pen);
    fn set_draw_mode(&mut self, mode: DrawMode);

    fn pen(&self) -> Pen;
    fn bg_pen(&self) -> Pen;
    fn draw_mode(&self) -> DrawMode;

    /// Set both pens and the draw mode in one call.
    fn set_pens_draw_mode(&mut self, pen: Pen, bg_pen: Pen, mode: DrawMode) {
        self.set_pen(pen);
        self.set_bg_pen(bg_pen);
        self.set_draw_mode(mode);
    }

    /// Fill with the current pen. Out-of-bounds parts are clipped.
    fn fill_rect(&mut self, rect: Rect);

    /// Stippled fill: set bits draw the current pen, clear bits the
    /// background pen.
    fn fill_pattern(&mut self, rect: Rect, pattern: &Pattern);

    /// Write a horizontal run of resolved pixels starting at (x, y).
    fn write_span(&mut self, x: i32, y: i32, span: &[Rgba]);

    /// Pen index to packed RGBA via the target's palette.
    fn resolve_pen(&self, pen: Pen) -> Rgba;

    /// Closest pen for a packed RGBA color (inverse of `resolve_pen`,
    /// lossy on targets with a small palette).
    fn resolve_color(&self, color: Rgba) -> Pen;
}

// ============================================================================
// MemoryTarget
// ============================================================================

/// RGBA framebuffer target with a pen palette. The default backend for
/// headless rendering and the reference destination in tests.
pub struct MemoryTarget {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
    palette: Vec<Rgba>,
    pen: Pen,
    bg_pen: Pen,
    mode: DrawMode,
}

/// Default 4-entry palette: black, white, dark grey, light grey.
const DEFAULT_PALETTE: [Rgba; 4] = [0x000000FF, 0xFFFFFFFF, 0x666666FF, 0xAAAAAAFF];

impl MemoryTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_palette(width, height, DEFAULT_PALETTE.to_vec())
    }

    pub fn with_palette(width: u32, height: u32, palette: Vec<Rgba>) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
            palette,
            pen: 1,
            bg_pen: 0,
            mode: DrawMode::Jam1,
        }
    }

    /// Read back a pixel, None when out of bounds.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        if x >= 0 && (x as u32) < self.width && y >= 0 && (y as u32) < self.height {
            Some(self.pixels[(y as u32 * self.width + x as u32) as usize])
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    fn fill_with(&mut self, rect: Rect, color: Rgba) {
        let Some(r) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        for y in r.y1..=r.y2 {
            let row = (y as u32 * self.width) as usize;
            self.pixels[row + r.x1 as usize..=row + r.x2 as usize].fill(color);
        }
    }
}

impl DrawTarget for MemoryTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_pen(&mut self, pen: Pen) {
        self.pen = pen;
    }

    fn set_bg_pen(&mut self, pen: Pen) {
        self.bg_pen = pen;
    }

    fn set_draw_mode(&mut self, mode: DrawMode) {
        self.mode = mode;
    }

    fn pen(&self) -> Pen {
        self.pen
    }

    fn bg_pen(&self) -> Pen {
        self.bg_pen
    }

    fn draw_mode(&self) -> DrawMode {
        self.mode
    }

    fn fill_rect(&mut self, rect: Rect) {
        let color = self.resolve_pen(self.pen);
        match self.mode {
            DrawMode::Complement => {
                let Some(r) = rect.clamp_to(self.width, self.height) else {
                    return;
                };
                for y in r.y1..=r.y2 {
                    let row = (y as u32 * self.width) as usize;
                    for px in &mut self.pixels[row + r.x1 as usize..=row + r.x2 as usize] {
                        *px = !*px | 0xFF;
                    }
                }
            }
            _ => self.fill_with(rect, color),
        }
    }

    fn fill_pattern(&mut self, rect: Rect, pattern: &Pattern) {
        let fg = self.resolve_pen(self.pen);
        let bg = self.resolve_pen(self.bg_pen);
        let jam2 = self.mode == DrawMode::Jam2;
        let Some(r) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        for y in r.y1..=r.y2 {
            let row_bits = pattern[(y & 15) as usize];
            let row = (y as u32 * self.width) as usize;
            for x in r.x1..=r.x2 {
                let set = row_bits & (0x8000 >> (x & 15)) != 0;
                if set {
                    self.pixels[row + x as usize] = fg;
                } else if jam2 {
                    self.pixels[row + x as usize] = bg;
                }
            }
        }
    }

    fn write_span(&mut self, x: i32, y: i32, span: &[Rgba]) {
        if y < 0 || y as u32 >= self.height || span.is_empty() {
            return;
        }
        // Clip the span to the row
        let start = x.max(0);
        let end = (x + span.len() as i32 - 1).min(self.width as i32 - 1);
        if start > end {
            return;
        }
        let src_off = (start - x) as usize;
        let row = (y as u32 * self.width) as usize;
        let count = (end - start + 1) as usize;
        self.pixels[row + start as usize..row + start as usize + count]
            .copy_from_slice(&span[src_off..src_off + count]);
    }

    fn resolve_pen(&self, pen: Pen) -> Rgba {
        self.palette
            .get(pen as usize)
            .copied()
            .unwrap_or(0x888888FF)
    }

    fn resolve_color(&self, color: Rgba) -> Pen {
        let (r, g, b, _) = unpack_rgba(color);
        let mut best = 0;
        let mut best_dist = i64::MAX;
        for (i, &entry) in self.palette.iter().enumerate() {
            let (pr, pg, pb, _) = unpack_rgba(entry);
            let dr = r as i64 - pr as i64;
            let dg = g as i64 - pg as i64;
            let db = b as i64 - pb as i64;
            let dist = dr * dr + dg * dg + db * db;
            if dist < best_dist {
                best_dist = dist;
                best = i as Pen;
            }
        }
        best
    }
}

// ============================================================================
// RecordingTarget
// ============================================================================

/// One observed call on a `RecordingTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCall {
    FillRect(Rect),
    FillPattern(Rect),
    SetPen(Pen),
    SetBgPen(Pen),
    SetDrawMode(DrawMode),
    WriteSpan { x: i32, y: i32, len: usize },
}

/// A `MemoryTarget` that also records every call it receives, so tests
/// and diagnostics can assert exactly what the optimization layer
/// dispatched.
pub struct RecordingTarget {
    inner: MemoryTarget,
    calls: Vec<TargetCall>,
}

impl RecordingTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: MemoryTarget::new(width, height),
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[TargetCall] {
        &self.calls
    }

    /// Recorded calls of one variant, in dispatch order.
    pub fn fill_calls(&self) -> Vec<Rect> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TargetCall::FillRect(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn span_writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TargetCall::WriteSpan { .. }))
            .count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        self.inner.pixel(x, y)
    }
}

impl DrawTarget for RecordingTarget {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn set_pen(&mut self, pen: Pen) {
        self.calls.push(TargetCall::SetPen(pen));
        self.inner.set_pen(pen);
    }

    fn set_bg_pen(&mut self, pen: Pen) {
        self.calls.push(TargetCall::SetBgPen(pen));
        self.inner.set_bg_pen(pen);
    }

    fn set_draw_mode(&mut self, mode: DrawMode) {
        self.calls.push(TargetCall::SetDrawMode(mode));
        self.inner.set_draw_mode(mode);
    }

    fn pen(&self) -> Pen {
        self.inner.pen()
    }

    fn bg_pen(&self) -> Pen {
        self.inner.bg_pen()
    }

    fn draw_mode(&self) -> DrawMode {
        self.inner.draw_mode()
    }

    fn fill_rect(&mut self, rect: Rect) {
        self.calls.push(TargetCall::FillRect(rect));
        self.inner.fill_rect(rect);
    }

    fn fill_pattern(&mut self, rect: Rect, pattern: &Pattern) {
        self.calls.push(TargetCall::FillPattern(rect));
        self.inner.fill_pattern(rect, pattern);
    }

    fn write_span(&mut self, x: i32, y: i32, span: &[Rgba]) {
        self.calls.push(TargetCall::WriteSpan {
            x,
            y,
            len: span.len(),
        });
        self.inner.write_span(x, y, span);
    }

    fn resolve_pen(&self, pen: Pen) -> Rgba {
        self.inner.resolve_pen(pen)
    }

    fn resolve_color(&self, color: Rgba) -> Pen {
        self.inner.resolve_color(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_uses_current_pen() {
        let mut t = MemoryTarget::new(16, 16);
        t.set_pen(1);
        t.fill_rect(Rect::new(2, 2, 5, 5));
        assert_eq!(t.pixel(2, 2), Some(0xFFFFFFFF));
        assert_eq!(t.pixel(6, 2), Some(0));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut t = MemoryTarget::new(8, 8);
        t.set_pen(1);
        t.fill_rect(Rect::new(-10, -10, 100, 100));
        assert_eq!(t.pixel(0, 0), Some(0xFFFFFFFF));
        assert_eq!(t.pixel(7, 7), Some(0xFFFFFFFF));
    }

    #[test]
    fn test_write_span_clips() {
        let mut t = MemoryTarget::new(8, 1);
        let span = [0x11111111u32; 4];
        t.write_span(6, 0, &span);
        assert_eq!(t.pixel(6, 0), Some(0x11111111));
        assert_eq!(t.pixel(7, 0), Some(0x11111111));
        // Off-row writes are dropped
        t.write_span(0, 5, &span);
    }

    #[test]
    fn test_resolve_color_nearest() {
        let t = MemoryTarget::new(1, 1);
        assert_eq!(t.resolve_color(0x000000FF), 0); // black
        assert_eq!(t.resolve_color(0xFEFEFEFF), 1); // nearly white
    }

    #[test]
    fn test_pattern_jam2_uses_bg() {
        let mut t = MemoryTarget::new(16, 16);
        t.set_pens_draw_mode(1, 2, DrawMode::Jam2);
        let pattern: Pattern = [0xAAAA; 16]; // alternating columns
        t.fill_pattern(Rect::new(0, 0, 3, 0), &pattern);
        assert_eq!(t.pixel(0, 0), Some(0xFFFFFFFF)); // fg
        assert_eq!(t.pixel(1, 0), Some(0x666666FF)); // bg
    }
}
