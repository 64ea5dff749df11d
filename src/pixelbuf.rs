//! Off-screen RGBA32 scratch buffer with dirty-rectangle tracking.
//!
//! This is a transient compositing surface, not persistent pixel storage:
//! growth does not preserve contents, because widgets re-render into it
//! every pass. Only the dirty rectangle is copied back to the real target
//! on flush.

use log::{debug, trace};

use crate::caps::RenderOps;
use crate::color::{blend_rgba, pack_rgba, unpack_rgba, Rgba};
use crate::geometry::Rect;
use crate::target::DrawTarget;

/// Growth factor for buffer reallocation
const GROWTH_FACTOR: f32 = 1.2;

/// Hard ceiling on buffer size (Full HD RGBA). Requests beyond this fail
/// and the caller falls back to non-buffered drawing.
pub const MAX_PIXEL_BUFFER_BYTES: usize = 1920 * 1080 * 4;

/// Growable off-screen color buffer owned by a rendering context.
pub struct PixelBuffer {
    pixels: Vec<Rgba>,
    width: u32,
    height: u32,
    dirty: bool,
    dirty_rect: Rect,
    alloc_size: usize,
}

impl PixelBuffer {
    /// Unallocated buffer; storage arrives lazily on the first `acquire`.
    pub fn new() -> Self {
        Self {
            pixels: Vec::new(),
            width: 0,
            height: 0,
            dirty: false,
            dirty_rect: Rect::empty_sentinel(0, 0),
            alloc_size: 0,
        }
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.pixels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn dirty_rect(&self) -> Rect {
        self.dirty_rect
    }

    /// Allocated byte size of the backing storage.
    #[inline]
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    /// True when the current allocation already covers the given area.
    #[inline]
    pub fn covers(&self, min_width: u32, min_height: u32) -> bool {
        self.is_allocated() && self.width >= min_width && self.height >= min_height
    }

    /// Make the buffer cover at least `min_width` x `min_height`.
    ///
    /// An already-covering buffer is kept as is. Otherwise the buffer grows
    /// to max(requested, current x 1.2) per dimension; contents are not
    /// preserved. Returns false (leaving any existing buffer untouched)
    /// when the request would exceed the byte ceiling or the allocation
    /// fails. On success the dirty flag is reset and the dirty rect is set
    /// to the empty sentinel.
    pub fn acquire(&mut self, min_width: u32, min_height: u32) -> bool {
        let min_width = min_width.max(1);
        let min_height = min_height.max(1);

        if !self.covers(min_width, min_height) {
            let mut w = min_width.max((self.width as f32 * GROWTH_FACTOR) as u32);
            let mut h = min_height.max((self.height as f32 * GROWTH_FACTOR) as u32);
            let mut bytes = w as usize * h as usize * 4;

            if bytes > MAX_PIXEL_BUFFER_BYTES {
                // Retry at exactly the requested size before giving up
                w = min_width;
                h = min_height;
                bytes = w as usize * h as usize * 4;
                if bytes > MAX_PIXEL_BUFFER_BYTES {
                    debug!(
                        "pixel buffer request {}x{} exceeds {} byte ceiling",
                        min_width, min_height, MAX_PIXEL_BUFFER_BYTES
                    );
                    return false;
                }
            }

            let count = w as usize * h as usize;
            let mut pixels = Vec::new();
            if pixels.try_reserve_exact(count).is_err() {
                return false;
            }
            pixels.resize(count, 0);

            trace!("pixel buffer grown to {}x{} ({} bytes)", w, h, bytes);
            self.pixels = pixels;
            self.width = w;
            self.height = h;
            self.alloc_size = bytes;
        }

        self.dirty = false;
        self.dirty_rect = Rect::empty_sentinel(self.width, self.height);
        true
    }

    /// Free the backing storage. Pending dirty pixels are discarded; flush
    /// first if they matter.
    pub fn release(&mut self) {
        self.pixels = Vec::new();
        self.width = 0;
        self.height = 0;
        self.dirty = false;
        self.dirty_rect = Rect::empty_sentinel(0, 0);
        self.alloc_size = 0;
    }

    /// Overwrite every pixel of `rect` (clamped to the buffer) with
    /// `color` and extend the dirty rect. Rects that clamp to empty are
    /// no-ops.
    pub fn fill(&mut self, ops: &RenderOps, rect: Rect, color: Rgba) {
        if !self.is_allocated() {
            return;
        }
        let Some(r) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        (ops.pb_fill)(&mut self.pixels, self.width, r, color);
        self.dirty_rect.include(r);
        self.dirty = true;
    }

    /// Blend `color` over `rect` at `alpha`. Alpha 0 is a complete no-op;
    /// alpha 255 delegates to `fill` for a bit-identical fast path.
    pub fn blend(&mut self, ops: &RenderOps, rect: Rect, color: Rgba, alpha: u8) {
        if alpha == 0 || !self.is_allocated() {
            return;
        }
        if alpha == 255 {
            self.fill(ops, rect, color);
            return;
        }
        let Some(r) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        (ops.pb_blend)(&mut self.pixels, self.width, r, color, alpha);
        self.dirty_rect.include(r);
        self.dirty = true;
    }

    /// Linear two-color gradient across `rect`, horizontal or vertical.
    /// Gradients always render here; there is no immediate-path variant.
    pub fn gradient(&mut self, rect: Rect, start: Rgba, end: Rgba, horizontal: bool) {
        if !self.is_allocated() {
            return;
        }
        let Some(r) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        let (sr, sg, sb, _) = unpack_rgba(start);
        let (er, eg, eb, _) = unpack_rgba(end);
        let steps = if horizontal { rect.width() } else { rect.height() };
        let denom = (steps - 1).max(1);

        let lerp = |a: u8, b: u8, num: i32| -> u8 {
            (a as i32 + (b as i32 - a as i32) * num / denom) as u8
        };

        for y in r.y1..=r.y2 {
            let row = (y as u32 * self.width) as usize;
            if horizontal {
                for x in r.x1..=r.x2 {
                    let t = x - rect.x1;
                    self.pixels[row + x as usize] =
                        pack_rgba(lerp(sr, er, t), lerp(sg, eg, t), lerp(sb, eb, t), 0xFF);
                }
            } else {
                let t = y - rect.y1;
                let color = pack_rgba(lerp(sr, er, t), lerp(sg, eg, t), lerp(sb, eb, t), 0xFF);
                self.pixels[row + r.x1 as usize..=row + r.x2 as usize].fill(color);
            }
        }

        self.dirty_rect.include(r);
        self.dirty = true;
    }

    /// Clear the whole buffer and mark all of it dirty.
    pub fn clear(&mut self, color: Rgba) {
        if !self.is_allocated() {
            return;
        }
        self.pixels.fill(color);
        self.dirty_rect = Rect::new(0, 0, self.width as i32 - 1, self.height as i32 - 1);
        self.dirty = true;
    }

    /// Copy the dirty rectangle into the real draw target and clear the
    /// dirty flag. No-op unless dirty; calling twice copies once.
    pub fn flush(&mut self, ops: &RenderOps, target: &mut dyn DrawTarget) {
        if !self.dirty || !self.is_allocated() {
            return;
        }
        if !self.dirty_rect.is_empty() {
            trace!("pixel buffer flush: {:?}", self.dirty_rect);
            (ops.pb_copy)(&self.pixels, self.width, self.dirty_rect, target);
        }
        self.dirty = false;
    }

    /// Read back a pixel, None when out of bounds or unallocated.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        if self.is_allocated()
            && x >= 0
            && (x as u32) < self.width
            && y >= 0
            && (y as u32) < self.height
        {
            Some(self.pixels[(y as u32 * self.width + x as u32) as usize])
        } else {
            None
        }
    }

    /// Blend one pixel in place, used by the reference blend entry.
    #[inline]
    pub(crate) fn blend_px(dst: &mut Rgba, src: Rgba, alpha: u8) {
        *dst = blend_rgba(src, *dst, alpha);
    }
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::new()
    }
}
