//! Rectangle math for clipping, dirty-region tracking and batch merging

/// Axis-aligned rectangle with inclusive corners.
///
/// `(x1, y1)` is the top-left pixel, `(x2, y2)` the bottom-right pixel,
/// both inside the rectangle. A rect with `x2 < x1` or `y2 < y1` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a rect from origin and size. Zero or negative sizes yield an
    /// empty rect.
    pub fn from_size(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + w - 1,
            y2: y + h - 1,
        }
    }

    /// Inverted sentinel used for "nothing dirty yet": min corner at the
    /// buffer extent, max corner at -1. Any real pixel extends it.
    pub fn empty_sentinel(width: u32, height: u32) -> Self {
        Self {
            x1: width as i32,
            y1: height as i32,
            x2: -1,
            y2: -1,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x2 < self.x1 || self.y2 < self.y1
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    /// Pixel area. Empty rects have area 0.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (i64::from(self.x2) - i64::from(self.x1) + 1)
                * (i64::from(self.y2) - i64::from(self.y1) + 1)
        }
    }

    /// Extend this rect to also cover `other`. If this rect is empty (the
    /// dirty sentinel), it becomes `other`. Empty `other` is ignored.
    pub fn include(&mut self, other: Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        self.x1 = self.x1.min(other.x1);
        self.y1 = self.y1.min(other.y1);
        self.x2 = self.x2.max(other.x2);
        self.y2 = self.y2.max(other.y2);
    }

    /// Intersection of two rects, or None when they don't overlap.
    pub fn intersect(&self, other: Rect) -> Option<Rect> {
        let r = Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Clamp to a `width` x `height` buffer. Returns None when nothing of
    /// the rect lands inside the buffer.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        if width == 0 || height == 0 {
            return None;
        }
        self.intersect(Rect::new(0, 0, width as i32 - 1, height as i32 - 1))
    }

    /// True if `self` fully contains `other`.
    pub fn contains(&self, other: Rect) -> bool {
        !other.is_empty()
            && self.x1 <= other.x1
            && self.y1 <= other.y1
            && self.x2 >= other.x2
            && self.y2 >= other.y2
    }
}
