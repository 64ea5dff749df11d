//! Draw-call batching: queue fills/blends during a draw pass, then merge,
//! sort and execute them in one go at the end of the pass.
//!
//! Operations are stored as one record per op (array-of-structs), so the
//! "all columns grow together" invariant of the queue is structural: a
//! partial resize cannot be observed because there is only one allocation.

use log::trace;

use crate::caps::{RenderOps, CAP_BATCH, CAP_PIXELBUFFER};
use crate::color::Rgba;
use crate::geometry::Rect;
use crate::pixelbuf::PixelBuffer;
use crate::target::DrawTarget;

pub const INITIAL_BATCH_CAPACITY: usize = 16;

/// Guard against runaway queues under memory pressure. Adds beyond this
/// are dropped, the documented lossy behavior of the queue.
pub const DEFAULT_MAX_BATCH_OPS: usize = 65_536;

/// Kind of a queued (or policy-classified) draw operation.
///
/// Ordering matters: execution sorts fills before patterns before blends,
/// so fills establish the base the blends composite over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpKind {
    Fill,
    Pattern,
    Blend,
    /// Policy-only classification; gradients render through the pixel
    /// buffer and are never queued.
    Gradient,
}

/// One queued draw operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOp {
    pub rect: Rect,
    pub color: Rgba,
    pub kind: OpKind,
    /// 0-255, meaningful only for `Blend`
    pub alpha: u8,
}

/// Append-only queue of pending draw operations for one draw pass.
pub struct DrawBatch {
    ops: Vec<BatchOp>,
    max_ops: usize,
}

impl DrawBatch {
    /// Empty batch; storage is allocated on first add.
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            max_ops: DEFAULT_MAX_BATCH_OPS,
        }
    }

    /// Batch with pre-allocated capacity. Returns None if the allocation
    /// fails; the caller falls back to unbatched drawing.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        let capacity = if capacity > 0 {
            capacity
        } else {
            INITIAL_BATCH_CAPACITY
        };
        let mut ops = Vec::new();
        ops.try_reserve_exact(capacity).ok()?;
        Some(Self {
            ops,
            max_ops: DEFAULT_MAX_BATCH_OPS,
        })
    }

    /// Cap the queue at `max_ops` operations. Adds beyond the cap are
    /// silently dropped, modelling allocation failure under memory
    /// pressure.
    pub fn with_max_ops(mut self, max_ops: usize) -> Self {
        self.max_ops = max_ops.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ops.capacity().min(self.max_ops)
    }

    pub fn has_ops(&self) -> bool {
        !self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Queue an opaque fill.
    pub fn add_fill(&mut self, rect: Rect, color: Rgba) {
        self.push(BatchOp {
            rect,
            color,
            kind: OpKind::Fill,
            alpha: 255,
        });
    }

    /// Queue a pattern fill. Batched patterns execute as solid fills; the
    /// stipple only applies on the immediate path.
    pub fn add_pattern(&mut self, rect: Rect, color: Rgba) {
        self.push(BatchOp {
            rect,
            color,
            kind: OpKind::Pattern,
            alpha: 255,
        });
    }

    /// Queue a blended fill. Alpha 0 is invisible and silently dropped.
    pub fn add_blend(&mut self, rect: Rect, color: Rgba, alpha: u8) {
        if alpha == 0 {
            return;
        }
        self.push(BatchOp {
            rect,
            color,
            kind: OpKind::Blend,
            alpha,
        });
    }

    /// Drop all queued operations without executing them. Capacity is
    /// retained.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    fn push(&mut self, op: BatchOp) {
        debug_assert!(op.kind != OpKind::Gradient, "gradients are not queueable");
        if self.ops.len() >= self.max_ops {
            trace!("batch full ({} ops), dropping {:?}", self.ops.len(), op.kind);
            return;
        }
        if self.ops.len() == self.ops.capacity() {
            // Grow by at least 2x, bounded by the op cap. On failure the
            // queue is left exactly as it was and the op is dropped.
            // max then min, not clamp: a cap below the initial capacity
            // must win, not assert
            let want = (self.ops.capacity() * 2)
                .max(INITIAL_BATCH_CAPACITY)
                .min(self.max_ops);
            if self.ops.try_reserve_exact(want - self.ops.len()).is_err() {
                trace!("batch growth to {} ops failed, dropping op", want);
                return;
            }
        }
        self.ops.push(op);
    }

    /// Merge horizontally abutting ops with identical kind/color/alpha and
    /// Y-span.
    ///
    /// Single left-to-right sweep over the queue; chains of 3+ mergeable
    /// rects in non-adjacent list order may not fully collapse. Callers
    /// rely on the one-pass semantics, so this must not become a
    /// fixed-point iteration.
    fn optimize(&mut self) {
        if self.ops.len() <= 1 {
            return;
        }
        let mut write_pos = 0;
        for i in 0..self.ops.len() {
            let op = self.ops[i];
            let mut merged = false;
            for j in 0..write_pos {
                let kept = self.ops[j];
                if op.kind == kept.kind
                    && op.color == kept.color
                    && op.alpha == kept.alpha
                    && op.rect.y1 == kept.rect.y1
                    && op.rect.y2 == kept.rect.y2
                {
                    if op.rect.x1 == kept.rect.x2 + 1 {
                        // Extend right
                        self.ops[j].rect.x2 = op.rect.x2;
                        merged = true;
                        break;
                    } else if op.rect.x2 + 1 == kept.rect.x1 {
                        // Extend left
                        self.ops[j].rect.x1 = op.rect.x1;
                        merged = true;
                        break;
                    }
                }
            }
            if !merged {
                self.ops[write_pos] = op;
                write_pos += 1;
            }
        }
        self.ops.truncate(write_pos);
    }

    /// Stable sort: fills before patterns before blends, then top to
    /// bottom.
    fn sort(&mut self) {
        self.ops.sort_by_key(|op| (op.kind, op.rect.y1));
    }

    /// Optimize, sort and execute all queued operations, then reset the
    /// count. Backing storage is retained so capacity amortizes across
    /// draw passes. Does nothing when empty.
    pub fn flush(
        &mut self,
        ops: &RenderOps,
        pixel: &mut PixelBuffer,
        target: &mut dyn DrawTarget,
    ) {
        if self.ops.is_empty() {
            return;
        }
        let before = self.ops.len();
        self.optimize();
        self.sort();
        trace!("batch flush: {} ops ({} after merge)", before, self.ops.len());

        if ops.has(CAP_BATCH) {
            self.execute_batched(ops, target);
        } else {
            self.execute_scalar(ops, pixel, target);
        }

        self.ops.clear();

        // Blends may have landed in the pixel buffer
        if pixel.dirty() {
            pixel.flush(ops, target);
        }
    }

    /// Dispatch maximal same-kind runs through the table's batch entry
    /// points, which may vectorize across the run.
    fn execute_batched(&self, ops: &RenderOps, target: &mut dyn DrawTarget) {
        let mut i = 0;
        while i < self.ops.len() {
            let kind = self.ops[i].kind;
            let start = i;
            while i < self.ops.len() && self.ops[i].kind == kind {
                i += 1;
            }
            let run = &self.ops[start..i];
            match kind {
                OpKind::Fill | OpKind::Pattern => (ops.batch_fill)(target, run),
                OpKind::Blend => (ops.batch_blend)(target, run),
                OpKind::Gradient => {}
            }
        }
    }

    /// Operation-by-operation execution through the scalar entries.
    /// Blends go through the pixel buffer when the capability is present;
    /// without it, mostly-opaque blends degrade to solid fills and the
    /// rest are skipped.
    fn execute_scalar(
        &self,
        ops: &RenderOps,
        pixel: &mut PixelBuffer,
        target: &mut dyn DrawTarget,
    ) {
        // One acquire covering every blend in the pass, so earlier blends
        // are not wiped by the dirty reset of a later acquire.
        let mut blend_buffered = false;
        if ops.has(CAP_PIXELBUFFER) {
            let mut union = Rect::new(i32::MAX, i32::MAX, -1, -1);
            for op in &self.ops {
                if op.kind == OpKind::Blend {
                    union.include(op.rect);
                }
            }
            if !union.is_empty() {
                // Saturate so pathological extents fail the acquire
                // instead of overflowing
                blend_buffered = pixel.acquire(
                    union.x2.saturating_add(1).max(1) as u32,
                    union.y2.saturating_add(1).max(1) as u32,
                );
            }
        }

        for op in &self.ops {
            match op.kind {
                OpKind::Fill | OpKind::Pattern => {
                    let pen = target.resolve_color(op.color);
                    (ops.fill_rect)(target, op.rect, pen);
                }
                OpKind::Blend => {
                    if blend_buffered {
                        pixel.blend(ops, op.rect, op.color, op.alpha);
                    } else if op.alpha >= 128 {
                        let pen = target.resolve_color(op.color);
                        (ops.fill_rect)(target, op.rect, pen);
                    }
                    // Too transparent to approximate without a buffer: skip
                }
                OpKind::Gradient => {}
            }
        }
    }
}

impl Default for DrawBatch {
    fn default() -> Self {
        Self::new()
    }
}
