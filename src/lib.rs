//! Transparent rendering optimization for widget toolkits that draw with
//! immediate fill calls.
//!
//! The crate sits between a widget tree and its drawing backend. Widgets
//! draw through a [`DrawTargetWrapper`] exactly as they would draw
//! directly, and the wrapper routes each call to one of three executors:
//!
//! - the **pixel buffer** ([`PixelBuffer`]): an off-screen RGBA surface
//!   for large fills, gradients and alpha blends, copied back to the
//!   target once per pass via dirty-rectangle tracking;
//! - the **batch queue** ([`DrawBatch`]): fills deferred to the end of
//!   the pass, where abutting rects merge and like operations dispatch
//!   together;
//! - the **target** itself, for small one-off work.
//!
//! Routing decisions come from [`policy`] heuristics over a capability
//! mask probed once per [`RenderContext`] by [`caps::detect`]. A wrong
//! routing decision costs speed, never pixels.
//!
//! ```
//! use rastbatch::{DrawBatch, DrawTargetWrapper, MemoryTarget, Rect, RenderContext};
//!
//! let mut ctx = RenderContext::new();
//! let mut target = MemoryTarget::new(640, 480);
//!
//! let mut wrapper = DrawTargetWrapper::new(&mut ctx, &mut target);
//! wrapper.enable_batch_mode(DrawBatch::new());
//! wrapper.set_pen(1);
//! wrapper.fill_rect(Rect::new(10, 10, 99, 99));
//! wrapper.fill_rect(Rect::new(100, 10, 189, 99)); // merges with the first
//! wrapper.finish();
//! ```

pub mod batch;
pub mod caps;
pub mod color;
pub mod context;
#[cfg(feature = "sdl2-display")]
pub mod display;
pub mod geometry;
pub mod pixelbuf;
pub mod policy;
pub mod target;
pub mod wrapper;

pub use batch::{BatchOp, DrawBatch, OpKind};
pub use caps::{detect, RenderOps};
pub use color::{pack_rgba, unpack_rgba, Rgba};
pub use context::RenderContext;
#[cfg(feature = "sdl2-display")]
pub use display::SdlTarget;
pub use geometry::Rect;
pub use pixelbuf::PixelBuffer;
pub use policy::{should_optimize_widget, should_use_pixel_buffer, PolicyConfig, WidgetProfile};
pub use target::{DrawMode, DrawTarget, MemoryTarget, Pattern, Pen, RecordingTarget};
pub use wrapper::{blend_rect_direct, DrawTargetWrapper};
