//! SDL2-backed draw target for running the optimization layer against a
//! real window. Only compiled with the `sdl2-display` feature.

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::Color;
use sdl2::rect::Rect as SdlRect;
use sdl2::render::Canvas;
use sdl2::video::Window;
use sdl2::EventPump;

use crate::color::{unpack_rgba, Rgba};
use crate::geometry::Rect;
use crate::target::{DrawMode, DrawTarget, Pattern, Pen};

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// SDL2 window wrapped as a `DrawTarget`.
///
/// Pens resolve through the same palette scheme as `MemoryTarget`;
/// `present` flips the canvas once per frame.
pub struct SdlTarget {
    canvas: Canvas<Window>,
    event_pump: EventPump,
    width: u32,
    height: u32,
    palette: Vec<Rgba>,
    pen: Pen,
    bg_pen: Pen,
    mode: DrawMode,
}

impl SdlTarget {
    pub fn new(title: &str) -> Result<Self, String> {
        Self::with_options(title, DEFAULT_WIDTH, DEFAULT_HEIGHT, true)
    }

    pub fn with_options(title: &str, width: u32, height: u32, vsync: bool) -> Result<Self, String> {
        let sdl_context = sdl2::init()?;
        let video_subsystem = sdl_context.video()?;

        let window = video_subsystem
            .window(title, width, height)
            .position_centered()
            .build()
            .map_err(|e| e.to_string())?;

        let mut canvas_builder = window.into_canvas().accelerated();
        if vsync {
            canvas_builder = canvas_builder.present_vsync();
        }
        let canvas = canvas_builder.build().map_err(|e| e.to_string())?;
        let event_pump = sdl_context.event_pump()?;

        Ok(Self {
            canvas,
            event_pump,
            width,
            height,
            palette: vec![0x000000FF, 0xFFFFFFFF, 0x666666FF, 0xAAAAAAFF],
            pen: 1,
            bg_pen: 0,
            mode: DrawMode::Jam1,
        })
    }

    pub fn set_palette(&mut self, palette: Vec<Rgba>) {
        self.palette = palette;
    }

    /// Flip the canvas. Call once per frame after `finish`.
    pub fn present(&mut self) {
        self.canvas.present();
    }

    /// Drain pending window events; false when the window was closed or
    /// Escape was pressed.
    pub fn pump(&mut self) -> bool {
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => return false,
                _ => {}
            }
        }
        true
    }

    fn sdl_color(&self, color: Rgba) -> Color {
        let (r, g, b, a) = unpack_rgba(color);
        Color::RGBA(r, g, b, a)
    }

    fn sdl_rect(rect: Rect) -> Option<SdlRect> {
        if rect.is_empty() {
            return None;
        }
        Some(SdlRect::new(
            rect.x1,
            rect.y1,
            rect.width() as u32,
            rect.height() as u32,
        ))
    }
}

impl DrawTarget for SdlTarget {
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
        let Some(r) = Self::sdl_rect(rect) else {
            return;
        };
        let color = self.sdl_color(self.resolve_pen(self.pen));
        self.canvas.set_draw_color(color);
        // SDL clips for us; a failed fill only costs this rect
        let _ = self.canvas.fill_rect(r);
    }

    fn fill_pattern(&mut self, rect: Rect, pattern: &Pattern) {
        let fg = self.sdl_color(self.resolve_pen(self.pen));
        let bg = self.sdl_color(self.resolve_pen(self.bg_pen));
        let jam2 = self.mode == DrawMode::Jam2;
        let Some(clamped) = rect.clamp_to(self.width, self.height) else {
            return;
        };
        for y in clamped.y1..=clamped.y2 {
            let row_bits = pattern[(y & 15) as usize];
            for x in clamped.x1..=clamped.x2 {
                let set = row_bits & (0x8000 >> (x & 15)) != 0;
                if set {
                    self.canvas.set_draw_color(fg);
                } else if jam2 {
                    self.canvas.set_draw_color(bg);
                } else {
                    continue;
                }
                let _ = self.canvas.draw_point((x, y));
            }
        }
    }

    fn write_span(&mut self, x: i32, y: i32, span: &[Rgba]) {
        for (i, &px) in span.iter().enumerate() {
            let color = self.sdl_color(px);
            self.canvas.set_draw_color(color);
            let _ = self.canvas.draw_point((x + i as i32, y));
        }
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
