// ============================================================================
// RENDER ENGINE: rasterize background + layers, in order, onto one surface
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::loader::SourceRef;
use crate::scene::{Decoded, Layer, LayerId, LayerKind, Scene, TextContent, TextMetrics};
use crate::text::FontBook;

/// Output size when no background has been uploaded.
pub const DEFAULT_SURFACE_SIZE: (u32, u32) = (400, 300);

/// The raster target. Written only by [`render`]; read by display and export.
#[derive(Clone)]
pub struct Surface {
    pixels: RgbaImage,
    /// Bumped after every completed render pass.
    generation: u64,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::new(width.max(1), height.max(1)), generation: 0 }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        (x < self.width() && y < self.height()).then(|| *self.pixels.get_pixel(x, y))
    }

    /// Reallocate to a new size. Contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if self.size() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        self.fill(Rgba([0, 0, 0, 0]));
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.pixels.pixels_mut() {
            *px = color;
        }
    }

    /// Copy the current pixels out (export snapshot).
    pub fn snapshot(&self) -> RgbaImage {
        self.pixels.clone()
    }
}

/// Knobs that don't live in the scene.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    /// Fill used when the scene has no background.
    pub clear_color: Rgba<u8>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { clear_color: Rgba([255, 255, 255, 255]) }
    }
}

/// What a pass found out about the scene that the caller has to act on.
#[derive(Debug, Default)]
pub struct RenderReport {
    /// Image layers that have never been requested. Each was skipped this pass.
    pub pending_images: Vec<(LayerId, SourceRef)>,
    /// Fresh measurement of every text layer, to be merged back into the scene.
    pub text_metrics: Vec<(LayerId, TextMetrics)>,
}

/// Paint `scene` into `surface` from scratch.
///
/// Only the surface is written. The derived state (text boxes, images that
/// still need loading) is handed back in the [`RenderReport`].
pub fn render(surface: &mut Surface, scene: &Scene, fonts: &mut FontBook, options: &RenderOptions) -> RenderReport {
    surface.clear();
    match scene.background() {
        Some(bg) => image::imageops::overlay(&mut surface.pixels, bg.image.as_ref(), 0, 0),
        None => surface.fill(options.clear_color),
    }

    let mut report = RenderReport::default();
    for layer in scene.layers() {
        match &layer.kind {
            LayerKind::Image(content) => match &content.decoded {
                Decoded::Ready(img) => draw_image_layer(surface, layer, content.flipped, img),
                Decoded::Unrequested => report.pending_images.push((layer.id, content.source.clone())),
                Decoded::Loading | Decoded::Failed => {}
            },
            LayerKind::Text(content) => {
                let metrics = draw_text_layer(surface, layer, content, fonts);
                report.text_metrics.push((layer.id, metrics));
            }
        }
    }

    surface.generation = surface.generation.wrapping_add(1);
    report
}

// ---------------------------------------------------------------------------
//  Geometry
// ---------------------------------------------------------------------------

/// Fit an image of `native` size inside a `box_w`×`box_h` box keeping the
/// native aspect ratio: the dimension that would overflow is shrunk.
pub fn fit_draw_size(box_w: f32, box_h: f32, native_w: u32, native_h: u32) -> (f32, f32) {
    if box_w <= 0.0 || box_h <= 0.0 || native_w == 0 || native_h == 0 {
        return (box_w.max(0.0), box_h.max(0.0));
    }
    let aspect = native_w as f32 / native_h as f32;
    let box_aspect = box_w / box_h;
    if box_aspect > aspect {
        (box_h * aspect, box_h)
    } else if box_aspect < aspect {
        (box_w, box_w / aspect)
    } else {
        (box_w, box_h)
    }
}

/// translate(center) · rotate(θ) · scale(±s, s) · translate(-center)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerTransform {
    pub center: (f32, f32),
    sin: f32,
    cos: f32,
    scale_x: f32,
    scale_y: f32,
}

impl LayerTransform {
    pub fn new(center: (f32, f32), rotation: f32, scale: f32, flipped: bool) -> Self {
        let (sin, cos) = rotation.sin_cos();
        let scale_x = if flipped { -scale } else { scale };
        Self { center, sin, cos, scale_x, scale_y: scale }
    }

    pub fn for_layer(layer: &Layer, flipped: bool) -> Self {
        let center = (layer.x + layer.width / 2.0, layer.y + layer.height / 2.0);
        Self::new(center, layer.rotation, layer.scale_factor, flipped)
    }

    /// Layer-local (un-rotated) point to canvas space.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let qx = (x - self.center.0) * self.scale_x;
        let qy = (y - self.center.1) * self.scale_y;
        (
            self.cos * qx - self.sin * qy + self.center.0,
            self.sin * qx + self.cos * qy + self.center.1,
        )
    }

    /// Canvas point back to layer-local space. `None` for a degenerate scale.
    pub fn invert(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        if self.scale_x.abs() < 1e-12 || self.scale_y.abs() < 1e-12 {
            return None;
        }
        let rx = x - self.center.0;
        let ry = y - self.center.1;
        let qx = self.cos * rx + self.sin * ry;
        let qy = -self.sin * rx + self.cos * ry;
        Some((qx / self.scale_x + self.center.0, qy / self.scale_y + self.center.1))
    }

    /// Canvas-space bounding box `(min_x, min_y, max_x, max_y)` of a local rect.
    pub fn bounds(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let corners = [
            self.apply(x, y),
            self.apply(x + w, y),
            self.apply(x, y + h),
            self.apply(x + w, y + h),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), &(cx, cy)| (x0.min(cx), y0.min(cy), x1.max(cx), y1.max(cy)),
        )
    }
}

// ---------------------------------------------------------------------------
//  Image layers
// ---------------------------------------------------------------------------

fn draw_image_layer(surface: &mut Surface, layer: &Layer, flipped: bool, img: &RgbaImage) {
    let (draw_w, draw_h) = fit_draw_size(layer.width, layer.height, img.width(), img.height());
    if draw_w <= 0.0 || draw_h <= 0.0 {
        return;
    }
    let transform = LayerTransform::for_layer(layer, flipped);
    draw_bitmap(&mut surface.pixels, img, &transform, (layer.x, layer.y, draw_w, draw_h));
}

/// Draw `src` stretched over the local rect `dest` (x, y, w, h) through
/// `transform`, compositing source-over. Each covered destination pixel is
/// inverse-mapped into the source and bilinearly sampled.
fn draw_bitmap(dst: &mut RgbaImage, src: &RgbaImage, transform: &LayerTransform, dest: (f32, f32, f32, f32)) {
    let (dx, dy, dw, dh) = dest;
    let (canvas_w, canvas_h) = dst.dimensions();
    let (bx0, by0, bx1, by1) = transform.bounds(dx, dy, dw, dh);
    if !(bx0.is_finite() && by0.is_finite() && bx1.is_finite() && by1.is_finite()) {
        return;
    }

    let x_start = bx0.floor().max(0.0) as u32;
    let y_start = by0.floor().max(0.0) as u32;
    let x_end = (bx1.ceil().max(0.0) as u32).min(canvas_w);
    let y_end = (by1.ceil().max(0.0) as u32).min(canvas_h);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let sx_per_px = src.width() as f32 / dw;
    let sy_per_px = src.height() as f32 / dh;
    let row_bytes = canvas_w as usize * 4;

    dst.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y_start as usize)
        .take((y_end - y_start) as usize)
        .for_each(|(py, row)| {
            let cy = py as f32 + 0.5;
            for px in x_start..x_end {
                let cx = px as f32 + 0.5;
                let Some((lx, ly)) = transform.invert(cx, cy) else { continue };
                if lx < dx || ly < dy || lx >= dx + dw || ly >= dy + dh {
                    continue;
                }
                let u = (lx - dx) * sx_per_px - 0.5;
                let v = (ly - dy) * sy_per_px - 0.5;
                let sample = bilinear_sample_clamped(src, u, v);
                let idx = px as usize * 4;
                blend_over(&mut row[idx..idx + 4], sample);
            }
        });
}

/// Bilinear interpolation with edge clamping.
fn bilinear_sample_clamped(img: &RgbaImage, x: f32, y: f32) -> [f32; 4] {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.clamp(0, max_x) as u32, sy.clamp(0, max_y) as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0.0f32; 4];
    for c in 0..4 {
        out[c] = lerp(lerp(tl[c], tr[c], fx), lerp(bl[c], br[c], fx), fy);
    }
    out
}

/// Straight-alpha source-over of `src` (0..255 floats) onto one RGBA pixel.
fn blend_over(dst: &mut [u8], src: [f32; 4]) {
    let sa = (src[3] / 255.0).clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

// ---------------------------------------------------------------------------
//  Text layers
// ---------------------------------------------------------------------------

/// Draw with the baseline at (x, y) and return the measured box. Height is
/// the font size; width is the advance of the whole string (0 when no font
/// can be found).
fn draw_text_layer(surface: &mut Surface, layer: &Layer, content: &TextContent, fonts: &mut FontBook) -> TextMetrics {
    let style = &content.style;
    let width = fonts
        .measure(&content.text, &style.font_family, style.font_weight, style.font_size)
        .unwrap_or(0.0);
    let metrics = TextMetrics { width, height: style.font_size };
    if content.text.is_empty() {
        return metrics;
    }

    let (canvas_w, canvas_h) = surface.size();
    let raster = fonts.rasterize(
        &content.text,
        &style.font_family,
        style.font_weight,
        style.font_size,
        layer.x,
        layer.y,
        style.color,
        canvas_w,
        canvas_h,
    );
    if raster.is_empty() {
        return metrics;
    }

    for ry in 0..raster.buf_h {
        let py = raster.off_y as u32 + ry;
        for rx in 0..raster.buf_w {
            let px = raster.off_x as u32 + rx;
            let si = (ry * raster.buf_w + rx) as usize * 4;
            let s = &raster.buf[si..si + 4];
            if s[3] == 0 {
                continue;
            }
            let d = surface.pixels.get_pixel_mut(px, py);
            blend_over(&mut d.0, [s[0] as f32, s[1] as f32, s[2] as f32, s[3] as f32]);
        }
    }
    metrics
}
