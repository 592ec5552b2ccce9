use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use std::collections::HashMap;
use std::path::Path;

/// Cache for rasterized glyph coverage. Key: (font slot, GlyphId, font_size_bits).
/// Value: (pixels as (x, y, coverage), bounds_min_x at origin 0, bounds_min_y at origin 0).
type GlyphPixelCache = HashMap<(usize, GlyphId, u32), (Vec<(u32, u32, f32)>, f32, f32)>;

/// Above this size glyphs are drawn straight into the coverage buffer
/// instead of being cached.
const GLYPH_CACHE_MAX_SIZE: f32 = 256.0;

/// Families tried, in order, when the requested one isn't installed.
#[cfg(target_os = "linux")]
const FALLBACK_FAMILIES: &[&str] = &["DejaVu Sans", "Liberation Sans", "Noto Sans", "FreeSans"];
#[cfg(not(target_os = "linux"))]
const FALLBACK_FAMILIES: &[&str] = &["Arial", "Helvetica", "Segoe UI", "Verdana"];

/// Horizontal layout of one line. Glyph positions are relative to the line
/// start with `y` on the baseline.
pub struct LineLayout {
    pub glyphs: Vec<(GlyphId, f32, f32)>,
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
}

/// Lay out a single line of text starting at x = 0.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> LineLayout {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let descent = scaled.descent();

    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, 0.0));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    LineLayout { glyphs, width: cursor_x, ascent, descent }
}

/// Coverage-to-color rasterization result, positioned in canvas space.
pub struct RasterizedText {
    pub buf: Vec<u8>,
    pub buf_w: u32,
    pub buf_h: u32,
    pub off_x: i32,
    pub off_y: i32,
}

impl RasterizedText {
    fn empty() -> Self {
        Self { buf: Vec::new(), buf_w: 0, buf_h: 0, off_x: 0, off_y: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.buf_w == 0 || self.buf_h == 0
    }
}

/// Loaded fonts plus the scratch buffers used while rasterizing.
///
/// Lookups are memoised per (family, weight), misses included, so a missing
/// family hits the system font database only once.
pub struct FontBook {
    fonts: Vec<FontArc>,
    slots: HashMap<(String, u16), Option<usize>>,
    /// Font forced for every family (from settings / `--font`).
    override_slot: Option<usize>,
    glyph_cache: GlyphPixelCache,
    /// Font size the cache currently holds; a different size empties it.
    cached_size: Option<u32>,
    coverage_buf: Vec<f32>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            slots: HashMap::new(),
            override_slot: None,
            glyph_cache: HashMap::new(),
            cached_size: None,
            coverage_buf: Vec::new(),
        }
    }

    /// Use `font` for all text regardless of requested family.
    pub fn with_font(font: FontArc) -> Self {
        let mut book = Self::new();
        book.fonts.push(font);
        book.override_slot = Some(0);
        book
    }

    /// Load a TTF/OTF file and use it for all text.
    pub fn set_override_file(&mut self, path: &Path) -> Result<(), String> {
        let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let font = FontArc::try_from_vec(bytes).map_err(|e| format!("{}: {}", path.display(), e))?;
        self.fonts.push(font);
        self.override_slot = Some(self.fonts.len() - 1);
        self.glyph_cache.clear();
        Ok(())
    }

    /// Resolve a family + weight to a loaded font slot.
    fn resolve(&mut self, family: &str, weight: u16) -> Option<usize> {
        if let Some(slot) = self.override_slot {
            return Some(slot);
        }
        let key = (family.to_string(), weight);
        if let Some(slot) = self.slots.get(&key) {
            return *slot;
        }
        let font = std::iter::once(family)
            .chain(FALLBACK_FAMILIES.iter().copied())
            .find_map(|f| load_system_font(f, weight));
        let slot = match font {
            Some(font) => {
                self.fonts.push(font);
                Some(self.fonts.len() - 1)
            }
            None => {
                crate::log_warn!("no usable font for family '{}' (weight {})", family, weight);
                None
            }
        };
        self.slots.insert(key, slot);
        slot
    }

    pub fn font(&mut self, family: &str, weight: u16) -> Option<FontArc> {
        let slot = self.resolve(family, weight)?;
        self.fonts.get(slot).cloned()
    }

    /// Advance width of `text` at `font_size`, or `None` when no font resolves.
    pub fn measure(&mut self, text: &str, family: &str, weight: u16, font_size: f32) -> Option<f32> {
        let slot = self.resolve(family, weight)?;
        Some(layout_line(&self.fonts[slot], text, font_size).width)
    }

    /// Rasterize one line of text with its baseline starting at
    /// (`origin_x`, `baseline_y`), clipped to the canvas.
    pub fn rasterize(
        &mut self,
        text: &str,
        family: &str,
        weight: u16,
        font_size: f32,
        origin_x: f32,
        baseline_y: f32,
        color: [u8; 4],
        canvas_w: u32,
        canvas_h: u32,
    ) -> RasterizedText {
        let Some(slot) = self.resolve(family, weight) else {
            return RasterizedText::empty();
        };
        let font = &self.fonts[slot];
        let layout = layout_line(font, text, font_size);
        if layout.glyphs.is_empty() {
            return RasterizedText::empty();
        }

        // Bounding box of all glyphs (no outlining needed)
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for &(glyph_id, gx, gy) in &layout.glyphs {
            let glyph = glyph_id.with_scale_and_position(font_size, point(gx, gy));
            let bounds = font.glyph_bounds(&glyph);
            min_x = min_x.min(bounds.min.x);
            min_y = min_y.min(bounds.min.y);
            max_x = max_x.max(bounds.max.x);
            max_y = max_y.max(bounds.max.y);
        }
        if min_x >= max_x || min_y >= max_y {
            return RasterizedText::empty();
        }

        let pad = 2.0;
        let x0 = ((origin_x + min_x - pad).floor() as i32).max(0);
        let y0 = ((baseline_y + min_y - pad).floor() as i32).max(0);
        let x1 = ((origin_x + max_x + pad).ceil() as i32).min(canvas_w as i32);
        let y1 = ((baseline_y + max_y + pad).ceil() as i32).min(canvas_h as i32);
        let buf_w = (x1 - x0).max(0) as u32;
        let buf_h = (y1 - y0).max(0) as u32;
        if buf_w == 0 || buf_h == 0 {
            return RasterizedText::empty();
        }

        let needed = buf_w as usize * buf_h as usize;
        self.coverage_buf.resize(needed, 0.0);
        let coverage = &mut self.coverage_buf[..needed];
        coverage.fill(0.0);
        let window = CoverageWindow { x0, y0, w: buf_w, h: buf_h };

        let font_size_key = font_size.to_bits();
        let cacheable = font_size <= GLYPH_CACHE_MAX_SIZE;
        if cacheable && self.cached_size != Some(font_size_key) {
            self.glyph_cache.clear();
            self.cached_size = Some(font_size_key);
        }

        // Glyphs are outlined at position (0,0) and shifted into place.
        for &(glyph_id, gx, gy) in &layout.glyphs {
            let shift_x = origin_x + gx.round();
            let shift_y = baseline_y + gy.round();
            let base_glyph = glyph_id.with_scale_and_position(font_size, point(0.0, 0.0));

            if !cacheable {
                if let Some(outlined) = font.outline_glyph(base_glyph) {
                    let b = outlined.px_bounds();
                    outlined.draw(|px, py, cov| {
                        window.plot(coverage, px as f32 + shift_x + b.min.x, py as f32 + shift_y + b.min.y, cov)
                    });
                }
                continue;
            }

            let (pixels, base_bx, base_by) =
                self.glyph_cache.entry((slot, glyph_id, font_size_key)).or_insert_with(|| {
                    let mut px_list = Vec::new();
                    match font.outline_glyph(base_glyph) {
                        Some(outlined) => {
                            let b = outlined.px_bounds();
                            outlined.draw(|px, py, cov| px_list.push((px, py, cov)));
                            (px_list, b.min.x, b.min.y)
                        }
                        None => (px_list, 0.0, 0.0),
                    }
                });
            for &(px, py, cov) in pixels.iter() {
                window.plot(coverage, px as f32 + shift_x + *base_bx, py as f32 + shift_y + *base_by, cov);
            }
        }

        let mut buf = vec![0u8; needed * 4];
        for (i, &cov) in self.coverage_buf[..needed].iter().enumerate() {
            if cov > 0.001 {
                let idx = i * 4;
                buf[idx] = color[0];
                buf[idx + 1] = color[1];
                buf[idx + 2] = color[2];
                buf[idx + 3] = (color[3] as f32 * cov.min(1.0)).round() as u8;
            }
        }

        RasterizedText { buf, buf_w, buf_h, off_x: x0, off_y: y0 }
    }
}

/// Canvas-space window covered by the coverage buffer.
#[derive(Clone, Copy)]
struct CoverageWindow {
    x0: i32,
    y0: i32,
    w: u32,
    h: u32,
}

impl CoverageWindow {
    fn plot(&self, coverage: &mut [f32], cx: f32, cy: f32, cov: f32) {
        let ix = cx.round() as i32 - self.x0;
        let iy = cy.round() as i32 - self.y0;
        if ix >= 0 && iy >= 0 && (ix as u32) < self.w && (iy as u32) < self.h {
            let idx = iy as usize * self.w as usize + ix as usize;
            coverage[idx] = coverage[idx].max(cov);
        }
    }
}

/// Load a font by family name and CSS weight from the system.
/// Returns None if the font cannot be found or parsed.
pub fn load_system_font(family: &str, weight: u16) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight.clamp(100, 900) as f32);

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .ok()?;

    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or a handful of CSS color names.
pub fn parse_color(s: &str) -> Option<[u8; 4]> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let nib = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => Some([nib(0)?, nib(1)?, nib(2)?, 255]),
            6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
            8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
            _ => None,
        };
    }
    let named = match s.to_ascii_lowercase().as_str() {
        "white" => [255, 255, 255, 255],
        "black" => [0, 0, 0, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        "transparent" => [0, 0, 0, 0],
        _ => {
            // "r,g,b,a" as written by the settings file
            let parts: Vec<u8> = s.split(',').map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
            return match parts.as_slice() {
                [r, g, b] => Some([*r, *g, *b, 255]),
                [r, g, b, a] => Some([*r, *g, *b, *a]),
                _ => None,
            };
        }
    };
    Some(named)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colors() {
        assert_eq!(parse_color("white"), Some([255, 255, 255, 255]));
        assert_eq!(parse_color("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_color("#102030"), Some([16, 32, 48, 255]));
        assert_eq!(parse_color("#10203040"), Some([16, 32, 48, 64]));
        assert_eq!(parse_color("1, 2, 3, 4"), Some([1, 2, 3, 4]));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn missing_font_measures_none_once() {
        let mut book = FontBook::new();
        // Whatever the machine has installed, the answer is memoised.
        let first = book.measure("abc", "No Such Family 1234", 400, 20.0);
        let second = book.measure("abc", "No Such Family 1234", 400, 20.0);
        assert_eq!(first.is_some(), second.is_some());
        assert_eq!(book.slots.len(), 1);
    }

    #[test]
    fn longer_text_is_wider_when_a_font_exists() {
        let mut book = FontBook::new();
        let Some(short) = book.measure("ab", "Arial", 400, 32.0) else { return };
        let long = book.measure("abababab", "Arial", 400, 32.0).unwrap();
        assert!(long > short);
        assert_eq!(book.measure("", "Arial", 400, 32.0), Some(0.0));
    }

    #[test]
    fn rasterize_clips_to_canvas() {
        let mut book = FontBook::new();
        if book.font("Arial", 400).is_none() {
            return;
        }
        let out = book.rasterize("Hello", "Arial", 400, 40.0, 5.0, 40.0, [255, 0, 0, 255], 50, 50);
        assert!(!out.is_empty());
        assert!(out.off_x >= 0 && out.off_y >= 0);
        assert!(out.off_x as u32 + out.buf_w <= 50);
        assert!(out.off_y as u32 + out.buf_h <= 50);
        assert!(out.buf.chunks_exact(4).any(|p| p[3] > 0));

        let off = book.rasterize("Hello", "Arial", 400, 40.0, 500.0, 500.0, [255, 0, 0, 255], 50, 50);
        assert!(off.is_empty());
    }

    #[test]
    fn glyph_cache_holds_one_size_and_skips_huge_text() {
        let mut book = FontBook::new();
        if book.font("Arial", 400).is_none() {
            return;
        }
        let red = [255, 0, 0, 255];
        book.rasterize("WOW", "Arial", 400, 40.0, 5.0, 60.0, red, 200, 100);
        let at_40 = book.glyph_cache.len();
        assert!(at_40 > 0);
        assert!(book.glyph_cache.keys().all(|k| k.2 == 40.0f32.to_bits()));

        book.rasterize("WOW", "Arial", 400, 60.0, 5.0, 60.0, red, 200, 100);
        assert!(book.glyph_cache.keys().all(|k| k.2 == 60.0f32.to_bits()));
        assert_eq!(book.glyph_cache.len(), at_40);

        let huge = book.rasterize("WOW", "Arial", 400, 2000.0, 0.0, 1500.0, red, 200, 100);
        assert!(book.glyph_cache.keys().all(|k| k.2 == 60.0f32.to_bits()));
        assert!(huge.off_x as u32 + huge.buf_w <= 200);
        assert!(huge.off_y as u32 + huge.buf_h <= 100);
        assert!(huge.buf.len() <= 200 * 100 * 4);
    }
}
