// ============================================================================
// EDITOR: one editing session (scene + surface + input + async loads)
// ============================================================================
//
// All mutation goes through `&mut Editor` on one thread. Decodes finish on
// rayon workers and are applied by `poll_loads` / `flush_loads`; every
// applied change is followed by a full re-render.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::Rgba;

use crate::controller::{InputEvent, InteractionController, Viewport};
use crate::io::{self, ExportError};
use crate::loader::{ImageLoader, LoadResult, LoadTarget, SourceRef};
use crate::render::{self, RenderOptions, Surface};
use crate::scene::{Decoded, Layer, LayerId, LayerKind, LayerPatch, Scene, TextMetrics, TextStyle};
use crate::settings::EditorSettings;
use crate::stickers::StickerCatalog;
use crate::text::FontBook;

pub const STICKER_LAYER_NAME: &str = "sticker";
pub const TEXT_LAYER_NAME: &str = "text";

/// Default sticker box.
const STICKER_BOX: (f32, f32, f32, f32) = (30.0, 30.0, 500.0, 500.0);
/// Default text baseline origin.
const TEXT_ORIGIN: (f32, f32) = (50.0, 50.0);
/// Demo caption: light weight, hit box enlarged fivefold.
const DEMO_TEXT_SCALE: f32 = 5.0;
const DEMO_TEXT_WEIGHT: u16 = 120;

pub struct Editor {
    scene: Scene,
    surface: Surface,
    controller: InteractionController,
    loader: ImageLoader,
    fonts: FontBook,
    catalog: StickerCatalog,
    settings: EditorSettings,
    options: RenderOptions,
    /// Global sticker mirror toggle.
    flipped: bool,
    /// Most recent background upload; older completions are dropped.
    background_request: Option<SourceRef>,
}

impl Editor {
    pub fn new(settings: EditorSettings) -> Self {
        let catalog = StickerCatalog::default_in(settings.asset_dir.clone());
        Self::with_catalog(settings, catalog)
    }

    pub fn with_catalog(settings: EditorSettings, catalog: StickerCatalog) -> Self {
        let mut fonts = FontBook::new();
        if let Some(path) = &settings.font_path
            && let Err(e) = fonts.set_override_file(path)
        {
            crate::log_warn!("Font override {} not usable: {}", path.display(), e);
        }
        let mut editor = Self {
            scene: Scene::new(),
            surface: Surface::new(settings.canvas_width, settings.canvas_height),
            controller: InteractionController::new(settings.controller_config()),
            loader: ImageLoader::new(),
            fonts,
            catalog,
            options: RenderOptions { clear_color: Rgba(settings.background_color) },
            settings,
            flipped: false,
            background_request: None,
        };
        editor.render();
        editor
    }

    /// Swap the font lookup (tests and embedders with their own fonts).
    pub fn set_fonts(&mut self, fonts: FontBook) {
        self.fonts = fonts;
        self.render();
    }

    // ---------------------------------------------------------------------
    //  Accessors
    // ---------------------------------------------------------------------

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &StickerCatalog {
        &self.catalog
    }

    pub fn loader_mut(&mut self) -> &mut ImageLoader {
        &mut self.loader
    }

    pub fn pending_loads(&self) -> usize {
        self.loader.pending()
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    pub fn is_dragging(&self) -> bool {
        self.controller.is_dragging()
    }

    // ---------------------------------------------------------------------
    //  Rendering and loads
    // ---------------------------------------------------------------------

    /// Redraw the whole scene, then fold the pass's findings back in:
    /// fresh text boxes, and loads for images nobody has asked for yet.
    pub fn render(&mut self) {
        let report = render::render(&mut self.surface, &self.scene, &mut self.fonts, &self.options);

        for (id, metrics) in report.text_metrics {
            let stale = self
                .scene
                .layer(id)
                .is_some_and(|l| TextMetrics { width: l.width, height: l.height } != metrics);
            if stale {
                self.scene.update_layer(id, &LayerPatch::measured(metrics));
            }
        }

        for (id, source) in report.pending_images {
            self.scene.update_layer(id, &LayerPatch::decoded(Decoded::Loading));
            self.loader.request(LoadTarget::Layer { id, source });
        }
    }

    /// Apply every load that has finished, without blocking. Returns whether
    /// anything was applied (and the surface redrawn).
    pub fn poll_loads(&mut self) -> bool {
        let done = self.loader.try_collect();
        if done.is_empty() {
            return false;
        }
        for result in done {
            self.apply_load(result);
        }
        self.render();
        true
    }

    /// Block until no loads are outstanding or `timeout` passes, applying
    /// and redrawing after each one. Returns how many loads were applied.
    pub fn flush_loads(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while let Some(result) = self.loader.wait_next(deadline) {
            self.apply_load(result);
            self.render();
            applied += 1;
        }
        applied
    }

    fn apply_load(&mut self, result: LoadResult) {
        let LoadResult { target, outcome } = result;
        match target {
            LoadTarget::Layer { id, source } => {
                let current = self
                    .scene
                    .layer(id)
                    .and_then(Layer::image_content)
                    .map(|c| c.source == source);
                if current == Some(true) {
                    let decoded = match outcome {
                        Ok(img) => Decoded::Ready(img),
                        Err(e) => {
                            crate::log_warn!("Image {} failed to load: {}", source, e);
                            Decoded::Failed
                        }
                    };
                    self.scene.update_layer(id, &LayerPatch::decoded(decoded));
                } else {
                    crate::log_debug!("Dropping stale load of {} for layer {}", source, id);
                }
                self.release_unused_blob(&source);
            }
            LoadTarget::Background { source } => {
                if self.background_request.as_ref() == Some(&source) {
                    match outcome {
                        Ok(img) => {
                            let (w, h) = (img.width(), img.height());
                            self.surface.resize(w, h);
                            self.scene.set_background(img, Some(source.clone()));
                            crate::log_info!("Background set: {} ({}x{})", source, w, h);
                        }
                        Err(e) => crate::log_warn!("Background {} failed to load: {}", source, e),
                    }
                } else {
                    crate::log_debug!("Dropping superseded background {}", source);
                }
                if source.is_blob() {
                    self.loader.revoke_blob(&source);
                }
            }
        }
    }

    /// Drop the bytes behind a `blob:` source once nothing refers to it.
    /// In-flight decodes already hold their own copy.
    fn release_unused_blob(&mut self, source: &SourceRef) {
        if !source.is_blob() || self.background_request.as_ref() == Some(source) {
            return;
        }
        let in_use = self
            .scene
            .layers()
            .iter()
            .any(|l| l.image_content().is_some_and(|c| &c.source == source));
        if !in_use {
            self.loader.revoke_blob(source);
        }
    }

    // ---------------------------------------------------------------------
    //  Input
    // ---------------------------------------------------------------------

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.controller.set_viewport(viewport);
    }

    /// Feed one pointer/wheel/key event. Returns whether the scene changed.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        let changed = self.controller.handle(event, &mut self.scene, self.surface.size());
        if changed {
            self.render();
        }
        changed
    }

    pub fn select(&mut self, id: Option<LayerId>) {
        self.scene.set_active(id);
        self.render();
    }

    // ---------------------------------------------------------------------
    //  Background
    // ---------------------------------------------------------------------

    /// Replace the background with the image at `source`. The surface takes
    /// the image's size once it has loaded; until then nothing changes.
    pub fn upload_background(&mut self, source: SourceRef) {
        self.background_request = Some(source.clone());
        self.loader.request(LoadTarget::Background { source });
    }

    /// Upload raw file bytes as the new background.
    pub fn upload_background_bytes(&mut self, bytes: Vec<u8>) -> SourceRef {
        let source = self.loader.register_blob(bytes);
        self.upload_background(source.clone());
        source
    }

    // ---------------------------------------------------------------------
    //  Layers
    // ---------------------------------------------------------------------

    /// Sticker in the default box plus an empty demo caption.
    pub fn add_default_layers(&mut self) {
        if let Some(id) = self.catalog.first_id() {
            self.add_sticker(id);
        }
        let (x, y) = TEXT_ORIGIN;
        let style = TextStyle { font_weight: DEMO_TEXT_WEIGHT, ..self.settings.text_style() };
        let layer = Layer::text(TEXT_LAYER_NAME, "", style, x, y).with_scale(DEMO_TEXT_SCALE);
        self.add_layer(layer);
    }

    /// Append any layer and redraw.
    pub fn add_layer(&mut self, layer: Layer) -> Option<LayerId> {
        let id = self.scene.add_layer(layer)?;
        self.render();
        Some(id)
    }

    /// New sticker layer in the default box, honoring the flip toggle.
    pub fn add_sticker(&mut self, sticker_id: u32) -> Option<LayerId> {
        let resolved = self.catalog.resolve(sticker_id, self.flipped)?;
        let (x, y, w, h) = STICKER_BOX;
        let layer = Layer::image(STICKER_LAYER_NAME, resolved.source, x, y, w, h).with_flip(resolved.mirror);
        self.add_layer(layer)
    }

    /// Point an existing image layer at another catalog sticker.
    pub fn set_sticker(&mut self, layer: LayerId, sticker_id: u32) -> bool {
        let is_image = self.scene.layer(layer).is_some_and(|l| !l.is_text());
        let Some(resolved) = self.catalog.resolve(sticker_id, self.flipped) else {
            return false;
        };
        if !is_image {
            return false;
        }
        let previous = self.scene.layer(layer).and_then(Layer::image_content).map(|c| c.source.clone());
        let patch = LayerPatch {
            source: Some(resolved.source),
            flipped: Some(resolved.mirror),
            ..Default::default()
        };
        let changed = self.scene.update_layer(layer, &patch);
        if let Some(previous) = previous {
            self.release_unused_blob(&previous);
        }
        self.render();
        changed
    }

    /// Sticker picker: swap the active image layer, else the first sticker
    /// layer, else add a new one.
    pub fn choose_sticker(&mut self, sticker_id: u32) -> Option<LayerId> {
        let target = self
            .scene
            .active_layer()
            .filter(|l| !l.is_text())
            .or_else(|| self.scene.layer_named(STICKER_LAYER_NAME))
            .map(|l| l.id);
        match target {
            Some(id) => self.set_sticker(id, sticker_id).then_some(id),
            None => self.add_sticker(sticker_id),
        }
    }

    /// Toggle mirroring for every catalog sticker in the scene.
    pub fn set_flipped(&mut self, flipped: bool) {
        self.flipped = flipped;
        let updates: Vec<(LayerId, u32)> = self
            .scene
            .layers()
            .iter()
            .filter_map(|l| {
                let content = l.image_content()?;
                Some((l.id, self.catalog.id_for_source(&content.source)?))
            })
            .collect();
        for (id, sticker_id) in updates {
            if let Some(resolved) = self.catalog.resolve(sticker_id, flipped) {
                let patch = LayerPatch {
                    source: Some(resolved.source),
                    flipped: Some(resolved.mirror),
                    ..Default::default()
                };
                self.scene.update_layer(id, &patch);
            }
        }
        self.render();
    }

    /// New text layer with the configured style at the default origin.
    pub fn add_text(&mut self, text: &str) -> Option<LayerId> {
        let (x, y) = TEXT_ORIGIN;
        let layer = Layer::text(TEXT_LAYER_NAME, text, self.settings.text_style(), x, y);
        self.add_layer(layer)
    }

    fn patch_and_render(&mut self, id: LayerId, patch: &LayerPatch) -> bool {
        let found = self.scene.update_layer(id, patch);
        if found {
            self.render();
        }
        found
    }

    pub fn set_text(&mut self, id: LayerId, text: &str) -> bool {
        self.patch_and_render(id, &LayerPatch::text(text))
    }

    pub fn set_text_color(&mut self, id: LayerId, color: [u8; 4]) -> bool {
        self.patch_and_render(id, &LayerPatch { color: Some(color), ..Default::default() })
    }

    pub fn set_font_size(&mut self, id: LayerId, size: f32) -> bool {
        self.patch_and_render(id, &LayerPatch { font_size: Some(size), ..Default::default() })
    }

    pub fn set_position(&mut self, id: LayerId, x: f32, y: f32) -> bool {
        self.patch_and_render(id, &LayerPatch::position(x, y))
    }

    pub fn set_scale(&mut self, id: LayerId, scale: f32) -> bool {
        self.patch_and_render(id, &LayerPatch::scale(scale))
    }

    /// Rotation from a degree-based control.
    pub fn set_rotation_degrees(&mut self, id: LayerId, degrees: f32) -> bool {
        self.patch_and_render(id, &LayerPatch::rotation(degrees.to_radians()))
    }

    /// First text layer, if any (what the text field edits).
    pub fn text_layer(&self) -> Option<&Layer> {
        self.scene.layers().iter().find(|l| matches!(l.kind, LayerKind::Text(_)))
    }

    // ---------------------------------------------------------------------
    //  Export
    // ---------------------------------------------------------------------

    /// Whatever is painted right now, as PNG bytes.
    pub fn export_png(&self) -> Result<Vec<u8>, ExportError> {
        let bytes = io::encode_png(self.surface.pixels())?;
        crate::log_info!(
            "Exported {}x{} PNG ({} bytes)",
            self.surface.width(),
            self.surface.height(),
            bytes.len()
        );
        Ok(bytes)
    }

    pub fn save_png(&self, path: &Path) -> Result<PathBuf, ExportError> {
        let written = io::save_png(self.surface.pixels(), path)?;
        crate::log_info!("Saved {}", written.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(10);

    fn png(w: u32, h: u32, c: [u8; 4]) -> Vec<u8> {
        io::encode_png(&RgbaImage::from_pixel(w, h, Rgba(c))).unwrap()
    }

    fn editor() -> Editor {
        let dir = std::env::temp_dir().join("memefe-no-assets");
        Editor::new(EditorSettings { asset_dir: dir, ..EditorSettings::default() })
    }

    fn decoded(editor: &Editor, id: LayerId) -> Decoded {
        editor.scene().layer(id).unwrap().image_content().unwrap().decoded.clone()
    }

    #[test]
    fn starts_blank_at_configured_size() {
        let e = Editor::new(EditorSettings {
            canvas_width: 64,
            canvas_height: 32,
            background_color: [1, 2, 3, 255],
            ..EditorSettings::default()
        });
        assert_eq!(e.surface().size(), (64, 32));
        assert_eq!(e.surface().pixel(10, 10), Some(Rgba([1, 2, 3, 255])));
        assert!(e.scene().is_empty());
    }

    #[test]
    fn image_layer_loads_then_draws() {
        let mut e = editor();
        let src = e.loader_mut().register_blob(png(4, 4, [255, 0, 0, 255]));
        let id = e.add_layer(Layer::image("img", src, 10.0, 10.0, 40.0, 40.0)).unwrap();
        assert!(matches!(decoded(&e, id), Decoded::Loading));
        assert_eq!(e.surface().pixel(30, 30), Some(Rgba([255, 255, 255, 255])));

        assert_eq!(e.flush_loads(WAIT), 1);
        assert!(decoded(&e, id).is_ready());
        assert_eq!(e.surface().pixel(30, 30), Some(Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn failed_load_is_not_retried() {
        let mut e = editor();
        let id = e
            .add_layer(Layer::image("img", SourceRef::new("/no/such/file.png"), 0.0, 0.0, 10.0, 10.0))
            .unwrap();
        e.flush_loads(WAIT);
        assert!(matches!(decoded(&e, id), Decoded::Failed));
        e.render();
        assert_eq!(e.pending_loads(), 0);
    }

    #[test]
    fn stale_layer_load_is_dropped() {
        let mut e = editor();
        let first = e.loader_mut().register_blob(png(2, 2, [255, 0, 0, 255]));
        let second = e.loader_mut().register_blob(png(2, 2, [0, 0, 255, 255]));
        let id = e.add_layer(Layer::image("img", first, 0.0, 0.0, 20.0, 20.0)).unwrap();
        // swap before the first decode is applied
        e.scene.update_layer(id, &LayerPatch::source(second));
        e.render();
        e.flush_loads(WAIT);
        assert_eq!(e.surface().pixel(10, 10), Some(Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn layer_blobs_are_released_when_unreferenced() {
        let mut e = editor();
        let first = e.loader_mut().register_blob(png(2, 2, [255, 0, 0, 255]));
        let second = e.loader_mut().register_blob(png(2, 2, [0, 0, 255, 255]));
        let id = e.add_layer(Layer::image("img", first.clone(), 0.0, 0.0, 20.0, 20.0)).unwrap();
        e.scene.update_layer(id, &LayerPatch::source(second.clone()));
        e.render();
        e.flush_loads(WAIT);
        // the superseded blob is gone, the one on screen is kept
        assert!(e.loader_mut().load_blocking(&first).is_err());
        assert!(e.loader_mut().load_blocking(&second).is_ok());

        // swapping to a catalog sticker releases it too
        assert!(e.set_sticker(id, 1));
        assert!(e.loader_mut().load_blocking(&second).is_err());
    }

    #[test]
    fn latest_background_wins() {
        let mut e = editor();
        e.upload_background_bytes(png(50, 40, [9, 9, 9, 255]));
        let last = e.upload_background_bytes(png(30, 20, [7, 7, 7, 255]));
        e.flush_loads(WAIT);
        assert_eq!(e.surface().size(), (30, 20));
        assert_eq!(e.scene().background().unwrap().source.as_ref(), Some(&last));
        // consumed blobs are released
        assert!(e.loader_mut().load_blocking(&last).is_err());
    }

    #[test]
    fn broken_background_keeps_fill() {
        let mut e = editor();
        e.upload_background_bytes(b"not an image".to_vec());
        e.flush_loads(WAIT);
        assert!(e.scene().background().is_none());
        assert_eq!(e.surface().size(), (400, 300));
        assert!(!e.export_png().unwrap().is_empty());
    }

    #[test]
    fn flip_toggle_mirrors_stickers_without_assets() {
        let mut e = editor();
        let id = e.add_sticker(2).unwrap();
        e.set_flipped(true);
        let c = e.scene().layer(id).unwrap().image_content().unwrap().clone();
        assert!(c.flipped);
        assert!(c.source.as_str().ends_with("pepe_2.webp"));
        e.set_flipped(false);
        assert!(!e.scene().layer(id).unwrap().image_content().unwrap().flipped);
    }

    #[test]
    fn choose_sticker_swaps_existing_layer() {
        let mut e = editor();
        e.add_default_layers();
        assert_eq!(e.scene().len(), 2);
        let sticker = e.scene().layer_named(STICKER_LAYER_NAME).unwrap().id;
        assert_eq!(e.choose_sticker(3), Some(sticker));
        assert_eq!(e.scene().len(), 2);
        let c = e.scene().layer(sticker).unwrap().image_content().unwrap().clone();
        assert!(c.source.as_str().ends_with("pepe_3.webp"));
        assert!(e.choose_sticker(99).is_none());
    }

    #[test]
    fn default_text_layer_style() {
        let mut e = editor();
        e.add_default_layers();
        let text = e.text_layer().unwrap();
        let content = text.text_content().unwrap();
        assert_eq!((text.x, text.y), (50.0, 50.0));
        assert_eq!(content.style.font_size, 80.0);
        assert_eq!(content.style.color, [255, 255, 255, 255]);
        assert_eq!(content.style.font_weight, 120);
        assert_eq!(text.scale_factor, 5.0);
        assert_eq!(text.height, 80.0);

        // captions added later keep the configured weight and unit scale
        let id = e.add_text("later").unwrap();
        let later = e.scene().layer(id).unwrap();
        assert_eq!(later.text_content().unwrap().style.font_weight, 400);
        assert_eq!(later.scale_factor, 1.0);
    }

    #[test]
    fn direct_edits_convert_degrees() {
        let mut e = editor();
        let id = e
            .add_layer(Layer::image("img", SourceRef::new("mem"), 0.0, 0.0, 10.0, 10.0)
                .with_decoded(Arc::new(RgbaImage::new(1, 1))))
            .unwrap();
        assert!(e.set_rotation_degrees(id, 180.0));
        assert!((e.scene().layer(id).unwrap().rotation - std::f32::consts::PI).abs() < 1e-6);
        assert!(e.set_position(id, 5.0, 6.0));
        assert!(e.set_scale(id, 3.0));
        assert!(!e.set_scale(LayerId::new(), 3.0));
        let l = e.scene().layer(id).unwrap();
        assert_eq!((l.x, l.y, l.scale_factor), (5.0, 6.0, 3.0));
    }
}
