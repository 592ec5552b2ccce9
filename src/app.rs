// ============================================================================
// MemeFE desktop shell: side panel controls + scaled canvas view
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;
use egui::{Color32, ColorImage, Rect, Sense, TextureHandle, TextureOptions, Vec2};

use crate::controller::{ArrowKey, InputEvent, Viewport};
use crate::editor::Editor;
use crate::io::DEFAULT_EXPORT_NAME;
use crate::loader::SourceRef;
use crate::scene::LayerId;
use crate::settings::EditorSettings;
use crate::{log_err, log_info, log_warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

pub struct MemeFEApp {
    editor: Editor,
    texture: Option<TextureHandle>,
    /// Surface generation currently uploaded to `texture`.
    shown_generation: Option<u64>,
    caption: String,
    text_color: [u8; 4],
    status: Option<String>,
}

impl MemeFEApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: EditorSettings, background: Option<PathBuf>) -> Self {
        let text_color = settings.text_color;
        let demo = settings.demo_layers;
        let mut editor = Editor::new(settings);
        if demo {
            editor.add_default_layers();
        }
        if let Some(path) = background {
            log_info!("Opening background from command line: {}", path.display());
            editor.upload_background(SourceRef::from_path(&path));
        }
        Self {
            editor,
            texture: None,
            shown_generation: None,
            caption: String::new(),
            text_color,
            status: None,
        }
    }

    fn pick_background(&mut self) {
        let Some(path) = rfd::FileDialog::new().add_filter("Image", IMAGE_EXTENSIONS).pick_file() else {
            return;
        };
        match std::fs::read(&path) {
            Ok(bytes) => {
                self.editor.upload_background_bytes(bytes);
            }
            Err(e) => log_warn!("Could not read {}: {}", path.display(), e),
        }
    }

    fn download(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(DEFAULT_EXPORT_NAME)
            .add_filter("PNG", &["png"])
            .save_file()
        else {
            return;
        };
        self.status = Some(match self.editor.save_png(&path) {
            Ok(written) => format!("Saved {}", written.display()),
            Err(e) => {
                log_err!("Export to {} failed: {}", path.display(), e);
                format!("Export failed: {}", e)
            }
        });
    }

    fn caption_layer(&mut self) -> Option<LayerId> {
        let existing = self.editor.text_layer().map(|l| l.id);
        existing.or_else(|| self.editor.add_text(""))
    }

    // ---------------------------------------------------------------------
    //  Side panel
    // ---------------------------------------------------------------------

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("MemeFE");
        ui.separator();

        if ui.button("Upload background…").clicked() {
            self.pick_background();
        }

        ui.add_space(8.0);
        ui.label("Change sticker:");
        let stickers: Vec<(u32, String)> = self
            .editor
            .catalog()
            .stickers()
            .iter()
            .map(|s| (s.id, s.label.clone()))
            .collect();
        ui.horizontal_wrapped(|ui| {
            for (id, label) in stickers {
                if ui.button(label).clicked() {
                    self.editor.choose_sticker(id);
                }
            }
        });
        let mut flipped = self.editor.is_flipped();
        if ui.checkbox(&mut flipped, "Flip").changed() {
            self.editor.set_flipped(flipped);
        }

        ui.add_space(8.0);
        ui.label("Text:");
        if ui.text_edit_singleline(&mut self.caption).changed()
            && let Some(id) = self.caption_layer()
        {
            self.editor.set_text(id, &self.caption);
        }
        ui.horizontal(|ui| {
            ui.label("Color");
            if ui.color_edit_button_srgba_unmultiplied(&mut self.text_color).changed()
                && let Some(id) = self.caption_layer()
            {
                self.editor.set_text_color(id, self.text_color);
            }
        });

        ui.add_space(8.0);
        self.active_layer_ui(ui);

        ui.add_space(8.0);
        ui.separator();
        if ui.button("Download").clicked() {
            self.download();
        }
        if let Some(status) = &self.status {
            ui.small(status);
        }
    }

    fn active_layer_ui(&mut self, ui: &mut egui::Ui) {
        let Some(layer) = self.editor.scene().active_layer() else {
            ui.weak("Click a layer to select it. Drag to move, scroll to scale, arrow keys to rotate.");
            return;
        };
        let id = layer.id;
        let (mut x, mut y) = (layer.x, layer.y);
        let mut scale = layer.scale_factor;
        let mut degrees = layer.rotation.to_degrees();
        let (w, h) = self.editor.surface().size();

        ui.label(format!("Selected: {} ({})", layer.name, id));
        if ui.add(egui::Slider::new(&mut x, -(w as f32)..=w as f32).text("x")).changed()
            | ui.add(egui::Slider::new(&mut y, -(h as f32)..=h as f32).text("y")).changed()
        {
            self.editor.set_position(id, x, y);
        }
        if ui
            .add(egui::Slider::new(&mut scale, 0.05..=10.0).logarithmic(true).text("scale"))
            .changed()
        {
            self.editor.set_scale(id, scale);
        }
        if ui.add(egui::Slider::new(&mut degrees, -180.0..=180.0).text("rotation °")).changed() {
            self.editor.set_rotation_degrees(id, degrees);
        }
    }

    // ---------------------------------------------------------------------
    //  Canvas
    // ---------------------------------------------------------------------

    fn sync_texture(&mut self, ctx: &egui::Context) {
        let generation = self.editor.surface().generation();
        if self.shown_generation == Some(generation) && self.texture.is_some() {
            return;
        }
        let pixels = self.editor.surface().pixels();
        let size = [pixels.width() as usize, pixels.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, pixels.as_raw());
        match &mut self.texture {
            Some(tex) => tex.set(image, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("memefe_surface", image, TextureOptions::LINEAR)),
        }
        self.shown_generation = Some(generation);
    }

    fn canvas_ui(&mut self, ui: &mut egui::Ui) {
        let (w, h) = self.editor.surface().size();
        let avail = ui.available_size();
        let fit = (avail.x / w as f32).min(avail.y / h as f32).min(1.0).max(0.01);
        let (response, painter) = ui.allocate_painter(avail, Sense::click_and_drag());
        let rect = Rect::from_center_size(response.rect.center(), Vec2::new(w as f32 * fit, h as f32 * fit));

        self.editor.set_viewport(Viewport {
            left: rect.min.x,
            top: rect.min.y,
            display_width: rect.width(),
            display_height: rect.height(),
        });

        if let Some(tex) = &self.texture {
            let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            painter.image(tex.id(), rect, uv, Color32::WHITE);
        }

        for event in collect_input(ui.ctx(), rect, self.editor.is_dragging()) {
            self.editor.handle_input(event);
        }
    }
}

/// Translate this frame's egui input into editor events.
fn collect_input(ctx: &egui::Context, canvas: Rect, dragging: bool) -> Vec<InputEvent> {
    ctx.input(|i| {
        let mut events = Vec::new();
        if i.pointer.primary_pressed()
            && let Some(pos) = i.pointer.interact_pos()
            && canvas.contains(pos)
        {
            events.push(InputEvent::PointerDown { x: pos.x, y: pos.y });
        }
        if (dragging || !events.is_empty())
            && i.pointer.is_moving()
            && let Some(pos) = i.pointer.hover_pos()
        {
            events.push(InputEvent::PointerMove { x: pos.x, y: pos.y });
        }
        if i.pointer.primary_released() {
            events.push(InputEvent::PointerUp);
        }
        if i.scroll_delta.y.abs() > 0.1 && i.pointer.hover_pos().is_some_and(|p| canvas.contains(p)) {
            // egui: positive = scroll up; editor follows the DOM sign.
            events.push(InputEvent::Wheel { delta_y: -i.scroll_delta.y });
        }
        for (key, arrow) in [
            (egui::Key::ArrowUp, ArrowKey::Up),
            (egui::Key::ArrowDown, ArrowKey::Down),
            (egui::Key::ArrowLeft, ArrowKey::Left),
            (egui::Key::ArrowRight, ArrowKey::Right),
        ] {
            if i.key_pressed(key) {
                events.push(InputEvent::Key(arrow));
            }
        }
        events
    })
}

impl eframe::App for MemeFEApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.editor.poll_loads();
        if self.editor.pending_loads() > 0 {
            ctx.request_repaint_after(Duration::from_millis(30));
        }

        egui::SidePanel::left("controls")
            .resizable(false)
            .default_width(240.0)
            .show(ctx, |ui| self.controls_ui(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            self.sync_texture(ctx);
            self.canvas_ui(ui);
        });

        // input may have re-rendered after the texture was drawn
        if self.shown_generation != Some(self.editor.surface().generation()) {
            ctx.request_repaint();
        }
    }
}
