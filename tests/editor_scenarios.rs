use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use memefe::controller::{ArrowKey, InputEvent, Viewport};
use memefe::editor::Editor;
use memefe::loader::SourceRef;
use memefe::render::fit_draw_size;
use memefe::scene::{Layer, LayerId};
use memefe::settings::EditorSettings;
use memefe::text::FontBook;

const WAIT: Duration = Duration::from_secs(10);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn png(w: u32, h: u32, color: Rgba<u8>) -> Vec<u8> {
    memefe::io::encode_png(&RgbaImage::from_pixel(w, h, color)).unwrap()
}

fn editor_sized(w: u32, h: u32, asset_dir: &Path) -> Editor {
    Editor::new(EditorSettings {
        canvas_width: w,
        canvas_height: h,
        asset_dir: asset_dir.to_path_buf(),
        demo_layers: false,
        ..EditorSettings::default()
    })
}

/// Image layer backed by an in-memory PNG, loaded to completion.
fn add_loaded(editor: &mut Editor, color: Rgba<u8>, native: (u32, u32), bx: (f32, f32, f32, f32)) -> LayerId {
    let src = editor.loader_mut().register_blob(png(native.0, native.1, color));
    let id = editor
        .add_layer(Layer::image("img", src, bx.0, bx.1, bx.2, bx.3))
        .unwrap();
    editor.flush_loads(WAIT);
    id
}

fn click(editor: &mut Editor, x: f32, y: f32) {
    editor.handle_input(InputEvent::PointerDown { x, y });
    editor.handle_input(InputEvent::PointerUp);
}

fn active_count(editor: &Editor) -> usize {
    editor.scene().layers().iter().filter(|l| l.active).count()
}

// ---------------------------------------------------------------------------
//  Scenarios
// ---------------------------------------------------------------------------

#[test]
fn background_upload_resizes_surface_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(120, 80, dir.path());
    editor.upload_background_bytes(png(400, 300, BLUE));
    editor.flush_loads(WAIT);

    assert_eq!(editor.surface().size(), (400, 300));
    assert_eq!(editor.surface().pixel(399, 299), Some(BLUE));

    let bytes = editor.export_png().unwrap();
    assert!(!bytes.is_empty());
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (400, 300));
}

#[test]
fn background_from_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bg.png");
    std::fs::write(&path, png(64, 48, BLUE)).unwrap();
    let mut editor = editor_sized(10, 10, dir.path());
    editor.upload_background(SourceRef::from_path(&path));
    editor.flush_loads(WAIT);
    assert_eq!(editor.surface().size(), (64, 48));
}

#[test]
fn sticker_layer_is_drawn_at_its_center() {
    let dir = tempfile::tempdir().unwrap();
    // content sniffing decides the format, not the extension
    std::fs::write(dir.path().join("pepe.webp"), png(50, 50, RED)).unwrap();
    let mut editor = editor_sized(400, 300, dir.path());
    let id = editor.add_sticker(1).unwrap();
    editor.flush_loads(WAIT);

    let layer = editor.scene().layer(id).unwrap();
    assert_eq!((layer.x, layer.y, layer.width, layer.height), (30.0, 30.0, 500.0, 500.0));
    let center = editor.surface().pixel(280, 280).unwrap();
    assert_ne!(center, WHITE);
    assert_eq!(center, RED);
}

#[test]
fn arrow_up_three_times_rotates_and_redraws() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(300, 300, dir.path());
    let id = add_loaded(&mut editor, RED, (10, 2), (100.0, 100.0, 100.0, 20.0));
    assert_eq!(editor.surface().pixel(195, 110), Some(RED));
    assert_eq!(editor.surface().pixel(193, 97), Some(WHITE));

    click(&mut editor, 150.0, 110.0);
    assert_eq!(editor.scene().active_id(), Some(id));
    for _ in 0..3 {
        assert!(editor.handle_input(InputEvent::Key(ArrowKey::Up)));
    }

    let rotation = editor.scene().layer(id).unwrap().rotation;
    assert!((rotation + 0.3).abs() < 1e-6, "rotation was {}", rotation);
    // the right end of the bar swings upward
    assert_eq!(editor.surface().pixel(195, 110), Some(WHITE));
    assert_eq!(editor.surface().pixel(193, 97), Some(RED));
}

#[test]
fn clicking_another_layer_moves_the_selection() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(300, 300, dir.path());
    let a = add_loaded(&mut editor, RED, (4, 4), (10.0, 10.0, 50.0, 50.0));
    let b = add_loaded(&mut editor, BLUE, (4, 4), (200.0, 200.0, 50.0, 50.0));

    click(&mut editor, 35.0, 35.0);
    assert!(editor.scene().layer(a).unwrap().active);

    click(&mut editor, 225.0, 225.0);
    assert!(!editor.scene().layer(a).unwrap().active);
    assert!(editor.scene().layer(b).unwrap().active);
}

// ---------------------------------------------------------------------------
//  Properties
// ---------------------------------------------------------------------------

#[test]
fn at_most_one_layer_is_ever_active() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(300, 300, dir.path());
    let ids: Vec<LayerId> = (0..4)
        .map(|i| {
            let x = i as f32 * 40.0;
            add_loaded(&mut editor, RED, (2, 2), (x, x, 100.0, 100.0))
        })
        .collect();

    let clicks = [(50.0, 50.0), (130.0, 130.0), (299.0, 0.0), (90.0, 90.0), (20.0, 20.0)];
    for (x, y) in clicks {
        click(&mut editor, x, y);
        assert!(active_count(&editor) <= 1);
    }
    for &id in ids.iter().rev() {
        editor.select(Some(id));
        assert_eq!(active_count(&editor), 1);
    }
    editor.select(Some(LayerId::new()));
    assert_eq!(active_count(&editor), 0);
}

#[test]
fn later_layer_wins_where_they_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(200, 200, dir.path());
    add_loaded(&mut editor, RED, (8, 8), (20.0, 20.0, 100.0, 100.0));
    add_loaded(&mut editor, BLUE, (8, 8), (60.0, 60.0, 100.0, 100.0));
    assert_eq!(editor.surface().pixel(90, 90), Some(BLUE));
    assert_eq!(editor.surface().pixel(40, 40), Some(RED));
}

#[test]
fn draw_size_keeps_native_aspect() {
    let boxes = [(500.0, 500.0), (300.0, 120.0), (80.0, 400.0), (1.0, 1000.0)];
    let natives = [(100, 50), (50, 100), (640, 480), (3, 7)];
    for &(bw, bh) in &boxes {
        for &(nw, nh) in &natives {
            let box_aspect = bw / bh;
            let native_aspect = nw as f32 / nh as f32;
            if (box_aspect - native_aspect).abs() < f32::EPSILON {
                continue;
            }
            let (dw, dh) = fit_draw_size(bw, bh, nw, nh);
            assert!((dw / dh - native_aspect).abs() < 1e-3, "{:?} in {:?}", (nw, nh), (bw, bh));
            assert!(dw <= bw + 1e-3 && dh <= bh + 1e-3);
        }
    }
}

#[test]
fn wide_image_in_square_box_leaves_bottom_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(200, 200, dir.path());
    add_loaded(&mut editor, RED, (20, 10), (0.0, 0.0, 100.0, 100.0));
    assert_eq!(editor.surface().pixel(50, 25), Some(RED));
    assert_eq!(editor.surface().pixel(50, 75), Some(WHITE));
}

#[test]
fn hit_testing_center_and_far_away() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(1000, 1000, dir.path());
    let id = add_loaded(&mut editor, RED, (4, 4), (300.0, 200.0, 120.0, 60.0));

    click(&mut editor, 360.0, 230.0);
    assert_eq!(editor.scene().active_id(), Some(id));

    click(&mut editor, 990.0, 990.0);
    assert_eq!(editor.scene().active_id(), None);
}

#[test]
fn drag_offset_is_applied_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(400, 400, dir.path());
    let id = add_loaded(&mut editor, RED, (4, 4), (30.5, 40.25, 100.0, 100.0));

    editor.handle_input(InputEvent::PointerDown { x: 60.0, y: 70.0 });
    editor.handle_input(InputEvent::PointerMove { x: 80.0, y: 100.0 });
    editor.handle_input(InputEvent::PointerMove { x: 97.0, y: 58.0 });
    editor.handle_input(InputEvent::PointerUp);

    let layer = editor.scene().layer(id).unwrap();
    assert_eq!((layer.x, layer.y), (30.5 + 37.0, 40.25 - 12.0));
}

#[test]
fn drag_through_a_shrunken_display() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(400, 400, dir.path());
    let id = add_loaded(&mut editor, RED, (4, 4), (100.0, 100.0, 100.0, 100.0));
    editor.set_viewport(Viewport { left: 20.0, top: 10.0, display_width: 100.0, display_height: 100.0 });

    // canvas (150, 150) is screen (57.5, 47.5)
    editor.handle_input(InputEvent::PointerDown { x: 57.5, y: 47.5 });
    assert_eq!(editor.scene().active_id(), Some(id));
    editor.handle_input(InputEvent::PointerMove { x: 67.5, y: 47.5 });
    let layer = editor.scene().layer(id).unwrap();
    assert_eq!((layer.x, layer.y), (140.0, 100.0));
}

#[test]
fn wheel_steps_compound_and_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(300, 300, dir.path());
    let id = add_loaded(&mut editor, RED, (4, 4), (100.0, 100.0, 50.0, 50.0));
    click(&mut editor, 125.0, 125.0);

    for n in 1..=6 {
        editor.handle_input(InputEvent::Wheel { delta_y: -53.0 });
        let s = editor.scene().layer(id).unwrap().scale_factor;
        assert!((s - 1.1f32.powi(n)).abs() < 1e-4);
    }
    for _ in 0..6 {
        editor.handle_input(InputEvent::Wheel { delta_y: 53.0 });
    }
    let s = editor.scene().layer(id).unwrap().scale_factor;
    assert!((s - 1.0).abs() < 1e-4);
}

// ---------------------------------------------------------------------------
//  Silent degradation
// ---------------------------------------------------------------------------

#[test]
fn nothing_escapes_on_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(50, 50, dir.path());

    // no layers at all
    assert!(!editor.handle_input(InputEvent::Wheel { delta_y: -1.0 }));
    assert!(!editor.handle_input(InputEvent::Key(ArrowKey::Left)));
    editor.handle_input(InputEvent::PointerDown { x: f32::NAN, y: -1e9 });
    editor.handle_input(InputEvent::PointerMove { x: 1.0, y: 1.0 });

    // unknown ids
    assert!(!editor.set_position(LayerId::new(), 1.0, 1.0));
    assert!(!editor.set_text(LayerId::new(), "x"));

    // undecodable sources
    editor.upload_background_bytes(vec![1, 2, 3]);
    editor.add_layer(Layer::image("broken", SourceRef::new("blob:gone"), 0.0, 0.0, 10.0, 10.0));
    editor.add_sticker(2);
    editor.flush_loads(WAIT);

    assert_eq!(editor.surface().size(), (50, 50));
    assert!(editor.surface().pixels().pixels().all(|p| *p == WHITE));
    assert!(!editor.export_png().unwrap().is_empty());
}

#[test]
fn degenerate_viewport_ignores_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(100, 100, dir.path());
    let id = add_loaded(&mut editor, RED, (4, 4), (0.0, 0.0, 100.0, 100.0));
    editor.select(Some(id));
    editor.set_viewport(Viewport { left: 0.0, top: 0.0, display_width: 0.0, display_height: 0.0 });
    assert!(!editor.handle_input(InputEvent::PointerDown { x: 50.0, y: 50.0 }));
    assert_eq!(editor.scene().active_id(), Some(id));
}

#[test]
fn caption_box_follows_text() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(400, 300, dir.path());
    let id = editor.add_text("").unwrap();
    assert_eq!(editor.scene().layer(id).unwrap().width, 0.0);

    editor.set_text(id, "SUCH WOW");
    let layer = editor.scene().layer(id).unwrap().clone();
    assert_eq!(layer.height, 80.0);

    let style = layer.text_content().unwrap().style.clone();
    match FontBook::new().measure("SUCH WOW", &style.font_family, style.font_weight, style.font_size) {
        Some(w) => {
            assert!(w > 0.0);
            assert!((layer.width - w).abs() < 1e-3);
        }
        None => assert_eq!(layer.width, 0.0),
    }

    editor.set_font_size(id, 20.0);
    assert_eq!(editor.scene().layer(id).unwrap().height, 20.0);
}

#[test]
fn colored_caption_is_painted_above_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(400, 200, dir.path());
    let id = editor.add_text("").unwrap();
    editor.set_text_color(id, [0, 0, 0, 255]);
    editor.set_text(id, "WOW");
    if editor.scene().layer(id).unwrap().width == 0.0 {
        // no usable system font on this machine
        return;
    }
    let surface = editor.surface();
    let inked = |y0: u32, y1: u32| (0..400).any(|x| (y0..y1).any(|y| surface.pixel(x, y) != Some(WHITE)));
    // baseline at y = 50 with an 80px font
    assert!(inked(0, 50));
    assert!(!inked(80, 200));
}

#[test]
fn predecoded_layers_skip_loading() {
    let dir = tempfile::tempdir().unwrap();
    let mut editor = editor_sized(40, 40, dir.path());
    editor.add_layer(
        Layer::image("mem", SourceRef::new("mem"), 0.0, 0.0, 40.0, 40.0)
            .with_decoded(Arc::new(RgbaImage::from_pixel(2, 2, BLUE))),
    );
    assert_eq!(editor.pending_loads(), 0);
    assert_eq!(editor.surface().pixel(20, 20), Some(BLUE));
}
