// ============================================================================
// INTERACTION CONTROLLER: pointer / wheel / arrow-key input → scene edits
// ============================================================================
//
// Two states: idle and dragging. The active layer itself lives on the scene.
// `handle` returns whether the scene changed in a way that needs a re-render.

use crate::scene::{Layer, LayerPatch, Scene};

pub const DEFAULT_WHEEL_STEP: f32 = 1.1;
pub const DEFAULT_ROTATION_STEP: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrowKey {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowKey {
    /// Rotation direction. Up/Left turn counter-clockwise, Down/Right clockwise.
    fn sign(self) -> f32 {
        match self {
            ArrowKey::Up | ArrowKey::Left => -1.0,
            ArrowKey::Down | ArrowKey::Right => 1.0,
        }
    }
}

/// Raw input in screen (client) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    /// Negative `delta_y` is "scroll up" (DOM wheel convention).
    Wheel { delta_y: f32 },
    Key(ArrowKey),
}

/// Where the surface is shown on screen and how big it appears there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub display_width: f32,
    pub display_height: f32,
}

impl Viewport {
    /// Viewport showing the surface unscaled at the screen origin.
    pub fn identity(backing: (u32, u32)) -> Self {
        Self { left: 0.0, top: 0.0, display_width: backing.0 as f32, display_height: backing.1 as f32 }
    }

    /// Map a screen point to surface pixels using backing/display ratios.
    /// `None` while the viewport has no visible extent.
    pub fn to_canvas(&self, client_x: f32, client_y: f32, backing: (u32, u32)) -> Option<(f32, f32)> {
        if self.display_width <= 0.0 || self.display_height <= 0.0 {
            return None;
        }
        let sx = backing.0 as f32 / self.display_width;
        let sy = backing.1 as f32 / self.display_height;
        Some(((client_x - self.left) * sx, (client_y - self.top) * sy))
    }
}

/// Whether canvas point (px, py) lies inside the layer's scaled box.
/// Rotation is not taken into account. Edges count as inside.
pub fn hit_test(layer: &Layer, px: f32, py: f32) -> bool {
    let frame = layer.frame();
    let (cx, cy) = frame.center();
    let half_w = frame.width * layer.scale_factor / 2.0;
    let half_h = frame.height * layer.scale_factor / 2.0;
    px >= cx - half_w && px <= cx + half_w && py >= cy - half_h && py <= cy + half_h
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Wheel multiplier per notch.
    pub wheel_step: f32,
    /// Radians per arrow key press.
    pub rotation_step: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { wheel_step: DEFAULT_WHEEL_STEP, rotation_step: DEFAULT_ROTATION_STEP }
    }
}

#[derive(Debug)]
pub struct InteractionController {
    dragging: bool,
    /// Pointer minus layer origin at drag start, in canvas units.
    offset: (f32, f32),
    viewport: Option<Viewport>,
    config: ControllerConfig,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { dragging: false, offset: (0.0, 0.0), viewport: None, config }
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Screen placement of the surface. Until set, screen and canvas
    /// coordinates coincide.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    fn to_canvas(&self, x: f32, y: f32, backing: (u32, u32)) -> Option<(f32, f32)> {
        self.viewport
            .unwrap_or_else(|| Viewport::identity(backing))
            .to_canvas(x, y, backing)
    }

    /// Apply one input event. `backing` is the surface size in pixels.
    pub fn handle(&mut self, event: InputEvent, scene: &mut Scene, backing: (u32, u32)) -> bool {
        match event {
            InputEvent::PointerDown { x, y } => {
                let Some((px, py)) = self.to_canvas(x, y, backing) else {
                    return false;
                };
                self.pointer_down(scene, px, py);
                true
            }
            InputEvent::PointerMove { x, y } => {
                if !self.dragging {
                    return false;
                }
                let Some((px, py)) = self.to_canvas(x, y, backing) else {
                    return false;
                };
                let Some(id) = scene.active_id() else {
                    return false;
                };
                scene.update_layer(id, &LayerPatch::position(px - self.offset.0, py - self.offset.1))
            }
            InputEvent::PointerUp => {
                let was_dragging = self.dragging;
                self.dragging = false;
                was_dragging
            }
            InputEvent::Wheel { delta_y } => {
                let Some(layer) = scene.active_layer() else {
                    return false;
                };
                let scale = if delta_y < 0.0 {
                    layer.scale_factor * self.config.wheel_step
                } else {
                    layer.scale_factor / self.config.wheel_step
                };
                let id = layer.id;
                scene.update_layer(id, &LayerPatch::scale(scale))
            }
            InputEvent::Key(key) => {
                let Some(layer) = scene.active_layer() else {
                    return false;
                };
                let rotation = layer.rotation + key.sign() * self.config.rotation_step;
                let id = layer.id;
                scene.update_layer(id, &LayerPatch::rotation(rotation))
            }
        }
    }

    fn pointer_down(&mut self, scene: &mut Scene, px: f32, py: f32) {
        scene.set_active(None);
        self.dragging = false;

        // topmost wins
        let hit = scene.layers().iter().rev().find(|l| hit_test(l, px, py));
        if let Some(layer) = hit {
            let id = layer.id;
            self.offset = (px - layer.x, py - layer.y);
            self.dragging = true;
            crate::log_debug!("pointer down ({:.1}, {:.1}) selected {} '{}'", px, py, id, layer.name);
            scene.set_active(Some(id));
        }
    }
}
