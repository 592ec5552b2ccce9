// ============================================================================
// SCENE MODEL: ordered layer list, background, single-active selection
// ============================================================================

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::loader::SourceRef;

/// Smallest nominal image box a patch may resize to, in canvas pixels.
pub const MIN_IMAGE_BOX: f32 = 5.0;

/// Stable layer identity, unique within a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is plenty for log lines.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

/// Decode state of an image layer's bitmap.
///
/// The bitmap belongs to the layer and is dropped (back to `Unrequested`)
/// whenever the layer's source changes.
#[derive(Clone, Default)]
pub enum Decoded {
    /// Nobody has asked for the source yet; the next render pass will.
    #[default]
    Unrequested,
    /// A background decode is in flight.
    Loading,
    Ready(Arc<RgbaImage>),
    /// Decode failed. The layer stays undrawn and is never retried.
    Failed,
}

impl Decoded {
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Decoded::Ready(img) => Some(img),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Decoded::Ready(_))
    }
}

impl fmt::Debug for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Unrequested => write!(f, "Unrequested"),
            Decoded::Loading => write!(f, "Loading"),
            Decoded::Ready(img) => write!(f, "Ready({}x{})", img.width(), img.height()),
            Decoded::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageContent {
    pub source: SourceRef,
    /// Mirror horizontally before rotation.
    pub flipped: bool,
    pub decoded: Decoded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    /// CSS-style weight (100 = thin, 400 = regular, 700 = bold).
    pub font_weight: u16,
    /// Straight-alpha RGBA fill.
    pub color: [u8; 4],
    pub font_family: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            font_weight: 400,
            color: [255, 255, 255, 255],
            font_family: "Arial".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextContent {
    pub text: String,
    pub style: TextStyle,
}

/// Type-specific payload of a layer.
#[derive(Clone, Debug)]
pub enum LayerKind {
    Image(ImageContent),
    Text(TextContent),
}

/// Measured box of a text layer, produced by the renderer every pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned box in canvas coordinates (top-left + size).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Frame {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One positioned, transformable visual element.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    /// Free-form label ("sticker", "text", ...), not required to be unique.
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Nominal box before scale. Derived from measurement for text layers.
    pub width: f32,
    pub height: f32,
    pub scale_factor: f32,
    /// Radians.
    pub rotation: f32,
    pub active: bool,
    pub kind: LayerKind,
}

impl Layer {
    pub fn image(name: impl Into<String>, source: SourceRef, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            x,
            y,
            width,
            height,
            scale_factor: 1.0,
            rotation: 0.0,
            active: false,
            kind: LayerKind::Image(ImageContent {
                source,
                flipped: false,
                decoded: Decoded::Unrequested,
            }),
        }
    }

    /// Text layer with its baseline starting at (x, y). Width/height stay 0
    /// until the first render measures the text.
    pub fn text(name: impl Into<String>, text: impl Into<String>, style: TextStyle, x: f32, y: f32) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            x,
            y,
            width: 0.0,
            height: 0.0,
            scale_factor: 1.0,
            rotation: 0.0,
            active: false,
            kind: LayerKind::Text(TextContent { text: text.into(), style }),
        }
    }

    pub fn with_scale(mut self, scale_factor: f32) -> Self {
        if scale_factor.is_finite() && scale_factor > 0.0 {
            self.scale_factor = scale_factor;
        }
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_flip(mut self, flipped: bool) -> Self {
        if let LayerKind::Image(content) = &mut self.kind {
            content.flipped = flipped;
        }
        self
    }

    /// Pre-decoded bitmap, for callers that already hold the pixels.
    pub fn with_decoded(mut self, image: Arc<RgbaImage>) -> Self {
        if let LayerKind::Image(content) = &mut self.kind {
            content.decoded = Decoded::Ready(image);
        }
        self
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, LayerKind::Text(_))
    }

    pub fn image_content(&self) -> Option<&ImageContent> {
        match &self.kind {
            LayerKind::Image(content) => Some(content),
            LayerKind::Text(_) => None,
        }
    }

    pub fn text_content(&self) -> Option<&TextContent> {
        match &self.kind {
            LayerKind::Text(content) => Some(content),
            LayerKind::Image(_) => None,
        }
    }

    /// Un-scaled, un-rotated box in canvas space.
    ///
    /// Text is drawn with its baseline at `y`, so its box extends upward
    /// from there by the measured height.
    pub fn frame(&self) -> Frame {
        let y = if self.is_text() { self.y - self.height } else { self.y };
        Frame { x: self.x, y, width: self.width, height: self.height }
    }

    /// Copy of this layer with `patch` merged in. Fields the patch leaves as
    /// `None` are carried over untouched.
    fn patched(&self, patch: &LayerPatch) -> Layer {
        let mut next = self.clone();
        if let Some(x) = patch.x {
            next.x = x;
        }
        if let Some(y) = patch.y {
            next.y = y;
        }
        if let Some(s) = patch.scale_factor
            && s.is_finite()
            && s > 0.0
        {
            next.scale_factor = s;
        }
        if let Some(r) = patch.rotation
            && r.is_finite()
        {
            next.rotation = r;
        }
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }

        match &mut next.kind {
            LayerKind::Image(content) => {
                // a resize below the minimum keeps the old box
                let w = patch.width.unwrap_or(next.width);
                let h = patch.height.unwrap_or(next.height);
                if w.is_finite() && h.is_finite() && w >= MIN_IMAGE_BOX && h >= MIN_IMAGE_BOX {
                    next.width = w;
                    next.height = h;
                }
                if let Some(flipped) = patch.flipped {
                    content.flipped = flipped;
                }
                if let Some(source) = &patch.source
                    && *source != content.source
                {
                    content.source = source.clone();
                    content.decoded = Decoded::Unrequested;
                }
                if let Some(decoded) = &patch.decoded {
                    content.decoded = decoded.clone();
                }
            }
            LayerKind::Text(content) => {
                // width/height of text are measurement outputs only.
                if let Some(m) = patch.measured {
                    next.width = m.width;
                    next.height = m.height;
                }
                if let Some(text) = &patch.text {
                    content.text = text.clone();
                }
                if let Some(size) = patch.font_size
                    && size.is_finite()
                    && size > 0.0
                {
                    content.style.font_size = size;
                }
                if let Some(weight) = patch.font_weight {
                    content.style.font_weight = weight;
                }
                if let Some(color) = patch.color {
                    content.style.color = color;
                }
                if let Some(family) = &patch.font_family {
                    content.style.font_family = family.clone();
                }
            }
        }
        next
    }
}

/// Partial update for [`Scene::update_layer`]. Only `Some` fields are applied;
/// fields that don't apply to the layer's kind are ignored.
#[derive(Clone, Debug, Default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub scale_factor: Option<f32>,
    pub rotation: Option<f32>,
    // image
    pub source: Option<SourceRef>,
    pub flipped: Option<bool>,
    pub decoded: Option<Decoded>,
    // text
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub font_weight: Option<u16>,
    pub color: Option<[u8; 4]>,
    pub font_family: Option<String>,
    pub measured: Option<TextMetrics>,
}

impl LayerPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), ..Default::default() }
    }

    pub fn scale(scale_factor: f32) -> Self {
        Self { scale_factor: Some(scale_factor), ..Default::default() }
    }

    pub fn rotation(rotation: f32) -> Self {
        Self { rotation: Some(rotation), ..Default::default() }
    }

    pub fn source(source: SourceRef) -> Self {
        Self { source: Some(source), ..Default::default() }
    }

    pub fn decoded(decoded: Decoded) -> Self {
        Self { decoded: Some(decoded), ..Default::default() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }

    pub fn measured(metrics: TextMetrics) -> Self {
        Self { measured: Some(metrics), ..Default::default() }
    }
}

/// Uploaded background bitmap. Its size drives the output surface size.
#[derive(Clone)]
pub struct Background {
    pub image: Arc<RgbaImage>,
    pub source: Option<SourceRef>,
}

impl Background {
    pub fn size(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

impl fmt::Debug for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.size();
        write!(f, "Background({}x{}, {:?})", w, h, self.source)
    }
}

/// The full composition: layers in paint order plus an optional background.
///
/// Every mutation builds a fresh layer list in which only the targeted layer
/// is replaced by a patched copy; layers are never edited through a shared
/// reference while the list is being walked.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    layers: Vec<Layer>,
    background: Option<Background>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// First layer carrying `name`, in paint order.
    pub fn layer_named(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.active)
    }

    pub fn active_id(&self) -> Option<LayerId> {
        self.active_layer().map(|l| l.id)
    }

    /// Append a layer on top of the stack. A layer whose id is already present
    /// is rejected and `None` returned.
    ///
    /// The `active` flag of the incoming layer is ignored; use [`Scene::set_active`].
    pub fn add_layer(&mut self, mut layer: Layer) -> Option<LayerId> {
        if self.layer(layer.id).is_some() {
            crate::log_warn!("add_layer: duplicate layer id {} ignored", layer.id);
            return None;
        }
        layer.active = false;
        let id = layer.id;
        let mut next = self.layers.clone();
        next.push(layer);
        self.layers = next;
        Some(id)
    }

    /// Merge `patch` into the layer with `id`. Unknown ids are a silent no-op;
    /// the return value only reports whether a layer was found.
    pub fn update_layer(&mut self, id: LayerId, patch: &LayerPatch) -> bool {
        if self.layer(id).is_none() {
            return false;
        }
        self.layers = self
            .layers
            .iter()
            .map(|l| if l.id == id { l.patched(patch) } else { l.clone() })
            .collect();
        true
    }

    /// Make `id` the single active layer, or clear the selection with `None`.
    /// An unknown id leaves nothing selected.
    pub fn set_active(&mut self, id: Option<LayerId>) {
        self.layers = self
            .layers
            .iter()
            .map(|l| {
                let mut next = l.clone();
                next.active = Some(l.id) == id;
                next
            })
            .collect();
    }

    /// Replace any previous background.
    pub fn set_background(&mut self, image: Arc<RgbaImage>, source: Option<SourceRef>) {
        self.background = Some(Background { image, source });
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn background_size(&self) -> Option<(u32, u32)> {
        self.background.as_ref().map(Background::size)
    }
}
