// ============================================================================
// EDITOR SETTINGS: key=value file in the platform config directory
// ============================================================================

use std::path::{Path, PathBuf};

use crate::controller::{ControllerConfig, DEFAULT_ROTATION_STEP, DEFAULT_WHEEL_STEP};
use crate::render::DEFAULT_SURFACE_SIZE;
use crate::scene::TextStyle;
use crate::text::parse_color;

const SETTINGS_FILE: &str = "memefe_settings.cfg";

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Surface size used until a background is uploaded.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Fill drawn when there is no background.
    pub background_color: [u8; 4],
    /// Wheel multiplier per notch.
    pub wheel_step: f32,
    /// Radians per arrow key press.
    pub rotation_step: f32,
    /// Directory holding the sticker images.
    pub asset_dir: PathBuf,
    pub font_family: String,
    /// Font file used instead of a system lookup, when set.
    pub font_path: Option<PathBuf>,
    pub text_color: [u8; 4],
    pub text_font_size: f32,
    pub text_font_weight: u16,
    /// Start with the demo sticker + text layers.
    pub demo_layers: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_SURFACE_SIZE.0,
            canvas_height: DEFAULT_SURFACE_SIZE.1,
            background_color: [255, 255, 255, 255],
            wheel_step: DEFAULT_WHEEL_STEP,
            rotation_step: DEFAULT_ROTATION_STEP,
            asset_dir: PathBuf::from("assets"),
            font_family: "Arial".to_string(),
            font_path: None,
            text_color: [255, 255, 255, 255],
            text_font_size: 80.0,
            text_font_weight: 400,
            demo_layers: true,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/memefe/memefe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MemeFE\memefe_settings.cfg
    /// On macOS:   ~/Library/Application Support/MemeFE/memefe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("memefe");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            return Some(PathBuf::from(appdata).join("MemeFE").join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("MemeFE");
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Serialize a color as "r,g,b,a"
    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig { wheel_step: self.wheel_step, rotation_step: self.rotation_step }
    }

    /// Style for newly created text layers.
    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            font_size: self.text_font_size,
            font_weight: self.text_font_weight,
            color: self.text_color,
            font_family: self.font_family.clone(),
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "canvas_width={}\n\
             canvas_height={}\n\
             background_color={}\n\
             wheel_step={}\n\
             rotation_step={}\n\
             asset_dir={}\n\
             font_family={}\n\
             font_path={}\n\
             text_color={}\n\
             text_font_size={}\n\
             text_font_weight={}\n\
             demo_layers={}\n",
            self.canvas_width,
            self.canvas_height,
            Self::color_to_str(self.background_color),
            self.wheel_step,
            self.rotation_step,
            self.asset_dir.display(),
            self.font_family,
            self.font_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
            Self::color_to_str(self.text_color),
            self.text_font_size,
            self.text_font_weight,
            self.demo_layers,
        )
    }

    /// Parse `key=value` lines. Unknown keys are skipped and malformed values
    /// keep their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas_width" => {
                    s.canvas_width = val.parse::<u32>().ok().filter(|&w| w > 0).unwrap_or(d.canvas_width);
                }
                "canvas_height" => {
                    s.canvas_height = val.parse::<u32>().ok().filter(|&h| h > 0).unwrap_or(d.canvas_height);
                }
                "background_color" => {
                    if let Some(c) = parse_color(val) { s.background_color = c; }
                }
                "wheel_step" => {
                    s.wheel_step = val
                        .parse()
                        .ok()
                        .filter(|v: &f32| v.is_finite() && *v > 1.0)
                        .unwrap_or(d.wheel_step);
                }
                "rotation_step" => {
                    s.rotation_step = val.parse().ok().filter(|v: &f32| v.is_finite()).unwrap_or(d.rotation_step);
                }
                "asset_dir" => {
                    if !val.is_empty() { s.asset_dir = PathBuf::from(val); }
                }
                "font_family" => {
                    if !val.is_empty() { s.font_family = val.to_string(); }
                }
                "font_path" => {
                    s.font_path = (!val.is_empty()).then(|| PathBuf::from(val));
                }
                "text_color" => {
                    if let Some(c) = parse_color(val) { s.text_color = c; }
                }
                "text_font_size" => {
                    s.text_font_size = val
                        .parse()
                        .ok()
                        .filter(|v: &f32| v.is_finite() && *v > 0.0)
                        .unwrap_or(d.text_font_size);
                }
                "text_font_weight" => {
                    s.text_font_weight = val.parse().unwrap_or(d.text_font_weight);
                }
                "demo_layers" => {
                    s.demo_layers = val == "true";
                }
                _ => {}
            }
        }
        s
    }

    pub fn load_from(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_config_str(&content))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path).unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }
}
