// ============================================================================
// MemeFE launch arguments: one-off overrides of the saved settings
// ============================================================================
//
// Usage examples:
//   MemeFE --background cat.jpg
//   MemeFE --assets ~/stickers --font /usr/share/fonts/Impact.ttf
//   MemeFE --empty -v

use std::path::PathBuf;

use clap::Parser;

use crate::settings::EditorSettings;

/// MemeFE sticker editor.
#[derive(Parser, Debug, Default)]
#[command(name = "MemeFE", about = "Put stickers and captions on a picture and save it as PNG")]
pub struct LaunchArgs {
    /// Image to open as the background.
    #[arg(short, long, value_name = "IMAGE")]
    pub background: Option<PathBuf>,

    /// Directory containing the sticker images.
    #[arg(short, long, value_name = "DIR")]
    pub assets: Option<PathBuf>,

    /// Font file for caption text (overrides the system font lookup).
    #[arg(short, long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Start without the demo sticker and caption layers.
    #[arg(long)]
    pub empty: bool,

    /// Write debug lines to the session log.
    #[arg(short, long)]
    pub verbose: bool,
}

impl LaunchArgs {
    /// Fold the flags into `settings`. Nothing is written back to disk.
    pub fn apply(&self, settings: &mut EditorSettings) {
        if let Some(dir) = &self.assets {
            settings.asset_dir = dir.clone();
        }
        if let Some(font) = &self.font {
            settings.font_path = Some(font.clone());
        }
        if self.empty {
            settings.demo_layers = false;
        }
    }
}
