// ============================================================================
// EXPORT: encode the composited surface for the download collaborator
// ============================================================================

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};

/// File name offered by the download dialog.
pub const DEFAULT_EXPORT_NAME: &str = "imageFileName.png";

/// Error type for export operations
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Encode(ImageError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::Encode(e) => write!(f, "PNG encode error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Encode(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<ImageError> for ExportError {
    fn from(e: ImageError) -> Self {
        ExportError::Encode(e)
    }
}

/// Encode an RGBA bitmap as a PNG byte stream.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    write_png(image, &mut out)?;
    Ok(out)
}

/// Encode into any writer.
pub fn write_png<W: Write>(image: &RgbaImage, writer: W) -> Result<(), ExportError> {
    let encoder = PngEncoder::new(writer);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

/// Encode and write a PNG file, appending `.png` when `path` has no extension.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<std::path::PathBuf, ExportError> {
    let path = if path.extension().is_none() {
        path.with_extension("png")
    } else {
        path.to_path_buf()
    };
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    write_png(image, &mut writer)?;
    writer.flush()?;
    Ok(path)
}
