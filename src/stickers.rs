// ============================================================================
// STICKER CATALOG: fixed set of sticker designs, base + mirrored assets
// ============================================================================

use std::path::{Path, PathBuf};

use crate::loader::SourceRef;

#[derive(Clone, Debug, PartialEq)]
pub struct Sticker {
    pub id: u32,
    pub label: String,
    /// File name inside the asset directory.
    pub file: String,
    /// Pre-mirrored variant, if one ships with the assets.
    pub flipped_file: Option<String>,
}

impl Sticker {
    pub fn new(id: u32, label: &str, file: &str, flipped_file: Option<&str>) -> Self {
        Self {
            id,
            label: label.to_string(),
            file: file.to_string(),
            flipped_file: flipped_file.map(str::to_string),
        }
    }
}

/// How to draw a sticker: which asset to load, and whether the renderer
/// still has to mirror it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSticker {
    pub source: SourceRef,
    pub mirror: bool,
}

#[derive(Clone, Debug)]
pub struct StickerCatalog {
    asset_dir: PathBuf,
    stickers: Vec<Sticker>,
}

impl StickerCatalog {
    pub fn new(asset_dir: impl Into<PathBuf>, stickers: Vec<Sticker>) -> Self {
        Self { asset_dir: asset_dir.into(), stickers }
    }

    /// The three stock designs.
    pub fn default_in(asset_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            asset_dir,
            vec![
                Sticker::new(1, "pepe1", "pepe.webp", Some("pepe_fliped.webp")),
                Sticker::new(2, "pepe2", "pepe_2.webp", Some("pepe_2_fliped.webp")),
                Sticker::new(3, "pepe3", "pepe_3.webp", Some("pepe_3_fliped.webp")),
            ],
        )
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    pub fn stickers(&self) -> &[Sticker] {
        &self.stickers
    }

    pub fn get(&self, id: u32) -> Option<&Sticker> {
        self.stickers.iter().find(|s| s.id == id)
    }

    /// First entry, used for the demo layer.
    pub fn first_id(&self) -> Option<u32> {
        self.stickers.first().map(|s| s.id)
    }

    /// Sticker id → source. A flipped request uses the mirrored asset when
    /// it exists on disk, and falls back to mirroring the base asset.
    pub fn resolve(&self, id: u32, flipped: bool) -> Option<ResolvedSticker> {
        let sticker = self.get(id)?;
        if flipped
            && let Some(file) = &sticker.flipped_file
        {
            let path = self.asset_dir.join(file);
            if path.is_file() {
                return Some(ResolvedSticker { source: SourceRef::from_path(&path), mirror: false });
            }
        }
        let path = self.asset_dir.join(&sticker.file);
        Some(ResolvedSticker { source: SourceRef::from_path(&path), mirror: flipped })
    }

    /// Reverse lookup from a layer's source back to its sticker id.
    pub fn id_for_source(&self, source: &SourceRef) -> Option<u32> {
        let path = source.to_path()?;
        self.stickers
            .iter()
            .find(|s| {
                path == self.asset_dir.join(&s.file)
                    || s.flipped_file.as_ref().is_some_and(|f| path == self.asset_dir.join(f))
            })
            .map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_resolves_to_nothing() {
        let catalog = StickerCatalog::default_in("assets");
        assert!(catalog.resolve(42, false).is_none());
        assert_eq!(catalog.stickers().len(), 3);
        assert_eq!(catalog.first_id(), Some(1));
    }

    #[test]
    fn missing_mirrored_asset_falls_back_to_transform_flip() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = StickerCatalog::default_in(dir.path());
        let r = catalog.resolve(2, true).unwrap();
        assert_eq!(r.source, SourceRef::from_path(&dir.path().join("pepe_2.webp")));
        assert!(r.mirror);

        let r = catalog.resolve(2, false).unwrap();
        assert!(!r.mirror);
    }

    #[test]
    fn shipped_mirrored_asset_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pepe_3_fliped.webp"), b"x").unwrap();
        let catalog = StickerCatalog::default_in(dir.path());
        let r = catalog.resolve(3, true).unwrap();
        assert_eq!(r.source, SourceRef::from_path(&dir.path().join("pepe_3_fliped.webp")));
        assert!(!r.mirror);
        assert_eq!(catalog.id_for_source(&r.source), Some(3));
    }

    #[test]
    fn reverse_lookup_of_base_asset() {
        let catalog = StickerCatalog::default_in("assets");
        let r = catalog.resolve(1, false).unwrap();
        assert_eq!(catalog.id_for_source(&r.source), Some(1));
        assert_eq!(catalog.id_for_source(&SourceRef::new("blob:abc")), None);
    }
}
