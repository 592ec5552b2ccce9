// ============================================================================
// IMAGE LOADER: resolve source references to bitmaps off the UI thread
// ============================================================================
//
// Decodes run on `rayon::spawn` and report back through an mpsc channel.
// The owner drains the channel from its event loop (`try_recv`), so every
// result is applied on the same thread that mutates the scene.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use uuid::Uuid;

use crate::scene::LayerId;

const BLOB_SCHEME: &str = "blob:";
const FILE_SCHEME: &str = "file://";

/// Reference to loadable bitmap data: a filesystem path, a `file://` URI, or
/// a `blob:<uuid>` handle to bytes registered with the [`ImageLoader`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blob(&self) -> bool {
        self.0.starts_with(BLOB_SCHEME)
    }

    /// Filesystem path for non-blob references.
    pub fn to_path(&self) -> Option<PathBuf> {
        if self.is_blob() {
            return None;
        }
        let raw = self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0);
        Some(PathBuf::from(raw))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error type for source resolution.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(image::ImageError),
    /// `blob:` reference that was never registered (or already revoked).
    UnknownBlob(String),
    /// Worker panicked or the channel closed before a result arrived.
    Aborted,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "decode error: {}", e),
            LoadError::UnknownBlob(uri) => write!(f, "unknown blob reference: {}", uri),
            LoadError::Aborted => write!(f, "load aborted"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<image::ImageError> for LoadError {
    fn from(e: image::ImageError) -> Self {
        LoadError::Decode(e)
    }
}

/// What a finished load should be attached to.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadTarget {
    Layer { id: LayerId, source: SourceRef },
    Background { source: SourceRef },
}

impl LoadTarget {
    pub fn source(&self) -> &SourceRef {
        match self {
            LoadTarget::Layer { source, .. } | LoadTarget::Background { source } => source,
        }
    }
}

pub struct LoadResult {
    pub target: LoadTarget,
    pub outcome: Result<Arc<RgbaImage>, LoadError>,
}

/// Decode bytes into a straight-alpha RGBA bitmap.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    Ok(image::load_from_memory(bytes)?.into_rgba8())
}

/// Decode a file from disk.
pub fn decode_file(path: &Path) -> Result<RgbaImage, LoadError> {
    let bytes = std::fs::read(path)?;
    decode_bytes(&bytes)
}

/// Background image resolver with an in-memory blob store.
pub struct ImageLoader {
    blobs: HashMap<String, Arc<Vec<u8>>>,
    sender: mpsc::Sender<LoadResult>,
    receiver: mpsc::Receiver<LoadResult>,
    pending: usize,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { blobs: HashMap::new(), sender, receiver, pending: 0 }
    }

    /// Keep `bytes` in memory and hand back a `blob:` reference to them.
    pub fn register_blob(&mut self, bytes: Vec<u8>) -> SourceRef {
        let uri = format!("{}{}", BLOB_SCHEME, Uuid::new_v4());
        self.blobs.insert(uri.clone(), Arc::new(bytes));
        SourceRef(uri)
    }

    /// Forget a registered blob. In-flight loads keep their own copy.
    pub fn revoke_blob(&mut self, source: &SourceRef) {
        self.blobs.remove(source.as_str());
    }

    /// Loads requested but not yet drained.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Resolve on the calling thread.
    pub fn load_blocking(&self, source: &SourceRef) -> Result<RgbaImage, LoadError> {
        if source.is_blob() {
            let bytes = self
                .blobs
                .get(source.as_str())
                .ok_or_else(|| LoadError::UnknownBlob(source.to_string()))?;
            return decode_bytes(bytes);
        }
        match source.to_path() {
            Some(path) => decode_file(&path),
            None => Err(LoadError::UnknownBlob(source.to_string())),
        }
    }

    /// Start decoding `target`'s source in the background. There is no
    /// cancellation: every request eventually produces exactly one result.
    pub fn request(&mut self, target: LoadTarget) {
        let sender = self.sender.clone();
        self.pending += 1;

        // Blob bytes are looked up here so the worker needs no shared store.
        let source = target.source().clone();
        let input = if source.is_blob() {
            match self.blobs.get(source.as_str()) {
                Some(bytes) => Ok(Input::Bytes(Arc::clone(bytes))),
                None => Err(LoadError::UnknownBlob(source.to_string())),
            }
        } else {
            match source.to_path() {
                Some(path) => Ok(Input::File(path)),
                None => Err(LoadError::UnknownBlob(source.to_string())),
            }
        };

        crate::log_debug!("load requested: {}", source);
        rayon::spawn(move || {
            let outcome = input.and_then(|input| {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| match input {
                    Input::Bytes(bytes) => decode_bytes(&bytes),
                    Input::File(path) => decode_file(&path),
                }))
                .unwrap_or(Err(LoadError::Aborted))
            });
            // Receiver dropped means the editor is gone; nothing to report to.
            let _ = sender.send(LoadResult { target, outcome: outcome.map(Arc::new) });
        });
    }

    /// Non-blocking drain of finished loads.
    pub fn try_collect(&mut self) -> Vec<LoadResult> {
        let mut done = Vec::new();
        while let Ok(result) = self.receiver.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            done.push(result);
        }
        done
    }

    /// Wait for the next finished load until `deadline`.
    pub fn wait_next(&mut self, deadline: Instant) -> Option<LoadResult> {
        if self.pending == 0 {
            return None;
        }
        let timeout = deadline.saturating_duration_since(Instant::now());
        if timeout == Duration::ZERO {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.pending = self.pending.saturating_sub(1);
                Some(result)
            }
            Err(_) => None,
        }
    }
}

enum Input {
    Bytes(Arc<Vec<u8>>),
    File(PathBuf),
}
