use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use image::ImageReader;
use uuid::Uuid;

use crate::error::GenerationError;

/// Used when the service does not declare a content type.
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Downloaded image bytes plus what a display layer needs to show them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    id: Uuid,
    bytes: Bytes,
    mime_type: String,
}

impl ImageHandle {
    pub fn new(bytes: Bytes, mime_type: Option<&str>) -> Self {
        let mime_type = mime_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        Self {
            id: Uuid::new_v4(),
            bytes,
            mime_type,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File extension from the MIME type, else sniffed from the bytes.
    pub fn extension(&self) -> &'static str {
        let essence = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => return "jpg",
            "image/png" => return "png",
            "image/webp" => return "webp",
            "image/gif" => return "gif",
            _ => {}
        }
        image::guess_format(&self.bytes)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("png")
    }

    /// Self-contained `data:` URL, the in-memory stand-in for an object URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn dimensions(&self) -> Result<(u32, u32), GenerationError> {
        ImageReader::new(Cursor::new(self.bytes.as_ref()))
            .with_guessed_format()
            .map_err(|err| GenerationError::Decode(err.to_string()))?
            .into_dimensions()
            .map_err(|err| GenerationError::Decode(err.to_string()))
    }

    pub fn default_filename(&self, timestamp_millis: i64) -> String {
        format!("generated-image-{timestamp_millis}.{}", self.extension())
    }

    pub fn save(&self, dir: &Path, filename: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}
