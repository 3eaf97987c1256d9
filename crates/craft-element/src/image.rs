//! Image payloads
//!
//! An element carries its picture inline: raw bytes plus a media type.
//! In JSON the bytes travel as standard base64 under `imageB64`.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// MIME media type of an image, e.g. `image/png`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaType(String);

impl MediaType {
    pub const PNG: &'static str = "image/png";
    pub const JPEG: &'static str = "image/jpeg";
    pub const GIF: &'static str = "image/gif";
    pub const WEBP: &'static str = "image/webp";
    pub const SVG: &'static str = "image/svg+xml";

    /// Create from any string; parameters after `;` are dropped
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        let essence = value.split(';').next().unwrap_or(value).trim();
        Self(essence.to_ascii_lowercase())
    }

    #[inline]
    #[must_use]
    pub fn png() -> Self {
        Self(Self::PNG.to_string())
    }

    #[inline]
    #[must_use]
    pub fn jpeg() -> Self {
        Self(Self::JPEG.to_string())
    }

    #[inline]
    #[must_use]
    pub fn svg() -> Self {
        Self(Self::SVG.to_string())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this names an `image/*` type
    #[inline]
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image formats recognised by content sniffing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

impl ImageFormat {
    /// Identify a format from leading magic bytes
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }
        let head = &bytes[..bytes.len().min(512)];
        let text = String::from_utf8_lossy(head);
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with("<svg")
            || (trimmed.starts_with("<?xml") && trimmed.contains("<svg"))
        {
            return Some(Self::Svg);
        }
        None
    }

    #[must_use]
    pub fn media_type(self) -> MediaType {
        let s = match self {
            Self::Png => MediaType::PNG,
            Self::Jpeg => MediaType::JPEG,
            Self::Gif => MediaType::GIF,
            Self::Webp => MediaType::WEBP,
            Self::Svg => MediaType::SVG,
        };
        MediaType(s.to_string())
    }
}

/// Binary image content plus its media type
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    #[serde(rename = "imageB64", with = "base64_bytes")]
    bytes: Vec<u8>,
    #[serde(rename = "mimeType")]
    media_type: MediaType,
}

impl ImagePayload {
    #[inline]
    #[must_use]
    pub fn new(bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self { bytes, media_type }
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        ContentHash::compute(&self.bytes)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
