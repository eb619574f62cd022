//! Image payload helpers: data-URIs, attachments, and transient references.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

use crate::error::{RemoteError, ValidationError};

/// Media type assumed when a payload doesn't declare one
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Image types accepted as attachments
pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

const BLOB_SCHEME: &str = "blob:pincel/";

/// Raw image bytes plus their declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Read an image file, inferring the media type from its extension
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let media_type = media_type_for_path(path)
            .ok_or_else(|| ValidationError::UnsupportedImage(path.display().to_string()))?;
        let bytes = std::fs::read(path)?;
        Ok(Self::new(bytes, media_type))
    }

    pub fn to_data_uri(&self) -> String {
        build_data_uri(&self.media_type, &STANDARD.encode(&self.bytes))
    }

    /// File extension matching the media type
    pub fn extension(&self) -> &'static str {
        extension_for(&self.media_type)
    }
}

/// Build `data:<type>;base64,<payload>` from an already-encoded payload
pub fn build_data_uri(media_type: &str, base64_payload: &str) -> String {
    let media_type = if media_type.is_empty() {
        DEFAULT_MEDIA_TYPE
    } else {
        media_type
    };
    format!("data:{};base64,{}", media_type, base64_payload)
}

pub fn is_data_uri(url: &str) -> bool {
    url.starts_with("data:")
}

pub fn is_transient(url: &str) -> bool {
    url.starts_with("blob:")
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(.*?);").expect("data-uri header pattern"))
}

/// Split a data-URI back into bytes and media type.
///
/// The media type comes from the header and falls back to JPEG; a missing
/// or undecodable payload is an invalid reference.
pub fn decode_data_uri(url: &str) -> Result<ImageData, RemoteError> {
    if !is_data_uri(url) {
        return Err(RemoteError::InvalidReference);
    }
    let (header, payload) = url.split_once(',').ok_or(RemoteError::InvalidReference)?;
    if payload.is_empty() {
        return Err(RemoteError::InvalidReference);
    }

    let media_type = header_regex()
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MEDIA_TYPE);

    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| RemoteError::InvalidReference)?;
    Ok(ImageData::new(bytes, media_type))
}

pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Process-local image references.
///
/// Attached images are shown in the thread through a `blob:` reference
/// that only this registry can resolve. References are never released
/// automatically; whoever creates one must `revoke` it when the image is
/// replaced or removed.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    entries: HashMap<String, ImageData>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, image: ImageData) -> String {
        let url = format!("{}{}", BLOB_SCHEME, uuid::Uuid::new_v4());
        self.entries.insert(url.clone(), image);
        url
    }

    pub fn resolve(&self, url: &str) -> Option<&ImageData> {
        self.entries.get(url)
    }

    /// Release a reference. Returns false if it was unknown or already revoked.
    pub fn revoke(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve any image reference (data-URI or live blob) to its bytes
pub fn load_image(url: &str, blobs: &BlobRegistry) -> Option<ImageData> {
    if is_transient(url) {
        blobs.resolve(url).cloned()
    } else {
        decode_data_uri(url).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_media_type_and_payload() {
        let image = decode_data_uri("data:image/webp;base64,AQID").unwrap();
        assert_eq!(image.media_type, "image/webp");
        assert_eq!(image.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn decode_defaults_to_jpeg_without_declared_type() {
        let image = decode_data_uri("data:base64,AQID").unwrap();
        assert_eq!(image.media_type, DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn decode_rejects_missing_payload_and_blob_refs() {
        assert!(matches!(
            decode_data_uri("data:image/png;base64,"),
            Err(RemoteError::InvalidReference)
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64"),
            Err(RemoteError::InvalidReference)
        ));
        assert!(matches!(
            decode_data_uri("blob:pincel/123"),
            Err(RemoteError::InvalidReference)
        ));
    }

    #[test]
    fn empty_media_type_builds_jpeg_uri() {
        assert_eq!(build_data_uri("", "AQID"), "data:image/jpeg;base64,AQID");
        let image = ImageData::new(vec![1, 2, 3], "image/png");
        assert_eq!(image.to_data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn attachment_types_come_from_extension() {
        assert_eq!(media_type_for_path(Path::new("cat.PNG")), Some("image/png"));
        assert_eq!(media_type_for_path(Path::new("cat.jpeg")), Some("image/jpeg"));
        assert_eq!(media_type_for_path(Path::new("cat.gif")), None);
        assert_eq!(media_type_for_path(Path::new("cat")), None);
    }

    #[test]
    fn registry_revokes_once() {
        let mut blobs = BlobRegistry::new();
        let url = blobs.create(ImageData::new(vec![9], "image/png"));
        assert!(is_transient(&url));
        assert_eq!(load_image(&url, &blobs).unwrap().bytes, vec![9]);

        assert!(blobs.revoke(&url));
        assert!(!blobs.revoke(&url));
        assert!(blobs.is_empty());
        assert!(load_image(&url, &blobs).is_none());
    }
}
