//! Image snapshots submitted for analysis.
//!
//! The whiteboard exports its stage as a data URL
//! (`data:image/png;base64,....`). The header is split off and the payload
//! decoded; the bytes are otherwise opaque to the hub.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Opaque image handed to the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSnapshot {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageSnapshot {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    /// Parse a base64 `data:` URL
    pub fn from_data_url(url: &str) -> Result<Self, SnapshotError> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or(SnapshotError::NotADataUrl)?;
        let (header, encoded) = rest.split_once(',').ok_or(SnapshotError::NotADataUrl)?;

        let media_type = header
            .strip_suffix(";base64")
            .ok_or(SnapshotError::NotBase64)?;
        let media_type = if media_type.is_empty() {
            "application/octet-stream"
        } else {
            media_type
        };

        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if data.is_empty() {
            return Err(SnapshotError::Empty);
        }

        Ok(Self::new(media_type, data))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Errors from decoding a submitted image
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("imageDataUrl is not a data URL")]
    NotADataUrl,

    #[error("imageDataUrl must be base64 encoded")]
    NotBase64,

    #[error("imageDataUrl payload is not valid base64: {0}")]
    Decode(String),

    #[error("imageDataUrl carries no image data")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_png_data_url() {
        let snapshot = ImageSnapshot::from_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(snapshot.media_type, "image/png");
        assert_eq!(snapshot.data, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        assert_eq!(snapshot.to_base64(), "iVBORw0KGgo=");
    }

    #[test]
    fn test_missing_media_type_defaults() {
        let snapshot = ImageSnapshot::from_data_url("data:;base64,AAEC").unwrap();
        assert_eq!(snapshot.media_type, "application/octet-stream");
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert_eq!(
            ImageSnapshot::from_data_url("http://example.com/a.png"),
            Err(SnapshotError::NotADataUrl)
        );
        assert_eq!(
            ImageSnapshot::from_data_url("data:image/png;base64"),
            Err(SnapshotError::NotADataUrl)
        );
        assert_eq!(
            ImageSnapshot::from_data_url("data:text/plain,hello"),
            Err(SnapshotError::NotBase64)
        );
        assert!(matches!(
            ImageSnapshot::from_data_url("data:image/png;base64,@@@"),
            Err(SnapshotError::Decode(_))
        ));
        assert_eq!(
            ImageSnapshot::from_data_url("data:image/png;base64,"),
            Err(SnapshotError::Empty)
        );
    }
}
