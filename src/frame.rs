//! Camera frames
//!
//! A decoded image pushed by a producer. Frames are transient: the relay
//! keeps only the latest one and sinks consume them as they arrive.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Container format detected from the image header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

impl ImageFormat {
    /// Detect the format from the leading magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
            [b'B', b'M', ..] => Some(ImageFormat::Bmp),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(ImageFormat::Webp)
            }
            _ => None,
        }
    }

    /// File extension used when saving
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Webp => "webp",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position in the producer's stream, starting at 1
    pub frame_number: u64,
    pub captured_at: DateTime<Utc>,
    pub format: ImageFormat,
    /// Dimensions, when the header carries them
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Encoded image bytes, exactly as received
    pub data: Vec<u8>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Representation embedded in `camera_frame` payloads
    pub fn to_wire(&self) -> Value {
        json!({
            "image": STANDARD.encode(&self.data),
            "format": self.format,
            "frame_number": self.frame_number,
            "timestamp": self.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "width": self.width,
            "height": self.height,
        })
    }
}
