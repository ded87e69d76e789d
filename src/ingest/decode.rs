//! Frame decoding
//!
//! Producers send either base64 text or raw bytes. Decoding validates the
//! image header (format and dimensions) without decompressing pixels.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use thiserror::Error;

use crate::frame::{Frame, ImageFormat};

/// Why an inbound payload is not a usable frame
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Empty image payload")]
    Empty,

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    #[error("Truncated {0} header")]
    Truncated(ImageFormat),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image field must be a base64 string")]
    InvalidPayload,
}

/// What the header says about an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Decode base64 image text, accepting an optional `data:` URL prefix
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    let text = text.trim();
    let encoded = match text.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => text,
    };
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(encoded)?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(bytes)
}

/// Identify an image and read its dimensions from the header
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let format = ImageFormat::detect(bytes).ok_or(DecodeError::UnrecognizedFormat)?;

    let dimensions = match format {
        ImageFormat::Jpeg => Some(jpeg_dimensions(bytes)?),
        ImageFormat::Png => Some(png_dimensions(bytes)?),
        ImageFormat::Gif => Some(gif_dimensions(bytes)?),
        ImageFormat::Bmp => Some(bmp_dimensions(bytes)?),
        ImageFormat::Webp => {
            if bytes.len() < 16 {
                return Err(DecodeError::Truncated(format));
            }
            None
        }
    };

    if let Some((width, height)) = dimensions {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidDimensions { width, height });
        }
    }

    Ok(ImageInfo {
        format,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    })
}

/// Validate raw bytes and wrap them as a frame
pub fn decode_frame(data: Vec<u8>, frame_number: u64) -> Result<Frame, DecodeError> {
    let info = inspect(&data)?;
    Ok(Frame {
        frame_number,
        captured_at: Utc::now(),
        format: info.format,
        width: info.width,
        height: info.height,
        data,
    })
}

fn jpeg_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let truncated = || DecodeError::Truncated(ImageFormat::Jpeg);
    let mut i = 2;

    loop {
        // Skip to the next marker, tolerating fill bytes
        while i < bytes.len() && bytes[i] != 0xFF {
            i += 1;
        }
        while i < bytes.len() && bytes[i] == 0xFF {
            i += 1;
        }
        let marker = *bytes.get(i).ok_or_else(truncated)?;
        i += 1;

        match marker {
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 | 0xDA => return Err(truncated()),
            // SOF0..SOF15, excluding DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let segment = bytes.get(i..i + 7).ok_or_else(truncated)?;
                let height = u16::from_be_bytes([segment[3], segment[4]]);
                let width = u16::from_be_bytes([segment[5], segment[6]]);
                return Ok((width as u32, height as u32));
            }
            _ => {
                let length = bytes.get(i..i + 2).ok_or_else(truncated)?;
                let length = u16::from_be_bytes([length[0], length[1]]) as usize;
                if length < 2 {
                    return Err(truncated());
                }
                i += length;
            }
        }
    }
}

fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let header = bytes
        .get(8..24)
        .filter(|h| &h[4..8] == b"IHDR")
        .ok_or(DecodeError::Truncated(ImageFormat::Png))?;
    let width = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let height = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
    Ok((width, height))
}

fn gif_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let header = bytes
        .get(6..10)
        .ok_or(DecodeError::Truncated(ImageFormat::Gif))?;
    let width = u16::from_le_bytes([header[0], header[1]]);
    let height = u16::from_le_bytes([header[2], header[3]]);
    Ok((width as u32, height as u32))
}

fn bmp_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let header = bytes
        .get(18..26)
        .ok_or(DecodeError::Truncated(ImageFormat::Bmp))?;
    let width = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    // Negative height marks a top-down bitmap
    let height = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok((width.unsigned_abs(), height.unsigned_abs()))
}
