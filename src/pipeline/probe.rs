//! Image verification from magic bytes and header fields
//!
//! Confirms downloaded bytes are a well-formed image of an accepted format
//! and reads the pixel dimensions without a full decode.

use crate::error::{AppError, Result};

/// Accepted input image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Format and dimensions read from an image header
#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Probe image bytes: format detection by magic bytes, dimensions from the
/// format's header. Anything unrecognized or malformed is a validation error.
pub fn probe(data: &[u8]) -> Result<ImageInfo> {
    if data.len() < 12 {
        return Err(AppError::Validation(
            "Image data too short to be a valid image".to_string(),
        ));
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return probe_png(data);
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return probe_jpeg(data);
    }

    // WebP: RIFF....WEBP
    if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return probe_webp(data);
    }

    Err(AppError::Validation(
        "Unsupported image format (accepted: JPEG, PNG, WebP)".to_string(),
    ))
}

fn probe_png(data: &[u8]) -> Result<ImageInfo> {
    // IHDR must be the first chunk: signature(8) + length(4) + "IHDR"(4)
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return Err(AppError::Validation("Malformed PNG header".to_string()));
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    if width == 0 || height == 0 {
        return Err(AppError::Validation("PNG with zero dimension".to_string()));
    }
    Ok(ImageInfo {
        format: ImageFormat::Png,
        width,
        height,
    })
}

fn probe_jpeg(data: &[u8]) -> Result<ImageInfo> {
    // Walk marker segments until a start-of-frame carrying the dimensions
    let mut pos = 2usize;
    while pos + 9 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        // Standalone markers have no length field
        if marker == 0xFF || (0xD0..=0xD9).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }
        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            break;
        }
        let is_sof = matches!(marker, 0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC);
        if is_sof {
            if pos + 9 > data.len() {
                break;
            }
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            if width == 0 || height == 0 {
                return Err(AppError::Validation("JPEG with zero dimension".to_string()));
            }
            return Ok(ImageInfo {
                format: ImageFormat::Jpeg,
                width,
                height,
            });
        }
        pos += 2 + seg_len;
    }
    Err(AppError::Validation(
        "Malformed JPEG: no frame header found".to_string(),
    ))
}

fn probe_webp(data: &[u8]) -> Result<ImageInfo> {
    if data.len() < 30 {
        return Err(AppError::Validation("Malformed WebP header".to_string()));
    }
    let chunk = &data[12..16];
    let payload = &data[20..];

    match chunk {
        // Extended format: canvas size minus one in 24-bit LE fields
        b"VP8X" => {
            if payload.len() < 10 {
                return Err(AppError::Validation("Truncated VP8X chunk".to_string()));
            }
            let width =
                1 + (payload[4] as u32 | (payload[5] as u32) << 8 | (payload[6] as u32) << 16);
            let height =
                1 + (payload[7] as u32 | (payload[8] as u32) << 8 | (payload[9] as u32) << 16);
            Ok(ImageInfo {
                format: ImageFormat::Webp,
                width,
                height,
            })
        }
        // Lossy: key frame start code then 14-bit dimensions
        b"VP8 " => {
            if payload.len() < 10 || payload[3..6] != [0x9D, 0x01, 0x2A] {
                return Err(AppError::Validation("Malformed VP8 frame".to_string()));
            }
            let width = (u16::from_le_bytes([payload[6], payload[7]]) & 0x3FFF) as u32;
            let height = (u16::from_le_bytes([payload[8], payload[9]]) & 0x3FFF) as u32;
            if width == 0 || height == 0 {
                return Err(AppError::Validation("WebP with zero dimension".to_string()));
            }
            Ok(ImageInfo {
                format: ImageFormat::Webp,
                width,
                height,
            })
        }
        // Lossless: 0x2F signature then 14-bit minus-one dimensions
        b"VP8L" => {
            if payload.len() < 5 || payload[0] != 0x2F {
                return Err(AppError::Validation("Malformed VP8L frame".to_string()));
            }
            let bits = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
            let width = (bits & 0x3FFF) + 1;
            let height = ((bits >> 14) & 0x3FFF) + 1;
            Ok(ImageInfo {
                format: ImageFormat::Webp,
                width,
                height,
            })
        }
        _ => Err(AppError::Validation(
            "Unrecognized WebP chunk".to_string(),
        )),
    }
}
