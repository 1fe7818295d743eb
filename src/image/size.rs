//! Reads declared pixel dimensions straight from JPEG, PNG and WebP headers.
//!
//! Every routine is total: truncated or corrupt buffers yield an empty [`Dimensions`].

use super::Format;
use serde::Serialize;

const PNG_SIGNATURE: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// Minimum distance kept from the end of the buffer while scanning JPEG markers.
const JPEG_SCAN_TAIL: usize = 9;

/// Pixel dimensions recovered from an image header.
///
/// A `None` field means it couldn't be determined from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Dimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Dimensions {
    /// Creates a new pair. Zero values count as undetermined.
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        return Self {
            width: Some(width).filter(|&x| x > 0),
            height: Some(height).filter(|&x| x > 0),
        };
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Returns `(width, height)` if both are known
    #[inline]
    pub fn pair(&self) -> Option<(u32, u32)> {
        return Some((self.width?, self.height?));
    }
}

/// Reads the dimensions of `bytes`, parsed as `format`.
///
/// Formats other than PNG and WebP are parsed as JPEG.
pub fn sniff_dimensions(bytes: &[u8], format: Format) -> Dimensions {
    match format {
        Format::Png => png_dimensions(bytes),
        Format::Webp => webp_dimensions(bytes),
        Format::Jpeg | Format::Other => jpeg_dimensions(bytes),
    }
}

/// Walks the JPEG marker chain looking for a start-of-frame segment.
pub fn jpeg_dimensions(bytes: &[u8]) -> Dimensions {
    return match find_start_of_frame(bytes, 2) {
        Some(offset) => {
            match (read_u16_be(bytes, offset + 7), read_u16_be(bytes, offset + 5)) {
                (Some(width), Some(height)) => Dimensions::new(width.into(), height.into()),
                _ => Dimensions::default(),
            }
        }
        None => Dimensions::default(),
    };
}

/// Returns the offset of the first SOF marker at or after `cursor`.
///
/// Bytes that aren't `0xFF` where a marker is expected are skipped one at a time.
/// Every other segment is jumped over by `2 + length`, so the cursor always advances.
fn find_start_of_frame(bytes: &[u8], mut cursor: usize) -> Option<usize> {
    while cursor + JPEG_SCAN_TAIL < bytes.len() {
        if bytes[cursor] != 0xFF {
            cursor += 1;
            continue;
        }

        let marker = bytes[cursor + 1];
        if is_start_of_frame(marker) {
            return Some(cursor);
        }

        let length = read_u16_be(bytes, cursor + 2)?;
        cursor += 2 + usize::from(length);
    }

    return None;
}

/// `0xC0..=0xCF`, minus DHT (`0xC4`), JPG (`0xC8`) and DAC (`0xCC`)
#[inline]
fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Reads width and height from the IHDR chunk, which always directly follows the signature.
pub fn png_dimensions(bytes: &[u8]) -> Dimensions {
    if bytes.get(..4) != Some(&PNG_SIGNATURE[..]) {
        return Dimensions::default();
    }

    return match (read_u32_be(bytes, 16), read_u32_be(bytes, 20)) {
        (Some(width), Some(height)) => Dimensions::new(width, height),
        _ => Dimensions::default(),
    };
}

/// Reads the canvas size of an extended (`VP8X`) WebP.
///
/// Lossy (`VP8 `) and lossless (`VP8L`) files aren't supported.
pub fn webp_dimensions(bytes: &[u8]) -> Dimensions {
    let is_vp8x = bytes.get(0..4) == Some(&b"RIFF"[..])
        && bytes.get(8..12) == Some(&b"WEBP"[..])
        && bytes.get(12..16) == Some(&b"VP8X"[..]);
    if !is_vp8x {
        return Dimensions::default();
    }

    // Stored as size minus one
    return match (read_u24_le(bytes, 24), read_u24_le(bytes, 27)) {
        (Some(width), Some(height)) => Dimensions::new(width + 1, height + 1),
        _ => Dimensions::default(),
    };
}

#[inline]
fn read_u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    let x = bytes.get(offset..offset.checked_add(2)?)?;
    return Some(u16::from_be_bytes([x[0], x[1]]));
}

#[inline]
fn read_u32_be(bytes: &[u8], offset: usize) -> Option<u32> {
    let x = bytes.get(offset..offset.checked_add(4)?)?;
    return Some(u32::from_be_bytes([x[0], x[1], x[2], x[3]]));
}

#[inline]
fn read_u24_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let x = bytes.get(offset..offset.checked_add(3)?)?;
    return Some(u32::from_le_bytes([x[0], x[1], x[2], 0]));
}
