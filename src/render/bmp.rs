//! # 1-bpp BMP Encoder
//!
//! Serializes a [`MonoBitmap`] as an uncompressed Windows bitmap with a
//! two-entry colour table.
//!
//! ## Layout
//!
//! ```text
//! offset  size  field
//!  0      14    BITMAPFILEHEADER  ("BM", file size, 0, pixel offset = 62)
//! 14      40    BITMAPINFOHEADER  (width, +height, 1 plane, 1 bpp, BI_RGB)
//! 54       8    colour table      (index 0, index 1 as B G R 0)
//! 62       …    pixel rows, bottom-up, MSB = leftmost pixel,
//!               each row padded to a multiple of 4 bytes
//! ```
//!
//! The display firmware only decodes index 0 as black and index 1 as white,
//! so every served bitmap gets its colour table overwritten with
//! [`MONO_PALETTE`] by [`force_mono_palette`].

use super::bitmap::MonoBitmap;
use crate::error::{Result, ServerError};

const FILE_HEADER_SIZE: usize = 14;
const INFO_HEADER_SIZE: usize = 40;

/// Byte offset of the colour table
pub const PALETTE_OFFSET: usize = FILE_HEADER_SIZE + INFO_HEADER_SIZE;

/// Byte offset of the first pixel row
pub const PIXEL_OFFSET: usize = PALETTE_OFFSET + MONO_PALETTE.len();

/// Black at index 0, white at index 1
pub const MONO_PALETTE: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0x00];

/// 72 DPI
const PIXELS_PER_METER: i32 = 2835;

/// Bytes per pixel row including padding
pub fn row_stride(width: u32) -> usize {
    (width as usize).div_ceil(32) * 4
}

/// Encode `bitmap` with its own palette.
pub fn encode(bitmap: &MonoBitmap) -> Vec<u8> {
    let stride = row_stride(bitmap.width());
    let image_size = stride * bitmap.height() as usize;
    let file_size = PIXEL_OFFSET + image_size;

    let mut out = Vec::with_capacity(file_size);

    // BITMAPFILEHEADER
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(PIXEL_OFFSET as u32).to_le_bytes());

    // BITMAPINFOHEADER
    out.extend_from_slice(&(INFO_HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&(bitmap.width() as i32).to_le_bytes());
    out.extend_from_slice(&(bitmap.height() as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());

    // Colour table, BGR0
    for color in bitmap.palette() {
        let [r, g, b] = color.0;
        out.extend_from_slice(&[b, g, r, 0]);
    }

    // Pixel rows, bottom-up
    for y in (0..bitmap.height()).rev() {
        let mut row = vec![0u8; stride];
        for (x, white) in bitmap.row(y).iter().enumerate() {
            if *white {
                row[x / 8] |= 0x80 >> (x % 8);
            }
        }
        out.extend_from_slice(&row);
    }

    out
}

/// Overwrite the colour table of an encoded 1-bpp BMP with [`MONO_PALETTE`].
///
/// # Errors
///
/// Returns [`ServerError::Bitmap`] if `bmp` is too short to hold a colour table.
pub fn force_mono_palette(bmp: &mut [u8]) -> Result<()> {
    if bmp.len() < PIXEL_OFFSET || !bmp.starts_with(b"BM") {
        return Err(ServerError::Bitmap(format!(
            "not a 1-bpp bitmap ({} bytes)",
            bmp.len()
        )));
    }
    bmp[PALETTE_OFFSET..PIXEL_OFFSET].copy_from_slice(&MONO_PALETTE);
    Ok(())
}

/// Encode `bitmap` and force the black/white colour table.
pub fn encode_mono(bitmap: &MonoBitmap) -> Result<Vec<u8>> {
    let mut bytes = encode(bitmap);
    force_mono_palette(&mut bytes)?;
    Ok(bytes)
}
