//! # 1-bit Canvas
//!
//! In-memory monochrome bitmap that `embedded-graphics` can draw on.
//!
//! Colour convention: [`BinaryColor::On`] is white (palette index 1),
//! [`BinaryColor::Off`] is black (palette index 0). Pixels drawn outside the
//! canvas are ignored.

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use image::Rgb;

use super::bmp;
use crate::error::{Result, ServerError};

/// Luma at or above this value becomes white
pub const LUMA_THRESHOLD: u8 = 128;

/// Two-entry palette: index 0 (dark), index 1 (light)
pub type Palette = [Rgb<u8>; 2];

/// Black and white
pub const DEFAULT_PALETTE: Palette = [Rgb([0, 0, 0]), Rgb([255, 255, 255])];

/// Monochrome canvas, row-major, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
    palette: Palette,
}

impl MonoBitmap {
    /// Canvas filled with `fill`
    pub fn new(width: u32, height: u32, fill: BinaryColor) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill.is_on(); (width as usize) * (height as usize)],
            palette: DEFAULT_PALETTE,
        }
    }

    /// Decode any format the `image` crate understands and threshold it.
    ///
    /// The palette is taken from the darkest and the lightest source pixel.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded or the image is empty.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let source = image::load_from_memory(bytes)?;
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(ServerError::Bitmap(format!(
                "source image has no pixels ({}x{})",
                width, height
            )));
        }

        let rgb = source.to_rgb8();
        let mut pixels = Vec::with_capacity((width as usize) * (height as usize));
        let mut darkest = (u8::MAX, Rgb([0, 0, 0]));
        let mut lightest = (u8::MIN, Rgb([255, 255, 255]));

        for pixel in rgb.pixels() {
            let luma = luma(pixel);
            if luma <= darkest.0 {
                darkest = (luma, *pixel);
            }
            if luma >= lightest.0 {
                lightest = (luma, *pixel);
            }
            pixels.push(luma >= LUMA_THRESHOLD);
        }

        Ok(Self {
            width,
            height,
            pixels,
            palette: [darkest.1, lightest.1],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some((y as usize) * (self.width as usize) + x as usize)
        } else {
            None
        }
    }

    /// Colour at `(x, y)`, `None` outside the canvas
    pub fn pixel(&self, x: u32, y: u32) -> Option<BinaryColor> {
        self.index(x, y).map(|i| BinaryColor::from(self.pixels[i]))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: BinaryColor) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color.is_on();
        }
    }

    /// Row `y` as booleans (`true` = white)
    pub fn row(&self, y: u32) -> &[bool] {
        let start = (y as usize) * (self.width as usize);
        &self.pixels[start..start + self.width as usize]
    }

    /// Cut `strip` rows off the bottom and append a `strip`-high band of
    /// `fill`. The height stays the same unless the canvas was shorter than
    /// the strip, in which case it becomes exactly `strip`.
    pub fn replace_bottom(&self, strip: u32, fill: BinaryColor) -> Self {
        let kept = self.height.saturating_sub(strip);
        let mut out = Self::new(self.width, kept + strip, fill);
        let kept_len = (kept as usize) * (self.width as usize);
        out.pixels[..kept_len].copy_from_slice(&self.pixels[..kept_len]);
        out.palette = self.palette;
        out
    }

    /// Serialize as an uncompressed 1-bpp BMP using the canvas palette.
    pub fn to_bmp(&self) -> Vec<u8> {
        bmp::encode(self)
    }
}

fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    // ITU-R 601-2 luma
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

impl DrawTarget for MonoBitmap {
    type Color = BinaryColor;

    type Error = ServerError;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels.into_iter() {
            if coord.x < 0 || coord.y < 0 {
                continue;
            }
            self.set_pixel(coord.x as u32, coord.y as u32, color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> std::result::Result<(), Self::Error> {
        self.pixels.fill(color.is_on());
        Ok(())
    }
}

impl OriginDimensions for MonoBitmap {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
