//! "No image available" bitmap served when no source image can be loaded.

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};

use super::bitmap::MonoBitmap;
use super::bmp;
use crate::error::Result;

pub const PLACEHOLDER_WIDTH: u32 = 800;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// Headline of the placeholder
pub const PLACEHOLDER_TEXT: &str = "No image available";

/// White 800 x 480 bitmap with the headline and `timestamp_text` centred
/// on two lines, encoded like every other served bitmap.
pub fn placeholder(timestamp_text: &str, font: &'static MonoFont<'static>) -> Result<Vec<u8>> {
    let mut canvas = MonoBitmap::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, BinaryColor::On);

    let text = format!("{}\n{}", PLACEHOLDER_TEXT, timestamp_text);
    let block_height = 2 * font.character_size.height as i32;
    let origin = Point::new(
        PLACEHOLDER_WIDTH as i32 / 2,
        (PLACEHOLDER_HEIGHT as i32 - block_height) / 2,
    );
    let layout = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();

    Text::with_text_style(&text, origin, MonoTextStyle::new(font, BinaryColor::Off), layout)
        .draw(&mut canvas)?;

    bmp::encode_mono(&canvas)
}
