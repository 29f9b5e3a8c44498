//! # Footer Composition
//!
//! Replaces the bottom strip of a source image with a status footer.
//!
//! ## Footer layout
//!
//! `h` is the height left after cropping, `w` the image width.
//!
//! ```text
//! x:   18        50          104          140                 w-155
//!      [wifi]    "NN %"      [battery]    "NN %"     ...      "DD.MM.YYYY HH:MM"
//! y:   h+4       h+7         h+4          h+7                 h+7
//! ```
//!
//! White background: a 2 px rule at `h+1`. Black background: two white
//! rounded panels carry the left and right groups. Text and glyphs are
//! always black.

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle, RoundedRectangle};
use embedded_graphics::text::{Baseline, Text};

use super::bitmap::MonoBitmap;
use super::bmp;
use super::glyphs::{self, BatteryGlyph};
use crate::error::Result;
use crate::settings::FooterBackground;
use crate::telemetry::BatteryLevel;

/// Height of the footer band in pixels
pub const FOOTER_HEIGHT: u32 = 35;

const PANEL_RADIUS: u32 = 5;
const LEFT_PANEL_WIDTH: i32 = 142;
const LEFT_PANEL_WIDTH_CHARGING: i32 = 100;

const WIFI_ICON: (i32, i32) = (18, 4);
const WIFI_TEXT: (i32, i32) = (50, 7);
const BATTERY_ICON: (i32, i32) = (104, 4);
const BATTERY_TEXT: (i32, i32) = (140, 7);
const PLUG_OFFSET: i32 = 10;
const DATE_FROM_RIGHT: i32 = 155;

/// Footer appearance
#[derive(Debug, Clone, Copy)]
pub struct FooterStyle {
    pub background: FooterBackground,
    pub font: &'static MonoFont<'static>,
}

impl FooterStyle {
    pub fn new(background: FooterBackground, font: &'static MonoFont<'static>) -> Self {
        Self { background, font }
    }

    fn band_color(&self) -> BinaryColor {
        match self.background {
            FooterBackground::White => BinaryColor::On,
            FooterBackground::Black => BinaryColor::Off,
        }
    }
}

/// Decode `source`, add the status footer and encode as 1-bpp BMP with the
/// black/white colour table.
///
/// # Arguments
///
/// * `source` - Encoded source image (BMP, PNG)
/// * `wifi_percent` - WiFi quality, 0 - 100
/// * `battery` - Battery level; `Charging` draws a plug and no percentage
/// * `timestamp_text` - Date text, already formatted in the display time zone
/// * `style` - Background polarity and font
///
/// # Errors
///
/// Returns an error if the source cannot be decoded.
pub fn compose(
    source: &[u8],
    wifi_percent: u8,
    battery: BatteryLevel,
    timestamp_text: &str,
    style: &FooterStyle,
) -> Result<Vec<u8>> {
    let decoded = MonoBitmap::decode(source)?;
    let mut canvas = decoded.replace_bottom(FOOTER_HEIGHT, style.band_color());
    draw_footer(&mut canvas, wifi_percent, battery, timestamp_text, style)?;
    bmp::encode_mono(&canvas)
}

/// Draw the footer into the bottom [`FOOTER_HEIGHT`] rows of `canvas`.
pub fn draw_footer(
    canvas: &mut MonoBitmap,
    wifi_percent: u8,
    battery: BatteryLevel,
    timestamp_text: &str,
    style: &FooterStyle,
) -> Result<()> {
    let width = canvas.width() as i32;
    let top = canvas.height().saturating_sub(FOOTER_HEIGHT) as i32;
    let ink = BinaryColor::Off;
    let date_x = width - DATE_FROM_RIGHT;

    match style.background {
        FooterBackground::White => {
            Rectangle::new(Point::new(0, top), Size::new(canvas.width(), 2))
                .into_styled(PrimitiveStyle::with_fill(ink))
                .draw(canvas)?;
        }
        FooterBackground::Black => {
            let left_width = if battery.is_charging() {
                LEFT_PANEL_WIDTH_CHARGING
            } else {
                LEFT_PANEL_WIDTH
            };
            let panel_bottom = top + FOOTER_HEIGHT as i32 + 5;
            let panels = [
                Rectangle::with_corners(
                    Point::new(-10, top + 3),
                    Point::new(WIFI_TEXT.0 + left_width, panel_bottom),
                ),
                Rectangle::with_corners(Point::new(date_x - 8, top + 3), Point::new(width + 10, panel_bottom)),
            ];
            for panel in panels {
                RoundedRectangle::with_equal_corners(panel, Size::new(PANEL_RADIUS, PANEL_RADIUS))
                    .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                    .draw(canvas)?;
            }
        }
    }

    let text_style = MonoTextStyle::new(style.font, ink);
    let at = |(x, y): (i32, i32)| Point::new(x, top + y);

    glyphs::draw_wifi(canvas, at(WIFI_ICON), ink)?;
    Text::with_baseline(&format!("{} %", wifi_percent), at(WIFI_TEXT), text_style, Baseline::Top)
        .draw(canvas)?;

    match battery {
        BatteryLevel::Charging => {
            glyphs::draw_battery(canvas, at(BATTERY_ICON), BatteryGlyph::Empty, ink)?;
            glyphs::draw_plug(canvas, at((BATTERY_ICON.0 + PLUG_OFFSET, BATTERY_ICON.1)), ink)?;
        }
        BatteryLevel::Percent(percent) => {
            glyphs::draw_battery(canvas, at(BATTERY_ICON), BatteryGlyph::for_percent(percent), ink)?;
            Text::with_baseline(
                &format!("{} %", percent.round() as i64),
                at(BATTERY_TEXT),
                text_style,
                Baseline::Top,
            )
            .draw(canvas)?;
        }
    }

    Text::with_baseline(timestamp_text, Point::new(date_x, top + 7), text_style, Baseline::Top)
        .draw(canvas)?;
    Ok(())
}
