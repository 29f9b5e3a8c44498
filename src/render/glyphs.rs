//! Footer glyphs drawn from `embedded-graphics` primitives.
//!
//! Every glyph fits a 24 x 24 box anchored at its top-left corner.

use embedded_graphics::geometry::Angle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Arc, Circle, PrimitiveStyle, Rectangle, Triangle};

use crate::error::{Result, ServerError};

/// Edge length of the glyph box
pub const GLYPH_SIZE: u32 = 24;

/// Battery fill levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryGlyph {
    Full,
    ThreeQuarters,
    Half,
    Quarter,
    Empty,
}

impl BatteryGlyph {
    /// Pick the glyph for a charge percentage (fraction truncated).
    pub fn for_percent(percent: f64) -> Self {
        let percent = percent.trunc();
        if percent > 80.0 {
            BatteryGlyph::Full
        } else if percent > 60.0 {
            BatteryGlyph::ThreeQuarters
        } else if percent > 40.0 {
            BatteryGlyph::Half
        } else if percent > 20.0 {
            BatteryGlyph::Quarter
        } else {
            BatteryGlyph::Empty
        }
    }

    /// Filled quarters of the battery body
    pub fn quarters(self) -> u32 {
        match self {
            BatteryGlyph::Full => 4,
            BatteryGlyph::ThreeQuarters => 3,
            BatteryGlyph::Half => 2,
            BatteryGlyph::Quarter => 1,
            BatteryGlyph::Empty => 0,
        }
    }
}

/// Three concentric arcs over a dot
pub fn draw_wifi<D>(target: &mut D, origin: Point, color: BinaryColor) -> Result<()>
where
    D: DrawTarget<Color = BinaryColor, Error = ServerError>,
{
    let center = origin + Point::new(12, 19);
    let stroke = PrimitiveStyle::with_stroke(color, 2);

    for diameter in [10u32, 20, 30] {
        Arc::with_center(center, diameter, Angle::from_degrees(-135.0), Angle::from_degrees(90.0))
            .into_styled(stroke)
            .draw(target)?;
    }
    Circle::with_center(center, 5)
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(target)?;
    Ok(())
}

/// Battery outline with terminal and `glyph.quarters()` filled quarters
pub fn draw_battery<D>(target: &mut D, origin: Point, glyph: BatteryGlyph, color: BinaryColor) -> Result<()>
where
    D: DrawTarget<Color = BinaryColor, Error = ServerError>,
{
    let body = Rectangle::new(origin + Point::new(0, 6), Size::new(21, 12));
    body.into_styled(PrimitiveStyle::with_stroke(color, 2))
        .draw(target)?;
    Rectangle::new(origin + Point::new(21, 9), Size::new(3, 6))
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(target)?;

    let fill_width = 4 * glyph.quarters();
    if fill_width > 0 {
        Rectangle::new(origin + Point::new(3, 9), Size::new(fill_width, 6))
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(target)?;
    }
    Ok(())
}

/// Lightning bolt marking external power
pub fn draw_plug<D>(target: &mut D, origin: Point, color: BinaryColor) -> Result<()>
where
    D: DrawTarget<Color = BinaryColor, Error = ServerError>,
{
    let fill = PrimitiveStyle::with_fill(color);
    Triangle::new(
        origin + Point::new(9, 0),
        origin + Point::new(2, 13),
        origin + Point::new(9, 13),
    )
    .into_styled(fill)
    .draw(target)?;
    Triangle::new(
        origin + Point::new(7, 11),
        origin + Point::new(14, 11),
        origin + Point::new(7, 24),
    )
    .into_styled(fill)
    .draw(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::bitmap::MonoBitmap;

    fn black_pixels(bitmap: &MonoBitmap) -> usize {
        (0..bitmap.height())
            .map(|y| bitmap.row(y).iter().filter(|white| !**white).count())
            .sum()
    }

    #[test]
    fn test_battery_ladder() {
        assert_eq!(BatteryGlyph::for_percent(100.0), BatteryGlyph::Full);
        assert_eq!(BatteryGlyph::for_percent(81.0), BatteryGlyph::Full);
        assert_eq!(BatteryGlyph::for_percent(80.9), BatteryGlyph::ThreeQuarters);
        assert_eq!(BatteryGlyph::for_percent(61.0), BatteryGlyph::ThreeQuarters);
        assert_eq!(BatteryGlyph::for_percent(60.0), BatteryGlyph::Half);
        assert_eq!(BatteryGlyph::for_percent(41.0), BatteryGlyph::Half);
        assert_eq!(BatteryGlyph::for_percent(40.5), BatteryGlyph::Quarter);
        assert_eq!(BatteryGlyph::for_percent(21.0), BatteryGlyph::Quarter);
        assert_eq!(BatteryGlyph::for_percent(20.0), BatteryGlyph::Empty);
        assert_eq!(BatteryGlyph::for_percent(0.0), BatteryGlyph::Empty);
    }

    #[test]
    fn test_fuller_battery_draws_more_pixels() {
        let mut previous = 0;
        for glyph in [
            BatteryGlyph::Empty,
            BatteryGlyph::Quarter,
            BatteryGlyph::Half,
            BatteryGlyph::ThreeQuarters,
            BatteryGlyph::Full,
        ] {
            let mut canvas = MonoBitmap::new(GLYPH_SIZE, GLYPH_SIZE, BinaryColor::On);
            draw_battery(&mut canvas, Point::zero(), glyph, BinaryColor::Off).unwrap();
            let count = black_pixels(&canvas);
            assert!(count > previous, "{:?} drew {} pixels", glyph, count);
            previous = count;
        }
    }

    #[test]
    fn test_wifi_stays_within_glyph_columns() {
        let mut canvas = MonoBitmap::new(GLYPH_SIZE * 3, GLYPH_SIZE * 3, BinaryColor::On);
        draw_wifi(&mut canvas, Point::new(GLYPH_SIZE as i32, GLYPH_SIZE as i32), BinaryColor::Off).unwrap();

        assert!(black_pixels(&canvas) > 0);
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                if canvas.pixel(x, y) == Some(BinaryColor::Off) {
                    assert!((GLYPH_SIZE..=GLYPH_SIZE * 2).contains(&x), "stray pixel at {},{}", x, y);
                }
            }
        }
    }

    #[test]
    fn test_plug_stays_in_box() {
        let mut canvas = MonoBitmap::new(GLYPH_SIZE * 2, GLYPH_SIZE * 2, BinaryColor::On);
        let origin = Point::new(GLYPH_SIZE as i32 / 2, GLYPH_SIZE as i32 / 2);
        draw_plug(&mut canvas, origin, BinaryColor::Off).unwrap();

        assert!(black_pixels(&canvas) > 0);
        let lo = GLYPH_SIZE / 2;
        let hi = lo + GLYPH_SIZE;
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                if canvas.pixel(x, y) == Some(BinaryColor::Off) {
                    assert!((lo..=hi).contains(&x) && (lo..=hi).contains(&y), "stray pixel at {},{}", x, y);
                }
            }
        }
    }
}
