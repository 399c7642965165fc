//! Tray icon bitmaps
//!
//! The icon is a white square with a solid coloured block in the middle. The
//! colour encodes state: blue while updating, black with no device, and a
//! red-to-green ramp for the battery level.

use std::fmt;

use image::{Rgba, RgbaImage};

/// Edge length of the generated bitmap
pub const ICON_SIZE: u32 = 64;

/// Inclusive bounds of the coloured block
const BLOCK_START: u32 = 16;
const BLOCK_END: u32 = 48;

/// Solid colour of the icon's block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl IconColor {
    /// Shown while the device list is being refreshed
    pub const UPDATING: IconColor = IconColor::rgb(0, 0, 255);
    /// Shown while no device is selected
    pub const NO_DEVICE: IconColor = IconColor::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }
}

impl fmt::Display for IconColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Map a battery level onto the red (0%) to green (100%) ramp.
/// Levels outside 0..=100 are clamped first.
pub fn battery_color(level: f64) -> IconColor {
    let normalized = (level / 100.0).clamp(0.0, 1.0);
    let red = (255.0 * (1.0 - normalized)) as u8;
    let green = (255.0 * normalized) as u8;
    IconColor::rgb(red, green, 0)
}

/// Render the tray bitmap for a colour
pub fn render_icon(color: IconColor) -> RgbaImage {
    let white = Rgba([255, 255, 255, 255]);
    let fill = color.to_rgba();
    let block = BLOCK_START..=BLOCK_END;

    RgbaImage::from_fn(ICON_SIZE, ICON_SIZE, |x, y| {
        if block.contains(&x) && block.contains(&y) {
            fill
        } else {
            white
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(battery_color(0.0), IconColor::rgb(255, 0, 0));
        assert_eq!(battery_color(100.0), IconColor::rgb(0, 255, 0));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(battery_color(-20.0), battery_color(0.0));
        assert_eq!(battery_color(180.0), battery_color(100.0));
    }

    #[test]
    fn test_monotonic_and_continuous() {
        let mut previous = battery_color(0.0);
        for level in 1..=100 {
            let current = battery_color(level as f64);
            assert!(current.g >= previous.g, "green must not decrease at {}", level);
            assert!(current.r <= previous.r, "red must not increase at {}", level);
            assert!(current.g - previous.g <= 3, "green jumps at {}", level);
            assert!(previous.r - current.r <= 3, "red jumps at {}", level);
            assert_eq!(current.b, 0);
            previous = current;
        }
    }

    #[test]
    fn test_hex_display() {
        assert_eq!(battery_color(50.0).to_string(), "#7f7f00");
        assert_eq!(IconColor::UPDATING.to_string(), "#0000ff");
    }

    #[test]
    fn test_render_icon_layout() {
        let image = render_icon(IconColor::UPDATING);
        assert_eq!(image.dimensions(), (ICON_SIZE, ICON_SIZE));
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(image.get_pixel(16, 16), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(48, 48), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(49, 32), &Rgba([255, 255, 255, 255]));
    }
}
