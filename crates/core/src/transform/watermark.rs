//! Bottom-right text watermark rendered with an 8x8 bitmap font.

use font8x8::legacy::BASIC_LEGACY;
use image::{Rgb, RgbImage};

/// Inset from the right and bottom edges.
pub const MARGIN: u32 = 10;

/// Font size as a fraction of the image width.
const FONT_SIZE_RATIO: f64 = 0.05;

const GLYPH_SIZE: u32 = 8;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Where and how large the watermark text is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkLayout {
    /// Left edge of the text.
    pub x: u32,
    /// Top edge of the text.
    pub y: u32,
    /// Pixels per font cell.
    pub scale: u32,
    /// Characters actually drawn.
    pub text: String,
}

impl WatermarkLayout {
    pub fn width(&self) -> u32 {
        char_count(&self.text)
            .saturating_mul(GLYPH_SIZE)
            .saturating_mul(self.scale)
    }

    pub fn height(&self) -> u32 {
        GLYPH_SIZE * self.scale
    }
}

fn char_count(text: &str) -> u32 {
    u32::try_from(text.chars().count()).unwrap_or(u32::MAX)
}

/// Compute the text placement for a `width` x `height` canvas.
///
/// Returns `None` when not even one glyph fits inside the margins.
pub fn layout_watermark(width: u32, height: u32, text: &str) -> Option<WatermarkLayout> {
    let printable: String = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    if printable.is_empty() {
        return None;
    }

    let avail_w = width.checked_sub(MARGIN)?;
    let avail_h = height.checked_sub(MARGIN)?;
    let chars = char_count(&printable);

    // Largest scale up to the preferred one that fits both axes, at least 1.
    let preferred = ((f64::from(width) * FONT_SIZE_RATIO) / f64::from(GLYPH_SIZE)).round() as u32;
    let scale = preferred
        .min(avail_h / GLYPH_SIZE)
        .min(avail_w / chars.saturating_mul(GLYPH_SIZE))
        .max(1);

    if GLYPH_SIZE * scale > avail_h {
        return None;
    }

    let fitting = (avail_w / (GLYPH_SIZE * scale)).min(chars);
    if fitting == 0 {
        return None;
    }
    let text: String = printable.chars().take(fitting as usize).collect();

    let layout = WatermarkLayout {
        x: 0,
        y: 0,
        scale,
        text,
    };
    Some(WatermarkLayout {
        x: width - MARGIN - layout.width(),
        y: height - MARGIN - layout.height(),
        ..layout
    })
}

/// Draw `text` onto `img` in white at the bottom-right corner.
pub fn apply_watermark(img: &mut RgbImage, text: &str) -> Option<WatermarkLayout> {
    let layout = layout_watermark(img.width(), img.height(), text)?;
    let cell = layout.scale;

    for (i, c) in layout.text.chars().enumerate() {
        let glyph = BASIC_LEGACY[c as usize];
        let origin_x = layout.x + i as u32 * GLYPH_SIZE * cell;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (*bits >> col) & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * cell;
                let py = layout.y + row as u32 * cell;
                for dy in 0..cell {
                    for dx in 0..cell {
                        img.put_pixel(px + dx, py + dy, WHITE);
                    }
                }
            }
        }
    }

    Some(layout)
}
