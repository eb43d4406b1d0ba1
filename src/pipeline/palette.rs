//! Pixel histogram palette: the code-level fallback when no model is used.
//!
//! Samples every tenth pixel on both axes, ignores near-white background and
//! ranks the remaining 24-bit colors by frequency. This is a heuristic, not
//! colour science: a photo-heavy landing page yields skin tones, a flat
//! design yields its brand colors. It must never fail the caller, so decode
//! errors produce [`DEFAULT_PALETTE`].

use image::GenericImageView;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Sampling stride on both axes.
pub const SAMPLE_STRIDE: u32 = 10;

/// Maximum number of colors returned.
pub const MAX_COLORS: usize = 6;

/// Channels strictly above this are considered background.
const NEAR_WHITE: u8 = 240;

/// Returned when the image cannot be decoded.
pub const DEFAULT_PALETTE: [&str; 6] = [
    "#E41F35", "#000000", "#FFFFFF", "#F5F5F5", "#666666", "#333333",
];

/// Dominant colors of an encoded image, most frequent first.
///
/// Ties are broken by ascending color value so the output is deterministic.
/// An image that is entirely near-white yields an empty list.
pub fn extract(image_bytes: &[u8]) -> Vec<String> {
    try_extract(image_bytes).unwrap_or_else(|e| {
        warn!("Palette: could not decode image ({e}); using default palette");
        DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
    })
}

/// Like [`extract`], but reports decode failures instead of masking them.
pub fn try_extract(image_bytes: &[u8]) -> Result<Vec<String>, image::ImageError> {
    let img = image::load_from_memory(image_bytes)?;

    let (width, height) = img.dimensions();
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for y in (0..height).step_by(SAMPLE_STRIDE as usize) {
        for x in (0..width).step_by(SAMPLE_STRIDE as usize) {
            let [r, g, b, _] = img.get_pixel(x, y).0;
            if is_near_white(r, g, b) {
                continue;
            }
            let rgb = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
            *counts.entry(rgb).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(u32, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let colors: Vec<String> = ranked
        .into_iter()
        .take(MAX_COLORS)
        .map(|(rgb, _)| format!("#{rgb:06X}"))
        .collect();
    debug!(
        "Palette: {}x{} image → {} dominant color(s) {:?}",
        width,
        height,
        colors.len(),
        colors
    );
    Ok(colors)
}

fn is_near_white(r: u8, g: u8, b: u8) -> bool {
    r > NEAR_WHITE && g > NEAR_WHITE && b > NEAR_WHITE
}
