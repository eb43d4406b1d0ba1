//! Image encoding: `DynamicImage` → lossless PNG → base64.
//!
//! Model endpoints accept images as base64 strings embedded in the JSON
//! request body. PNG is used because it is lossless: field labels, asterisks
//! and checkbox outlines must survive intact for the model to read the form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Base64 of already-encoded bytes.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
