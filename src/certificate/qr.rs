/// QR images for verification links
use crate::error::{CertError, CertResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// Smallest edge of the rendered image, in pixels
const MIN_EDGE_PX: u32 = 400;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Render `data` as a PNG QR code inside a `data:` URL, ready for an `<img>` tag
pub fn render_data_url(data: &str) -> CertResult<String> {
    // High error correction so printed certificates survive wear
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| CertError::Internal(format!("QR encoding failed: {}", e)))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_EDGE_PX, MIN_EDGE_PX)
        .build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| CertError::Internal(format!("QR image encoding failed: {}", e)))?;

    Ok(format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(png)))
}
