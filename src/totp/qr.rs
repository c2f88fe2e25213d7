//! QR rendering for provisioning URIs.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

/// Pixels per QR module.
const MODULE_PIXELS: u32 = 10;

/// Render a provisioning URI as a PNG image.
///
/// Encoding uses error-correction level H with a 4-module quiet zone so the
/// image survives small screens and rough camera angles. Pure function:
/// identical input yields identical bytes.
///
/// # Errors
/// Returns an error if the input exceeds QR capacity or PNG encoding fails.
pub fn encode_png(uri: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(uri.as_bytes(), EcLevel::H)
        .context("failed to build QR code")?;

    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode QR PNG")?;
    Ok(png)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    #[test]
    fn encodes_valid_png() {
        let png = encode_png("otpauth://totp/Enrolla:alice%40example.com?secret=ABC").unwrap();
        assert!(png.len() > PNG_MAGIC.len());
        assert_eq!(&png[..PNG_MAGIC.len()], PNG_MAGIC);
    }

    #[test]
    fn encoding_is_deterministic() {
        let uri = "otpauth://totp/Enrolla:bob%40example.com?secret=JBSWY3DPEHPK3PXP&issuer=Enrolla";
        assert_eq!(encode_png(uri).unwrap(), encode_png(uri).unwrap());
    }

    #[test]
    fn distinct_uris_yield_distinct_images() {
        let a = encode_png("otpauth://totp/a?secret=AAAA").unwrap();
        let b = encode_png("otpauth://totp/b?secret=BBBB").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_payload_rejected() {
        let uri = "x".repeat(8 * 1024);
        assert!(encode_png(&uri).is_err());
    }
}
