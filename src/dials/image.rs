//! Image processing for the dial e-paper panel
//!
//! Each dial carries a 200x144 monochrome panel. The hub expects a 3600-byte
//! frame packed column by column: 18 bytes per column, each byte holding 8
//! vertically stacked pixels with the most significant bit at the top.
//!
//! This module handles:
//! - JPEG, PNG, GIF, BMP decoding (via the `image` crate)
//! - Aspect-preserving scaling with a white letterbox
//! - Thresholded packing into the panel frame
//! - Splitting a frame into hub-sized transfer chunks

use image::{imageops::FilterType, DynamicImage, GrayImage, Rgba, RgbaImage};
use thiserror::Error;

pub const PANEL_WIDTH: u32 = 200;
pub const PANEL_HEIGHT: u32 = 144;
/// Bytes per packed column (144 pixels / 8)
pub const COLUMN_BYTES: usize = (PANEL_HEIGHT / 8) as usize;
pub const FRAME_LEN: usize = PANEL_WIDTH as usize * COLUMN_BYTES;
/// Largest image data payload the hub accepts in one command
pub const MAX_CHUNK_LEN: usize = 1000;
pub const DEFAULT_THRESHOLD: u8 = 127;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("frame must be {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },

    #[error("image must be 200x144, got {width}x{height}")]
    WrongDimensions { width: u32, height: u32 },

    #[error("chunk size {len} outside 1..={max}")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Check that `data` is a complete panel frame.
pub fn validate_frame(data: &[u8]) -> Result<(), ImageError> {
    if data.len() != FRAME_LEN {
        return Err(ImageError::WrongSize {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Split a validated frame into transfer chunks of at most `chunk_len` bytes.
pub fn chunk_frame(data: &[u8], chunk_len: usize) -> Result<Vec<&[u8]>, ImageError> {
    validate_frame(data)?;
    if chunk_len == 0 || chunk_len > MAX_CHUNK_LEN {
        return Err(ImageError::ChunkTooLarge {
            len: chunk_len,
            max: MAX_CHUNK_LEN,
        });
    }
    Ok(data.chunks(chunk_len).collect())
}

/// Pack a panel-sized grayscale image.
///
/// A pixel is drawn when its ink intensity (`255 - gray`) exceeds
/// `threshold`, so white packs to `0x00` and black to `0xFF`.
pub fn pack_grayscale(gray: &GrayImage, threshold: u8) -> Result<Vec<u8>, ImageError> {
    let (width, height) = gray.dimensions();
    if width != PANEL_WIDTH || height != PANEL_HEIGHT {
        return Err(ImageError::WrongDimensions { width, height });
    }

    let mut frame = Vec::with_capacity(FRAME_LEN);
    for x in 0..PANEL_WIDTH {
        for band in 0..COLUMN_BYTES as u32 {
            let mut byte = 0u8;
            for bit in 0..8u32 {
                let ink = 255 - gray.get_pixel(x, band * 8 + bit)[0];
                if ink > threshold {
                    byte |= 0x80 >> bit;
                }
            }
            frame.push(byte);
        }
    }
    Ok(frame)
}

/// Scale `img` to fit the panel, preserving aspect ratio, centered on white.
///
/// Transparent areas are composited onto white as well.
pub fn fit_to_panel(img: &DynamicImage) -> GrayImage {
    let scaled = if img.width() == PANEL_WIDTH && img.height() == PANEL_HEIGHT {
        img.to_rgba8()
    } else {
        img.resize(PANEL_WIDTH, PANEL_HEIGHT, FilterType::Triangle).to_rgba8()
    };

    let mut canvas = RgbaImage::from_pixel(PANEL_WIDTH, PANEL_HEIGHT, Rgba([255, 255, 255, 255]));
    let x = i64::from((PANEL_WIDTH - scaled.width()) / 2);
    let y = i64::from((PANEL_HEIGHT - scaled.height()) / 2);
    image::imageops::overlay(&mut canvas, &scaled, x, y);

    DynamicImage::ImageRgba8(canvas).to_luma8()
}

/// Convert a decoded image into a panel frame.
pub fn image_to_frame(img: &DynamicImage, threshold: u8) -> Result<Vec<u8>, ImageError> {
    pack_grayscale(&fit_to_panel(img), threshold)
}

/// Decode an encoded image (format auto-detected) into a panel frame.
pub fn image_bytes_to_frame(image_data: &[u8], threshold: u8) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(image_data)?;
    image_to_frame(&img, threshold)
}
