//! Raw pixel buffer to canonical luma image conversion.

use crate::image::LumaImage;

/// Errors produced while building a [`LumaImage`] from a raw buffer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unsupported number of channels: {channels}")]
    UnsupportedChannelCount { channels: usize },

    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },

    #[error("pixel buffer too small (expected {expected} bytes, got {got})")]
    BufferTooSmall { expected: usize, got: usize },
}

/// Luma of one RGB pixel: `truncate(0.299 R + 0.587 G + 0.114 B)`.
///
/// The sum is evaluated left to right in `f64` and truncated toward zero.
/// Sums that round onto an integer keep that integer, so white gives 255.
#[inline]
pub fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

/// Build the canonical luma image from a tightly packed buffer.
///
/// `channels == 1` copies rows verbatim, `channels == 3` treats the buffer as
/// interleaved RGB. Any other channel count is rejected before allocating.
pub fn convert_to_luma(
    buffer: &[u8],
    width: usize,
    height: usize,
    channels: usize,
) -> Result<LumaImage, ConvertError> {
    if channels != 1 && channels != 3 {
        return Err(ConvertError::UnsupportedChannelCount { channels });
    }
    if width == 0 || height == 0 {
        return Err(ConvertError::InvalidDimensions { width, height });
    }
    let Some(expected) = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
    else {
        return Err(ConvertError::InvalidDimensions { width, height });
    };
    if buffer.len() < expected {
        return Err(ConvertError::BufferTooSmall {
            expected,
            got: buffer.len(),
        });
    }

    let mut img = LumaImage::new(width, height);
    let src_row_len = width * channels;
    for (y, src) in buffer[..expected].chunks_exact(src_row_len).enumerate() {
        let dst = img.row_mut(y);
        if channels == 1 {
            dst.copy_from_slice(src);
        } else {
            for (out, px) in dst.iter_mut().zip(src.chunks_exact(3)) {
                *out = rgb_to_luma(px[0], px[1], px[2]);
            }
        }
    }
    Ok(img)
}
