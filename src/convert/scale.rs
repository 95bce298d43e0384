//! Bilinear scaling of packed 32-bit color

use crate::capture::frame::{PixelBuffer, BYTES_PER_PIXEL};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

/// Tightly packed copy of `src`; the filter is per channel, so BGRA bytes
/// go through the RGBA pixel type unchanged
fn to_image(src: &PixelBuffer) -> Option<ImageBuffer<Rgba<u8>, Vec<u8>>> {
    let row_len = src.width as usize * BYTES_PER_PIXEL;
    let mut packed = Vec::with_capacity(row_len * src.height as usize);
    for y in 0..src.height {
        packed.extend_from_slice(&src.row(y)[..row_len]);
    }
    ImageBuffer::from_raw(src.width, src.height, packed)
}

/// Scale to `width` x `height` with a triangle (bilinear) filter
pub fn scale_argb(src: &PixelBuffer, width: u32, height: u32) -> PixelBuffer {
    if src.width == 0 || src.height == 0 || width == 0 || height == 0 {
        return PixelBuffer::filled(width, height, 0);
    }
    let Some(image) = to_image(src) else {
        return PixelBuffer::filled(width, height, 0);
    };

    let scaled = imageops::resize(&image, width, height, FilterType::Triangle);
    PixelBuffer {
        width,
        height,
        stride: width as usize * BYTES_PER_PIXEL,
        data: scaled.into_raw(),
    }
}
