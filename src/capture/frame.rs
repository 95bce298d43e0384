//! Captured pixel buffer
//!
//! Packed 32-bit color, stored B, G, R, A in memory (little-endian ARGB).

use std::fmt;

/// Bytes per packed pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Packed color value `0xAARRGGBB`
pub type Argb = u32;

/// Raw packed-color buffer produced by a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bytes per row (>= width * 4)
    pub stride: usize,

    /// Raw pixel data, `stride * height` bytes
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a buffer with a tight stride, every pixel set to `color`
    pub fn filled(width: u32, height: u32, color: Argb) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        let pixel = color.to_le_bytes();
        let mut data = Vec::with_capacity(stride * height as usize);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&pixel);
        }
        Self { width, height, stride, data }
    }

    /// Wrap existing data; `None` if the data is too short for the geometry
    pub fn from_raw(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Option<Self> {
        if stride < width as usize * BYTES_PER_PIXEL {
            return None;
        }
        if data.len() < stride * height as usize {
            return None;
        }
        Some(Self { width, height, stride, data })
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * BYTES_PER_PIXEL
    }

    /// Pixel at (x, y) as `0xAARRGGBB`
    pub fn pixel(&self, x: u32, y: u32) -> Argb {
        let o = self.offset(x, y);
        u32::from_le_bytes([
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Argb) {
        let o = self.offset(x, y);
        self.data[o..o + BYTES_PER_PIXEL].copy_from_slice(&color.to_le_bytes());
    }

    /// Row `y` without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let o = self.offset(0, y);
        &self.data[o..o + self.width as usize * BYTES_PER_PIXEL]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let o = self.offset(0, y);
        let len = self.width as usize * BYTES_PER_PIXEL;
        &mut self.data[o..o + len]
    }
}

impl fmt::Display for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelBuffer({}x{}, stride={}, {} bytes)",
            self.width,
            self.height,
            self.stride,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_layout_is_bgra() {
        let buf = PixelBuffer::filled(2, 1, 0xFF11_2233);
        assert_eq!(&buf.data[..4], &[0x33, 0x22, 0x11, 0xFF]);
        assert_eq!(buf.pixel(1, 0), 0xFF11_2233);
    }

    #[test]
    fn from_raw_rejects_short_data() {
        assert!(PixelBuffer::from_raw(4, 4, 16, vec![0; 63]).is_none());
        assert!(PixelBuffer::from_raw(4, 4, 12, vec![0; 64]).is_none());
        assert!(PixelBuffer::from_raw(4, 4, 20, vec![0; 80]).is_some());
    }
}
