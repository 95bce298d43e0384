//! Packed color to planar I420

use crate::capture::frame::PixelBuffer;

/// Planar 4:2:0 frame; chroma planes are half size in both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub stride_y: usize,
    /// Chroma stride: width rounded up to even, halved
    pub stride_uv: usize,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl I420Frame {
    pub fn chroma_stride(width: u32) -> usize {
        (width as usize + 1) / 2
    }

    pub fn chroma_height(height: u32) -> usize {
        (height as usize + 1) / 2
    }

    pub fn buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize
            + 2 * Self::chroma_stride(width) * Self::chroma_height(height)
    }

    /// Planes laid out back to back: Y, then U, then V
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.y.len() + self.u.len() + self.v.len());
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&self.u);
        out.extend_from_slice(&self.v);
        out
    }
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8
}

/// (r, g, b) of the pixel at (x, y)
#[inline]
fn rgb(src: &PixelBuffer, x: u32, y: u32) -> (i32, i32, i32) {
    let o = y as usize * src.stride + x as usize * 4;
    (
        src.data[o + 2] as i32,
        src.data[o + 1] as i32,
        src.data[o] as i32,
    )
}

/// Convert packed 32-bit color to I420, chroma from 2x2 averages
pub fn argb_to_i420(src: &PixelBuffer) -> I420Frame {
    let width = src.width;
    let height = src.height;
    let stride_y = width as usize;
    let stride_uv = I420Frame::chroma_stride(width);
    let chroma_rows = I420Frame::chroma_height(height);

    let mut y_plane = vec![0u8; stride_y * height as usize];
    let mut u_plane = vec![0u8; stride_uv * chroma_rows];
    let mut v_plane = vec![0u8; stride_uv * chroma_rows];

    for y in 0..height {
        let row = &mut y_plane[y as usize * stride_y..(y as usize + 1) * stride_y];
        for x in 0..width {
            let (r, g, b) = rgb(src, x, y);
            row[x as usize] = luma(r, g, b);
        }
    }

    for cy in 0..chroma_rows {
        for cx in 0..stride_uv {
            let x0 = cx as u32 * 2;
            let y0 = cy as u32 * 2;
            let (mut r, mut g, mut b, mut n) = (0, 0, 0, 0);
            for y in y0..(y0 + 2).min(height) {
                for x in x0..(x0 + 2).min(width) {
                    let (pr, pg, pb) = rgb(src, x, y);
                    r += pr;
                    g += pg;
                    b += pb;
                    n += 1;
                }
            }
            if n == 0 {
                continue;
            }
            let (r, g, b) = ((r + n / 2) / n, (g + n / 2) / n, (b + n / 2) / n);
            u_plane[cy * stride_uv + cx] = chroma_u(r, g, b);
            v_plane[cy * stride_uv + cx] = chroma_v(r, g, b);
        }
    }

    I420Frame {
        width,
        height,
        stride_y,
        stride_uv,
        y: y_plane,
        u: u_plane,
        v: v_plane,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_levels() {
        let white = argb_to_i420(&PixelBuffer::filled(4, 4, 0xFFFF_FFFF));
        assert!(white.y.iter().all(|&v| v == 235));
        assert!(white.u.iter().all(|&v| v == 128));
        assert!(white.v.iter().all(|&v| v == 128));

        let black = argb_to_i420(&PixelBuffer::filled(4, 4, 0xFF00_0000));
        assert!(black.y.iter().all(|&v| v == 16));
        assert!(black.u.iter().all(|&v| v == 128));
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        let frame = argb_to_i420(&PixelBuffer::filled(5, 3, 0xFF00_00FF));
        assert_eq!(frame.stride_uv, 3);
        assert_eq!(frame.u.len(), 3 * 2);
        assert_eq!(frame.y.len(), 15);
        // pure blue: Y=41 U=240 V=110
        assert!(frame.y.iter().all(|&v| (v as i32 - 41).abs() <= 1));
        assert!(frame.u.iter().all(|&v| (v as i32 - 240).abs() <= 1));
        assert!(frame.v.iter().all(|&v| (v as i32 - 110).abs() <= 1));
    }

    #[test]
    fn to_bytes_concatenates_planes() {
        let frame = argb_to_i420(&PixelBuffer::filled(2, 2, 0xFFFF_FFFF));
        assert_eq!(frame.to_bytes(), vec![235, 235, 235, 235, 128, 128]);
    }
}
