//! Frame conversion
//!
//! Box-filtered scaling of packed 32-bit color followed by conversion to
//! planar I420 (BT.601, studio range).

pub mod scale;
pub mod yuv;

pub use scale::scale_argb;
pub use yuv::{argb_to_i420, I420Frame};

use crate::capture::frame::PixelBuffer;

/// Stateless scale + color conversion to the negotiated output size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConverter {
    pub output_width: u32,
    pub output_height: u32,
}

impl FrameConverter {
    pub fn new(output_width: u32, output_height: u32) -> Self {
        Self {
            output_width,
            output_height,
        }
    }

    /// Scale `src` to the output size (skipped when already matching) and
    /// convert to I420
    pub fn convert(&self, src: &PixelBuffer) -> I420Frame {
        if src.width == self.output_width && src.height == self.output_height {
            argb_to_i420(src)
        } else {
            let scaled = scale_argb(src, self.output_width, self.output_height);
            argb_to_i420(&scaled)
        }
    }

    /// Size in bytes of one converted frame
    pub fn frame_size(&self) -> usize {
        I420Frame::buffer_size(self.output_width, self.output_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_color_survives_scale_and_convert() {
        // pure red, BT.601 studio range: Y=82 U=90 V=240
        let src = PixelBuffer::filled(64, 48, 0xFFFF_0000);
        let frame = FrameConverter::new(20, 10).convert(&src);
        assert_eq!(frame.width, 20);
        assert_eq!(frame.height, 10);
        assert!(frame.y.iter().all(|&v| (v as i32 - 82).abs() <= 1));
        assert!(frame.u.iter().all(|&v| (v as i32 - 90).abs() <= 1));
        assert!(frame.v.iter().all(|&v| (v as i32 - 240).abs() <= 1));
    }

    #[test]
    fn frame_size_matches_planes() {
        let converter = FrameConverter::new(7, 5);
        let frame = converter.convert(&PixelBuffer::filled(7, 5, 0xFF00_0000));
        assert_eq!(frame.y.len() + frame.u.len() + frame.v.len(), converter.frame_size());
    }
}
