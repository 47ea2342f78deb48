//! YUV 4:2:0 to RGBA conversion

use std::time::Instant;

use tracing::instrument;

use crate::capture::frame::{ColorRange, PixelBuffer, PlanarImage};
use crate::error::Result;

/// BT.601 coefficients applied to (Y, U-128, V-128)
struct Matrix {
    y_scale: f32,
    y_offset: f32,
    rv: f32,
    gu: f32,
    gv: f32,
    bu: f32,
}

const FULL_RANGE: Matrix = Matrix {
    y_scale: 1.0,
    y_offset: 0.0,
    rv: 1.370705,
    gu: 0.337633,
    gv: 0.698001,
    bu: 1.732446,
};

const LIMITED_RANGE: Matrix = Matrix {
    y_scale: 1.164383,
    y_offset: 16.0,
    rv: 1.596027,
    gu: 0.391762,
    gv: 0.812968,
    bu: 2.017232,
};

/// Stateless planar YUV to packed RGBA converter.
///
/// Safe to share between threads: `convert` only reads its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameConverter {
    range: ColorRange,
}

impl FrameConverter {
    pub fn new(range: ColorRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> ColorRange {
        self.range
    }

    /// Convert one frame. Chroma is sampled at (row/2, col/2), each channel
    /// is clamped to 0..=255 and truncated, alpha is always 255.
    #[instrument(level = "trace", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn convert(&self, image: &PlanarImage<'_>) -> Result<PixelBuffer> {
        let start = Instant::now();
        let m = match self.range {
            ColorRange::Full => &FULL_RANGE,
            ColorRange::Limited => &LIMITED_RANGE,
        };

        let (w, h) = (image.width() as usize, image.height() as usize);
        let mut rgba = vec![0u8; w * h * 4];

        for (row, line) in rgba.chunks_exact_mut(w * 4).enumerate() {
            let luma = &image.y.data[row * image.y.row_stride..][..w];
            let chroma_row = row / 2;

            for (col, px) in line.chunks_exact_mut(4).enumerate() {
                let y = (luma[col] as f32 - m.y_offset) * m.y_scale;
                let u = image.u.data[image.u.offset(chroma_row, col / 2)] as f32 - 128.0;
                let v = image.v.data[image.v.offset(chroma_row, col / 2)] as f32 - 128.0;

                px[0] = clamp_channel(y + m.rv * v);
                px[1] = clamp_channel(y - m.gu * u - m.gv * v);
                px[2] = clamp_channel(y + m.bu * u);
                px[3] = 255;
            }
        }

        metrics::histogram!("convert_time_us").record(start.elapsed().as_micros() as f64);

        PixelBuffer::new(image.width(), image.height(), rgba)
    }
}

#[inline]
fn clamp_channel(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Plane;

    fn uniform(w: usize, h: usize, y: u8, u: u8, v: u8) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        (vec![y; w * h], vec![u; chroma], vec![v; chroma])
    }

    fn convert_uniform(range: ColorRange, y: u8, u: u8, v: u8) -> PixelBuffer {
        let (yp, up, vp) = uniform(6, 4, y, u, v);
        let image = PlanarImage::new(
            Plane::new(&yp, 6, 1),
            Plane::new(&up, 3, 1),
            Plane::new(&vp, 3, 1),
            6,
            4,
        )
        .unwrap();
        FrameConverter::new(range).convert(&image).unwrap()
    }

    #[test]
    fn test_output_size_and_alpha() {
        let out = convert_uniform(ColorRange::Full, 90, 60, 200);
        assert_eq!(out.as_bytes().len(), 6 * 4 * 4);
        assert!(out.pixels().all(|px| px[3] == 255));
    }

    #[test]
    fn test_neutral_chroma_is_gray() {
        let out = convert_uniform(ColorRange::Full, 235, 128, 128);
        assert!(out.pixels().all(|px| px == [235, 235, 235, 255]));
    }

    #[test]
    fn test_limited_range_white_saturates() {
        let out = convert_uniform(ColorRange::Limited, 235, 128, 128);
        for px in out.pixels() {
            assert!(px[0] >= 254 && px[1] >= 254 && px[2] >= 254, "{:?}", px);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_limited_range_black_clamps_to_zero() {
        let out = convert_uniform(ColorRange::Limited, 0, 128, 128);
        assert!(out.pixels().all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_channels_clamp() {
        // Strong red: V high pushes R past 255, G below 0
        let out = convert_uniform(ColorRange::Full, 200, 128, 255);
        let px = out.pixel(0, 0).unwrap();
        assert_eq!(px[0], 255);
        assert_eq!(px[2], 200);
        // G = 200 - 0.698001 * 127 = 111.35...
        assert_eq!(px[1], 111);
    }

    #[test]
    fn test_chroma_is_subsampled_two_by_two() {
        // 4x2 image, two chroma columns: left blue-ish, right red-ish
        let y = vec![128u8; 8];
        let u = vec![255u8, 128];
        let v = vec![128u8, 255];
        let image = PlanarImage::new(
            Plane::new(&y, 4, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            4,
            2,
        )
        .unwrap();
        let out = FrameConverter::default().convert(&image).unwrap();

        for row in 0..2 {
            assert_eq!(out.pixel(0, row), out.pixel(1, row));
            assert_eq!(out.pixel(2, row), out.pixel(3, row));
        }
        let left = out.pixel(0, 0).unwrap();
        let right = out.pixel(2, 0).unwrap();
        assert_eq!(left[2], 255);
        assert_eq!(right[0], 255);
    }

    #[test]
    fn test_interleaved_chroma_with_padding() {
        // Semi-planar layout: U and V share one buffer, pixel stride 2,
        // rows padded to 8 bytes
        let y: Vec<u8> = (0..2).flat_map(|_| [100u8, 100, 100, 100, 0, 0]).collect();
        let uv = vec![128u8, 128, 128, 128, 0, 0, 0, 0];
        let image = PlanarImage::new(
            Plane::new(&y, 6, 1),
            Plane::new(&uv[0..], 8, 2),
            Plane::new(&uv[1..], 8, 2),
            4,
            2,
        )
        .unwrap();
        let out = FrameConverter::default().convert(&image).unwrap();
        assert!(out.pixels().all(|px| px == [100, 100, 100, 255]));
    }
}
