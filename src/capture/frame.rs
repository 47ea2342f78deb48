use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One plane of a planar camera image, borrowed from the caller
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte offset of sample (row, col) in plane coordinates. Only valid for
    /// samples inside a plane that passed `PlanarImage::new`.
    #[inline]
    pub(crate) fn offset(&self, row: usize, col: usize) -> usize {
        row * self.row_stride + col * self.pixel_stride
    }

    /// `offset`, or `None` if the host-supplied strides overflow
    fn checked_offset(&self, row: usize, col: usize) -> Option<usize> {
        row.checked_mul(self.row_stride)?
            .checked_add(col.checked_mul(self.pixel_stride)?)
    }
}

/// Borrowed YUV 4:2:0 frame, valid for one producer callback.
///
/// Construction checks every plane against the declared geometry, so the
/// converter can index without bounds surprises. Nothing in the pipeline
/// keeps a `PlanarImage` past the call it was handed to.
#[derive(Debug, Clone, Copy)]
pub struct PlanarImage<'a> {
    pub(crate) y: Plane<'a>,
    pub(crate) u: Plane<'a>,
    pub(crate) v: Plane<'a>,
    width: u32,
    height: u32,
}

impl<'a> PlanarImage<'a> {
    pub fn new(y: Plane<'a>, u: Plane<'a>, v: Plane<'a>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "non-positive dimensions {}x{}",
                width, height
            )));
        }
        if y.pixel_stride != 1 {
            return Err(PipelineError::InvalidImage(format!(
                "luma pixel stride must be 1, got {}",
                y.pixel_stride
            )));
        }
        if y.row_stride < width as usize {
            return Err(PipelineError::InvalidImage(format!(
                "luma row stride {} shorter than width {}",
                y.row_stride, width
            )));
        }

        let (w, h) = (width as usize, height as usize);
        check_plane("Y", &y, h, w)?;

        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        for (name, plane) in [("U", &u), ("V", &v)] {
            if plane.pixel_stride == 0 {
                return Err(PipelineError::InvalidImage(format!(
                    "{} pixel stride must be positive",
                    name
                )));
            }
            check_plane(name, plane, ch, cw)?;
        }

        Ok(Self {
            y,
            u,
            v,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Geometry a camera callback reports alongside its three planes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub y_stride: usize,
    pub uv_stride: usize,
    pub uv_pixel_stride: usize,
}

impl<'a> PlanarImage<'a> {
    /// View over raw camera planes; U and V share stride and pixel stride
    pub fn from_planes(y: &'a [u8], u: &'a [u8], v: &'a [u8], layout: FrameLayout) -> Result<Self> {
        Self::new(
            Plane::new(y, layout.y_stride, 1),
            Plane::new(u, layout.uv_stride, layout.uv_pixel_stride),
            Plane::new(v, layout.uv_stride, layout.uv_pixel_stride),
            layout.width,
            layout.height,
        )
    }
}

/// Last sample at (rows-1, cols-1) must be addressable
fn check_plane(name: &'static str, plane: &Plane<'_>, rows: usize, cols: usize) -> Result<()> {
    let needed = plane
        .checked_offset(rows - 1, cols - 1)
        .and_then(|last| last.checked_add(1))
        .ok_or_else(|| {
            PipelineError::InvalidImage(format!(
                "{} plane strides ({}, {}) overflow the address space",
                name, plane.row_stride, plane.pixel_stride
            ))
        })?;
    if plane.data.len() < needed {
        return Err(PipelineError::PlaneTooSmall {
            plane: name,
            needed,
            len: plane.data.len(),
        });
    }
    Ok(())
}

/// YUV quantization range of the incoming camera frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    /// Y, U and V span 0..=255 (camera2 / JFIF)
    #[default]
    Full,
    /// Studio swing, Y in 16..=235
    Limited,
}

/// Owned, packed RGBA8 image, row-major, `width * height * 4` bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(PipelineError::BufferSize {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Buffer with every pixel set to `rgba`
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let data = rgba.iter().copied().cycle().take(count * 4).collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(4)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Freeze into shareable bytes without copying
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i420_planes(w: usize, h: usize) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        (vec![0; w * h], vec![128; cw * ch], vec![128; cw * ch])
    }

    #[test]
    fn test_planar_image_accepts_tight_i420() {
        let (y, u, v) = i420_planes(4, 4);
        let image = PlanarImage::new(
            Plane::new(&y, 4, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            4,
            4,
        );
        assert!(image.is_ok());
    }

    #[test]
    fn test_planar_image_accepts_odd_dimensions() {
        let (y, u, v) = i420_planes(5, 3);
        let image = PlanarImage::new(
            Plane::new(&y, 5, 1),
            Plane::new(&u, 3, 1),
            Plane::new(&v, 3, 1),
            5,
            3,
        );
        assert!(image.is_ok());
    }

    #[test]
    fn test_planar_image_rejects_zero_dimensions() {
        let (y, u, v) = i420_planes(4, 4);
        let err = PlanarImage::new(
            Plane::new(&y, 4, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            0,
            4,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn test_planar_image_rejects_short_chroma() {
        let y = vec![0u8; 16];
        let u = vec![128u8; 3];
        let v = vec![128u8; 4];
        let err = PlanarImage::new(
            Plane::new(&y, 4, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            4,
            4,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PlaneTooSmall {
                plane: "U",
                needed: 4,
                len: 3
            }
        ));
    }

    #[test]
    fn test_planar_image_rejects_narrow_luma_stride() {
        let (y, u, v) = i420_planes(4, 4);
        let err = PlanarImage::new(
            Plane::new(&y, 3, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            4,
            4,
        )
        .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_planar_image_rejects_overflowing_strides() {
        let (y, u, v) = i420_planes(4, 4);

        let err = PlanarImage::new(
            Plane::new(&y, usize::MAX, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
            4,
            4,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));

        let layout = FrameLayout {
            width: 4,
            height: 4,
            y_stride: 4,
            uv_stride: 2,
            uv_pixel_stride: usize::MAX,
        };
        let err = PlanarImage::from_planes(&y, &u, &v, layout).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));

        let layout = FrameLayout {
            uv_stride: usize::MAX / 2 + 1,
            uv_pixel_stride: 1,
            ..layout
        };
        let err = PlanarImage::from_planes(&y, &u, &v, layout).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_pixel_buffer_size_check() {
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            PixelBuffer::new(2, 2, vec![0; 15]),
            Err(PipelineError::BufferSize { len: 15, .. })
        ));
    }

    #[test]
    fn test_pixel_buffer_filled() {
        let buf = PixelBuffer::filled(3, 2, [1, 2, 3, 255]);
        assert_eq!(buf.as_bytes().len(), 24);
        assert_eq!(buf.pixel(2, 1), Some([1, 2, 3, 255]));
        assert_eq!(buf.pixel(3, 0), None);
        assert!(PixelBuffer::empty().is_empty());
    }
}
