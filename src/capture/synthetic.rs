//! Synthetic YUV 4:2:0 camera used by the demo runner and the tests

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::frame::{Plane, PlanarImage};
use crate::error::Result;
use crate::CameraConfig;

const LUMA_DARK: u8 = 16;
const LUMA_BRIGHT: u8 = 235;

/// How the chroma samples are laid out in memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChromaLayout {
    /// I420: separate U and V planes, pixel stride 1
    #[default]
    Planar,
    /// NV21: one interleaved VU plane, pixel stride 2
    Interleaved,
}

/// Picture content generated per frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TestPattern {
    /// Dark/bright luma squares scrolling one pixel per frame
    Checkerboard { cell: u32 },
    /// Horizontal luma ramp with a chroma sweep
    Gradient,
    /// Constant Y, U and V
    Flat { y: u8, u: u8, v: u8 },
}

impl Default for TestPattern {
    fn default() -> Self {
        TestPattern::Checkerboard { cell: 32 }
    }
}

/// Owned camera frame; hand out borrowed views with [`YuvFrame::planar`]
#[derive(Debug, Clone)]
pub struct YuvFrame {
    pub sequence: u64,
    pub timestamp: Instant,
    width: u32,
    height: u32,
    luma: Vec<u8>,
    chroma: Vec<u8>,
    layout: ChromaLayout,
}

impl YuvFrame {
    /// Build a frame from a luma plane and per-chroma-sample (U, V) pairs
    pub fn from_samples(
        width: u32,
        height: u32,
        luma: Vec<u8>,
        uv: &[(u8, u8)],
        layout: ChromaLayout,
    ) -> Self {
        let chroma = match layout {
            ChromaLayout::Planar => uv
                .iter()
                .map(|&(u, _)| u)
                .chain(uv.iter().map(|&(_, v)| v))
                .collect(),
            ChromaLayout::Interleaved => uv.iter().flat_map(|&(u, v)| [v, u]).collect(),
        };
        Self {
            sequence: 0,
            timestamp: Instant::now(),
            width,
            height,
            luma,
            chroma,
            layout,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Borrowed planar view, the shape a camera callback hands the pipeline
    pub fn planar(&self) -> Result<PlanarImage<'_>> {
        let cw = (self.width as usize).div_ceil(2);
        let ch = (self.height as usize).div_ceil(2);
        let y = Plane::new(&self.luma, self.width as usize, 1);

        let (u, v) = match self.layout {
            ChromaLayout::Planar => {
                let (u, v) = self.chroma.split_at(cw * ch);
                (Plane::new(u, cw, 1), Plane::new(v, cw, 1))
            }
            ChromaLayout::Interleaved => (
                Plane::new(self.chroma.get(1..).unwrap_or(&[]), cw * 2, 2),
                Plane::new(&self.chroma, cw * 2, 2),
            ),
        };

        PlanarImage::new(y, u, v, self.width, self.height)
    }
}

/// Camera stand-in producing deterministic frames
pub struct SyntheticCamera {
    config: CameraConfig,
    sequence: u64,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        debug!(
            "Synthetic camera {}x{} @ {} fps, {:?}",
            config.width, config.height, config.fps, config.pattern
        );
        Self {
            config,
            sequence: 0,
        }
    }

    pub fn next_frame(&mut self) -> YuvFrame {
        let (w, h) = (self.config.width, self.config.height);
        let shift = self.sequence as u32;

        let luma: Vec<u8> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| self.luma_at(x, y, shift))
            .collect();

        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let uv: Vec<(u8, u8)> = (0..ch)
            .flat_map(|y| (0..cw).map(move |x| (x, y)))
            .map(|(x, y)| self.chroma_at(x, y, cw, ch))
            .collect();

        let mut frame = YuvFrame::from_samples(w, h, luma, &uv, self.config.layout);
        self.sequence += 1;
        frame.sequence = self.sequence;
        frame
    }

    fn luma_at(&self, x: u32, y: u32, shift: u32) -> u8 {
        match self.config.pattern {
            TestPattern::Checkerboard { cell } => {
                let cell = cell.max(1);
                if ((x.wrapping_add(shift) / cell) + (y / cell)) % 2 == 0 {
                    LUMA_DARK
                } else {
                    LUMA_BRIGHT
                }
            }
            TestPattern::Gradient => {
                let span = self.config.width.max(1);
                ((x.wrapping_add(shift) % span) * 255 / span) as u8
            }
            TestPattern::Flat { y, .. } => y,
        }
    }

    fn chroma_at(&self, x: u32, y: u32, cw: u32, ch: u32) -> (u8, u8) {
        match self.config.pattern {
            TestPattern::Checkerboard { .. } => (128, 128),
            TestPattern::Gradient => ((x * 255 / cw.max(1)) as u8, (y * 255 / ch.max(1)) as u8),
            TestPattern::Flat { u, v, .. } => (u, v),
        }
    }
}
