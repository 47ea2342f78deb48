//! Canny-style edge kernels over single-channel images.
//!
//! All kernels take row-major `u8`/`i32` planes of `width * height` samples
//! and replicate border pixels where a window leaves the image.

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_7;

#[inline]
fn clamp_index(v: isize, len: usize) -> usize {
    v.clamp(0, len as isize - 1) as usize
}

/// BT.601 luma in 14-bit fixed point
pub(crate) fn rgba_to_gray(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            ((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8
        })
        .collect()
}

/// Expand an edge map to opaque gray RGBA
pub(crate) fn gray_to_rgba(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&v| [v, v, v, 255]).collect()
}

/// Separable box blur with a `kernel x kernel` window, rounded mean
pub(crate) fn box_blur(src: &[u8], width: usize, height: usize, kernel: usize) -> Vec<u8> {
    if kernel <= 1 {
        return src.to_vec();
    }
    let radius = (kernel / 2) as isize;

    let mut rows = vec![0u32; width * height];
    for y in 0..height {
        let line = &src[y * width..][..width];
        for x in 0..width {
            rows[y * width + x] = (-radius..=radius)
                .map(|d| line[clamp_index(x as isize + d, width)] as u32)
                .sum();
        }
    }

    let area = (kernel * kernel) as u32;
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let sum: u32 = (-radius..=radius)
                .map(|d| rows[clamp_index(y as isize + d, height) * width + x])
                .sum();
            out[y * width + x] = ((sum + area / 2) / area) as u8;
        }
    }
    out
}

pub(crate) struct Gradients {
    pub gx: Vec<i32>,
    pub gy: Vec<i32>,
    /// L1 magnitude |gx| + |gy|
    pub magnitude: Vec<i32>,
}

/// 3x3 Sobel operator
pub(crate) fn sobel(src: &[u8], width: usize, height: usize) -> Gradients {
    let px = |x: isize, y: isize| -> i32 {
        src[clamp_index(y, height) * width + clamp_index(x, width)] as i32
    };

    let len = width * height;
    let mut gx = vec![0i32; len];
    let mut gy = vec![0i32; len];
    let mut magnitude = vec![0i32; len];

    for y in 0..height as isize {
        for x in 0..width as isize {
            let dx = px(x + 1, y - 1) + 2 * px(x + 1, y) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2 * px(x - 1, y)
                - px(x - 1, y + 1);
            let dy = px(x - 1, y + 1) + 2 * px(x, y + 1) + px(x + 1, y + 1)
                - px(x - 1, y - 1)
                - 2 * px(x, y - 1)
                - px(x + 1, y - 1);

            let i = y as usize * width + x as usize;
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }

    Gradients { gx, gy, magnitude }
}

/// Thin ridges to one pixel along the gradient direction.
///
/// A pixel survives when it is strictly above the neighbour on the negative
/// side and at least equal to the one on the positive side, so plateaus keep
/// exactly one sample. Neighbours outside the image count as zero.
pub(crate) fn non_max_suppression(g: &Gradients, width: usize, height: usize) -> Vec<i32> {
    let mag = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            g.magnitude[y as usize * width + x as usize]
        }
    };

    let mut out = vec![0i32; width * height];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let i = y as usize * width + x as usize;
            let m = g.magnitude[i];
            if m == 0 {
                continue;
            }

            let (gx, gy) = (g.gx[i], g.gy[i]);
            let (ax, ay) = (gx.abs() as f32, gy.abs() as f32);

            let (before, after) = if ay <= ax * TAN_22_5 {
                (mag(x - 1, y), mag(x + 1, y))
            } else if ay > ax * TAN_67_5 {
                (mag(x, y - 1), mag(x, y + 1))
            } else if (gx > 0) == (gy > 0) {
                (mag(x - 1, y - 1), mag(x + 1, y + 1))
            } else {
                (mag(x + 1, y - 1), mag(x - 1, y + 1))
            };

            if m > before && m >= after {
                out[i] = m;
            }
        }
    }
    out
}

/// Keep strong edges (> high) and weak ones (> low) 8-connected to them
pub(crate) fn hysteresis(thin: &[i32], width: usize, height: usize, low: f32, high: f32) -> Vec<u8> {
    let mut edges = vec![0u8; width * height];
    let mut stack: Vec<usize> = Vec::new();

    for (i, &m) in thin.iter().enumerate() {
        if m as f32 > high {
            edges[i] = 255;
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % width) as isize, (i / width) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let j = ny as usize * width + nx as usize;
                if edges[j] == 0 && thin[j] as f32 > low {
                    edges[j] = 255;
                    stack.push(j);
                }
            }
        }
    }

    edges
}
