//! Canny edge detector with 5x5 Sobel derivatives.
//!
//! Gradients use the separable aperture-5 Sobel pair (derivative
//! `[-1 -2 0 2 1]`, smoothing `[1 4 6 4 1]`) with replicated borders and an
//! L1 magnitude. Non-maximum suppression quantises the gradient direction into
//! four bins in fixed point, then hysteresis grows edges from pixels above the
//! high threshold through 8-connected pixels above the low threshold.

use image::{GrayImage, Luma};

/// Sobel aperture.
pub const APERTURE_SIZE: usize = 5;

const DERIVATIVE: [i32; APERTURE_SIZE] = [-1, -2, 0, 2, 1];
const SMOOTHING: [i32; APERTURE_SIZE] = [1, 4, 6, 4, 1];

/// tan(22.5°) in Q15.
const TG22_Q15: i64 = 13573;
const SHIFT: u32 = 15;

const NOT_EDGE: u8 = 0;
const WEAK: u8 = 1;
const EDGE: u8 = 2;

/// Run Canny on `image`, returning a mask with edge pixels set to 255.
///
/// Thresholds apply to `|dx| + |dy|` of the 5x5 Sobel response.
pub fn canny(image: &GrayImage, low: i32, high: i32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return GrayImage::new(width, height);
    }

    let src: Vec<i32> = image.as_raw().iter().map(|&p| p as i32).collect();
    let dx = convolve_cols(&convolve_rows(&src, w, h, &DERIVATIVE), w, h, &SMOOTHING);
    let dy = convolve_cols(&convolve_rows(&src, w, h, &SMOOTHING), w, h, &DERIVATIVE);
    let magnitude: Vec<i32> = dx.iter().zip(&dy).map(|(x, y)| x.abs() + y.abs()).collect();

    let labels = suppress_non_maxima(&dx, &dy, &magnitude, w, h, low, high);
    let labels = hysteresis(labels, w, h);

    let mut out = GrayImage::new(width, height);
    for (dst, &label) in out.pixels_mut().zip(&labels) {
        if label == EDGE {
            *dst = Luma([255]);
        }
    }
    out
}

/// Horizontal pass with clamp-to-edge borders.
fn convolve_rows(src: &[i32], w: usize, h: usize, kernel: &[i32; APERTURE_SIZE]) -> Vec<i32> {
    let half = kernel.len() as isize / 2;
    let mut dst = vec![0i32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0;
            for (k, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as usize;
                acc += row[sx] * kv;
            }
            dst[y * w + x] = acc;
        }
    }
    dst
}

/// Vertical pass with clamp-to-edge borders.
fn convolve_cols(src: &[i32], w: usize, h: usize, kernel: &[i32; APERTURE_SIZE]) -> Vec<i32> {
    let half = kernel.len() as isize / 2;
    let mut dst = vec![0i32; w * h];
    for y in 0..h {
        for (k, &kv) in kernel.iter().enumerate() {
            let sy = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
            let src_row = &src[sy * w..(sy + 1) * w];
            let dst_row = &mut dst[y * w..(y + 1) * w];
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                *d += s * kv;
            }
        }
    }
    dst
}

fn suppress_non_maxima(
    dx: &[i32],
    dy: &[i32],
    magnitude: &[i32],
    w: usize,
    h: usize,
    low: i32,
    high: i32,
) -> Vec<u8> {
    // Magnitude outside the image counts as zero.
    let mag = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut labels = vec![NOT_EDGE; w * h];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }

            let (gx, gy) = (dx[i] as i64, dy[i] as i64);
            let tg22x = gx.abs() * TG22_Q15;
            let ay = gy.abs() << SHIFT;
            let (xi, yi) = (x as isize, y as isize);

            let is_max = if ay < tg22x {
                // Mostly horizontal gradient.
                m > mag(xi - 1, yi) && m >= mag(xi + 1, yi)
            } else if ay > tg22x + (gx.abs() << (SHIFT + 1)) {
                // Mostly vertical gradient.
                m > mag(xi, yi - 1) && m >= mag(xi, yi + 1)
            } else {
                let s = if (gx ^ gy) < 0 { -1 } else { 1 };
                m > mag(xi - s, yi - 1) && m > mag(xi + s, yi + 1)
            };

            if is_max {
                labels[i] = if m > high { EDGE } else { WEAK };
            }
        }
    }
    labels
}

fn hysteresis(mut labels: Vec<u8>, w: usize, h: usize) -> Vec<u8> {
    let mut stack: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == EDGE)
        .map(|(i, _)| i)
        .collect();

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if labels[j] == WEAK {
                    labels[j] = EDGE;
                    stack.push(j);
                }
            }
        }
    }

    for label in labels.iter_mut() {
        if *label == WEAK {
            *label = NOT_EDGE;
        }
    }
    labels
}
