pub mod blur;
pub mod canny;

use image::{GrayImage, Luma, RgbImage};

/// Frames must be strictly taller than this to be processed.
pub const MIN_HEIGHT: u32 = 400;
/// Frames must be strictly wider than this to be processed.
pub const MIN_WIDTH: u32 = 600;

/// Side of the square box blur applied before edge detection.
pub const BLUR_SIZE: u32 = 5;
pub const CANNY_LOW_THRESHOLD: i32 = 200;
pub const CANNY_HIGH_THRESHOLD: i32 = 300;
pub use canny::APERTURE_SIZE as CANNY_APERTURE;

/// Output of one pass of the edge pipeline.
pub struct EdgeFrame {
    /// Binary mask, 255 on edges.
    pub mask: GrayImage,
    /// Source pixels where the mask is set, black elsewhere.
    pub composite: RgbImage,
}

/// Returns `true` if the frame is large enough to run the pipeline on.
pub fn passes_size_gate(frame: &RgbImage) -> bool {
    frame.height() > MIN_HEIGHT && frame.width() > MIN_WIDTH
}

/// Grayscale, box blur, Canny, then copy the source through the edge mask.
pub fn detect_edges(src: &RgbImage) -> EdgeFrame {
    let gray = to_gray(src);
    let blurred = blur::box_blur(&gray, BLUR_SIZE);
    let mask = canny::canny(&blurred, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD);
    let composite = masked_copy(src, &mask);
    EdgeFrame { mask, composite }
}

/// Rec. 601 luma, `0.299 R + 0.587 G + 0.114 B`, rounded.
pub fn to_gray(src: &RgbImage) -> GrayImage {
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        let [r, g, b] = src.get_pixel(x, y).0.map(u32::from);
        Luma([((299 * r + 587 * g + 114 * b + 500) / 1000) as u8])
    })
}

/// Copy `src` into an all-black frame wherever `mask` is nonzero.
pub fn masked_copy(src: &RgbImage, mask: &GrayImage) -> RgbImage {
    debug_assert_eq!(src.dimensions(), mask.dimensions());
    let mut dst = RgbImage::new(src.width(), src.height());
    for ((d, s), m) in dst.pixels_mut().zip(src.pixels()).zip(mask.pixels()) {
        if m.0[0] != 0 {
            *d = *s;
        }
    }
    dst
}
