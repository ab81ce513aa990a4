//! Normalised box blur.

use image::GrayImage;

/// Mean over a `size`x`size` window (`size` odd), rounded to the nearest
/// integer once at the end.
///
/// Borders mirror without repeating the edge pixel: `dcb|abcd|cba`.
pub fn box_blur(image: &GrayImage, size: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || size <= 1 {
        return image.clone();
    }

    let half = (size / 2) as isize;
    let area = ((2 * half + 1) * (2 * half + 1)) as u32;
    let src = image.as_raw();

    // Horizontal window sums, kept unnormalised.
    let mut rows = vec![0u32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            rows[y * w + x] = (-half..=half)
                .map(|k| u32::from(row[reflect_101(x as isize + k, w)]))
                .sum();
        }
    }

    let mut out = GrayImage::new(width, height);
    for (i, dst) in out.iter_mut().enumerate() {
        let (x, y) = (i % w, i / w);
        let sum: u32 = (-half..=half)
            .map(|k| rows[reflect_101(y as isize + k, h) * w + x])
            .sum();
        *dst = ((sum + area / 2) / area) as u8;
    }
    out
}

fn reflect_101(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * (n - 1) - i;
        } else {
            return i as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn uniform_image_is_unchanged() {
        let src = GrayImage::from_pixel(9, 7, Luma([77]));
        assert_eq!(box_blur(&src, 5), src);
    }

    #[test]
    fn mean_is_rounded_not_truncated() {
        // 24 * 10 + 23 = 263, and 263 / 25 = 10.52.
        let mut src = GrayImage::from_pixel(7, 7, Luma([10]));
        src.put_pixel(3, 3, Luma([23]));
        let out = box_blur(&src, 5);
        assert_eq!(out.get_pixel(3, 3).0[0], 11);
        assert_eq!(out.get_pixel(0, 0).0[0], 10);
    }

    #[test]
    fn borders_mirror_without_repeating_edge() {
        let mut src = GrayImage::new(5, 1);
        src.put_pixel(4, 0, Luma([100]));
        let out = box_blur(&src, 5);
        // A replicated border would count the bright pixel three times at
        // x = 4 and give 60.
        let row: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        assert_eq!(row, vec![0, 0, 20, 20, 20]);
    }

    #[test]
    fn reflect_101_indices() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(-2, 1), 0);
        assert_eq!(reflect_101(-2, 2), 0);
    }
}
