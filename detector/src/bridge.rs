//! Conversion between bus image messages and in-memory frames.

use edge_bridge_common::image::{encodings, Header, ImageMessage};
use image::RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("unsupported image encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("row step {step} too small for {width} pixels of {channels} channel(s)")]
    StepTooSmall {
        step: u32,
        width: u32,
        channels: usize,
    },
    #[error("image data too short: got {got} bytes, expected {expected}")]
    DataTooShort { got: usize, expected: usize },
    #[error("image dimensions {width}x{height} overflow")]
    Overflow { width: u32, height: u32 },
}

/// Channel layout of a supported input encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Mono,
}

impl Layout {
    fn from_encoding(encoding: &str) -> Option<Self> {
        match encoding {
            encodings::RGB8 => Some(Self::Rgb),
            encodings::BGR8 => Some(Self::Bgr),
            encodings::RGBA8 => Some(Self::Rgba),
            encodings::BGRA8 => Some(Self::Bgra),
            encodings::MONO8 => Some(Self::Mono),
            _ => None,
        }
    }

    fn channels(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            Self::Rgb | Self::Rgba => [px[0], px[1], px[2]],
            Self::Bgr | Self::Bgra => [px[2], px[1], px[0]],
            Self::Mono => [px[0], px[0], px[0]],
        }
    }
}

/// Copy a message into a 3-channel 8-bit colour frame.
///
/// Alpha is discarded and mono images are replicated across channels.
/// Padding bytes beyond `width * channels` in each row are skipped.
pub fn to_rgb8(msg: &ImageMessage) -> Result<RgbImage, BridgeError> {
    let layout = Layout::from_encoding(&msg.encoding)
        .ok_or_else(|| BridgeError::UnsupportedEncoding(msg.encoding.clone()))?;
    let channels = layout.channels();
    let overflow = || BridgeError::Overflow {
        width: msg.width,
        height: msg.height,
    };

    let width = msg.width as usize;
    let height = msg.height as usize;
    let step = msg.step as usize;
    let row_bytes = width.checked_mul(channels).ok_or_else(overflow)?;
    if step < row_bytes {
        return Err(BridgeError::StepTooSmall {
            step: msg.step,
            width: msg.width,
            channels,
        });
    }
    let expected = step.checked_mul(height).ok_or_else(overflow)?;
    if msg.data.len() < expected {
        return Err(BridgeError::DataTooShort {
            got: msg.data.len(),
            expected,
        });
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in msg.data.chunks_exact(step.max(1)).take(height) {
        for px in row[..row_bytes].chunks_exact(channels) {
            rgb.extend_from_slice(&layout.to_rgb(px));
        }
    }

    // Zero-width rows produce no chunks above; the buffer length still matches.
    RgbImage::from_raw(msg.width, msg.height, rgb).ok_or_else(overflow)
}

/// Encode a frame as a tightly packed `bgr8` message carrying `header`.
pub fn from_rgb8(header: &Header, frame: &RgbImage) -> ImageMessage {
    let (width, height) = frame.dimensions();
    let mut data = Vec::with_capacity(frame.as_raw().len());
    for px in frame.pixels() {
        let [r, g, b] = px.0;
        data.extend_from_slice(&[b, g, r]);
    }
    ImageMessage::new(
        header.clone(),
        width,
        height,
        encodings::BGR8,
        width * 3,
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn msg(encoding: &str, width: u32, height: u32, step: u32, data: Vec<u8>) -> ImageMessage {
        ImageMessage::new(Header::default(), width, height, encoding, step, data)
    }

    #[test]
    fn bgr8_is_swapped_into_rgb() {
        let frame = to_rgb8(&msg("bgr8", 2, 1, 6, vec![1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(frame.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }

    #[test]
    fn rgba8_drops_alpha() {
        let frame = to_rgb8(&msg("rgba8", 1, 1, 4, vec![10, 20, 30, 255])).unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn mono8_is_replicated() {
        let frame = to_rgb8(&msg("mono8", 2, 1, 2, vec![7, 9])).unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([7, 7, 7]));
        assert_eq!(frame.get_pixel(1, 0), &Rgb([9, 9, 9]));
    }

    #[test]
    fn row_padding_is_skipped() {
        // Two rows of one rgb8 pixel, each padded to four bytes.
        let frame = to_rgb8(&msg("rgb8", 1, 2, 4, vec![1, 2, 3, 0, 4, 5, 6, 0])).unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([1, 2, 3]));
        assert_eq!(frame.get_pixel(0, 1), &Rgb([4, 5, 6]));
    }

    #[test]
    fn unsupported_encoding_is_rejected() {
        let err = to_rgb8(&msg("16UC1", 1, 1, 2, vec![0, 0])).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedEncoding(e) if e == "16UC1"));
    }

    #[test]
    fn short_data_is_rejected() {
        let err = to_rgb8(&msg("bgr8", 2, 2, 6, vec![0; 11])).unwrap_err();
        assert!(matches!(err, BridgeError::DataTooShort { got: 11, expected: 12 }));
    }

    #[test]
    fn small_step_is_rejected() {
        let err = to_rgb8(&msg("bgr8", 2, 1, 5, vec![0; 6])).unwrap_err();
        assert!(matches!(err, BridgeError::StepTooSmall { step: 5, .. }));
    }

    #[test]
    fn from_rgb8_writes_packed_bgr() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([1, 2, 3]));
        frame.put_pixel(1, 0, Rgb([4, 5, 6]));
        let header = Header {
            stamp_ms: 5,
            seq: 9,
            frame_id: "cam".into(),
        };
        let out = from_rgb8(&header, &frame);
        assert_eq!(out.encoding, "bgr8");
        assert_eq!(out.step, 6);
        assert_eq!(out.header, header);
        assert_eq!(out.data, vec![3, 2, 1, 6, 5, 4]);
    }
}
