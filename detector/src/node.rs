use crate::bridge::{self, BridgeError};
use crate::display::{DisplaySurface, EDGE_WINDOW, EVENT_WAIT, RAW_WINDOW};
use crate::pipeline;
use crate::transport::{ImagePublisher, TransportError};
use edge_bridge_common::image::ImageMessage;
use image::RgbImage;
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("image conversion failed: {0}")]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What happened to one incoming image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed, displayed and republished.
    Published,
    /// Too small for the size gate; nothing shown or published.
    Gated,
    /// Dropped because of an error, already logged.
    Failed,
}

/// Running totals, logged periodically.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub received: u64,
    pub published: u64,
    pub gated: u64,
    pub failed: u64,
}

/// The edge detector node: owns the output publisher and the display.
///
/// Windows and producer are released when the node is dropped.
pub struct EdgeDetector<P, D> {
    publisher: P,
    display: D,
    stats: Stats,
}

impl<P: ImagePublisher, D: DisplaySurface> EdgeDetector<P, D> {
    pub fn new(publisher: P, display: D) -> Self {
        Self {
            publisher,
            display,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Handle one raw payload from the input topic.
    pub fn on_payload(&mut self, payload: &[u8]) -> Outcome {
        match ImageMessage::deserialize(payload) {
            Ok(msg) => self.image_callback(&msg),
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "failed to deserialize image, skipping");
                self.record(Outcome::Failed)
            }
        }
    }

    /// Handle one image. Errors stop here: they are logged and the frame
    /// is discarded.
    pub fn image_callback(&mut self, msg: &ImageMessage) -> Outcome {
        let outcome = match self.process(msg) {
            Ok(outcome) => outcome,
            Err(CallbackError::Transport(e @ TransportError::QueueFull(_))) => {
                warn!(error = %e, seq = msg.header.seq, "publisher busy");
                Outcome::Failed
            }
            Err(e) => {
                error!(
                    error = %e,
                    seq = msg.header.seq,
                    encoding = msg.encoding,
                    "dropping image"
                );
                Outcome::Failed
            }
        };
        self.record(outcome)
    }

    fn process(&mut self, msg: &ImageMessage) -> Result<Outcome, CallbackError> {
        let frame = bridge::to_rgb8(msg)?;

        if !pipeline::passes_size_gate(&frame) {
            debug!(
                width = frame.width(),
                height = frame.height(),
                "image below size gate, dropping"
            );
            return Ok(Outcome::Gated);
        }

        let edges = pipeline::detect_edges(&frame);
        debug!(
            seq = msg.header.seq,
            edge_pixels = edges.mask.pixels().filter(|p| p.0[0] != 0).count(),
            age_ms = msg.header.age_ms(),
            "edges detected"
        );

        self.render(&frame, &edges.composite);
        self.publisher
            .publish(&bridge::from_rgb8(&msg.header, &edges.composite))?;
        Ok(Outcome::Published)
    }

    /// Draw source and result; display trouble never drops a frame.
    fn render(&mut self, source: &RgbImage, composite: &RgbImage) {
        for (window, frame) in [(RAW_WINDOW, source), (EDGE_WINDOW, composite)] {
            if let Err(e) = self.display.show(window, frame) {
                warn!(error = %e, "display update failed");
            }
        }
        self.display.wait_events(EVENT_WAIT);
    }

    fn record(&mut self, outcome: Outcome) -> Outcome {
        self.stats.received += 1;
        match outcome {
            Outcome::Published => self.stats.published += 1,
            Outcome::Gated => self.stats.gated += 1,
            Outcome::Failed => self.stats.failed += 1,
        }
        if self.stats.received % 100 == 0 {
            let s = self.stats;
            debug!(
                received = s.received,
                published = s.published,
                gated = s.gated,
                failed = s.failed,
                "images processed"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayError;
    use edge_bridge_common::image::{encodings, Header};
    use image::Rgb;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Vec<ImageMessage>,
        fail_next: bool,
    }

    impl ImagePublisher for RecordingPublisher {
        fn publish(&mut self, msg: &ImageMessage) -> Result<(), TransportError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(TransportError::QueueFull("test".into()));
            }
            self.sent.push(msg.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        shown: Vec<(String, (u32, u32))>,
        waits: usize,
        broken: bool,
    }

    impl DisplaySurface for RecordingDisplay {
        fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DisplayError> {
            if self.broken {
                return Err(DisplayError::Open(window.into(), "no display".into()));
            }
            self.shown.push((window.to_string(), frame.dimensions()));
            Ok(())
        }

        fn wait_events(&mut self, timeout: Duration) {
            assert_eq!(timeout, EVENT_WAIT);
            self.waits += 1;
        }
    }

    fn node() -> EdgeDetector<RecordingPublisher, RecordingDisplay> {
        EdgeDetector::new(RecordingPublisher::default(), RecordingDisplay::default())
    }

    fn header(seq: u64) -> Header {
        Header {
            stamp_ms: 1708300000000,
            seq,
            frame_id: "usb_cam".into(),
        }
    }

    fn bgr8(frame: &RgbImage, seq: u64) -> ImageMessage {
        bridge::from_rgb8(&header(seq), frame)
    }

    fn gray_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
    }

    #[test]
    fn small_frames_are_not_published_or_shown() {
        let mut node = node();
        for (w, h) in [(600, 500), (601, 400), (320, 240)] {
            assert_eq!(node.image_callback(&bgr8(&gray_frame(w, h), 1)), Outcome::Gated);
        }
        assert!(node.publisher.sent.is_empty());
        assert!(node.display.shown.is_empty());
        assert_eq!(node.display.waits, 0);
        assert_eq!(node.stats().gated, 3);
    }

    #[test]
    fn uniform_frame_publishes_black_image_of_same_shape() {
        let mut node = node();
        let outcome = node.image_callback(&bgr8(&gray_frame(601, 500), 7));
        assert_eq!(outcome, Outcome::Published);

        let out = &node.publisher.sent[0];
        assert_eq!((out.width, out.height), (601, 500));
        assert_eq!(out.encoding, encodings::BGR8);
        assert_eq!(out.step, 601 * 3);
        assert_eq!(out.header, header(7));
        assert!(out.data.iter().all(|&b| b == 0));

        assert_eq!(
            node.display.shown,
            vec![
                (RAW_WINDOW.to_string(), (601, 500)),
                (EDGE_WINDOW.to_string(), (601, 500)),
            ]
        );
        assert_eq!(node.display.waits, 1);
    }

    #[test]
    fn published_pixels_are_zero_or_input() {
        let frame = RgbImage::from_fn(640, 480, |x, y| {
            if (100..300).contains(&x) && (100..300).contains(&y) {
                Rgb([250, 30, 30])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let input = bgr8(&frame, 1);
        let mut node = node();
        assert_eq!(node.image_callback(&input), Outcome::Published);

        let out = &node.publisher.sent[0];
        assert_eq!(out.data.len(), input.data.len());
        let mut lit = 0;
        for (o, i) in out.data.chunks_exact(3).zip(input.data.chunks_exact(3)) {
            if o != [0, 0, 0] {
                assert_eq!(o, i);
                lit += 1;
            }
        }
        assert!(lit > 0);
    }

    #[test]
    fn bad_encoding_is_dropped_and_next_frame_still_processed() {
        let mut node = node();
        let mut bad = bgr8(&gray_frame(601, 500), 1);
        bad.encoding = "yuv422".into();
        assert_eq!(node.image_callback(&bad), Outcome::Failed);

        let mut short = bgr8(&gray_frame(601, 500), 2);
        short.data.truncate(10);
        assert_eq!(node.image_callback(&short), Outcome::Failed);
        assert!(node.publisher.sent.is_empty());
        assert!(node.display.shown.is_empty());

        assert_eq!(
            node.image_callback(&bgr8(&gray_frame(601, 500), 3)),
            Outcome::Published
        );
        assert_eq!(node.publisher.sent.len(), 1);
        assert_eq!(node.publisher.sent[0].header.seq, 3);
    }

    #[test]
    fn garbage_payload_is_skipped() {
        let mut node = node();
        assert_eq!(node.on_payload(&[0xde, 0xad]), Outcome::Failed);

        let good = bgr8(&gray_frame(601, 500), 4).serialize();
        assert_eq!(node.on_payload(&good), Outcome::Published);
        assert_eq!(node.stats().failed, 1);
        assert_eq!(node.stats().published, 1);
    }

    #[test]
    fn display_failure_does_not_block_publishing() {
        let mut node = node();
        node.display.broken = true;
        assert_eq!(
            node.image_callback(&bgr8(&gray_frame(601, 500), 1)),
            Outcome::Published
        );
        assert_eq!(node.publisher.sent.len(), 1);
    }

    #[test]
    fn publish_failure_only_loses_that_frame() {
        let mut node = node();
        node.publisher.fail_next = true;
        assert_eq!(
            node.image_callback(&bgr8(&gray_frame(601, 500), 1)),
            Outcome::Failed
        );
        assert_eq!(
            node.image_callback(&bgr8(&gray_frame(601, 500), 2)),
            Outcome::Published
        );
        assert_eq!(node.publisher.sent.len(), 1);
    }
}
