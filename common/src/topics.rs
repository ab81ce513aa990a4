//! Topic names used by the edge detector node.
//!
//! Names are written in the robotics `/namespace/name` style and mapped onto
//! legal Kafka topic names with [`kafka_topic`].

/// Raw camera images coming in.
pub const INPUT_TOPIC: &str = "/usb_cam/image_raw";
/// Edge-highlighted images going out.
pub const OUTPUT_TOPIC: &str = "/edge_detector/raw_image";
/// Subscriber and publisher queue depth: only the newest image matters.
pub const QUEUE_DEPTH: usize = 1;

pub const NODE_NAME: &str = "Edge_Detector";

/// Map a `/a/b/c` style name to the Kafka name `a.b.c`.
///
/// Kafka only allows `[a-zA-Z0-9._-]`, so any other character becomes `_`.
pub fn kafka_topic(name: &str) -> String {
    name.trim_start_matches('/')
        .chars()
        .map(|c| match c {
            '/' => '.',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_topics_map_to_kafka_names() {
        assert_eq!(kafka_topic(INPUT_TOPIC), "usb_cam.image_raw");
        assert_eq!(kafka_topic(OUTPUT_TOPIC), "edge_detector.raw_image");
    }

    #[test]
    fn illegal_characters_are_replaced() {
        assert_eq!(kafka_topic("/cam 1/image~raw"), "cam_1.image_raw");
    }

    #[test]
    fn relative_names_pass_through() {
        assert_eq!(kafka_topic("camera.frames"), "camera.frames");
    }
}
