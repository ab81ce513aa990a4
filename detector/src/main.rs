mod bridge;
mod display;
mod node;
mod pipeline;
mod transport;

use edge_bridge_common::config::Config;
use edge_bridge_common::topics::{INPUT_TOPIC, NODE_NAME, OUTPUT_TOPIC, QUEUE_DEPTH};
use node::EdgeDetector;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use transport::{ImagePublisher, KafkaPublisher, KafkaSubscriber};

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        node = NODE_NAME,
        brokers = config.kafka.brokers,
        input = INPUT_TOPIC,
        output = OUTPUT_TOPIC,
        queue_depth = QUEUE_DEPTH,
        display = config.display.enabled,
        blur = pipeline::BLUR_SIZE,
        canny_low = pipeline::CANNY_LOW_THRESHOLD,
        canny_high = pipeline::CANNY_HIGH_THRESHOLD,
        aperture = pipeline::CANNY_APERTURE,
        "starting edge detector"
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let subscriber = match KafkaSubscriber::subscribe(&config.kafka, INPUT_TOPIC) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create subscriber");
            std::process::exit(1);
        }
    };

    let publisher = match KafkaPublisher::advertise(&config.kafka, OUTPUT_TOPIC) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to create publisher");
            std::process::exit(1);
        }
    };

    let mut detector = EdgeDetector::new(publisher, display::open(&config.display));

    info!("spinning");
    spin(
        &subscriber,
        &mut detector,
        Duration::from_millis(config.kafka.poll_timeout_ms),
        &running,
    );

    let stats = detector.stats();
    info!(
        received = stats.received,
        published = stats.published,
        gated = stats.gated,
        failed = stats.failed,
        "shutting down"
    );
    // Dropping the detector closes the windows and flushes the publisher.
}

/// Deliver images to the node one at a time until asked to stop.
fn spin<P, D>(
    subscriber: &KafkaSubscriber,
    detector: &mut EdgeDetector<P, D>,
    poll_timeout: Duration,
    running: &AtomicBool,
) where
    P: ImagePublisher,
    D: display::DisplaySurface,
{
    while running.load(Ordering::SeqCst) {
        if let Some(payload) = subscriber.next_latest(poll_timeout) {
            detector.on_payload(&payload);
        }
    }
}
