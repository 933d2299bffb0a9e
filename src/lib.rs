pub mod config;
pub mod errors;
pub mod perception;

pub use config::VisionConfig;
pub use errors::{VisionError, VisionResult};
pub use perception::pipeline::{ElementDetector, ElementDetectorBuilder};
pub use perception::types::{
    BoundingBox, ClickTarget, DetectedElement, DetectionConfig, DetectionMethod, DetectionReport, ElementType,
    UniversalUIElement,
};

/// Install the global `tracing` subscriber writing to stderr. `RUST_LOG`
/// overrides `default_filter`. Calling it more than once is a no-op.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
