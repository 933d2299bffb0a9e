pub mod annotator;
pub mod click;
pub mod cv;
pub mod fusion;
pub mod ocr;
pub mod pipeline;
pub mod region;
pub mod remote;
pub mod search;
pub mod semantic;
pub mod shape;
pub mod template;
pub mod traits;
pub mod types;
pub mod warn;

pub use pipeline::{DetectorProbe, ElementDetector, ElementDetectorBuilder};
pub use traits::Detector;
