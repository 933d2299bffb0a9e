use async_trait::async_trait;

use crate::errors::VisionResult;
use crate::perception::region::RegionFrame;
use crate::perception::types::{DetectedElement, DetectionMethod};

/// Common interface for every element detector.
/// Four implementations: text recognition, edge/shape, template matching and
/// the remote semantic service.
///
/// Returned boxes are already in full-screenshot coordinates (the frame's
/// offset added back). Ids are numbered per call with the method's prefix.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> DetectionMethod;

    /// Cheap readiness check; an unavailable detector is skipped for the call.
    async fn is_available(&self) -> bool;

    async fn detect(&self, frame: &RegionFrame) -> VisionResult<Vec<DetectedElement>>;
}

/// `{prefix}_{n}` with `n` starting at 1.
pub fn element_id(method: DetectionMethod, index: usize) -> String {
    format!("{}_{}", method.id_prefix(), index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_one_based_with_prefix() {
        assert_eq!(element_id(DetectionMethod::Ocr, 0), "ocr_1");
        assert_eq!(element_id(DetectionMethod::Template, 2), "tpl_3");
        assert_eq!(element_id(DetectionMethod::RemoteSemantic, 1), "remote_2");
    }
}
