//! Building the production detector from a config file on disk.

use std::io::Cursor;

use image::{GrayImage, Luma};

use seeclaw_vision::config::{load_config, save_config, VisionConfig};
use seeclaw_vision::{DetectionConfig, ElementDetector};

fn noise_patch(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
        let mut v = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
        v = (v ^ (v >> 13)).wrapping_mul(1_274_126_177);
        Luma([(v >> 24) as u8])
    })
}

fn png(img: &GrayImage) -> Vec<u8> {
    let mut out = Vec::new();
    image::DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

#[test]
fn defaults_survive_a_save_load_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vision.toml");
    let config = VisionConfig::default();
    save_config(&config, Some(&path)).unwrap();
    assert_eq!(load_config(Some(&path)).unwrap(), config);
}

#[tokio::test]
async fn missing_template_directory_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vision.toml");
    std::fs::write(
        &path,
        format!(
            "[template]\ndirectory = {:?}\n",
            dir.path().join("does-not-exist").display().to_string()
        ),
    )
    .unwrap();
    let config = load_config(Some(&path)).unwrap();
    let detector = ElementDetector::new(&config).unwrap();
    let probes = detector.probe().await;
    let template = probes.iter().find(|p| p.detector == "template").unwrap();
    assert!(template.configured);
    assert!(!template.available);
    assert!(detector.shutdown().await);
}

#[cfg(feature = "cv")]
#[tokio::test]
async fn templates_from_config_directory_are_found() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("templates");
    std::fs::create_dir(&templates).unwrap();
    let patch = noise_patch(24);
    std::fs::write(templates.join("gear.icon.png"), png(&patch)).unwrap();

    let path = dir.path().join("vision.toml");
    std::fs::write(
        &path,
        format!(
            "[detection]\nenable_ocr = false\nenable_shape = false\n\n[template]\ndirectory = {:?}\n",
            templates.display().to_string()
        ),
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    let detector = ElementDetector::new(&config).unwrap();

    let mut screen = GrayImage::from_pixel(200, 120, Luma([128]));
    image::imageops::replace(&mut screen, &patch, 60, 40);
    let elements = detector.detect(&png(&screen), detector.defaults()).await;

    assert_eq!(elements.len(), 1);
    let e = &elements[0];
    assert_eq!((e.coordinates.x, e.coordinates.y), (60, 40));
    assert_eq!((e.coordinates.width, e.coordinates.height), (24, 24));
    assert_eq!(e.element_type, seeclaw_vision::ElementType::Icon);
    assert_eq!(e.metadata.template_name.as_deref(), Some("gear"));

    // Same template, searched only in a region that excludes it.
    let elsewhere = DetectionConfig {
        search_region: Some(seeclaw_vision::BoundingBox::new(120, 0, 80, 120)),
        ..detector.defaults().clone()
    };
    assert!(detector.detect(&png(&screen), &elsewhere).await.is_empty());
}
