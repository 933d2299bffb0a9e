use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use seeclaw_vision::config;
use seeclaw_vision::perception::{annotator, cv};
use seeclaw_vision::{BoundingBox, DetectionConfig, ElementDetector, VisionError, VisionResult};

/// Detect interactive UI controls in screenshots.
#[derive(Parser)]
#[command(name = "seeclaw-vision")]
#[command(version)]
struct Cli {
    /// Config file (default: vision.toml next to the binary, in the working
    /// directory or in the user config directory)
    #[arg(short, long, global = true, env = "SEECLAW_VISION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect elements and print the report as JSON
    Detect {
        /// Screenshot (PNG or JPEG)
        image: PathBuf,

        /// Restrict detection to x,y,width,height
        #[arg(long)]
        region: Option<BoundingBox>,

        /// Minimum confidence of reported elements
        #[arg(long)]
        threshold: Option<f32>,

        #[arg(long)]
        no_ocr: bool,

        #[arg(long)]
        no_shape: bool,

        #[arg(long)]
        no_template: bool,

        /// Also query the remote semantic service
        #[arg(long)]
        remote: bool,

        /// Print the universal projection instead of the raw report
        #[arg(long)]
        project: bool,

        /// Write an annotated PNG here
        #[arg(long)]
        annotate: Option<PathBuf>,
    },

    /// Find the element best matching a description
    Find {
        image: PathBuf,

        /// e.g. "submit button"
        description: String,
    },

    /// Report which detectors are usable
    Probe,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    seeclaw_vision::init_tracing("info");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "seeclaw-vision failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> VisionResult<ExitCode> {
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Probe => {
            let detector = ElementDetector::new(&config)?;
            let probes = detector.probe().await;
            let out = serde_json::json!({
                "cv_feature": cv::AVAILABLE,
                "detectors": probes,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            detector.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect {
            image,
            region,
            threshold,
            no_ocr,
            no_shape,
            no_template,
            remote,
            project,
            annotate,
        } => {
            let mut detection = config.detection.clone();
            detection.search_region = region.or(detection.search_region);
            if let Some(t) = threshold {
                detection.confidence_threshold = t;
            }
            detection.enable_ocr &= !no_ocr;
            detection.enable_shape &= !no_shape;
            detection.enable_template &= !no_template;
            detection.enable_remote |= remote;

            let bytes = read_image(&image).await?;
            let detector = ElementDetector::new(&config)?;
            let report = detector.detect_with_report(&bytes, &detection).await;

            if let Some(out_path) = annotate {
                let targets: Vec<_> = report.elements.iter().map(|e| detector.resolve_click_target(e)).collect();
                let png = annotator::annotate_image(&bytes, &report.elements, &targets)?;
                tokio::fs::write(&out_path, png).await?;
                tracing::info!(path = %out_path.display(), "annotated image written");
            }

            if project {
                let projected = detector.project_report(&report);
                println!("{}", serde_json::to_string_pretty(&projected)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            detector.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Find { image, description } => {
            let bytes = read_image(&image).await?;
            let detector = ElementDetector::new(&config)?;
            let detection: DetectionConfig = config.detection.clone();
            let elements = detector.detect(&bytes, &detection).await;
            let found = detector.find_by_description(&elements, &description);
            let code = match found {
                Some(element) => {
                    let out = serde_json::json!({
                        "element": element,
                        "click_target": detector.resolve_click_target(element),
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("no element matches \"{description}\" ({} candidates)", elements.len());
                    ExitCode::from(2)
                }
            };
            detector.shutdown().await;
            Ok(code)
        }
    }
}

async fn read_image(path: &Path) -> VisionResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| VisionError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))
}
