/// `tesseract` command-line backend.
///
/// The image is piped to `tesseract stdin stdout … tsv` as PNG and the TSV
/// report is parsed back into words.
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::{VisionError, VisionResult};
use crate::perception::ocr::engine::{LineKey, OcrParams, OcrWord, TextRecognizer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractSettings {
    /// Executable name or path.
    pub binary: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            binary: "tesseract".into(),
            language: "eng".into(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TesseractCli {
    settings: TesseractSettings,
}

impl TesseractCli {
    pub fn new(settings: TesseractSettings) -> Self {
        Self { settings }
    }

    fn build_args(&self, params: &OcrParams) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.settings.language.clone(),
            "--psm".to_string(),
            params.page_seg_mode.to_string(),
        ];
        if let Some(dpi) = params.dpi {
            args.push("--dpi".into());
            args.push(dpi.to_string());
        }
        if let Some(wl) = params.whitelist.as_deref().filter(|s| !s.is_empty()) {
            args.push("-c".into());
            args.push(format!("tessedit_char_whitelist={wl}"));
        }
        if let Some(bl) = params.blacklist.as_deref().filter(|s| !s.is_empty()) {
            args.push("-c".into());
            args.push(format!("tessedit_char_blacklist={bl}"));
        }
        args.push("tsv".into());
        args
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn probe(&self) -> VisionResult<String> {
        let output = timeout(
            Duration::from_secs(5),
            Command::new(&self.settings.binary)
                .arg("--version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| VisionError::EngineUnavailable("tesseract --version timed out".into()))?
        .map_err(|e| VisionError::EngineUnavailable(format!("{}: {e}", self.settings.binary)))?;

        if !output.status.success() {
            return Err(VisionError::EngineUnavailable(format!(
                "tesseract --version exited with {}",
                output.status
            )));
        }
        // Older builds print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        let version = String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or("tesseract")
            .trim()
            .to_string();
        Ok(version)
    }

    async fn recognize(&self, image: &GrayImage, params: &OcrParams) -> VisionResult<Vec<OcrWord>> {
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image.clone()).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.settings.binary)
            .args(self.build_args(params))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VisionError::EngineUnavailable(format!("spawn {}: {e}", self.settings.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VisionError::Recognition("tesseract stdin not captured".into()))?;

        // Feed stdin while draining stdout, both under one deadline.
        let feed = async move {
            let written = stdin.write_all(&png).await;
            drop(stdin);
            written
        };
        let run = async {
            let (written, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            // On a failed exit the status is reported, not the broken pipe.
            if output.status.success() {
                written?;
            }
            Ok::<_, std::io::Error>(output)
        };
        let output = timeout(Duration::from_secs(self.settings.timeout_secs.max(1)), run)
            .await
            .map_err(|_| {
                VisionError::Recognition(format!(
                    "tesseract timed out after {}s",
                    self.settings.timeout_secs
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VisionError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        tracing::trace!(psm = params.page_seg_mode, words = words.len(), "tesseract pass");
        Ok(words)
    }
}

/// Parse tesseract's TSV report, keeping word rows (level 5) with a
/// non-negative confidence and non-blank text.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    for line in tsv.lines() {
        let cols: Vec<&str> = line.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().ok();
        let (Some(block), Some(paragraph), Some(line_no)) = (num(2), num(3), num(4)) else {
            continue;
        };
        let (Some(x), Some(y), Some(width), Some(height)) = (num(6), num(7), num(8), num(9)) else {
            continue;
        };
        let Ok(confidence) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        let text = cols[11].trim();
        if confidence < 0.0 || text.is_empty() || width == 0 || height == 0 {
            continue;
        }
        words.push(OcrWord {
            text: text.to_string(),
            confidence: confidence.min(100.0),
            x,
            y,
            width,
            height,
            line: LineKey {
                block,
                paragraph,
                line: line_no,
            },
        });
    }
    words
}
