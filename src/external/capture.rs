//! Screen captures with `screencapture` and JPEG compression with `sips`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ToolError;

use super::automation::WindowBounds;
use super::command::CommandRunner;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);
const SIPS_TIMEOUT: Duration = Duration::from_secs(10);

/// What to capture and how to store it.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Directory the files are written to; created if missing.
    pub dir: PathBuf,
    /// File name prefix, followed by a timestamp.
    pub prefix: String,
    /// Screen region to grab.
    pub region: WindowBounds,
    /// Width scale applied before encoding.
    pub resize_factor: f64,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

/// A stored screenshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screenshot {
    /// Final file path.
    pub path: PathBuf,
    /// File size in KB, one decimal.
    pub size_kb: f64,
    /// Whether the JPEG step succeeded; otherwise `path` is the raw PNG.
    pub compressed: bool,
}

impl Screenshot {
    /// File name of the stored image.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Takes and compresses screenshots.
#[derive(Clone)]
pub struct ScreenCapture {
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for ScreenCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenCapture").finish_non_exhaustive()
    }
}

impl ScreenCapture {
    /// Creates a capture handle over the given runner.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Grabs `region` into `output` as PNG.
    ///
    /// If the region grab fails the whole screen is captured instead.
    pub async fn capture_region(&self, region: WindowBounds, output: &Path) -> Result<(), ToolError> {
        let rect = format!("{},{},{},{}", region.x, region.y, region.width, region.height);
        let out = output.to_string_lossy().to_string();

        let result = self
            .runner
            .run(
                "screencapture",
                &["-R".to_string(), rect, "-x".to_string(), out.clone()],
                CAPTURE_TIMEOUT,
            )
            .await?;

        if !result.is_success() {
            warn!(
                stderr = %result.stderr.trim(),
                "Region capture failed, capturing the full screen"
            );
            self.runner
                .run("screencapture", &["-x".to_string(), out], CAPTURE_TIMEOUT)
                .await?;
        }

        if output.exists() {
            Ok(())
        } else {
            Err(ToolError::UnexpectedOutput {
                program: "screencapture".to_string(),
                message: format!("no image written to {}", output.display()),
            })
        }
    }

    /// Resizes `input` to `width` and re-encodes it as JPEG at `output`.
    ///
    /// Returns the size of the JPEG in KB.
    pub async fn compress(
        &self,
        input: &Path,
        output: &Path,
        width: i64,
        quality: u8,
    ) -> Result<f64, ToolError> {
        let temp = output.with_extension("temp.png");
        let temp_arg = temp.to_string_lossy().to_string();

        let resized = self
            .runner
            .run_checked(
                "sips",
                &[
                    "--resampleWidth".to_string(),
                    width.to_string(),
                    input.to_string_lossy().to_string(),
                    "--out".to_string(),
                    temp_arg.clone(),
                ],
                SIPS_TIMEOUT,
            )
            .await;

        let encoded = match resized {
            Ok(_) => {
                self.runner
                    .run_checked(
                        "sips",
                        &[
                            "-s".to_string(),
                            "format".to_string(),
                            "jpeg".to_string(),
                            "-s".to_string(),
                            "formatOptions".to_string(),
                            quality.to_string(),
                            temp_arg,
                            "--out".to_string(),
                            output.to_string_lossy().to_string(),
                        ],
                        SIPS_TIMEOUT,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        let _ = tokio::fs::remove_file(&temp).await;
        encoded?;

        file_size_kb(output).await.ok_or_else(|| ToolError::UnexpectedOutput {
            program: "sips".to_string(),
            message: format!("no image written to {}", output.display()),
        })
    }

    /// Captures, compresses and stores a screenshot.
    ///
    /// When compression fails the raw PNG is kept and returned.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<Screenshot, ToolError> {
        tokio::fs::create_dir_all(&request.dir).await?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let raw = request
            .dir
            .join(format!("{}_{}_raw.png", request.prefix, timestamp));
        let jpeg = request
            .dir
            .join(format!("{}_{}.jpg", request.prefix, timestamp));

        self.capture_region(request.region, &raw).await?;
        let raw_kb = file_size_kb(&raw).await.unwrap_or(0.0);
        debug!(path = %raw.display(), size_kb = raw_kb, "Raw screenshot captured");

        let width = (request.region.width as f64 * request.resize_factor) as i64;
        match self.compress(&raw, &jpeg, width, request.jpeg_quality).await {
            Ok(size_kb) => {
                let _ = tokio::fs::remove_file(&raw).await;
                Ok(Screenshot {
                    path: jpeg,
                    size_kb: round_kb(size_kb),
                    compressed: true,
                })
            }
            Err(e) => {
                warn!(error = %e, "Compression failed, keeping raw PNG");
                Ok(Screenshot {
                    path: raw,
                    size_kb: round_kb(raw_kb),
                    compressed: false,
                })
            }
        }
    }
}

async fn file_size_kb(path: &Path) -> Option<f64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .map(|m| m.len() as f64 / 1024.0)
}

fn round_kb(kb: f64) -> f64 {
    (kb * 10.0).round() / 10.0
}
