//! Driver for an external text-to-image service.
//!
//! Each caption is sent at most once. Calls are spaced by a fixed delay,
//! and quota or rate-limit errors trigger a longer backoff before the next
//! request. Existing outputs are never regenerated.

use std::fs;
use std::path::Path;
use std::time::Duration;

use image::RgbImage;

use crate::error::{GenerationError, Result};
use crate::executor::save_image;
use crate::report::{Failure, FailureStage, RunReport};

/// Scenario identifier used for generation runs in a [`RunReport`].
pub const GENERATE_SCENARIO: &str = "generate";

/// A text-to-image service.
pub trait ImageGenerator {
    /// Generate at most one image for `caption`.
    ///
    /// # Errors
    ///
    /// Any service error. Set [`GenerationError::rate_limited`] for quota
    /// errors so the driver backs off.
    fn generate(&self, caption: &str) -> std::result::Result<Option<RgbImage>, GenerationError>;
}

/// One image to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Output file name, also used to detect already generated images.
    pub image_name: String,
    /// Prompt text.
    pub caption: String,
}

/// Pacing for generation calls.
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    /// Pause after every completed call.
    pub delay: Duration,
    /// Pause after a rate-limited call.
    pub rate_limit_backoff: Duration,
    /// JPEG quality for `.jpg` outputs.
    pub output_quality: u8,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(10),
            output_quality: 75,
        }
    }
}

/// Generate every request into `output_dir`, pausing through `sleep`.
///
/// # Errors
///
/// Only fails if `output_dir` cannot be created.
pub fn generate_batch<G, S>(
    generator: &G,
    requests: &[GenerationRequest],
    output_dir: &Path,
    policy: &GenerationPolicy,
    mut sleep: S,
) -> Result<RunReport>
where
    G: ImageGenerator + ?Sized,
    S: FnMut(Duration),
{
    fs::create_dir_all(output_dir)?;

    let mut report = RunReport::new();
    report.add_scenario(GENERATE_SCENARIO, "Generate from caption", None);

    let total = requests.len();
    for (idx, request) in requests.iter().enumerate() {
        report.record_image();
        let output = output_dir.join(&request.image_name);
        if output.exists() {
            tracing::info!(
                "[{}/{}] skipping (already exists): {}",
                idx + 1,
                total,
                request.image_name
            );
            report.record_skip(GENERATE_SCENARIO, &request.image_name);
            continue;
        }
        tracing::info!("[{}/{}] generating: {}", idx + 1, total, request.image_name);
        tracing::debug!(caption = %request.caption, "prompt");

        let failure = |stage, message: String| Failure {
            image: request.image_name.clone(),
            scenario: Some(GENERATE_SCENARIO.to_string()),
            stage,
            message,
        };

        match generator.generate(&request.caption) {
            Ok(Some(image)) => {
                match save_image(&image, &output, policy.output_quality) {
                    Ok(()) => report.record_success(GENERATE_SCENARIO, &request.image_name),
                    Err(e) => {
                        tracing::warn!(image = %request.image_name, error = %e, "failed to save");
                        report.record_failure(failure(FailureStage::OutputWrite, e.to_string()));
                    }
                }
                sleep(policy.delay);
            }
            Ok(None) => {
                tracing::warn!(image = %request.image_name, "no image returned");
                report.record_failure(failure(
                    FailureStage::Collaborator,
                    "no image returned".to_string(),
                ));
                sleep(policy.delay);
            }
            Err(e) => {
                tracing::warn!(image = %request.image_name, error = %e, "generation failed");
                let rate_limited = e.rate_limited;
                report.record_failure(failure(FailureStage::Collaborator, e.message));
                if rate_limited {
                    tracing::info!("rate limited, waiting {:?}", policy.rate_limit_backoff);
                    sleep(policy.rate_limit_backoff);
                }
            }
        }
    }
    Ok(report)
}
