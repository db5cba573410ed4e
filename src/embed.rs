//! Driver for an external watermark embedder.
//!
//! The embedder itself is opaque. This module decodes sources, hands them to
//! the embedder one at a time, checks the result keeps its dimensions, and
//! writes it under the source file name. Unlike the attack executor, the
//! default policy is to keep outputs that already exist.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{EmbedError, Result};
use crate::executor::{save_image, WritePolicy};
use crate::report::{Failure, FailureStage, RunReport};

/// Scenario identifier used for embedding runs in a [`RunReport`].
pub const EMBED_SCENARIO: &str = "embed";

/// Maps an image to a watermarked image of identical dimensions.
pub trait WatermarkEmbedder {
    /// Embed a watermark.
    ///
    /// # Errors
    ///
    /// Any embedder failure; it is reported for that image and not retried.
    fn embed(&self, image: &RgbImage) -> std::result::Result<RgbImage, EmbedError>;
}

impl<F> WatermarkEmbedder for F
where
    F: Fn(&RgbImage) -> std::result::Result<RgbImage, EmbedError>,
{
    fn embed(&self, image: &RgbImage) -> std::result::Result<RgbImage, EmbedError> {
        self(image)
    }
}

/// Options for an embedding run.
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    /// Existing-output policy.
    pub write_policy: WritePolicy,
    /// JPEG quality for `.jpg` outputs.
    pub output_quality: u8,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            write_policy: WritePolicy::SkipExisting,
            output_quality: 75,
        }
    }
}

/// Watermark every file in `sources` into `output_dir`.
///
/// # Errors
///
/// Only fails if `output_dir` cannot be created; per-image failures are
/// recorded in the report.
pub fn embed_files<E: WatermarkEmbedder + ?Sized>(
    embedder: &E,
    sources: &[PathBuf],
    output_dir: &Path,
    opts: &EmbedOptions,
) -> Result<RunReport> {
    fs::create_dir_all(output_dir)?;

    let mut report = RunReport::new();
    report.add_scenario(EMBED_SCENARIO, "Embed watermark", None);

    let total = sources.len();
    for (idx, input) in sources.iter().enumerate() {
        report.record_image();
        let file_name = input.file_name().unwrap_or_else(|| input.as_os_str());
        let image = file_name.to_string_lossy().into_owned();
        let output = output_dir.join(file_name);

        if opts.write_policy == WritePolicy::SkipExisting && output.exists() {
            tracing::info!("[{}/{}] skipping (already exists): {image}", idx + 1, total);
            report.record_skip(EMBED_SCENARIO, &image);
            continue;
        }
        tracing::info!("[{}/{}] embedding: {image}", idx + 1, total);

        match embed_one(embedder, input, &output, opts.output_quality) {
            Ok(()) => report.record_success(EMBED_SCENARIO, &image),
            Err((stage, message)) => {
                tracing::warn!(image = %image, error = %message, "embedding failed");
                report.record_failure(Failure {
                    image,
                    scenario: if stage == FailureStage::SourceDecode {
                        None
                    } else {
                        Some(EMBED_SCENARIO.to_string())
                    },
                    stage,
                    message,
                });
            }
        }
    }
    Ok(report)
}

fn embed_one<E: WatermarkEmbedder + ?Sized>(
    embedder: &E,
    input: &Path,
    output: &Path,
    quality: u8,
) -> std::result::Result<(), (FailureStage, String)> {
    let source = image::open(input)
        .map_err(|e| (FailureStage::SourceDecode, e.to_string()))?
        .to_rgb8();

    let marked = embedder
        .embed(&source)
        .map_err(|e| (FailureStage::Collaborator, e.to_string()))?;
    if marked.dimensions() != source.dimensions() {
        return Err((
            FailureStage::Collaborator,
            format!(
                "embedder changed dimensions from {}x{} to {}x{}",
                source.width(),
                source.height(),
                marked.width(),
                marked.height()
            ),
        ));
    }

    save_image(&marked, output, quality).map_err(|e| (FailureStage::OutputWrite, e.to_string()))
}

/// Pick `count` distinct names at random, reproducibly for a given `seed`.
///
/// Returns every name (shuffled) when `count` exceeds the input length.
#[must_use]
pub fn select_sample(names: &[String], count: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    names.choose_multiple(&mut rng, count).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invert(image: &RgbImage) -> std::result::Result<RgbImage, EmbedError> {
        let mut out = image.clone();
        image::imageops::invert(&mut out);
        Ok(out)
    }

    fn write_source(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(12, 10, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn embeds_and_skips_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_source(dir.path(), "a.png");
        let b = write_source(dir.path(), "b.png");
        let out = dir.path().join("seal");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("b.png"), b"already there").unwrap();

        let report = embed_files(&invert, &[a, b], &out, &EmbedOptions::default()).unwrap();
        let summary = report.summarize();
        assert_eq!(summary.images, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failures.is_empty());

        let marked = image::open(out.join("a.png")).unwrap().to_rgb8();
        assert_eq!(marked.get_pixel(0, 0), &image::Rgb([245, 235, 225]));
        assert_eq!(fs::read(out.join("b.png")).unwrap(), b"already there");
    }

    #[test]
    fn embedder_failure_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_source(dir.path(), "a.png");
        let bad = dir.path().join("broken.png");
        fs::write(&bad, b"not a png").unwrap();
        let out = dir.path().join("out");

        let failing = |_: &RgbImage| -> std::result::Result<RgbImage, EmbedError> {
            Err(EmbedError("model unavailable".into()))
        };
        let report = embed_files(&failing, &[bad, a], &out, &EmbedOptions::default()).unwrap();
        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].stage, FailureStage::SourceDecode);
        assert_eq!(failures[1].stage, FailureStage::Collaborator);
        assert!(failures[1].message.contains("model unavailable"));
        assert!(!out.join("a.png").exists());
    }

    #[test]
    fn dimension_change_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_source(dir.path(), "a.png");
        let out = dir.path().join("out");

        let shrink = |img: &RgbImage| -> std::result::Result<RgbImage, EmbedError> {
            Ok(RgbImage::new(img.width() / 2, img.height()))
        };
        let report = embed_files(&shrink, &[a], &out, &EmbedOptions::default()).unwrap();
        assert_eq!(report.summarize().succeeded, 0);
        assert!(report.failures()[0].message.contains("12x10 to 6x10"));
    }

    #[test]
    fn sample_is_reproducible_and_distinct() {
        let names: Vec<String> = (0..50).map(|i| format!("img_{i}.jpg")).collect();
        let first = select_sample(&names, 20, 42);
        let second = select_sample(&names, 20, 42);
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);

        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 20);

        assert_eq!(select_sample(&names[..3], 20, 1).len(), 3);
    }
}
