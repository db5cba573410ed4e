//! Batch executor: every scenario of a catalog against every source image.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::catalog::{Catalog, CatalogKind, Scenario};
use crate::error::{Error, Result};
use crate::report::{Failure, FailureStage, Outcome, RunReport};

/// What to do when an output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Keep the existing file and record a skip.
    SkipExisting,
}

/// Options controlling a batch run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Seed for the noise operator. `None` draws fresh entropy per
    /// (image, scenario) pair.
    pub seed: Option<u64>,
    /// JPEG quality used when the output extension is `.jpg`/`.jpeg`.
    pub output_quality: u8,
    /// Existing-output policy.
    pub write_policy: WritePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seed: None,
            output_quality: 75,
            write_policy: WritePolicy::Overwrite,
        }
    }
}

impl RunOptions {
    /// Defaults for one of the built-in catalogs.
    #[must_use]
    pub fn for_kind(kind: CatalogKind) -> Self {
        Self {
            output_quality: kind.output_quality(),
            ..Self::default()
        }
    }
}

/// Applies a [`Catalog`] to directories of images.
///
/// The executor holds no state between runs; the output directory tree is
/// the only thing a run leaves behind.
#[derive(Debug, Clone)]
pub struct Executor {
    catalog: Catalog,
    options: RunOptions,
}

impl Executor {
    /// Create an executor for `catalog`.
    #[must_use]
    pub fn new(catalog: Catalog, options: RunOptions) -> Self {
        Self { catalog, options }
    }

    /// The scenarios this executor runs.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run options.
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Discover images in `source_dir`, create one subdirectory per
    /// scenario under `output_dir`, and process every image.
    ///
    /// # Errors
    ///
    /// Only fails if the source directory cannot be listed or an output
    /// subdirectory cannot be created. Per-image problems are recorded in
    /// the returned report.
    pub fn run(&self, source_dir: &Path, output_dir: &Path) -> Result<RunReport> {
        let sources = discover_images(source_dir)?;
        self.prepare_output_dirs(output_dir)?;
        Ok(self.run_files(&sources, output_dir))
    }

    /// Create `output_dir/<scenario_id>` for every scenario. Existing
    /// directories are reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a directory cannot be created.
    pub fn prepare_output_dirs(&self, output_dir: &Path) -> Result<()> {
        for scenario in &self.catalog {
            fs::create_dir_all(output_dir.join(scenario.id()))?;
        }
        Ok(())
    }

    /// Process `sources` into already-prepared output directories.
    ///
    /// Images are processed in parallel when the `cli` feature is enabled;
    /// outcomes are folded into the report in `sources` order either way.
    #[must_use]
    pub fn run_files(&self, sources: &[PathBuf], output_dir: &Path) -> RunReport {
        let total = sources.len();
        tracing::info!(
            images = total,
            scenarios = self.catalog.len(),
            output = %output_dir.display(),
            "starting attack run"
        );

        let process = |(idx, input): (usize, &PathBuf)| {
            tracing::info!("[{}/{}] {}", idx + 1, total, input.display());
            self.process_file(input, output_dir)
        };

        #[cfg(feature = "cli")]
        let per_image: Vec<Vec<Outcome>> = {
            use rayon::prelude::*;
            sources.par_iter().enumerate().map(process).collect()
        };

        #[cfg(not(feature = "cli"))]
        let per_image: Vec<Vec<Outcome>> = sources.iter().enumerate().map(process).collect();

        let mut report = self.new_report();
        for outcomes in per_image {
            report.record_image();
            for outcome in outcomes {
                report.record(outcome);
            }
        }
        report
    }

    /// Decode one source image and run every scenario on it.
    ///
    /// Returns a single [`FailureStage::SourceDecode`] failure if the source
    /// cannot be decoded, otherwise one outcome per scenario in catalog order.
    #[must_use]
    pub fn process_file(&self, input: &Path, output_dir: &Path) -> Vec<Outcome> {
        let file_name = input.file_name().unwrap_or_else(|| input.as_os_str());
        let image_name = file_name.to_string_lossy().into_owned();

        let source = match image::open(input) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(image = %image_name, error = %e, "failed to decode source image");
                return vec![Outcome::Failed(Failure {
                    image: image_name,
                    scenario: None,
                    stage: FailureStage::SourceDecode,
                    message: e.to_string(),
                })];
            }
        };

        self.catalog
            .iter()
            .map(|scenario| self.run_scenario(scenario, &source, file_name, output_dir))
            .collect()
    }

    fn run_scenario(
        &self,
        scenario: &Scenario,
        source: &RgbImage,
        file_name: &OsStr,
        output_dir: &Path,
    ) -> Outcome {
        let image = file_name.to_string_lossy().into_owned();
        let id = scenario.id().to_string();
        let path = output_dir.join(&id).join(file_name);

        if self.options.write_policy == WritePolicy::SkipExisting && path.exists() {
            tracing::debug!(scenario = %id, image = %image, "output exists, skipping");
            return Outcome::Skipped {
                scenario: id,
                image,
                path,
            };
        }

        let mut rng = self.rng_for(&image, &id);
        let attacked = match scenario.apply(source, &mut rng) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(scenario = %id, image = %image, error = %e, "scenario failed");
                remove_stale_output(&path);
                return Outcome::Failed(Failure {
                    image,
                    scenario: Some(id),
                    stage: FailureStage::Step {
                        index: e.index,
                        label: e.label,
                    },
                    message: e.source.to_string(),
                });
            }
        };

        match save_image(&attacked, &path, self.options.output_quality) {
            Ok(()) => {
                tracing::debug!("  ✓ {id}: {}", scenario.trace());
                Outcome::Written {
                    scenario: id,
                    image,
                    path,
                }
            }
            Err(e) => {
                tracing::warn!(
                    scenario = %id,
                    image = %image,
                    error = %e,
                    "failed to write output"
                );
                Outcome::Failed(Failure {
                    image,
                    scenario: Some(id),
                    stage: FailureStage::OutputWrite,
                    message: e.to_string(),
                })
            }
        }
    }

    fn rng_for(&self, image: &str, scenario: &str) -> ChaCha8Rng {
        match self.options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(pair_seed(seed, image, scenario)),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn new_report(&self) -> RunReport {
        let mut report = RunReport::new();
        for scenario in &self.catalog {
            report.add_scenario(scenario.id(), scenario.trace(), scenario.description());
        }
        report
    }
}

/// Drop an earlier run's output for a pair that failed this time, so the
/// output tree agrees with the report. Only reached under `Overwrite`.
fn remove_stale_output(path: &Path) {
    if path.is_file() {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale output"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove stale output");
            }
        }
    }
}

/// Derive the noise seed for one (image, scenario) pair from the run seed.
///
/// Depends only on the names, never on processing order.
#[must_use]
pub fn pair_seed(seed: u64, image: &str, scenario: &str) -> u64 {
    let mut h = seed;
    h = h.wrapping_add(fnv1a(image.as_bytes()).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    h ^= h >> 30;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = h.wrapping_add(fnv1a(scenario.as_bytes()).wrapping_mul(0x517C_C1B7_2722_0A95));
    h ^= h >> 30;
    h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^= h >> 31;
    h
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xCBF2_9CE4_8422_2325;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01B3);
    }
    h
}

/// List supported images directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_supported_image(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Encode an RGB image into `format`. JPEG uses `jpeg_quality`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for formats other than JPEG, PNG,
/// WebP and BMP, or [`Error::Image`] if encoding fails.
pub fn encode_image(img: &RgbImage, format: ImageFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, jpeg_quality)
                .encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.write_to(&mut buf, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }
    Ok(buf.into_inner())
}

/// Save an RGB image in the container implied by `path`'s extension.
///
/// The image is fully encoded in memory before the file is touched, and a
/// file left behind by a failed write is removed.
///
/// # Errors
///
/// Returns an error if the format is unsupported, encoding fails, or
/// writing fails.
pub fn save_image(img: &RgbImage, path: &Path, jpeg_quality: u8) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
    let bytes = encode_image(img, format, jpeg_quality)?;

    if let Err(e) = fs::write(path, &bytes) {
        let _ = fs::remove_file(path);
        return Err(e.into());
    }
    Ok(())
}

/// Default output root: the source directory name plus the catalog suffix.
///
/// Example: `"seal"` becomes `"seal_attacks"`.
#[must_use]
pub fn default_output_dir(source: &Path, kind: CatalogKind) -> PathBuf {
    let mut name = OsString::from(source.components().as_path().as_os_str());
    name.push(kind.output_suffix());
    PathBuf::from(name)
}
