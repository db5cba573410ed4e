//! Transform operators that simulate watermark attacks.
//!
//! Every operator reads an [`RgbImage`] and returns a new one; inputs are
//! never modified, so a single decoded source can feed any number of
//! scenarios. Codec-based operators round-trip through an in-memory buffer
//! and always decode back to a raster before returning.

use std::fmt;
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::error::TransformError;

/// Resampling filter shared by every resize step.
const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// Blur sigma used by the screenshot operator unless overridden.
pub const DEFAULT_SCREENSHOT_BLUR: f32 = 0.5;

/// A single image degradation with its parameters bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attack {
    /// Lossy JPEG round-trip at `quality` (1-100).
    JpegCompress {
        /// Encoder quality; higher means less distortion.
        quality: u8,
    },
    /// Downsample by `scale` (0, 1], then upsample back to the original size.
    Resize {
        /// Downsample factor.
        scale: f32,
    },
    /// Remove `percent / 2` of each dimension from every side.
    Crop {
        /// Total fraction of each axis removed, in percent `[0, 100)`.
        percent: f32,
    },
    /// Same geometry as [`Attack::Crop`], then resize back to the original size.
    CropRestore {
        /// Total fraction of each axis removed, in percent `[0, 100)`.
        percent: f32,
    },
    /// Lossless PNG round-trip followed by a light Gaussian blur.
    Screenshot {
        /// Blur standard deviation in pixels.
        blur_sigma: f32,
    },
    /// Additive zero-mean Gaussian noise per pixel and channel.
    GaussianNoise {
        /// Noise standard deviation in intensity units.
        sigma: f32,
    },
}

impl Attack {
    /// Screenshot simulation with the default blur.
    #[must_use]
    pub const fn screenshot() -> Self {
        Self::Screenshot {
            blur_sigma: DEFAULT_SCREENSHOT_BLUR,
        }
    }

    /// Short operator name used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JpegCompress { .. } => "jpeg",
            Self::Resize { .. } => "resize",
            Self::Crop { .. } => "crop",
            Self::CropRestore { .. } => "crop-restore",
            Self::Screenshot { .. } => "screenshot",
            Self::GaussianNoise { .. } => "noise",
        }
    }

    /// Check the bound parameters without touching an image.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::InvalidParameter`] for out-of-range values and
    /// [`TransformError::Degenerate`] for a crop of 100% or more.
    pub fn validate(&self) -> Result<(), TransformError> {
        let operator = self.name();
        let invalid = |reason: String| Err(TransformError::InvalidParameter { operator, reason });
        match *self {
            Self::JpegCompress { quality } => {
                if !(1..=100).contains(&quality) {
                    return invalid(format!("quality {quality} outside 1..=100"));
                }
            }
            Self::Resize { scale } => {
                if !(scale.is_finite() && scale > 0.0 && scale <= 1.0) {
                    return invalid(format!("scale {scale} outside (0, 1]"));
                }
            }
            Self::Crop { percent } | Self::CropRestore { percent } => {
                if !percent.is_finite() || percent < 0.0 {
                    return invalid(format!("percent {percent} must be a finite value >= 0"));
                }
                if percent >= 100.0 {
                    return Err(TransformError::Degenerate {
                        operator,
                        width: 0,
                        height: 0,
                    });
                }
            }
            Self::Screenshot { blur_sigma } => {
                if !blur_sigma.is_finite() || blur_sigma < 0.0 {
                    return invalid(format!("blur sigma {blur_sigma} must be a finite value >= 0"));
                }
            }
            Self::GaussianNoise { sigma } => {
                if !sigma.is_finite() || sigma < 0.0 {
                    return invalid(format!("sigma {sigma} must be a finite value >= 0"));
                }
            }
        }
        Ok(())
    }

    /// Apply the attack, returning a new image.
    ///
    /// `rng` is only consumed by [`Attack::GaussianNoise`].
    ///
    /// # Errors
    ///
    /// Fails on an empty input image, invalid parameters, degenerate
    /// geometry, or a codec failure of the intermediate buffer.
    pub fn apply(
        &self,
        image: &RgbImage,
        rng: &mut dyn RngCore,
    ) -> Result<RgbImage, TransformError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage { width, height });
        }
        self.validate().map_err(|e| match e {
            TransformError::Degenerate { operator, .. } => TransformError::Degenerate {
                operator,
                width,
                height,
            },
            other => other,
        })?;

        match *self {
            Self::JpegCompress { quality } => jpeg_compress(image, quality),
            Self::Resize { scale } => resize_down_up(image, scale),
            Self::Crop { percent } => center_crop(image, percent),
            Self::CropRestore { percent } => {
                let cropped = center_crop(image, percent)?;
                Ok(imageops::resize(&cropped, width, height, RESAMPLE_FILTER))
            }
            Self::Screenshot { blur_sigma } => screenshot(image, blur_sigma),
            Self::GaussianNoise { sigma } => gaussian_noise(image, sigma, rng),
        }
    }
}

impl fmt::Display for Attack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::JpegCompress { quality } => write!(f, "JPEG {quality}"),
            Self::Resize { scale } => write!(f, "Resize {}%", scale_percent(scale)),
            Self::Crop { percent } => write!(f, "Crop {percent}%"),
            Self::CropRestore { percent } => write!(f, "Crop {percent}% (restored)"),
            Self::Screenshot { .. } => write!(f, "Screenshot"),
            Self::GaussianNoise { sigma } => write!(f, "Noise σ={sigma}"),
        }
    }
}

/// `scale` as a percentage, rounded to drop `f32` representation noise.
fn scale_percent(scale: f32) -> f64 {
    (f64::from(scale) * 100_000.0).round() / 1000.0
}

/// Round-trip through an in-memory JPEG at `quality`.
fn jpeg_compress(image: &RgbImage, quality: u8) -> Result<RgbImage, TransformError> {
    let codec = |source| TransformError::Codec {
        operator: "jpeg",
        source,
    };
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(codec)?;
    let decoded = image::load_from_memory_with_format(&buf, ImageFormat::Jpeg).map_err(codec)?;
    Ok(decoded.to_rgb8())
}

/// Downsample to `round(w * scale) x round(h * scale)`, then back up.
fn resize_down_up(image: &RgbImage, scale: f32) -> Result<RgbImage, TransformError> {
    let (width, height) = image.dimensions();
    let small_w = scaled_dimension(width, scale);
    let small_h = scaled_dimension(height, scale);
    if small_w == 0 || small_h == 0 {
        return Err(TransformError::Degenerate {
            operator: "resize",
            width,
            height,
        });
    }
    let small = imageops::resize(image, small_w, small_h, RESAMPLE_FILTER);
    Ok(imageops::resize(&small, width, height, RESAMPLE_FILTER))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_dimension(value: u32, scale: f32) -> u32 {
    (f64::from(value) * f64::from(scale)).round() as u32
}

/// Border width removed from each side of an axis of length `len`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn crop_margin(len: u32, percent: f32) -> u32 {
    (f64::from(len) * f64::from(percent) / 200.0).floor() as u32
}

fn center_crop(image: &RgbImage, percent: f32) -> Result<RgbImage, TransformError> {
    let (width, height) = image.dimensions();
    let left = crop_margin(width, percent);
    let top = crop_margin(height, percent);
    let new_w = width.saturating_sub(2 * left);
    let new_h = height.saturating_sub(2 * top);
    if new_w == 0 || new_h == 0 {
        return Err(TransformError::Degenerate {
            operator: "crop",
            width,
            height,
        });
    }
    Ok(imageops::crop_imm(image, left, top, new_w, new_h).to_image())
}

/// Lossless PNG round-trip, then blur.
fn screenshot(image: &RgbImage, blur_sigma: f32) -> Result<RgbImage, TransformError> {
    let codec = |source| TransformError::Codec {
        operator: "screenshot",
        source,
    };
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).map_err(codec)?;
    let decoded = image::load_from_memory_with_format(buf.get_ref(), ImageFormat::Png)
        .map_err(codec)?
        .to_rgb8();

    // imageops::blur substitutes sigma 1.0 for non-positive values.
    if blur_sigma <= 0.0 {
        return Ok(decoded);
    }
    Ok(imageops::blur(&decoded, blur_sigma))
}

fn gaussian_noise(
    image: &RgbImage,
    sigma: f32,
    rng: &mut dyn RngCore,
) -> Result<RgbImage, TransformError> {
    if sigma == 0.0 {
        return Ok(image.clone());
    }
    let normal = Normal::new(0.0_f32, sigma).map_err(|e| TransformError::InvalidParameter {
        operator: "noise",
        reason: e.to_string(),
    })?;

    let mut noisy = image.clone();
    for px in noisy.pixels_mut() {
        for ch in &mut px.0 {
            let value = f32::from(*ch) + normal.sample(&mut *rng);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *ch = value.clamp(0.0, 255.0).round() as u8;
            }
        }
    }
    Ok(noisy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[allow(clippy::cast_possible_truncation)]
    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn resize_preserves_dimensions() {
        let img = gradient(101, 67);
        for scale in [0.25, 0.5, 0.75, 1.0] {
            let out = Attack::Resize { scale }.apply(&img, &mut rng()).unwrap();
            assert_eq!(out.dimensions(), (101, 67), "scale {scale}");
        }
    }

    #[test]
    fn resize_rejects_degenerate_scale() {
        let img = gradient(3, 3);
        let err = Attack::Resize { scale: 0.1 }.apply(&img, &mut rng()).unwrap_err();
        assert!(matches!(err, TransformError::Degenerate { .. }));

        let err = Attack::Resize { scale: 1.5 }.apply(&img, &mut rng()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameter { .. }));
    }

    #[test]
    fn crop_restore_preserves_dimensions() {
        let img = gradient(100, 80);
        for percent in [5.0, 10.0, 25.0, 40.0] {
            let out = Attack::CropRestore { percent }.apply(&img, &mut rng()).unwrap();
            assert_eq!(out.dimensions(), (100, 80));
        }
    }

    #[test]
    fn crop_zero_is_identity() {
        let img = gradient(64, 48);
        let out = Attack::Crop { percent: 0.0 }.apply(&img, &mut rng()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn crop_removes_more_border_as_percent_grows() {
        let img = gradient(100, 100);
        let sizes: Vec<_> = [0.0, 10.0, 25.0, 40.0]
            .into_iter()
            .map(|percent| Attack::Crop { percent }.apply(&img, &mut rng()).unwrap().dimensions())
            .collect();
        assert_eq!(sizes, vec![(100, 100), (90, 90), (76, 76), (60, 60)]);
    }

    #[test]
    fn crop_keeps_the_center() {
        let img = gradient(100, 100);
        let out = Attack::Crop { percent: 10.0 }.apply(&img, &mut rng()).unwrap();
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(5, 5));
    }

    #[test]
    fn crop_of_full_image_is_degenerate() {
        let img = gradient(10, 10);
        for attack in [
            Attack::Crop { percent: 100.0 },
            Attack::CropRestore { percent: 150.0 },
        ] {
            let err = attack.apply(&img, &mut rng()).unwrap_err();
            assert!(
                matches!(err, TransformError::Degenerate { width: 10, height: 10, .. }),
                "{attack}: {err}"
            );
        }
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let img = gradient(37, 23);
        for quality in [95, 50, 1] {
            let out = Attack::JpegCompress { quality }.apply(&img, &mut rng()).unwrap();
            assert_eq!(out.dimensions(), (37, 23));
        }
    }

    #[test]
    fn jpeg_rejects_quality_zero() {
        let err = Attack::JpegCompress { quality: 0 }
            .apply(&gradient(8, 8), &mut rng())
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameter { .. }));
    }

    #[test]
    fn screenshot_blurs_sharp_edges() {
        let img = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let out = Attack::screenshot().apply(&img, &mut rng()).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        let left = out.get_pixel(9, 10)[0];
        let right = out.get_pixel(10, 10)[0];
        assert!(left > 0 && right < 255, "edge not softened: {left} {right}");
    }

    #[test]
    fn noise_zero_sigma_is_identity() {
        let img = gradient(30, 30);
        let out = Attack::GaussianNoise { sigma: 0.0 }.apply(&img, &mut rng()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn noise_stays_in_bounds_and_changes_pixels() {
        let img = RgbImage::from_fn(40, 40, |x, _| {
            if x % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let out = Attack::GaussianNoise { sigma: 50.0 }.apply(&img, &mut rng()).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        assert_ne!(out, img);
    }

    #[test]
    fn noise_is_reproducible_with_fixed_seed() {
        let img = gradient(32, 32);
        let attack = Attack::GaussianNoise { sigma: 10.0 };
        let a = attack.apply(&img, &mut rng()).unwrap();
        let b = attack.apply(&img, &mut rng()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn noise_rejects_negative_sigma() {
        let err = Attack::GaussianNoise { sigma: -1.0 }
            .apply(&gradient(4, 4), &mut rng())
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameter { .. }));
    }

    #[test]
    fn empty_image_is_rejected_by_every_operator() {
        let img = RgbImage::new(0, 10);
        for attack in [
            Attack::JpegCompress { quality: 75 },
            Attack::Resize { scale: 0.5 },
            Attack::Crop { percent: 10.0 },
            Attack::screenshot(),
            Attack::GaussianNoise { sigma: 5.0 },
        ] {
            let err = attack.apply(&img, &mut rng()).unwrap_err();
            assert!(matches!(err, TransformError::EmptyImage { .. }), "{attack}");
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let img = gradient(16, 16);
        let copy = img.clone();
        let _ = Attack::GaussianNoise { sigma: 20.0 }.apply(&img, &mut rng()).unwrap();
        let _ = Attack::Crop { percent: 25.0 }.apply(&img, &mut rng()).unwrap();
        assert_eq!(img, copy);
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(Attack::JpegCompress { quality: 75 }.to_string(), "JPEG 75");
        assert_eq!(Attack::Resize { scale: 0.75 }.to_string(), "Resize 75%");
        assert_eq!(Attack::Crop { percent: 10.0 }.to_string(), "Crop 10%");
        assert_eq!(Attack::screenshot().to_string(), "Screenshot");
    }

    #[test]
    fn resize_label_has_no_float_noise() {
        assert_eq!(Attack::Resize { scale: 0.3 }.to_string(), "Resize 30%");
        assert_eq!(Attack::Resize { scale: 0.2 }.to_string(), "Resize 20%");
        assert_eq!(Attack::Resize { scale: 0.125 }.to_string(), "Resize 12.5%");
    }
}
