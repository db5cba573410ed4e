//! Generate attacked copies of watermarked images for robustness testing.
//!
//! A [`Catalog`] of named [`Scenario`]s, each an ordered chain of
//! [`Attack`]s (JPEG re-encoding, resize, crop, screenshot simulation,
//! Gaussian noise), is applied by an [`Executor`] to every image in a
//! source directory. Results land in `output/<scenario_id>/<file_name>`,
//! and a [`RunReport`] records what was written and what failed. One bad
//! image or one failing step never stops the batch.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_attacks::{Catalog, Executor, RunOptions};
//!
//! let catalog = Catalog::single_attacks().expect("built-in catalog is valid");
//! let executor = Executor::new(catalog, RunOptions::default());
//! let report = executor.run(Path::new("seal"), Path::new("seal_attacks")).unwrap();
//! println!("{}", report.summarize());
//! ```
//!
//! # Custom scenarios
//!
//! ```
//! use watermark_attacks::{Attack, Catalog, Scenario};
//!
//! let catalog = Catalog::from_scenarios([Scenario::new(
//!     "crop_then_compress",
//!     [Attack::Crop { percent: 25.0 }, Attack::JpegCompress { quality: 50 }],
//! )])
//! .unwrap();
//! assert_eq!(catalog.len(), 1);
//! ```

#![deny(missing_docs)]

pub mod attack;
pub mod catalog;
pub mod embed;
pub mod error;
mod executor;
pub mod generate;
pub mod report;

pub use attack::Attack;
pub use catalog::{Catalog, CatalogKind, Scenario, Step};
pub use error::{CatalogError, Error, Result, StepError, TransformError};
pub use executor::{
    default_output_dir, discover_images, encode_image, is_supported_image, pair_seed, save_image,
    Executor, RunOptions, WritePolicy,
};
pub use report::{Failure, FailureStage, Outcome, RunReport, RunSummary};
