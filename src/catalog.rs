//! Scenario definitions and the built-in attack catalogs.
//!
//! A [`Scenario`] is an ordered chain of [`Step`]s; a [`Catalog`] is an
//! insertion-ordered set of scenarios with unique identifiers. Identifiers
//! double as output subdirectory names.

use std::collections::HashSet;

use rand::RngCore;

use crate::attack::Attack;
use crate::error::{CatalogError, StepError};

/// One attack in a scenario chain, with an optional display label.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The operator and its parameters.
    pub attack: Attack,
    label: Option<String>,
}

impl Step {
    /// A step labelled by its attack's display form.
    #[must_use]
    pub fn new(attack: Attack) -> Self {
        Self {
            attack,
            label: None,
        }
    }

    /// A step with an explicit report label.
    #[must_use]
    pub fn labelled(attack: Attack, label: impl Into<String>) -> Self {
        Self {
            attack,
            label: Some(label.into()),
        }
    }

    /// Label shown in progress logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.attack.to_string())
    }
}

impl From<Attack> for Step {
    fn from(attack: Attack) -> Self {
        Self::new(attack)
    }
}

/// A named, ordered chain of attacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    id: String,
    description: Option<String>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a scenario from its identifier and steps.
    pub fn new<S: Into<Step>>(id: impl Into<String>, steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            description: None,
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-step scenario.
    pub fn single(id: impl Into<String>, attack: Attack) -> Self {
        Self::new(id, [attack])
    }

    /// Attach a one-line description shown in the run summary.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identifier, also the output subdirectory name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional human-readable description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step labels joined with arrows, e.g. `JPEG 75 → Screenshot`.
    #[must_use]
    pub fn trace(&self) -> String {
        self.steps
            .iter()
            .map(Step::label)
            .collect::<Vec<_>>()
            .join(" → ")
    }

    /// Run every step in declared order; each step consumes the previous
    /// step's output. `image` itself is never modified.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] naming the first step that failed.
    pub fn apply(
        &self,
        image: &image::RgbImage,
        rng: &mut dyn RngCore,
    ) -> Result<image::RgbImage, StepError> {
        let mut current: Option<image::RgbImage> = None;
        for (index, step) in self.steps.iter().enumerate() {
            let input = current.as_ref().unwrap_or(image);
            let next = step.attack.apply(input, rng).map_err(|source| StepError {
                index,
                label: step.label(),
                source,
            })?;
            current = Some(next);
        }
        Ok(current.unwrap_or_else(|| image.clone()))
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if !is_valid_dir_name(&self.id) {
            return Err(CatalogError::InvalidId(self.id.clone()));
        }
        if self.steps.is_empty() {
            return Err(CatalogError::EmptyScenario(self.id.clone()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.attack
                .validate()
                .map_err(|source| CatalogError::InvalidStep {
                    scenario: self.id.clone(),
                    index,
                    source,
                })?;
        }
        Ok(())
    }
}

fn is_valid_dir_name(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_control)
}

/// Insertion-ordered registry of scenarios with unique identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    scenarios: Vec<Scenario>,
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, rejecting the first invalid or duplicate scenario.
    ///
    /// # Errors
    ///
    /// See [`Catalog::insert`].
    pub fn from_scenarios(
        scenarios: impl IntoIterator<Item = Scenario>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        let mut seen = HashSet::new();
        for scenario in scenarios {
            if !seen.insert(scenario.id.clone()) {
                return Err(CatalogError::DuplicateScenario(scenario.id));
            }
            scenario.validate()?;
            catalog.scenarios.push(scenario);
        }
        Ok(catalog)
    }

    /// Append a scenario.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateScenario`] if the identifier is taken,
    /// and [`CatalogError::InvalidId`], [`CatalogError::EmptyScenario`] or
    /// [`CatalogError::InvalidStep`] for a malformed scenario.
    pub fn insert(&mut self, scenario: Scenario) -> Result<(), CatalogError> {
        if self.get(&scenario.id).is_some() {
            return Err(CatalogError::DuplicateScenario(scenario.id));
        }
        scenario.validate()?;
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Look up a scenario by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Scenarios in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    /// Number of scenarios.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether the catalog has no scenarios.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// One scenario per single attack: JPEG, resize, crop-only, screenshot
    /// and noise at the standard strengths.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the definitions go through the same
    /// validation as user-supplied catalogs.
    pub fn single_attacks() -> Result<Self, CatalogError> {
        use Attack::{Crop, GaussianNoise, JpegCompress, Resize};

        Self::from_scenarios([
            Scenario::single("jpeg_95", JpegCompress { quality: 95 }),
            Scenario::single("jpeg_75", JpegCompress { quality: 75 }),
            Scenario::single("jpeg_50", JpegCompress { quality: 50 }),
            Scenario::single("jpeg_30", JpegCompress { quality: 30 }),
            Scenario::single("resize_50", Resize { scale: 0.5 }),
            Scenario::single("resize_75", Resize { scale: 0.75 }),
            Scenario::single("crop_10", Crop { percent: 10.0 }),
            Scenario::single("crop_25", Crop { percent: 25.0 }),
            Scenario::single("crop_40", Crop { percent: 40.0 }),
            Scenario::single("screenshot", Attack::screenshot()),
            Scenario::single("noise_light", GaussianNoise { sigma: 5.0 }),
            Scenario::single("noise_medium", GaussianNoise { sigma: 10.0 }),
        ])
    }

    /// Multi-step chains modelling real distribution paths. Crops here
    /// restore the original canvas size.
    ///
    /// # Errors
    ///
    /// Never fails in practice; see [`Catalog::single_attacks`].
    pub fn combined_attacks() -> Result<Self, CatalogError> {
        fn jpeg(quality: u8) -> Attack {
            Attack::JpegCompress { quality }
        }
        fn resize(scale: f32) -> Attack {
            Attack::Resize { scale }
        }
        fn crop(percent: f32) -> Attack {
            Attack::CropRestore { percent }
        }
        fn noise(sigma: f32) -> Step {
            Step::labelled(Attack::GaussianNoise { sigma }, "Noise")
        }
        fn crop_step(percent: f32) -> Step {
            Step::labelled(crop(percent), format!("Crop {percent}%"))
        }
        let shot = Attack::screenshot;

        Self::from_scenarios([
            Scenario::new("social_light", [jpeg(75), shot()])
                .with_description("Basic social media share"),
            Scenario::new("social_heavy", [jpeg(50), resize(0.75), jpeg(50)])
                .with_description("Repeated shares with resizing"),
            Scenario::new(
                "screenshot_crop",
                [shot().into(), crop_step(10.0), jpeg(75).into()],
            )
            .with_description("Screenshot with light editing"),
            Scenario::new(
                "screenshot_heavy",
                [shot().into(), crop_step(25.0), jpeg(50).into()],
            )
            .with_description("Screenshot with heavy editing"),
            Scenario::new(
                "intentional_light",
                [resize(0.75).into(), noise(5.0), jpeg(50).into()],
            )
            .with_description("Light removal attempt"),
            Scenario::new(
                "intentional_heavy",
                [
                    resize(0.5).into(),
                    crop_step(10.0),
                    noise(10.0),
                    jpeg(30).into(),
                ],
            )
            .with_description("Aggressive removal attempt"),
            Scenario::new(
                "viral_repost",
                [
                    jpeg(75).into(),
                    shot().into(),
                    crop_step(5.0),
                    jpeg(65).into(),
                    jpeg(50).into(),
                ],
            )
            .with_description("Viral content reposted many times"),
            Scenario::new("thumbnail", [resize(0.25), jpeg(75)])
                .with_description("Extreme size reduction"),
            Scenario::new("crop_compress_light", [crop_step(15.0), jpeg(60).into()])
                .with_description("Quick basic edit"),
            Scenario::new("crop_compress_heavy", [crop_step(30.0), jpeg(40).into()])
                .with_description("Quick aggressive edit"),
        ])
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Scenario;
    type IntoIter = std::slice::Iter<'a, Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenarios.iter()
    }
}

/// Which built-in catalog to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogKind {
    /// [`Catalog::single_attacks`].
    #[default]
    Single,
    /// [`Catalog::combined_attacks`].
    Combined,
}

impl CatalogKind {
    /// Build the catalog.
    ///
    /// # Errors
    ///
    /// Propagates catalog validation errors.
    pub fn catalog(self) -> Result<Catalog, CatalogError> {
        match self {
            Self::Single => Catalog::single_attacks(),
            Self::Combined => Catalog::combined_attacks(),
        }
    }

    /// Suffix appended to the source directory for the default output root.
    #[must_use]
    pub const fn output_suffix(self) -> &'static str {
        match self {
            Self::Single => "_attacks",
            Self::Combined => "_combined_attacks",
        }
    }

    /// JPEG quality used when writing outputs with a `.jpg` extension.
    #[must_use]
    pub const fn output_quality(self) -> u8 {
        match self {
            Self::Single => 75,
            Self::Combined => 95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ids(catalog: &Catalog) -> Vec<&str> {
        catalog.iter().map(Scenario::id).collect()
    }

    #[test]
    fn single_catalog_has_expected_entries_in_order() {
        let catalog = Catalog::single_attacks().unwrap();
        assert_eq!(
            ids(&catalog),
            vec![
                "jpeg_95",
                "jpeg_75",
                "jpeg_50",
                "jpeg_30",
                "resize_50",
                "resize_75",
                "crop_10",
                "crop_25",
                "crop_40",
                "screenshot",
                "noise_light",
                "noise_medium",
            ]
        );
        assert!(catalog.iter().all(|s| s.steps().len() == 1));
        assert_eq!(
            catalog.get("crop_25").unwrap().steps()[0].attack,
            Attack::Crop { percent: 25.0 }
        );
    }

    #[test]
    fn combined_catalog_chains_are_ordered() {
        let catalog = Catalog::combined_attacks().unwrap();
        assert_eq!(catalog.len(), 10);

        let viral = catalog.get("viral_repost").unwrap();
        let attacks: Vec<_> = viral.steps().iter().map(|s| s.attack).collect();
        assert_eq!(
            attacks,
            vec![
                Attack::JpegCompress { quality: 75 },
                Attack::screenshot(),
                Attack::CropRestore { percent: 5.0 },
                Attack::JpegCompress { quality: 65 },
                Attack::JpegCompress { quality: 50 },
            ]
        );
        assert_eq!(
            viral.trace(),
            "JPEG 75 → Screenshot → Crop 5% → JPEG 65 → JPEG 50"
        );
        assert!(catalog.iter().all(|s| s.description().is_some()));
    }

    #[test]
    fn duplicate_identifier_fails_fast() {
        let err = Catalog::from_scenarios([
            Scenario::single("a", Attack::JpegCompress { quality: 90 }),
            Scenario::single("a", Attack::Resize { scale: 0.5 }),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateScenario(id) if id == "a"));

        let mut catalog = Catalog::new();
        catalog
            .insert(Scenario::single("b", Attack::screenshot()))
            .unwrap();
        assert!(catalog
            .insert(Scenario::single("b", Attack::screenshot()))
            .is_err());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn malformed_scenarios_are_rejected() {
        let empty = Scenario::new("nothing", Vec::<Step>::new());
        assert!(matches!(
            Catalog::from_scenarios([empty]),
            Err(CatalogError::EmptyScenario(_))
        ));

        let bad_id = Scenario::single("../escape", Attack::screenshot());
        assert!(matches!(
            Catalog::from_scenarios([bad_id]),
            Err(CatalogError::InvalidId(_))
        ));

        let bad_step = Scenario::new(
            "bad",
            [
                Attack::JpegCompress { quality: 80 },
                Attack::Crop { percent: 120.0 },
            ],
        );
        assert!(matches!(
            Catalog::from_scenarios([bad_step]),
            Err(CatalogError::InvalidStep { index: 1, .. })
        ));
    }

    #[test]
    fn scenario_reports_failing_step_index() {
        let scenario = Scenario::new(
            "chain",
            [Attack::Crop { percent: 50.0 }, Attack::Resize { scale: 0.2 }],
        );
        let img = image::RgbImage::new(4, 4);
        let err = scenario
            .apply(&img, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.label, "Resize 20%");
    }

    #[test]
    fn scenario_steps_run_in_declared_order() {
        let img = image::RgbImage::new(100, 100);
        let double_crop = Scenario::new(
            "a",
            [Attack::Crop { percent: 50.0 }, Attack::Crop { percent: 50.0 }],
        );
        let out = double_crop
            .apply(&img, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        // 100 -> 50 -> 26: the second crop sees the first crop's output.
        assert_eq!(out.dimensions(), (26, 26));
    }

    #[test]
    fn catalog_kind_defaults() {
        assert_eq!(CatalogKind::Single.output_suffix(), "_attacks");
        assert_eq!(CatalogKind::Combined.output_suffix(), "_combined_attacks");
        assert_eq!(CatalogKind::Combined.catalog().unwrap().len(), 10);
    }
}
