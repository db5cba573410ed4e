//! Outcome accounting for a batch run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Where in the pipeline a (image, scenario) pair failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStage {
    /// The source image could not be decoded; no scenario ran for it.
    SourceDecode,
    /// A transform step failed.
    Step {
        /// Zero-based index of the failing step.
        index: usize,
        /// Label of the failing step.
        label: String,
    },
    /// The collaborator (embedder or generator) failed or returned nothing.
    Collaborator,
    /// The result could not be encoded or written.
    OutputWrite,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceDecode => write!(f, "decode"),
            Self::Step { index, label } => write!(f, "step {index} ({label})"),
            Self::Collaborator => write!(f, "collaborator"),
            Self::OutputWrite => write!(f, "write"),
        }
    }
}

/// A recorded failure for one image and, unless the source itself was
/// unreadable, one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Source file name.
    pub image: String,
    /// Scenario identifier; `None` for source decode failures.
    pub scenario: Option<String>,
    /// Pipeline stage that failed.
    pub stage: FailureStage,
    /// Underlying error message.
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scenario {
            Some(scenario) => write!(
                f,
                "{} [{scenario}] {}: {}",
                self.image, self.stage, self.message
            ),
            None => write!(f, "{} {}: {}", self.image, self.stage, self.message),
        }
    }
}

/// Result for one (image, scenario) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Output written to `path`.
    Written {
        /// Scenario identifier.
        scenario: String,
        /// Source file name.
        image: String,
        /// Output file path.
        path: PathBuf,
    },
    /// Output already existed and the write policy says to keep it.
    Skipped {
        /// Scenario identifier.
        scenario: String,
        /// Source file name.
        image: String,
        /// Existing output file path.
        path: PathBuf,
    },
    /// Nothing written.
    Failed(Failure),
}

/// Accumulates outcomes for one run. Counts only ever grow.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    scenarios: Vec<ScenarioEntry>,
    images: usize,
    succeeded: usize,
    skipped: usize,
    written_per_scenario: BTreeMap<String, usize>,
    failures: Vec<Failure>,
}

#[derive(Debug, Clone)]
struct ScenarioEntry {
    id: String,
    trace: String,
    description: Option<String>,
}

impl RunReport {
    /// Empty report; register scenarios with [`RunReport::add_scenario`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario with its step trace and optional description.
    pub fn add_scenario(
        &mut self,
        id: impl Into<String>,
        trace: impl Into<String>,
        description: Option<&str>,
    ) {
        self.scenarios.push(ScenarioEntry {
            id: id.into(),
            trace: trace.into(),
            description: description.map(str::to_string),
        });
    }

    /// Count one attempted source image.
    pub fn record_image(&mut self) {
        self.images += 1;
    }

    /// Count one written output.
    pub fn record_success(&mut self, scenario: &str, _image: &str) {
        self.succeeded += 1;
        *self
            .written_per_scenario
            .entry(scenario.to_string())
            .or_default() += 1;
    }

    /// Count one output left in place by the skip-existing policy.
    pub fn record_skip(&mut self, _scenario: &str, _image: &str) {
        self.skipped += 1;
    }

    /// Record one failure.
    pub fn record_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Fold an [`Outcome`] into the counts.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Written {
                scenario, image, ..
            } => self.record_success(&scenario, &image),
            Outcome::Skipped {
                scenario, image, ..
            } => self.record_skip(&scenario, &image),
            Outcome::Failed(failure) => self.record_failure(failure),
        }
    }

    /// Step trace registered for `scenario`.
    #[must_use]
    pub fn trace(&self, scenario: &str) -> Option<&str> {
        self.scenarios
            .iter()
            .find(|s| s.id == scenario)
            .map(|s| s.trace.as_str())
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Snapshot the counts.
    #[must_use]
    pub fn summarize(&self) -> RunSummary {
        let mut failures_by_scenario = BTreeMap::new();
        let mut unreadable_images = 0;
        for failure in &self.failures {
            match &failure.scenario {
                Some(id) => *failures_by_scenario.entry(id.clone()).or_insert(0) += 1,
                None => unreadable_images += 1,
            }
        }

        RunSummary {
            images: self.images,
            scenarios: self.scenarios.len(),
            expected: self.images * self.scenarios.len(),
            succeeded: self.succeeded,
            skipped: self.skipped,
            unreadable_images,
            written_per_scenario: self.written_per_scenario.clone(),
            failures_by_scenario,
            failures: self.failures.clone(),
            descriptions: self
                .scenarios
                .iter()
                .map(|s| (s.id.clone(), s.description.clone(), s.trace.clone()))
                .collect(),
        }
    }
}

/// Aggregate statistics for a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Source images attempted.
    pub images: usize,
    /// Scenarios in the catalog.
    pub scenarios: usize,
    /// `images * scenarios`.
    pub expected: usize,
    /// Outputs written.
    pub succeeded: usize,
    /// Outputs left in place by the skip-existing policy.
    pub skipped: usize,
    /// Source images that could not be decoded.
    pub unreadable_images: usize,
    /// Outputs written per scenario.
    pub written_per_scenario: BTreeMap<String, usize>,
    /// Scenario-level failures per scenario.
    pub failures_by_scenario: BTreeMap<String, usize>,
    /// Every recorded failure, in the order recorded.
    pub failures: Vec<Failure>,
    descriptions: Vec<(String, Option<String>, String)>,
}

impl RunSummary {
    /// Scenario identifier, description and step trace, in catalog order.
    pub fn scenario_traces(&self) -> impl Iterator<Item = (&str, Option<&str>, &str)> {
        self.descriptions
            .iter()
            .map(|(id, desc, trace)| (id.as_str(), desc.as_deref(), trace.as_str()))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Summary:")?;
        writeln!(f, "  Images processed: {}", self.images)?;
        writeln!(f, "  Scenarios per image: {}", self.scenarios)?;
        writeln!(f, "  Expected outputs: {}", self.expected)?;
        writeln!(f, "  Outputs written: {}", self.succeeded)?;
        if self.skipped > 0 {
            writeln!(f, "  Skipped (already present): {}", self.skipped)?;
        }
        if self.unreadable_images > 0 {
            writeln!(f, "  Unreadable images: {}", self.unreadable_images)?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "  Failures: {}", self.failures.len())?;
            for (scenario, count) in &self.failures_by_scenario {
                writeln!(f, "    {scenario}: {count}")?;
            }
            for failure in &self.failures {
                writeln!(f, "    - {failure}")?;
            }
        }
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(scenarios: &[&str]) -> RunReport {
        let mut report = RunReport::new();
        for id in scenarios {
            report.add_scenario(*id, format!("{id} trace"), None);
        }
        report
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut report = report_with(&["jpeg_95", "crop_10"]);
        report.record_image();
        report.record_image();
        report.record(Outcome::Written {
            scenario: "jpeg_95".into(),
            image: "a.png".into(),
            path: PathBuf::from("out/jpeg_95/a.png"),
        });
        report.record_success("crop_10", "a.png");
        report.record_failure(Failure {
            image: "b.png".into(),
            scenario: None,
            stage: FailureStage::SourceDecode,
            message: "bad header".into(),
        });

        let summary = report.summarize();
        assert_eq!(summary.images, 2);
        assert_eq!(summary.scenarios, 2);
        assert_eq!(summary.expected, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.unreadable_images, 1);
        assert!(summary.failures_by_scenario.is_empty());
        assert_eq!(summary.written_per_scenario["jpeg_95"], 1);
    }

    #[test]
    fn failures_are_grouped_by_scenario() {
        let mut report = report_with(&["crop_40"]);
        for image in ["a.png", "b.png"] {
            report.record_failure(Failure {
                image: image.into(),
                scenario: Some("crop_40".into()),
                stage: FailureStage::Step {
                    index: 0,
                    label: "Crop 40%".into(),
                },
                message: "boom".into(),
            });
        }
        let summary = report.summarize();
        assert_eq!(summary.failures_by_scenario["crop_40"], 2);

        let text = summary.to_string();
        assert!(text.contains("Failures: 2"));
        assert!(text.contains("a.png [crop_40] step 0 (Crop 40%): boom"));
    }

    #[test]
    fn trace_is_kept_per_scenario() {
        let report = report_with(&["thumbnail"]);
        assert_eq!(report.trace("thumbnail"), Some("thumbnail trace"));
        assert_eq!(report.trace("missing"), None);
    }
}
