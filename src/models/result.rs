//! Benchmark result data models
//!
//! Contains the per-measurement timing record and the ordered report a
//! benchmark session produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::units::format_seconds;
use crate::Result;

/// One measured execution of an operation within a phase.
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTimingResult")]
pub struct TimingResult {
    operation_name: String,
    phase_name: String,
    duration_seconds: f64,
    documents: usize,
    timestamp: DateTime<Utc>,
}

/// Wire form of [`TimingResult`]; decoded records go through `new`
#[derive(Deserialize)]
struct RawTimingResult {
    operation_name: String,
    phase_name: String,
    duration_seconds: f64,
    documents: usize,
    timestamp: DateTime<Utc>,
}

impl From<RawTimingResult> for TimingResult {
    fn from(raw: RawTimingResult) -> Self {
        Self::new(
            raw.operation_name,
            raw.phase_name,
            raw.duration_seconds,
            raw.documents,
            raw.timestamp,
        )
    }
}

impl TimingResult {
    /// Create a timing record; negative durations are clamped to zero
    pub fn new(
        operation_name: impl Into<String>,
        phase_name: impl Into<String>,
        duration_seconds: f64,
        documents: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            phase_name: phase_name.into(),
            duration_seconds: duration_seconds.max(0.0),
            documents,
            timestamp,
        }
    }

    /// Name of the measured operation
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Name of the phase the measurement belongs to
    pub fn phase_name(&self) -> &str {
        &self.phase_name
    }

    /// Wall-clock duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Number of result documents materialized during the measurement
    pub fn documents(&self) -> usize {
        self.documents
    }

    /// When the measurement started
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get a human-readable summary line
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} - {} ({} docs)",
            self.phase_name,
            self.operation_name,
            format_seconds(self.duration_seconds),
            self.documents
        )
    }
}

/// Speed of one operation in a candidate phase relative to a baseline phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseComparison {
    pub operation_name: String,
    pub baseline_seconds: f64,
    pub candidate_seconds: f64,
    /// `baseline / candidate`; above 1.0 means the candidate was faster.
    /// `None` when the candidate took no measurable time.
    pub speedup: Option<f64>,
}

/// Ordered timing records of one session, in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    entries: Vec<TimingResult>,
}

impl Report {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; records are never reordered or deduplicated
    pub fn push(&mut self, result: TimingResult) {
        self.entries.push(result);
    }

    /// All records in execution order
    pub fn entries(&self) -> &[TimingResult] {
        &self.entries
    }

    /// Iterate records in execution order
    pub fn iter(&self) -> std::slice::Iter<'_, TimingResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct phase names in order of first appearance
    pub fn phase_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.phase_name()) {
                names.push(entry.phase_name());
            }
        }
        names
    }

    /// Records of one phase, in execution order
    pub fn for_phase<'a>(&'a self, phase_name: &'a str) -> impl Iterator<Item = &'a TimingResult> {
        self.entries
            .iter()
            .filter(move |entry| entry.phase_name == phase_name)
    }

    /// Records of one operation across phases, in execution order
    pub fn for_operation<'a>(
        &'a self,
        operation_name: &'a str,
    ) -> impl Iterator<Item = &'a TimingResult> {
        self.entries
            .iter()
            .filter(move |entry| entry.operation_name == operation_name)
    }

    /// Sum of all measured durations
    pub fn total_seconds(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_seconds).sum()
    }

    /// Compare every operation measured in both phases, using the first
    /// measurement of the operation in each phase
    pub fn compare(&self, baseline_phase: &str, candidate_phase: &str) -> Vec<PhaseComparison> {
        let mut comparisons = Vec::new();
        for baseline in self.for_phase(baseline_phase) {
            if comparisons
                .iter()
                .any(|c: &PhaseComparison| c.operation_name == baseline.operation_name)
            {
                continue;
            }
            let candidate = self
                .for_phase(candidate_phase)
                .find(|entry| entry.operation_name == baseline.operation_name);
            if let Some(candidate) = candidate {
                let speedup = if candidate.duration_seconds > 0.0 {
                    Some(baseline.duration_seconds / candidate.duration_seconds)
                } else {
                    None
                };
                comparisons.push(PhaseComparison {
                    operation_name: baseline.operation_name.clone(),
                    baseline_seconds: baseline.duration_seconds,
                    candidate_seconds: candidate.duration_seconds,
                    speedup,
                });
            }
        }
        comparisons
    }

    /// Human-readable lines, one per record, grouped under phase headings
    /// in execution order
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_phase: Option<&str> = None;
        for entry in &self.entries {
            if current_phase != Some(entry.phase_name()) {
                lines.push(entry.phase_name().to_string());
                current_phase = Some(entry.phase_name());
            }
            lines.push(format!(
                "  {}: {} ({} docs)",
                entry.operation_name,
                format_seconds(entry.duration_seconds),
                entry.documents
            ));
        }
        lines
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a TimingResult;
    type IntoIter = std::slice::Iter<'a, TimingResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(operation: &str, phase: &str, seconds: f64) -> TimingResult {
        TimingResult::new(operation, phase, seconds, 5, Utc::now())
    }

    fn sample_report() -> Report {
        let mut report = Report::new();
        report.push(entry("top-5", "cold, no index", 0.9));
        report.push(entry("top-5", "warm, no index", 0.15));
        report.push(entry("top-5", "with index", 0.3));
        report.push(entry("top-5", "with index", 0.1));
        report
    }

    #[test]
    fn test_negative_duration_clamped() {
        let result = entry("op", "phase", -0.5);
        assert_eq!(result.duration_seconds(), 0.0);
    }

    #[test]
    fn test_deserialized_negative_duration_clamped() {
        let result: TimingResult = serde_json::from_value(serde_json::json!({
            "operation_name": "top-5",
            "phase_name": "cold, no index",
            "duration_seconds": -3.0,
            "documents": 5,
            "timestamp": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(result.duration_seconds(), 0.0);
        assert_eq!(result.documents(), 5);

        let report: Report = serde_json::from_value(serde_json::json!({
            "entries": [{
                "operation_name": "top-5",
                "phase_name": "with index",
                "duration_seconds": -0.25,
                "documents": 5,
                "timestamp": "2024-05-01T12:00:01Z"
            }]
        }))
        .unwrap();
        assert!(report.iter().all(|entry| entry.duration_seconds() >= 0.0));
    }

    #[test]
    fn test_report_keeps_insertion_order_and_duplicates() {
        let report = sample_report();
        assert_eq!(report.len(), 4);
        assert_eq!(
            report.phase_names(),
            vec!["cold, no index", "warm, no index", "with index"]
        );
        assert_eq!(report.for_phase("with index").count(), 2);
        assert_eq!(report.for_operation("top-5").count(), 4);
        assert!((report.total_seconds() - 1.45).abs() < 1e-9);
    }

    #[test]
    fn test_compare_uses_first_measurement() {
        let report = sample_report();
        let comparison = report.compare("cold, no index", "with index");
        assert_eq!(comparison.len(), 1);
        assert_eq!(comparison[0].candidate_seconds, 0.3);
        assert!((comparison[0].speedup.unwrap() - 3.0).abs() < 1e-9);

        assert!(report.compare("cold, no index", "missing").is_empty());
    }

    #[test]
    fn test_compare_zero_candidate() {
        let mut report = Report::new();
        report.push(entry("op", "a", 0.5));
        report.push(entry("op", "b", 0.0));
        assert_eq!(report.compare("a", "b")[0].speedup, None);
    }

    #[test]
    fn test_summary_groups_consecutive_phases() {
        let lines = sample_report().summary();
        assert_eq!(lines[0], "cold, no index");
        assert!(lines[1].starts_with("  top-5: "));
        assert_eq!(lines.iter().filter(|l| l.as_str() == "with index").count(), 1);
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let value: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        let first = &value["entries"][0];
        assert_eq!(first["operation_name"], "top-5");
        assert_eq!(first["phase_name"], "cold, no index");
        assert_eq!(first["duration_seconds"], 0.9);
        assert!(first["timestamp"].is_string());

        let back: Report = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }
}
