//! Progress reporting for inference runs.
//!
//! Inference never prints. Each combination step is reported to an
//! [`InferenceObserver`] handed in by the caller:
//! - [`NoopObserver`] discards everything
//! - [`RecordingObserver`] keeps reports in memory
//! - [`TracingObserver`] forwards them to `tracing` when the feature is enabled

use crate::model::attribute::AttributeId;

/// How a matrix was folded into the accumulated distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StepKind {
    /// First matrix: profiles taken from its normalized cells.
    Seed,
    /// Conditional combination through hook attributes.
    Fold,
    /// Redistribution through an aggregated attribute's referent.
    Aggregated,
}

/// Outcome of one combination step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepReport {
    /// Position of the step in the run, starting at 0.
    pub index: usize,
    pub matrix: String,
    pub kind: StepKind,
    /// Attributes already known and shared with the matrix.
    pub hooks: Vec<AttributeId>,
    /// Attributes introduced by the matrix.
    pub introduced: Vec<AttributeId>,
    pub profiles_in: usize,
    pub profiles_out: usize,
    pub mass_in: f64,
    pub mass_out: f64,
    /// Profiles extended with empty values instead of matched cells.
    pub untargeted: usize,
}

impl StepReport {
    /// Mass lost by the step.
    pub fn dropped_mass(&self) -> f64 {
        self.mass_in - self.mass_out
    }
}

/// Receives progress of an inference run. Steps are sequential.
pub trait InferenceObserver {
    fn step_started(&mut self, _index: usize, _matrix: &str) {}

    fn step_finished(&mut self, _report: &StepReport) {}
}

/// Observer discarding every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl InferenceObserver for NoopObserver {}

/// Observer keeping every report.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub started: Vec<String>,
    pub reports: Vec<StepReport>,
}

impl InferenceObserver for RecordingObserver {
    fn step_started(&mut self, _index: usize, matrix: &str) {
        self.started.push(matrix.to_string());
    }

    fn step_finished(&mut self, report: &StepReport) {
        self.reports.push(report.clone());
    }
}

/// Observer forwarding reports to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl InferenceObserver for TracingObserver {
    fn step_started(&mut self, _index: usize, _matrix: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!(step = _index, matrix = _matrix, "combination step started");
    }

    fn step_finished(&mut self, _report: &StepReport) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            step = _report.index,
            matrix = %_report.matrix,
            kind = ?_report.kind,
            profiles = _report.profiles_out,
            mass = _report.mass_out,
            dropped = _report.dropped_mass(),
            untargeted = _report.untargeted,
            "combination step finished"
        );
    }
}

/// Summary of a whole inference run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InferenceDiagnostics {
    pub strategy: &'static str,
    pub steps: Vec<StepReport>,
    /// Attribute order followed by the hierarchical strategy, empty otherwise.
    pub exploration_order: Vec<AttributeId>,
    pub profile_count: usize,
    pub total_mass: f64,
}

impl InferenceDiagnostics {
    /// Mass lost across all steps.
    pub fn dropped_mass(&self) -> f64 {
        self.steps.iter().map(StepReport::dropped_mass).sum()
    }
}
