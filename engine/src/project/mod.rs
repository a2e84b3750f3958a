//! Project documents
//!
//! A project is the persistent record of one analysis subject: its canonical
//! kebab-case name, its coordinates, one optional result slot per pipeline step
//! and the metrics derived from those results. Documents only ever grow: a
//! merge adds or overwrites step results and never removes one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use vane_sdk::errors::EngineError;
use vane_sdk::types::{Coordinates, StepKind};

pub mod store;

pub use store::{ProjectBackend, ProjectStore};

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Output of one successful worker invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub data: Value,
    pub completed_at: i64,
    pub worker: String,
}

impl StepResult {
    pub fn new(worker: impl Into<String>, data: Value, completed_at: i64) -> Self {
        Self {
            data,
            completed_at,
            worker: worker.into(),
        }
    }
}

/// One result slot per pipeline step; `None` until the step has succeeded
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepResults {
    #[serde(default)]
    pub terrain: Option<StepResult>,
    #[serde(default)]
    pub layout: Option<StepResult>,
    #[serde(default)]
    pub simulation: Option<StepResult>,
    #[serde(default)]
    pub report: Option<StepResult>,
}

impl StepResults {
    pub fn get(&self, step: StepKind) -> Option<&StepResult> {
        match step {
            StepKind::Terrain => self.terrain.as_ref(),
            StepKind::Layout => self.layout.as_ref(),
            StepKind::Simulation => self.simulation.as_ref(),
            StepKind::Report => self.report.as_ref(),
        }
    }

    fn slot_mut(&mut self, step: StepKind) -> &mut Option<StepResult> {
        match step {
            StepKind::Terrain => &mut self.terrain,
            StepKind::Layout => &mut self.layout,
            StepKind::Simulation => &mut self.simulation,
            StepKind::Report => &mut self.report,
        }
    }

    pub fn set(&mut self, step: StepKind, result: StepResult) {
        *self.slot_mut(step) = Some(result);
    }

    pub fn is_complete(&self, step: StepKind) -> bool {
        self.get(step).is_some()
    }

    pub fn status(&self) -> StepStatus {
        StepStatus {
            terrain: self.terrain.is_some(),
            layout: self.layout.is_some(),
            simulation: self.simulation.is_some(),
            report: self.report.is_some(),
        }
    }
}

/// Completion flag per step, as shown to callers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepStatus {
    pub terrain: bool,
    pub layout: bool,
    pub simulation: bool,
    pub report: bool,
}

impl StepStatus {
    pub fn is_complete(&self, step: StepKind) -> bool {
        match step {
            StepKind::Terrain => self.terrain,
            StepKind::Layout => self.layout,
            StepKind::Simulation => self.simulation,
            StepKind::Report => self.report,
        }
    }

    pub fn completed_count(&self) -> usize {
        StepKind::ALL
            .iter()
            .filter(|step| self.is_complete(**step))
            .count()
    }

    /// `completed / total * 100`, rounded down
    pub fn completion_percent(&self) -> u8 {
        (self.completed_count() * 100 / StepKind::ALL.len()) as u8
    }

    /// First step in pipeline order that has not completed yet
    pub fn next_step(&self) -> Option<StepKind> {
        StepKind::ALL
            .iter()
            .copied()
            .find(|step| !self.is_complete(*step))
    }
}

/// Figures derived from the layout and simulation results
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub unit_count: Option<u64>,
    pub total_capacity_mw: Option<f64>,
    pub annual_output_gwh: Option<f64>,
}

impl Metrics {
    /// Derive metrics from step results; `None` until a layout exists
    pub fn compute(results: &StepResults) -> Option<Self> {
        let layout = &results.layout.as_ref()?.data;

        let unit_count = layout
            .get("unit_count")
            .and_then(Value::as_u64)
            .or_else(|| {
                ["units", "turbines"]
                    .iter()
                    .find_map(|key| layout.get(*key).and_then(Value::as_array))
                    .map(|units| units.len() as u64)
            });

        let total_capacity_mw = layout
            .get("total_capacity_mw")
            .and_then(Value::as_f64)
            .or_else(|| {
                let per_unit = layout.get("unit_capacity_mw").and_then(Value::as_f64)?;
                unit_count.map(|count| count as f64 * per_unit)
            });

        let annual_output_gwh = results.simulation.as_ref().and_then(|simulation| {
            ["annual_output_gwh", "aep_gwh"]
                .iter()
                .find_map(|key| simulation.data.get(*key).and_then(Value::as_f64))
        });

        Some(Self {
            unit_count,
            total_capacity_mw,
            annual_output_gwh,
        })
    }
}

/// The persisted record of one project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub name: String,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub step_results: StepResults,
    pub metrics: Option<Metrics>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProjectDocument {
    /// A document with no results yet, as used for a project that is not stored
    pub fn empty(name: impl Into<String>, now: i64) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
            step_results: StepResults::default(),
            metrics: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> StepStatus {
        self.step_results.status()
    }

    pub fn completion_percent(&self) -> u8 {
        self.status().completion_percent()
    }

    /// Whether nothing has been computed for this project
    pub fn is_empty(&self) -> bool {
        self.status().completed_count() == 0
    }

    /// Check the step ordering constraints
    pub fn validate(&self) -> Result<(), EngineError> {
        let status = self.status();
        if status.layout && self.coordinates.is_none() {
            return Err(EngineError::InvalidDocument(format!(
                "project '{}' has a layout but no coordinates",
                self.name
            )));
        }
        if status.simulation && !status.layout {
            return Err(EngineError::InvalidDocument(format!(
                "project '{}' has a simulation but no layout",
                self.name
            )));
        }
        if status.report && !(status.terrain || status.layout || status.simulation) {
            return Err(EngineError::InvalidDocument(format!(
                "project '{}' has a report but no analysis to report on",
                self.name
            )));
        }
        Ok(())
    }

    /// Fold a partial update into this document
    ///
    /// Coordinates are replaced only when the update supplies them. Step results
    /// named by the update overwrite the same slot; every other slot is kept.
    /// The result is validated before metrics are recomputed, so an update that
    /// would break the step ordering leaves the caller with an error and no
    /// document.
    pub fn merge(mut self, update: &ProjectUpdate, now: i64) -> Result<Self, EngineError> {
        if update.name != self.name {
            return Err(EngineError::InvalidDocument(format!(
                "update for '{}' applied to '{}'",
                update.name, self.name
            )));
        }

        if let Some(coordinates) = update.coordinates {
            self.coordinates = Some(coordinates);
        }

        for (step, result) in &update.steps {
            self.step_results.set(*step, result.clone());
        }

        self.validate()?;

        self.metrics = Metrics::compute(&self.step_results);
        self.updated_at = now.max(self.created_at);

        Ok(self)
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            name: self.name.clone(),
            updated_at: self.updated_at,
            status: self.status(),
            completion_percent: self.completion_percent(),
            coordinates: self.coordinates,
        }
    }
}

/// Partial write applied through `ProjectStore::save`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectUpdate {
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub steps: Vec<(StepKind, StepResult)>,
}

impl ProjectUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
            steps: Vec::new(),
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_step(mut self, step: StepKind, result: StepResult) -> Self {
        self.steps.push((step, result));
        self
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub updated_at: i64,
    pub status: StepStatus,
    pub completion_percent: u8,
    pub coordinates: Option<Coordinates>,
}
