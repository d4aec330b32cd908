//! Patch engine - executes a patch plan against the filesystem
//!
//! Steps run strictly in plan order. For each step the engine:
//! - reads the whole target file
//! - applies the step's transform
//! - writes back only when the content changed
//! - stops the plan at the first read or write failure
//!
//! There is no retry and no rollback: files touched by steps before a failure
//! stay modified.

use crate::transform::{Transform, WriteMode};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// One target file plus the transform to apply to it.
#[derive(Debug, Clone)]
pub struct PatchStep {
    target: PathBuf,
    transform: Transform,
    label: String,
}

impl PatchStep {
    pub fn new(target: impl Into<PathBuf>, transform: Transform, label: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            transform,
            label: label.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Ordered list of steps. Later steps may depend on earlier ones.
#[derive(Debug, Clone, Default)]
pub struct PatchPlan {
    steps: Vec<PatchStep>,
}

impl PatchPlan {
    pub fn new(steps: Vec<PatchStep>) -> Self {
        Self { steps }
    }

    /// Append a step, builder style.
    pub fn step(mut self, step: PatchStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PatchStep] {
        &self.steps
    }
}

impl FromIterator<PatchStep> for PatchPlan {
    fn from_iter<I: IntoIterator<Item = PatchStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PatchPlan {
    type Item = PatchStep;
    type IntoIter = std::vec::IntoIter<PatchStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ReadError,
    WriteError,
}

/// The only fatal conditions: the target could not be read or written.
#[derive(Error, Debug)]
pub enum StepFailure {
    #[error("unable to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("unable to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl StepFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepFailure::Read { .. } => FailureKind::ReadError,
            StepFailure::Write { .. } => FailureKind::WriteError,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            StepFailure::Read { path, .. } | StepFailure::Write { path, .. } => path,
        }
    }
}

/// Classification of a single attempted step.
#[derive(Debug)]
#[must_use = "StepOutcome should be checked for failure"]
pub enum StepOutcome {
    /// Content changed and was persisted (or would be, in a dry run)
    Applied,
    /// Content unchanged: pattern matched nothing, guard present, or snippet present
    AlreadySatisfied,
    Failed(StepFailure),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StepOutcome::Failed(failure) => Some(failure.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::AlreadySatisfied => write!(f, "already satisfied"),
            StepOutcome::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// File content before and after an applied step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub before: String,
    pub after: String,
}

#[derive(Debug)]
pub struct StepRecord {
    pub label: String,
    pub target: PathBuf,
    pub outcome: StepOutcome,
    /// Present only for applied steps when change capture is enabled
    pub change: Option<ContentChange>,
}

/// Outcomes of the steps actually attempted, in plan order.
#[derive(Debug, Default)]
#[must_use = "PlanResult should be checked for an aborted run"]
pub struct PlanResult {
    pub records: Vec<StepRecord>,
    pub aborted: bool,
}

impl PlanResult {
    pub fn outcomes(&self) -> impl Iterator<Item = &StepOutcome> {
        self.records.iter().map(|record| &record.outcome)
    }

    pub fn applied_count(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, StepOutcome::Applied))
            .count()
    }

    pub fn satisfied_count(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, StepOutcome::AlreadySatisfied))
            .count()
    }

    /// The failing step's record, if the run aborted.
    pub fn failure(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.outcome.is_failed())
    }

    pub fn is_complete(&self) -> bool {
        !self.aborted
    }
}

/// Runs patch plans. Single-threaded; one step finishes before the next starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchEngine {
    dry_run: bool,
    capture_changes: bool,
}

impl PatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify steps without writing anything. `Applied` then means "would apply",
    /// and later steps of the same plan see the content earlier steps would write.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Keep before/after content for applied steps.
    pub fn capture_changes(mut self, enabled: bool) -> Self {
        self.capture_changes = enabled;
        self
    }

    /// Execute `plan`, stopping at the first failed step.
    pub fn run(&self, plan: PatchPlan) -> PlanResult {
        let mut result = PlanResult {
            records: Vec::with_capacity(plan.len()),
            aborted: false,
        };

        // Dry runs write nothing; later steps read earlier "would apply" content from here.
        let mut staged: HashMap<PathBuf, String> = HashMap::new();

        for step in plan {
            let (outcome, change) = match self.execute_step(&step, &mut staged) {
                Ok(Some(change)) => (StepOutcome::Applied, self.capture_changes.then_some(change)),
                Ok(None) => (StepOutcome::AlreadySatisfied, None),
                Err(failure) => (StepOutcome::Failed(failure), None),
            };

            match &outcome {
                StepOutcome::Failed(failure) => {
                    warn!(step = %step.label, error = %failure, "step failed, aborting plan")
                }
                other => debug!(
                    step = %step.label,
                    path = %step.target.display(),
                    dry_run = self.dry_run,
                    "{other}"
                ),
            }

            let failed = outcome.is_failed();
            result.records.push(StepRecord {
                label: step.label,
                target: step.target,
                outcome,
                change,
            });

            if failed {
                result.aborted = true;
                break;
            }
        }

        result
    }

    /// Read, transform, compare and (unless dry) write one step.
    ///
    /// Returns the change when the content differs, `None` when it does not.
    /// In a dry run the content comes from `staged` when an earlier step of the
    /// plan would have changed the same file.
    fn execute_step(
        &self,
        step: &PatchStep,
        staged: &mut HashMap<PathBuf, String>,
    ) -> Result<Option<ContentChange>, StepFailure> {
        let before = match staged.get(&step.target) {
            Some(content) if self.dry_run => content.clone(),
            _ => read_text(&step.target).map_err(|source| StepFailure::Read {
                path: step.target.clone(),
                source,
            })?,
        };

        let after = step.transform.apply(&before);
        if after == before {
            return Ok(None);
        }

        if self.dry_run {
            staged.insert(step.target.clone(), after.clone());
        } else {
            write_text(&step.target, &before, &after, step.transform.write_mode()).map_err(
                |source| StepFailure::Write {
                    path: step.target.clone(),
                    source,
                },
            )?;
        }

        Ok(Some(ContentChange { before, after }))
    }
}

/// Read a whole file as UTF-8. The handle is closed on return.
fn read_text(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Persist `after` over `before`. The file must already exist.
///
/// Append mode writes only the suffix `after` adds to `before`; if `after`
/// is not an extension of `before` the whole file is rewritten instead.
fn write_text(path: &Path, before: &str, after: &str, mode: WriteMode) -> io::Result<()> {
    let (mut file, bytes) = match (mode, after.strip_prefix(before)) {
        (WriteMode::Append, Some(suffix)) => {
            (OpenOptions::new().append(true).open(path)?, suffix)
        }
        _ => (
            OpenOptions::new().write(true).truncate(true).open(path)?,
            after,
        ),
    };

    file.write_all(bytes.as_bytes())?;
    file.sync_all()?;
    Ok(())
}
