use crate::engine::{PatchPlan, PatchStep};
use crate::transform::{MatchLimit, Transform};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PlanConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PlanConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        if self.steps.is_empty() {
            issues.push(ValidationIssue::EmptyStepList);
        }

        for step in &self.steps {
            let step_id = if step.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: None,
                    field: "id",
                });
                None
            } else {
                if !seen.insert(step.id.as_str()) {
                    issues.push(ValidationIssue::DuplicateId {
                        step_id: step.id.clone(),
                    });
                }
                Some(step.id.clone())
            };

            if step.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: step_id.clone(),
                    field: "file",
                });
            }

            match &step.transform {
                TransformSpec::Substitute {
                    pattern,
                    unless_contains,
                    ..
                } => {
                    if pattern.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id.clone(),
                            field: "transform.pattern",
                        });
                    } else if let Err(e) = Regex::new(pattern) {
                        issues.push(ValidationIssue::InvalidPattern {
                            step_id: step_id.clone(),
                            message: e.to_string(),
                        });
                    }
                    if unless_contains.as_deref() == Some("") {
                        issues.push(ValidationIssue::InvalidCombo {
                            step_id: step_id.clone(),
                            message: "unless_contains must not be empty".to_string(),
                        });
                    }
                }
                TransformSpec::AppendIfMissing { snippet } => {
                    if snippet.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id.clone(),
                            field: "transform.snippet",
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Resolve a step's target path.
    pub fn resolve_file(&self, workspace_root: &Path, file: &str) -> PathBuf {
        if self.meta.workspace_relative {
            workspace_root.join(file)
        } else {
            PathBuf::from(file)
        }
    }

    /// Compile into an executable plan, preserving step order.
    pub fn to_plan(&self, workspace_root: &Path) -> Result<PatchPlan, ValidationError> {
        let mut steps = Vec::with_capacity(self.steps.len());
        let mut issues = Vec::new();

        for def in &self.steps {
            match def.transform.compile() {
                Ok(transform) => steps.push(PatchStep::new(
                    self.resolve_file(workspace_root, &def.file),
                    transform,
                    def.label(),
                )),
                Err(e) => issues.push(ValidationIssue::InvalidPattern {
                    step_id: Some(def.id.clone()),
                    message: e.to_string(),
                }),
            }
        }

        if issues.is_empty() {
            Ok(PatchPlan::new(steps))
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StepDefinition {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub description: Option<String>,
    pub transform: TransformSpec,
}

impl StepDefinition {
    /// Human-readable label: the id, plus the description when present.
    pub fn label(&self) -> String {
        match &self.description {
            Some(desc) if !desc.trim().is_empty() => format!("{} ({})", self.id, desc.trim()),
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransformSpec {
    Substitute {
        pattern: String,
        #[serde(default)]
        template: String,
        #[serde(default)]
        limit: MatchLimit,
        #[serde(default)]
        unless_contains: Option<String>,
    },
    AppendIfMissing {
        snippet: String,
    },
}

impl TransformSpec {
    pub fn compile(&self) -> Result<Transform, regex::Error> {
        match self {
            TransformSpec::Substitute {
                pattern,
                template,
                limit,
                unless_contains,
            } => {
                let transform = Transform::substitute(Regex::new(pattern)?, template)
                    .with_limit(*limit);
                Ok(match unless_contains {
                    Some(guard) => transform.unless_contains(guard.clone()),
                    None => transform,
                })
            }
            TransformSpec::AppendIfMissing { snippet } => {
                Ok(Transform::append_if_missing(snippet.clone()))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransformSpec::Substitute { .. } => "substitute",
            TransformSpec::AppendIfMissing { .. } => "append-if-missing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyStepList,
    MissingField {
        step_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        step_id: String,
    },
    InvalidPattern {
        step_id: Option<String>,
        message: String,
    },
    InvalidCombo {
        step_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyStepList => write!(f, "patch plan contains no steps"),
            ValidationIssue::MissingField { step_id, field } => match step_id {
                Some(id) => write!(f, "step '{id}' missing required field '{field}'"),
                None => write!(f, "step missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { step_id } => {
                write!(f, "step id '{step_id}' is used more than once")
            }
            ValidationIssue::InvalidPattern { step_id, message } => match step_id {
                Some(id) => write!(f, "step '{id}' has an invalid pattern: {message}"),
                None => write!(f, "invalid pattern: {message}"),
            },
            ValidationIssue::InvalidCombo { step_id, message } => match step_id {
                Some(id) => write!(f, "step '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid step configuration: {message}"),
            },
        }
    }
}
