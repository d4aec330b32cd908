//! Fork Patcher: ordered, idempotent text patch plans
//!
//! Derives a branded variant of an existing source tree by applying a fixed,
//! ordered list of textual transformations to its files. The files are never
//! parsed; every change is either a regex substitution or an append of a
//! literal snippet.
//!
//! # Architecture
//!
//! - [`Transform`]: a pure `content -> content` function. Never fails.
//! - [`PatchEngine`]: runs a [`PatchPlan`] step by step. It reads the target,
//!   applies the transform, writes only when the content changed, and stops at
//!   the first I/O failure.
//! - [`config`]: TOML plan files compiled into a [`PatchPlan`].
//!
//! # Caveat
//!
//! A substitution whose pattern matches nothing reports
//! [`StepOutcome::AlreadySatisfied`], exactly like one that was already
//! applied. A plan that no longer fits its target tree therefore "succeeds".
//!
//! # Example
//!
//! ```no_run
//! use fork_patcher::{PatchEngine, PatchPlan, PatchStep, Transform};
//! use regex::Regex;
//!
//! let plan = PatchPlan::default()
//!     .step(PatchStep::new(
//!         "src/Makefile",
//!         Transform::substitute(Regex::new(r"^(TARGET\s*=\s*).*").unwrap(), "$1nocursor"),
//!         "rename binary",
//!     ))
//!     .step(PatchStep::new(
//!         "src/term.c",
//!         Transform::append_if_missing("void hide_cursor(void) {}"),
//!         "add hide_cursor",
//!     ));
//!
//! let result = PatchEngine::new().run(plan);
//! if result.aborted {
//!     eprintln!("plan stopped early");
//! }
//! ```

pub mod config;
pub mod engine;
pub mod transform;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, PlanConfig, ValidationError};
pub use engine::{
    ContentChange, FailureKind, PatchEngine, PatchPlan, PatchStep, PlanResult, StepFailure,
    StepOutcome, StepRecord,
};
pub use transform::{MatchLimit, Transform, WriteMode};
